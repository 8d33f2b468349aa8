//! Integration tests for the screener fetcher against a fake chartink endpoint.

use serde_json::json;
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::util::SubscriberInitExt;
use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use screener_web::{Catalog, FetchError, QueryPayload, ScreenerFetcher};

const PAGE_WITH_TOKEN: &str = r#"<!DOCTYPE html><html><head>
<meta name="csrf-token" content="tok123">
</head><body>screener</body></html>"#;

fn payload() -> QueryPayload {
    Catalog::builtin()
        .unwrap()
        .get("episodic_pivot")
        .unwrap()
        .query_payload
        .clone()
}

fn fetcher_for(server: &MockServer) -> ScreenerFetcher {
    ScreenerFetcher::new(format!("{}/screener/process", server.uri()))
}

async fn mount_page(server: &MockServer, html: &str) {
    Mock::given(method("GET"))
        .and(path("/screener/process"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_posts_token_and_scan_clause() {
    let server = MockServer::start().await;
    mount_page(&server, PAGE_WITH_TOKEN).await;

    Mock::given(method("POST"))
        .and(path("/screener/process"))
        .and(header("x-csrf-token", "tok123"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("scan_clause="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "draw": 1,
            "recordsTotal": 2,
            "data": [
                {"sr": 1, "nsecode": "TCS", "name": "Tata Consultancy", "per_chg": 1.2, "close": 3400, "volume": 500000},
                {"nsecode": "BAD"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = fetcher_for(&server)
        .fetch("episodic_pivot", &payload())
        .await
        .unwrap();

    assert_eq!(result.rows.len(), 1);
    let row = &result.rows[0];
    assert_eq!(row.symbol, "TCS");
    assert_eq!(row.percent_change.as_f64(), Some(1.2));
    assert_eq!(row.price.as_i64(), Some(3400));
    assert_eq!(row.volume.as_i64(), Some(500000));
    assert_eq!(row.rank, 1);
    assert_eq!(result.fetched_at.offset().local_minus_utc(), 19800);
}

#[tokio::test]
async fn test_fetch_without_token_still_posts() {
    let server = MockServer::start().await;
    mount_page(&server, "<html><head></head><body></body></html>").await;

    Mock::given(method("POST"))
        .and(path("/screener/process"))
        .and(header_exists("x-csrf-token"))
        .respond_with(ResponseTemplate::new(419))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/screener/process"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let result = fetcher_for(&server)
        .fetch("episodic_pivot", &payload())
        .await
        .unwrap();
    assert!(result.rows.is_empty());
}

#[tokio::test]
async fn test_fetch_non_json_reply_is_malformed() {
    let server = MockServer::start().await;
    mount_page(&server, PAGE_WITH_TOKEN).await;

    Mock::given(method("POST"))
        .and(path("/screener/process"))
        .respond_with(ResponseTemplate::new(419).set_body_string("<html>Page Expired</html>"))
        .mount(&server)
        .await;

    let err = fetcher_for(&server)
        .fetch("episodic_pivot", &payload())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_fetch_reply_without_data_is_malformed() {
    let server = MockServer::start().await;
    mount_page(&server, PAGE_WITH_TOKEN).await;

    Mock::given(method("POST"))
        .and(path("/screener/process"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "message": "CSRF token mismatch." })),
        )
        .mount(&server)
        .await;

    let err = fetcher_for(&server)
        .fetch("episodic_pivot", &payload())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_fetch_unreachable_host_is_network_error() {
    // Nothing listens on the discard port locally.
    let err = ScreenerFetcher::new("http://127.0.0.1:9/screener/process")
        .fetch("episodic_pivot", &payload())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Network(_)));
}

#[tokio::test]
async fn test_each_fetch_opens_its_own_session() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/screener/process"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE_WITH_TOKEN))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/screener/process"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(2)
        .mount(&server)
        .await;

    let fetcher = fetcher_for(&server);
    fetcher.fetch("episodic_pivot", &payload()).await.unwrap();
    fetcher.fetch("episodic_pivot", &payload()).await.unwrap();
}

#[tokio::test]
async fn test_session_cookie_carries_to_post() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/screener/process"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "ci_session=abc123; Path=/")
                .set_body_string(PAGE_WITH_TOKEN),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/screener/process"))
        .and(header("cookie", "ci_session=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(1)
        .mount(&server)
        .await;

    fetcher_for(&server).fetch("episodic_pivot", &payload()).await.unwrap();
}

/// Writer that keeps formatted log output in memory.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_fetch_span_records_screener_id() {
    let server = MockServer::start().await;
    mount_page(&server, PAGE_WITH_TOKEN).await;

    Mock::given(method("POST"))
        .and(path("/screener/process"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    let logs = LogBuffer::default();
    let writer = logs.clone();
    let _guard = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish()
        .set_default();

    fetcher_for(&server)
        .fetch("volume_buzz", &payload())
        .await
        .unwrap();

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    let line = output
        .lines()
        .find(|line| line.contains("Screener fetched"))
        .expect("fetch summary logged");
    assert!(line.contains("screener_fetch{"));
    assert!(line.contains("fetch_id="));
    assert!(line.contains("screener=volume_buzz"));
}
