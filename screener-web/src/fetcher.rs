//! Screener fetcher: runs one screener against chartink.com.
//!
//! Every fetch is a fresh session:
//!
//! 1. `GET` the screener endpoint and read the `csrf-token` meta tag
//! 2. `POST` the query payload as a form with the token in `x-csrf-token`
//! 3. Read the `data` array of the JSON reply and keep complete rows
//!
//! No client, cookie or token outlives a single call.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::time::Duration;
use tracing::Instrument;

use crate::catalog::QueryPayload;
use screener_common::config::ChartinkConfig;
use screener_common::logging::generate_fetch_id;

/// Raw keys every result row must carry.
pub const REQUIRED_KEYS: [&str; 5] = ["nsecode", "per_chg", "close", "volume", "sr"];

const CSRF_HEADER: &str = "x-csrf-token";

/// Indian Standard Time (UTC+05:30).
pub fn ist_timezone() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("UTC+05:30 is a valid timezone offset")
}

/// Fetch failures. All of them collapse to an empty or error result at the route layer.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Unknown screener: {0}")]
    UnknownScreener(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// One matched stock. Numbers keep the integer or float kind chartink sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    #[serde(rename = "stock_name")]
    pub symbol: String,
    pub percent_change: Number,
    #[serde(rename = "current_price")]
    pub price: Number,
    #[serde(rename = "trade_volume")]
    pub volume: Number,
    pub rank: i64,
}

impl ResultRow {
    /// Project a raw record. `None` when a required key is missing or unreadable.
    pub fn from_raw(raw: &Map<String, Value>) -> Option<Self> {
        if !REQUIRED_KEYS.iter().all(|key| raw.contains_key(*key)) {
            return None;
        }

        let row = Self {
            symbol: as_text(&raw["nsecode"])?,
            percent_change: as_number(&raw["per_chg"])?,
            price: as_number(&raw["close"])?,
            volume: as_number(&raw["volume"])?,
            rank: as_integer(&raw["sr"])?,
        };
        Some(row)
    }

    /// Whether the day's change is zero or positive.
    pub fn is_up(&self) -> bool {
        self.percent_change.as_f64().is_some_and(|change| change >= 0.0)
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Rows of one screener run.
#[derive(Debug, Clone, Serialize)]
pub struct ScreenerResult {
    pub rows: Vec<ResultRow>,
    pub fetched_at: DateTime<FixedOffset>,
}

/// Keep the raw records that carry every required key and project them.
pub fn normalize_rows(raw_rows: &[Value]) -> Vec<ResultRow> {
    raw_rows
        .iter()
        .filter_map(|raw| {
            let row = raw.as_object().and_then(ResultRow::from_raw);
            if row.is_none() {
                tracing::debug!(row = %raw, "Dropping incomplete screener row");
            }
            row
        })
        .collect()
}

/// Read the `content` of `<meta name="csrf-token">`, if any.
pub fn extract_csrf_token(html: &str) -> Option<String> {
    let document = scraper::Html::parse_document(html);
    let selector = scraper::Selector::parse(r#"meta[name="csrf-token"]"#).ok()?;

    document
        .select(&selector)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .map(str::to_string)
}

/// Parse the scan reply and return its `data` array.
pub fn parse_scan_body(body: &str) -> Result<Vec<Value>, FetchError> {
    let mut json: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::MalformedResponse(format!("body is not JSON: {}", e)))?;

    match json.get_mut("data").map(Value::take) {
        Some(Value::Array(rows)) => Ok(rows),
        Some(other) => Err(FetchError::MalformedResponse(format!(
            "`data` is not an array: {}",
            other
        ))),
        None => Err(FetchError::MalformedResponse("missing `data` field".into())),
    }
}

/// Client for the external screener endpoint.
#[derive(Debug, Clone)]
pub struct ScreenerFetcher {
    endpoint: String,
    timeout: Option<Duration>,
}

impl ScreenerFetcher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn from_config(config: &ChartinkConfig) -> Self {
        let fetcher = Self::new(config.endpoint.clone());
        match config.timeout_secs {
            Some(secs) => fetcher.with_timeout(Duration::from_secs(secs)),
            None => fetcher,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run one screener query.
    pub async fn fetch(
        &self,
        screener_id: &str,
        payload: &QueryPayload,
    ) -> Result<ScreenerResult, FetchError> {
        let span = tracing::info_span!(
            "screener_fetch",
            fetch_id = %generate_fetch_id(),
            screener = %screener_id
        );
        self.fetch_inner(payload).instrument(span).await
    }

    async fn fetch_inner(&self, payload: &QueryPayload) -> Result<ScreenerResult, FetchError> {
        let start = std::time::Instant::now();
        let client = self.session()?;

        let page = client.get(&self.endpoint).send().await?.text().await?;
        let token = extract_csrf_token(&page);
        if token.is_none() {
            tracing::warn!(endpoint = %self.endpoint, "csrf-token meta tag missing, posting without token");
        }

        let mut request = client.post(&self.endpoint).form(payload);
        if let Some(token) = token {
            request = request.header(CSRF_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let raw_rows = parse_scan_body(&body).inspect_err(|_| {
            tracing::debug!(%status, body_len = body.len(), "Unexpected scan reply");
        })?;
        let rows = normalize_rows(&raw_rows);

        tracing::info!(
            raw = raw_rows.len(),
            kept = rows.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Screener fetched"
        );

        Ok(ScreenerResult {
            rows,
            fetched_at: Utc::now().with_timezone(&ist_timezone()),
        })
    }

    /// A fresh client with its own cookie jar.
    fn session(&self) -> Result<reqwest::Client, FetchError> {
        let mut builder = reqwest::Client::builder().cookie_store(true);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_drops_incomplete_rows() {
        let raw = vec![
            json!({"nsecode": "TCS", "per_chg": 1.2, "close": 3400, "volume": 500000, "sr": 1}),
            json!({"nsecode": "BAD"}),
        ];

        let rows = normalize_rows(&raw);
        assert_eq!(rows.len(), 1);
        assert_eq!(
            serde_json::to_value(&rows).unwrap(),
            json!([{
                "stock_name": "TCS",
                "percent_change": 1.2,
                "current_price": 3400,
                "trade_volume": 500000,
                "rank": 1
            }])
        );
    }

    #[test]
    fn test_normalize_keeps_extra_fields_out() {
        let raw = vec![json!({
            "nsecode": "INFY", "name": "Infosys", "bsecode": "500209",
            "per_chg": -0.5, "close": 1500.25, "volume": 1200, "sr": 2
        })];

        let rows = normalize_rows(&raw);
        assert_eq!(
            rows,
            vec![ResultRow {
                symbol: "INFY".into(),
                percent_change: Number::from_f64(-0.5).unwrap(),
                price: Number::from_f64(1500.25).unwrap(),
                volume: Number::from(1200),
                rank: 2,
            }]
        );
    }

    #[test]
    fn test_normalize_each_missing_key_drops_row() {
        for missing in REQUIRED_KEYS {
            let mut raw = json!({"nsecode": "TCS", "per_chg": 1.2, "close": 3400, "volume": 500000, "sr": 1});
            raw.as_object_mut().unwrap().remove(missing);
            assert!(normalize_rows(&[raw]).is_empty(), "kept row without {}", missing);
        }
    }

    #[test]
    fn test_normalize_accepts_numeric_strings() {
        let raw = vec![json!({"nsecode": "SBIN", "per_chg": "2.5", "close": "812.4", "volume": "100", "sr": "3"})];
        let rows = normalize_rows(&raw);
        assert_eq!(rows[0].rank, 3);
        assert_eq!(rows[0].price.as_f64(), Some(812.4));
        assert_eq!(rows[0].volume, Number::from(100));
    }

    #[test]
    fn test_normalize_keeps_float_kind() {
        let raw = vec![json!({"nsecode": "X", "per_chg": 2.0, "close": 100.0, "volume": 10, "sr": 1})];
        let row = &normalize_rows(&raw)[0];
        assert_eq!(row.percent_change.to_string(), "2.0");
        assert_eq!(row.price.to_string(), "100.0");
        assert_eq!(row.volume.to_string(), "10");
    }

    #[test]
    fn test_normalize_drops_non_numeric_fields() {
        let raw = vec![
            json!({"nsecode": "TCS", "per_chg": "n/a", "close": 3400, "volume": 500000, "sr": 1}),
            json!({"nsecode": "TCS", "per_chg": 1.2, "close": [3400], "volume": 500000, "sr": 1}),
        ];
        assert!(normalize_rows(&raw).is_empty());
    }

    #[test]
    fn test_is_up() {
        let raw = vec![
            json!({"nsecode": "A", "per_chg": 0, "close": 1, "volume": 1, "sr": 1}),
            json!({"nsecode": "B", "per_chg": -0.4, "close": 1, "volume": 1, "sr": 2}),
        ];
        let rows = normalize_rows(&raw);
        assert!(rows[0].is_up());
        assert!(!rows[1].is_up());
    }

    #[test]
    fn test_normalize_drops_null_and_non_objects() {
        let raw = vec![
            json!({"nsecode": "TCS", "per_chg": null, "close": 3400, "volume": 500000, "sr": 1}),
            json!("TCS"),
            json!(null),
        ];
        assert!(normalize_rows(&raw).is_empty());
    }

    #[test]
    fn test_extract_csrf_token() {
        let html = r#"<html><head>
            <meta charset="utf-8">
            <meta name="csrf-token" content="tok123">
            </head><body></body></html>"#;
        assert_eq!(extract_csrf_token(html).as_deref(), Some("tok123"));
    }

    #[test]
    fn test_extract_csrf_token_missing() {
        assert_eq!(extract_csrf_token("<html><head></head></html>"), None);
        assert_eq!(extract_csrf_token("not html at all"), None);
    }

    #[test]
    fn test_parse_scan_body() {
        let rows = parse_scan_body(r#"{"draw": 1, "data": [{"nsecode": "TCS"}]}"#).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_parse_scan_body_rejects_non_json() {
        let err = parse_scan_body("<html>Page Expired</html>").unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_scan_body_rejects_missing_data() {
        let err = parse_scan_body(r#"{"message": "CSRF token mismatch."}"#).unwrap_err();
        assert!(err.to_string().contains("missing `data`"));

        let err = parse_scan_body(r#"{"data": "nope"}"#).unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }

    #[test]
    fn test_ist_offset() {
        assert_eq!(ist_timezone().local_minus_utc(), 19800);
    }

    #[test]
    fn test_from_config() {
        let config = ChartinkConfig {
            timeout_secs: Some(5),
            ..Default::default()
        };
        let fetcher = ScreenerFetcher::from_config(&config);
        assert_eq!(fetcher.endpoint(), "https://chartink.com/screener/process");
        assert_eq!(fetcher.timeout, Some(Duration::from_secs(5)));
    }
}
