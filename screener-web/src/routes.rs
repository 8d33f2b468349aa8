//! HTTP routes.

use crate::catalog::Catalog;
use crate::csv;
use crate::error::WebError;
use crate::fetcher::{FetchError, ResultRow, ScreenerFetcher, ScreenerResult};
use crate::view::{IndexPage, PageRenderer};
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use screener_common::config::{Config, DEFAULT_SCREENER};
use screener_common::error::{Error, Result};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

/// Body of every failed CSV download.
pub const DOWNLOAD_ERROR_BODY: &str = "Error downloading CSV";

/// Largest accepted request body; the only body is the screener form.
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub fetcher: Arc<ScreenerFetcher>,
    pub pages: Arc<PageRenderer>,
    pub default_screener: String,
}

impl AppState {
    pub fn new(catalog: Catalog, fetcher: ScreenerFetcher) -> Result<Self> {
        let pages = PageRenderer::new()
            .map_err(|e| Error::Internal(format!("page template: {}", e)))?;

        Ok(Self {
            catalog: Arc::new(catalog),
            fetcher: Arc::new(fetcher),
            pages: Arc::new(pages),
            default_screener: DEFAULT_SCREENER.to_string(),
        })
    }

    pub fn with_default_screener(mut self, id: impl Into<String>) -> Self {
        self.default_screener = id.into();
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let catalog = match &config.catalog.path {
            Some(path) => Catalog::load(path)?,
            None => Catalog::builtin()?,
        };
        tracing::info!(
            screeners = catalog.screeners().len(),
            categories = catalog.categories().len(),
            "Catalog loaded"
        );

        if catalog.get(&config.chartink.default_screener).is_none() {
            tracing::warn!(
                screener = %config.chartink.default_screener,
                "Default download screener is not in the catalog"
            );
        }

        let fetcher = ScreenerFetcher::from_config(&config.chartink);
        Ok(Self::new(catalog, fetcher)?.with_default_screener(&config.chartink.default_screener))
    }

    /// Look up a screener and fetch its results.
    pub async fn run_screener(&self, id: &str) -> std::result::Result<ScreenerResult, FetchError> {
        let screener = self
            .catalog
            .get(id)
            .ok_or_else(|| FetchError::UnknownScreener(id.to_string()))?;

        self.fetcher.fetch(id, &screener.query_payload).await
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Pages
        .route("/", get(index).post(run_screener))
        .route("/download", get(download_csv))
        // Health check
        .route("/health", get(health_check))
        // Catalog
        .route("/api/v1/screeners", get(list_screeners))
        .route("/api/v1/categories", get(list_categories))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

// ============ Health Check ============

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "screener-web",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Query and form fields as sent, repeats included.
type Params = Vec<(String, String)>;

/// Value of `key`. A repeated field resolves to its last occurrence.
fn last_value(params: Params, key: &str) -> Option<String> {
    params
        .into_iter()
        .rev()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value)
}

// ============ Pages ============

async fn index(
    State(state): State<AppState>,
    Query(query): Query<Params>,
) -> std::result::Result<Html<String>, WebError> {
    let category = last_value(query, "category");
    let page = IndexPage::new(&state.catalog, category.as_deref());
    Ok(Html(state.pages.render(&page)?))
}

async fn run_screener(
    State(state): State<AppState>,
    Query(query): Query<Params>,
    Form(form): Form<Params>,
) -> std::result::Result<Html<String>, WebError> {
    let category = last_value(query, "category");
    let screener_name = last_value(form, "screener_name");
    let mut page = IndexPage::new(&state.catalog, category.as_deref());

    if let Some(id) = screener_name.as_deref().filter(|id| !id.is_empty()) {
        page = page.with_selection(&state.catalog, id);
        page = match state.run_screener(id).await {
            Ok(result) => page.with_result(&result),
            Err(e) => {
                tracing::warn!(screener = %id, error = %e, "Screener run failed");
                page.with_empty_result()
            }
        };
    }

    Ok(Html(state.pages.render(&page)?))
}

// ============ CSV ============

async fn download_csv(State(state): State<AppState>, Query(query): Query<Params>) -> Response {
    let id = last_value(query, "screener_name").unwrap_or_else(|| state.default_screener.clone());

    match state.run_screener(&id).await {
        Ok(result) => csv_response(&id, &result.rows).unwrap_or_else(IntoResponse::into_response),
        Err(e) => {
            tracing::warn!(screener = %id, error = %e, "CSV download failed");
            let status = match e {
                FetchError::UnknownScreener(_) => StatusCode::NOT_FOUND,
                FetchError::Network(_) | FetchError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            };
            (
                status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                DOWNLOAD_ERROR_BODY,
            )
                .into_response()
        }
    }
}

fn csv_response(id: &str, rows: &[ResultRow]) -> std::result::Result<Response, WebError> {
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        csv::file_name(id)
    ))
    .map_err(|e| WebError::Internal(format!("invalid file name for {}: {}", id, e)))?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/csv; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv::render(rows),
    )
        .into_response())
}

// ============ Catalog API ============

async fn list_screeners(
    State(state): State<AppState>,
    Query(query): Query<Params>,
) -> impl IntoResponse {
    let category = last_value(query, "category");
    let screeners: Vec<serde_json::Value> = state
        .catalog
        .screeners_for(category.as_deref())
        .into_iter()
        .map(|s| serde_json::json!({ "id": s.id, "name": s.display_name }))
        .collect();

    Json(serde_json::json!({
        "success": true,
        "data": {
            "count": screeners.len(),
            "screeners": screeners
        }
    }))
}

async fn list_categories(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "data": {
            "categories": state.catalog.categories()
        }
    }))
}
