//! screener-web - Runs predefined chartink.com stock screeners and renders the
//! matches as an HTML table or a CSV download.
//!
//! # Request Flow
//!
//! ```text
//! browser ──► routes ──► Catalog (id → scan clause)
//!                │
//!                └──► ScreenerFetcher ──GET──► chartink.com (csrf-token meta tag)
//!                          │          ──POST─► chartink.com (scan_clause form)
//!                          ▼
//!                     ResultRow[] ──► view (HTML) | csv (attachment)
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod catalog;
pub mod csv;
pub mod error;
pub mod fetcher;
pub mod routes;
pub mod view;

pub use catalog::{Catalog, QueryPayload, ScreenerCategory, ScreenerDefinition};
pub use error::WebError;
pub use fetcher::{FetchError, ResultRow, ScreenerFetcher, ScreenerResult};
pub use routes::{build_router, AppState};
pub use view::{IndexPage, PageRenderer};
