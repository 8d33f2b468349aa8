//! HTML rendering of the index page.

use chrono::{DateTime, FixedOffset};
use handlebars::Handlebars;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::fetcher::{ResultRow, ScreenerResult};

const INDEX_TEMPLATE: &str = include_str!("../templates/index.hbs");

/// Display format of the "last updated" marker.
pub const LAST_UPDATED_FORMAT: &str = "%d %b %Y, %I:%M:%S %p IST";

#[derive(Debug, Serialize)]
struct CategoryLink<'a> {
    name: &'a str,
    query: String,
    selected: bool,
}

#[derive(Debug, Serialize)]
struct ScreenerOption<'a> {
    id: &'a str,
    name: &'a str,
    selected: bool,
}

#[derive(Debug, Serialize)]
struct RowView {
    rank: i64,
    stock_name: String,
    percent_change: String,
    current_price: String,
    trade_volume: String,
    up: bool,
}

impl From<&ResultRow> for RowView {
    fn from(row: &ResultRow) -> Self {
        Self {
            rank: row.rank,
            stock_name: row.symbol.clone(),
            percent_change: row.percent_change.to_string(),
            current_price: row.price.to_string(),
            trade_volume: row.volume.to_string(),
            up: row.is_up(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResultsView {
    rows: Vec<RowView>,
    last_updated: Option<String>,
}

/// Everything the index page shows.
#[derive(Debug, Serialize)]
pub struct IndexPage<'a> {
    categories: Vec<CategoryLink<'a>>,
    screeners: Vec<ScreenerOption<'a>>,
    selected_category: Option<&'a str>,
    selected_screener: Option<&'a str>,
    selected_screener_name: &'a str,
    form_action: String,
    results: Option<ResultsView>,
}

impl<'a> IndexPage<'a> {
    /// Page listing the screeners of a category, with no results yet.
    pub fn new(catalog: &'a Catalog, category: Option<&'a str>) -> Self {
        let selected_category = category.filter(|name| catalog.category(name).is_some());

        let categories = catalog
            .categories()
            .iter()
            .map(|c| CategoryLink {
                name: &c.name,
                query: encode(&c.name),
                selected: Some(c.name.as_str()) == selected_category,
            })
            .collect();

        let screeners = catalog
            .screeners_for(selected_category)
            .into_iter()
            .map(|s| ScreenerOption {
                id: &s.id,
                name: &s.display_name,
                selected: false,
            })
            .collect();

        let form_action = match selected_category {
            Some(name) => format!("/?category={}", encode(name)),
            None => "/".to_string(),
        };

        Self {
            categories,
            screeners,
            selected_category,
            selected_screener: None,
            selected_screener_name: "",
            form_action,
            results: None,
        }
    }

    /// Mark the screener that was run. Unknown ids keep an empty display name.
    pub fn with_selection(mut self, catalog: &'a Catalog, screener_id: &'a str) -> Self {
        self.selected_screener = Some(screener_id);
        self.selected_screener_name = catalog
            .get(screener_id)
            .map(|s| s.display_name.as_str())
            .unwrap_or("");
        for option in &mut self.screeners {
            option.selected = option.id == screener_id;
        }
        self
    }

    /// Attach a successful run.
    pub fn with_result(mut self, result: &ScreenerResult) -> Self {
        self.results = Some(ResultsView {
            rows: result.rows.iter().map(RowView::from).collect(),
            last_updated: Some(format_last_updated(&result.fetched_at)),
        });
        self
    }

    /// Attach a failed run: an empty table with no timestamp.
    pub fn with_empty_result(mut self) -> Self {
        self.results = Some(ResultsView {
            rows: Vec::new(),
            last_updated: None,
        });
        self
    }
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

pub fn format_last_updated(at: &DateTime<FixedOffset>) -> String {
    at.format(LAST_UPDATED_FORMAT).to_string()
}

/// Handlebars registry holding the page template.
pub struct PageRenderer {
    registry: Handlebars<'static>,
}

impl PageRenderer {
    pub fn new() -> Result<Self, handlebars::TemplateError> {
        let mut registry = Handlebars::new();
        registry.register_template_string("index", INDEX_TEMPLATE)?;
        Ok(Self { registry })
    }

    pub fn render(&self, page: &IndexPage<'_>) -> Result<String, handlebars::RenderError> {
        self.registry.render("index", page)
    }
}
