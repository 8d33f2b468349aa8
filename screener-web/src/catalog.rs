//! Screener catalog: the static set of screener definitions and their categories.
//!
//! The built-in catalog is embedded at compile time from `data/screeners.json`.
//! A catalog file with the same shape can replace it through `catalog.path`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use screener_common::error::{Error, Result, ResultExt};

const BUILTIN_CATALOG: &str = include_str!("../data/screeners.json");

/// Name of the category that lists every categorised screener.
pub const ALL_SCREENERS: &str = "All Screeners";

/// Opaque form fields understood only by the external service.
pub type QueryPayload = BTreeMap<String, String>;

/// One predefined screener.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenerDefinition {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "payload")]
    pub query_payload: QueryPayload,
}

/// Named, ordered group of screener ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenerCategory {
    pub name: String,
    pub screeners: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    screeners: Vec<ScreenerDefinition>,
    #[serde(default)]
    categories: Vec<ScreenerCategory>,
}

/// Immutable screener catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    screeners: Vec<ScreenerDefinition>,
    categories: Vec<ScreenerCategory>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CATALOG).context("built-in catalog")
    }

    /// Load a catalog file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read catalog {}", path.display()))?;
        Self::from_json(&content).context(format!("Failed to load catalog {}", path.display()))
    }

    /// Parse and check a catalog document.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.screeners, file.categories)
    }

    /// Build a catalog, rejecting duplicate screener ids and category names.
    pub fn new(
        screeners: Vec<ScreenerDefinition>,
        categories: Vec<ScreenerCategory>,
    ) -> Result<Self> {
        let mut index = HashMap::with_capacity(screeners.len());
        for (i, screener) in screeners.iter().enumerate() {
            if index.insert(screener.id.clone(), i).is_some() {
                return Err(Error::Config(format!(
                    "duplicate screener id: {}",
                    screener.id
                )));
            }
        }

        let mut names = HashSet::new();
        for category in &categories {
            if !names.insert(category.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate category: {}",
                    category.name
                )));
            }
            for id in category.screeners.iter().filter(|id| !index.contains_key(*id)) {
                tracing::warn!(category = %category.name, screener = %id, "Category references unknown screener");
            }
        }

        Ok(Self {
            screeners,
            categories,
            index,
        })
    }

    /// Look up a screener by id.
    pub fn get(&self, id: &str) -> Option<&ScreenerDefinition> {
        self.index.get(id).map(|&i| &self.screeners[i])
    }

    /// All screeners in definition order.
    pub fn screeners(&self) -> &[ScreenerDefinition] {
        &self.screeners
    }

    pub fn categories(&self) -> &[ScreenerCategory] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&ScreenerCategory> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Screeners shown for a category selection.
    ///
    /// A known category yields its members in category order, skipping ids with
    /// no definition. No category, or an unknown one, yields every screener.
    pub fn screeners_for(&self, category: Option<&str>) -> Vec<&ScreenerDefinition> {
        match category.and_then(|name| self.category(name)) {
            Some(category) => category
                .screeners
                .iter()
                .filter_map(|id| self.get(id))
                .collect(),
            None => self.screeners.iter().collect(),
        }
    }
}
