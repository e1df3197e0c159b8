use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One crawled page as returned by the crawler API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub links: Vec<String>,
}

impl PageRecord {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
            metadata: Map::new(),
            links: Vec::new(),
        }
    }
}
