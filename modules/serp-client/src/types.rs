use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub organic_results: Vec<SearchResult>,
}

/// One organic result. Position is 1-based rank on the results page.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SearchResult {
    pub position: u32,
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}
