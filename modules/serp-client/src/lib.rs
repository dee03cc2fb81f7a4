pub mod error;
pub mod types;

pub use error::{Result, SerpError};
pub use types::{SearchResponse, SearchResult};

use std::time::Duration;

const BASE_URL: &str = "https://serpapi.com";

/// Client for the web-search provider's organic results endpoint.
pub struct SerpClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SerpClient {
    pub fn new(api_key: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key: api_key.to_string(),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Issue an organic web search. The query string must already be in the
    /// provider-safe form (bare `"{name} {city}"`); quoted phrases and
    /// appended keywords trigger 400-class rejections at a high
    /// rate, so the caller formats and this client passes through untouched.
    pub async fn search(
        &self,
        query: &str,
        country: &str,
        results: u32,
    ) -> Result<Vec<SearchResult>> {
        let url = format!("{}/search", self.base_url);

        tracing::debug!(query, country, results, "Web search");

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("gl", country),
                ("num", &results.to_string()),
                ("api_key", &self.api_key),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SerpError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: SearchResponse = resp.json().await?;
        let mut results_out = body.organic_results;
        results_out.truncate(10);

        tracing::debug!(count = results_out.len(), "Web search complete");
        Ok(results_out)
    }
}
