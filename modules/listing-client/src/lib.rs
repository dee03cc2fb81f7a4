pub mod error;
pub mod types;

pub use error::{ListingError, Result};
pub use types::{PlacesQuery, RawBusiness, SearchResponse};

use std::time::Duration;

const BASE_URL: &str = "https://api.outscraper.cloud";

/// Client for the business-listing provider's synchronous places search.
pub struct ListingClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ListingClient {
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

    /// Search places for a single zone-scoped query.
    pub async fn search(&self, q: &PlacesQuery) -> Result<Vec<RawBusiness>> {
        let url = format!("{}/maps/search", self.base_url);

        tracing::info!(query = %q.query, region = %q.region, limit = q.limit, "Listing provider search");

        // Zoom 12 keeps result bias near the zone center; the radius rides
        // along for providers that honor it directly.
        let coordinates = format!("@{},{},12z", q.latitude, q.longitude);

        let resp = self
            .client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .query(&[
                ("query", q.query.as_str()),
                ("region", q.region.as_str()),
                ("language", q.language.as_str()),
                ("limit", &q.limit.to_string()),
                ("coordinates", &coordinates),
                ("radius", &format!("{}", (q.radius_km * 1000.0) as u64)),
                ("async", "false"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ListingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: SearchResponse = resp.json().await?;
        let businesses: Vec<RawBusiness> = body.data.into_iter().flatten().collect();

        tracing::info!(count = businesses.len(), "Listing provider search complete");
        Ok(businesses)
    }
}
