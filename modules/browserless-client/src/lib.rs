pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

/// A fully rendered page from the browser service.
#[derive(Debug, Clone)]
pub struct RenderedContent {
    /// URL after all redirects.
    pub final_url: String,
    pub html: String,
    pub status: u16,
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    navigation_timeout: Duration,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>, navigation_timeout: Duration) -> Self {
        // HTTP budget sits slightly above the in-browser navigation budget so
        // the service's own timeout error reaches us instead of a client abort.
        let client = reqwest::Client::builder()
            .timeout(navigation_timeout + Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            navigation_timeout,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        let mut endpoint = format!("{}{}?stealth", self.base_url, path);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("&token={token}"));
        }
        endpoint
    }

    /// Fetch fully-rendered HTML via the /content endpoint, presenting the
    /// given user agent and waiting for network idle.
    pub async fn content(&self, url: &str, user_agent: &str) -> Result<RenderedContent> {
        let body = serde_json::json!({
            "url": url,
            "userAgent": user_agent,
            "gotoOptions": {
                "waitUntil": "networkidle2",
                "timeout": self.navigation_timeout.as_millis() as u64,
            },
        });

        tracing::debug!(url, "Rendering page");

        let resp = self
            .client
            .post(self.endpoint("/content"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        // The service reports the post-redirect URL and page status in
        // response headers when available; fall back to the requested URL.
        let final_url = resp
            .headers()
            .get("x-response-url")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(url)
            .to_string();
        let page_status = resp
            .headers()
            .get("x-response-code")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(200);

        Ok(RenderedContent {
            final_url,
            html: resp.text().await?,
            status: page_status,
        })
    }

    /// Capture a JPEG screenshot. The caller stores the bytes by reference
    /// (content hash); this client does not persist anything.
    pub async fn screenshot(&self, url: &str, user_agent: &str) -> Result<Vec<u8>> {
        let body = serde_json::json!({
            "url": url,
            "userAgent": user_agent,
            "options": { "type": "jpeg", "quality": 70, "fullPage": false },
            "gotoOptions": {
                "waitUntil": "networkidle2",
                "timeout": self.navigation_timeout.as_millis() as u64,
            },
        });

        let resp = self
            .client
            .post(self.endpoint("/screenshot"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.bytes().await?.to_vec())
    }
}
