use thiserror::Error;

pub type Result<T> = std::result::Result<T, ListingError>;

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ListingError {
    /// Retriable: timeouts, connection failures, 5xx, and rate limiting.
    /// Auth and quota rejections (401/402/403) are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            ListingError::Network(_) => true,
            ListingError::Api { status, .. } => *status == 429 || *status >= 500,
            ListingError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for ListingError {
    fn from(err: reqwest::Error) -> Self {
        ListingError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ListingError {
    fn from(err: serde_json::Error) -> Self {
        ListingError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ListingError::Network("timeout".into()).is_transient());
        assert!(ListingError::Api { status: 503, message: String::new() }.is_transient());
        assert!(ListingError::Api { status: 429, message: String::new() }.is_transient());
        assert!(!ListingError::Api { status: 401, message: String::new() }.is_transient());
        assert!(!ListingError::Api { status: 402, message: String::new() }.is_transient());
        assert!(!ListingError::Parse("bad json".into()).is_transient());
    }
}
