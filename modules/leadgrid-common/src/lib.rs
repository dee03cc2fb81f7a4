pub mod config;
pub mod types;
pub mod urlnorm;

pub use config::AppConfig;
pub use types::{
    CampaignMode, CampaignStatus, DiscoveryAttempt, ValidationEntry, ValidationStatus,
    WebsiteMetadata, WebsiteSource, WorkKind, ZoneStatus,
};
pub use urlnorm::normalize_url;
