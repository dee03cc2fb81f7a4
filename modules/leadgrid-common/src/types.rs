use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// --- Campaign ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CampaignMode {
    /// Plan zones and persist them without enqueuing any scrape work.
    Draft,
    Live,
}

impl std::fmt::Display for CampaignMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignMode::Draft => write!(f, "draft"),
            CampaignMode::Live => write!(f, "live"),
        }
    }
}

impl std::str::FromStr for CampaignMode {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "live" => Ok(Self::Live),
            other => Err(format!("unknown CampaignMode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Active,
    Cancelled,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Active => write!(f, "active"),
            CampaignStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown CampaignStatus: {other}")),
        }
    }
}

// --- Zone ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneStatus {
    Pending,
    Scraping,
    Completed,
    Failed,
    Skipped,
}

impl ZoneStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ZoneStatus::Completed | ZoneStatus::Skipped)
    }
}

impl std::fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZoneStatus::Pending => write!(f, "pending"),
            ZoneStatus::Scraping => write!(f, "scraping"),
            ZoneStatus::Completed => write!(f, "completed"),
            ZoneStatus::Failed => write!(f, "failed"),
            ZoneStatus::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for ZoneStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "scraping" => Ok(Self::Scraping),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown ZoneStatus: {other}")),
        }
    }
}

// --- Website disposition ---

/// Per-business website disposition state. Drives and is driven by the
/// disposition state machine; the string forms are what land in Postgres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    NeedsDiscovery,
    DiscoveryInProgress,
    Validating,
    ValidFromProvider,
    ValidFromSearch,
    InvalidTechnical,
    NeedsVerification,
    ConfirmedNoWebsite,
    Error,
}

impl ValidationStatus {
    /// States from which no further pipeline work is scheduled.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ValidationStatus::ValidFromProvider
                | ValidationStatus::ValidFromSearch
                | ValidationStatus::InvalidTechnical
                | ValidationStatus::ConfirmedNoWebsite
                | ValidationStatus::Error
        )
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::NeedsDiscovery => "needs_discovery",
            ValidationStatus::DiscoveryInProgress => "discovery_in_progress",
            ValidationStatus::Validating => "validating",
            ValidationStatus::ValidFromProvider => "valid_from_provider",
            ValidationStatus::ValidFromSearch => "valid_from_search",
            ValidationStatus::InvalidTechnical => "invalid_technical",
            ValidationStatus::NeedsVerification => "needs_verification",
            ValidationStatus::ConfirmedNoWebsite => "confirmed_no_website",
            ValidationStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ValidationStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "needs_discovery" => Ok(Self::NeedsDiscovery),
            "discovery_in_progress" => Ok(Self::DiscoveryInProgress),
            "validating" => Ok(Self::Validating),
            "valid_from_provider" => Ok(Self::ValidFromProvider),
            "valid_from_search" => Ok(Self::ValidFromSearch),
            "invalid_technical" => Ok(Self::InvalidTechnical),
            "needs_verification" => Ok(Self::NeedsVerification),
            "confirmed_no_website" => Ok(Self::ConfirmedNoWebsite),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown ValidationStatus: {other}")),
        }
    }
}

/// Where the current candidate URL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebsiteSource {
    Provider,
    Search,
    Manual,
    None,
}

impl std::fmt::Display for WebsiteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebsiteSource::Provider => write!(f, "provider"),
            WebsiteSource::Search => write!(f, "search"),
            WebsiteSource::Manual => write!(f, "manual"),
            WebsiteSource::None => write!(f, "none"),
        }
    }
}

// --- Website metadata (jsonb on businesses) ---

/// One verifier evaluation, as recorded in the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationEntry {
    pub timestamp: DateTime<Utc>,
    pub url_evaluated: String,
    pub verdict: String,
    pub confidence: f64,
    pub reasoning: String,
    pub recommendation: String,
    pub evidence_summary: String,
}

/// One discovery method's outcome (e.g. "provider", "search").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryAttempt {
    pub attempted: bool,
    pub timestamp: DateTime<Utc>,
    pub found_url: Option<String>,
    pub verdict: Option<String>,
}

/// Structured audit record embedded in every business row. Append-only:
/// history entries and discovery attempts are added, never rewritten.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebsiteMetadata {
    pub source: Option<WebsiteSource>,
    pub source_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub validation_history: Vec<ValidationEntry>,
    #[serde(default)]
    pub discovery_attempts: BTreeMap<String, DiscoveryAttempt>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl WebsiteMetadata {
    /// Normalized forms of every URL that has appeared in the validation
    /// history. This is the loop-prevention set: discovery may only hand
    /// back a URL that is absent from it.
    pub fn seen_urls(&self) -> std::collections::HashSet<String> {
        self.validation_history
            .iter()
            .map(|e| crate::urlnorm::normalize_url(&e.url_evaluated))
            .collect()
    }
}

// --- Work queue ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    ScrapeZone,
    ValidateBusiness,
    DiscoverWebsite,
    SubmitGeneration,
}

impl WorkKind {
    /// Default retry budget per kind.
    pub fn default_max_attempts(self) -> i32 {
        match self {
            WorkKind::ScrapeZone | WorkKind::ValidateBusiness => 3,
            WorkKind::DiscoverWebsite => 2,
            WorkKind::SubmitGeneration => 3,
        }
    }
}

impl std::fmt::Display for WorkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkKind::ScrapeZone => write!(f, "scrape_zone"),
            WorkKind::ValidateBusiness => write!(f, "validate_business"),
            WorkKind::DiscoverWebsite => write!(f, "discover_website"),
            WorkKind::SubmitGeneration => write!(f, "submit_generation"),
        }
    }
}

impl std::str::FromStr for WorkKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scrape_zone" => Ok(Self::ScrapeZone),
            "validate_business" => Ok(Self::ValidateBusiness),
            "discover_website" => Ok(Self::DiscoverWebsite),
            "submit_generation" => Ok(Self::SubmitGeneration),
            other => Err(format!("unknown WorkKind: {other}")),
        }
    }
}
