//! LLM verification: given a business and evidence, decide whether a URL
//! belongs to it. Stateless; every call carries its full context.

use ai_client::Claude;
use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::render::RenderedPage;
use serp_client::SearchResult;

pub const VERIFIER_MODEL: &str = "claude-haiku-4-5-20251001";

/// What the pipeline knows about a business, independent of any evidence.
#[derive(Debug, Clone, Serialize)]
pub struct BusinessContext {
    pub name: String,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
}

/// Evidence handed to the verifier. Serialized verbatim into the
/// validation record for reproducibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    RenderedPage { page: RenderedPage },
    SearchResults { results: Vec<SearchResult> },
    /// Bot-wall fallback: the listing data and the URL itself are all we
    /// have. The verdict's confidence is expected to reflect that.
    ListingOnly { url: String },
}

impl Evidence {
    pub fn kind(&self) -> &'static str {
        match self {
            Evidence::RenderedPage { .. } => "rendered_page",
            Evidence::SearchResults { .. } => "search_results",
            Evidence::ListingOnly { .. } => "listing_only",
        }
    }

    /// The URL under evaluation, when the evidence names one.
    pub fn url(&self) -> Option<&str> {
        match self {
            Evidence::RenderedPage { page } => Some(&page.final_url),
            Evidence::SearchResults { .. } => None,
            Evidence::ListingOnly { url } => Some(url),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    /// The evidence establishes the URL is the business's own site, even if
    /// low quality.
    Valid,
    /// The URL is theirs but broken or placeholder; retain it, mark
    /// technically invalid.
    Invalid,
    /// The URL is not theirs (directory, aggregator, unrelated business,
    /// social profile); clear it.
    Missing,
}

impl std::fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerdictKind::Valid => write!(f, "valid"),
            VerdictKind::Invalid => write!(f, "invalid"),
            VerdictKind::Missing => write!(f, "missing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    KeepUrl,
    ClearUrlAndMarkMissing,
    MarkInvalidKeepUrl,
    UseUrl { url: String },
}

impl Recommendation {
    pub fn as_label(&self) -> String {
        match self {
            Recommendation::KeepUrl => "keep_url".to_string(),
            Recommendation::ClearUrlAndMarkMissing => "clear_url_and_mark_missing".to_string(),
            Recommendation::MarkInvalidKeepUrl => "mark_invalid_keep_url".to_string(),
            Recommendation::UseUrl { url } => format!("use_url:{url}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema)]
pub struct MatchSignals {
    pub phone_match: bool,
    pub address_match: bool,
    pub name_match: bool,
    pub is_directory: bool,
    pub is_aggregator: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Verdict {
    pub verdict: VerdictKind,
    /// 0.0 - 1.0
    pub confidence: f64,
    pub reasoning: String,
    pub recommendation: Recommendation,
    pub match_signals: MatchSignals,
}

impl Verdict {
    /// The canned verdict for persistent schema failures; callers treat it
    /// as low-confidence missing.
    pub fn schema_failure() -> Self {
        Self {
            verdict: VerdictKind::Missing,
            confidence: 0.0,
            reasoning: "verifier schema failure".to_string(),
            recommendation: Recommendation::ClearUrlAndMarkMissing,
            match_signals: MatchSignals::default(),
        }
    }
}

const VERIFY_SYSTEM_PROMPT: &str = r#"You decide whether a URL is a local business's own website.

Verdict semantics (contractual):
- valid: the evidence establishes the URL IS the business's own site, even if the site is low quality.
- invalid: the URL is theirs but broken or placeholder (empty shell, parked domain, dead CMS). Keep the URL, mark technically invalid.
- missing: the URL is NOT theirs (a directory, aggregator, social profile, or an unrelated business). Clear it.

Strong signals the URL is theirs (drive valid):
- phone number matching exactly or sharing area code and prefix
- the business name in the page title or main heading
- the street name or zip code of the listing address on the page
- two or more independent contact methods aligning

Signals the URL is not theirs (drive missing):
- a different phone number, the business name absent from the page
- a different city or region featured prominently
- obvious directory/aggregator structure (listing grids, review widgets for many businesses)

When evidence is a list of search results, pick the single most likely official site. If one result is clearly the business's own site, answer valid with recommendation use_url and that result's link. If everything is directories and social profiles, answer missing.

When evidence is only the listing data and the URL (the page could not be fetched), judge from the domain name and listing alone and lower your confidence accordingly.

Set confidence to your actual certainty between 0.0 and 1.0. Keep reasoning to a sentence or two."#;

fn context_block(context: &BusinessContext) -> String {
    format!(
        "Business:\n  name: {}\n  phones: {}\n  emails: {}\n  address: {}\n  city: {}\n  region: {}\n",
        context.name,
        if context.phones.is_empty() { "(none)".to_string() } else { context.phones.join(", ") },
        if context.emails.is_empty() { "(none)".to_string() } else { context.emails.join(", ") },
        context.address.as_deref().unwrap_or("(unknown)"),
        context.city.as_deref().unwrap_or("(unknown)"),
        context.region.as_deref().unwrap_or("(unknown)"),
    )
}

/// Render the user prompt for a context + evidence pair.
pub fn build_user_prompt(context: &BusinessContext, evidence: &Evidence) -> String {
    let mut prompt = context_block(context);

    match evidence {
        Evidence::RenderedPage { page } => {
            prompt.push_str(&format!(
                "\nEvidence: rendered page\n  final_url: {}\n  title: {}\n  meta_description: {}\n  phones_on_page: {}\n  emails_on_page: {}\n  has_address: {}\n  has_hours: {}\n  word_count: {}\n\nVisible text (first 2000 chars):\n{}\n",
                page.final_url,
                page.title,
                page.meta_description,
                page.phones.join(", "),
                page.emails.join(", "),
                page.has_address,
                page.has_hours,
                page.word_count,
                page.content_preview,
            ));
        }
        Evidence::SearchResults { results } => {
            prompt.push_str("\nEvidence: web search results\n");
            for r in results {
                prompt.push_str(&format!(
                    "  {}. {} | {}\n     {}\n",
                    r.position, r.title, r.link, r.snippet
                ));
            }
        }
        Evidence::ListingOnly { url } => {
            prompt.push_str(&format!(
                "\nEvidence: none. The page at {url} could not be fetched (bot wall). Judge from the domain and listing data alone.\n"
            ));
        }
    }

    prompt
}

/// Live verifier over the Claude messages API.
#[derive(Clone)]
pub struct LlmVerifier {
    claude: Claude,
}

impl LlmVerifier {
    pub fn new(claude: Claude) -> Self {
        Self { claude }
    }

    pub fn model(&self) -> &str {
        self.claude.model()
    }

    /// One evaluation. Schema-invalid output is retried once; a second
    /// malformed reply yields the canned low-confidence missing verdict.
    /// Transport and API errors propagate for the caller's retry policy.
    pub async fn verify(&self, context: &BusinessContext, evidence: &Evidence) -> Result<Verdict> {
        let user_prompt = build_user_prompt(context, evidence);

        match self
            .claude
            .extract::<Verdict>(VERIFY_SYSTEM_PROMPT, &user_prompt)
            .await
        {
            Ok(verdict) => Ok(verdict),
            Err(first_err) if is_schema_error(&first_err) => {
                tracing::warn!(error = %first_err, "Verifier returned malformed output, retrying once");
                match self
                    .claude
                    .extract::<Verdict>(VERIFY_SYSTEM_PROMPT, &user_prompt)
                    .await
                {
                    Ok(verdict) => Ok(verdict),
                    Err(second_err) if is_schema_error(&second_err) => {
                        tracing::error!(error = %second_err, "Verifier schema failure, using fallback verdict");
                        Ok(Verdict::schema_failure())
                    }
                    Err(other) => Err(other),
                }
            }
            Err(other) => Err(other),
        }
    }
}

/// Malformed model output (as opposed to a transport/API failure, which the
/// work item's retry policy owns).
fn is_schema_error(err: &anyhow::Error) -> bool {
    let msg = err.to_string();
    msg.contains("Failed to deserialize response") || msg.contains("No structured output")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_round_trips_through_json() {
        let v = Verdict {
            verdict: VerdictKind::Valid,
            confidence: 0.92,
            reasoning: "phone and name match".to_string(),
            recommendation: Recommendation::UseUrl {
                url: "https://wandercpa.com/".to_string(),
            },
            match_signals: MatchSignals {
                phone_match: true,
                address_match: false,
                name_match: true,
                is_directory: false,
                is_aggregator: false,
            },
        };
        let rendered = serde_json::to_string(&v).unwrap();
        let parsed: Verdict = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed.verdict, VerdictKind::Valid);
        assert_eq!(parsed.recommendation, v.recommendation);
        assert!(parsed.match_signals.phone_match);
        assert_eq!(parsed.confidence, 0.92);
    }

    #[test]
    fn verdict_parses_wire_form() {
        let wire = r#"{
            "verdict": "missing",
            "confidence": 0.85,
            "reasoning": "yelp listing, not an owned site",
            "recommendation": "clear_url_and_mark_missing",
            "match_signals": {
                "phone_match": false, "address_match": false, "name_match": true,
                "is_directory": true, "is_aggregator": true
            }
        }"#;
        let v: Verdict = serde_json::from_str(wire).unwrap();
        assert_eq!(v.verdict, VerdictKind::Missing);
        assert_eq!(v.recommendation, Recommendation::ClearUrlAndMarkMissing);
        assert!(v.match_signals.is_aggregator);
    }

    #[test]
    fn use_url_wire_form() {
        let wire = r#"{
            "verdict": "valid",
            "confidence": 0.9,
            "reasoning": "official site in results",
            "recommendation": {"use_url": {"url": "https://wandercpa.com/"}},
            "match_signals": {
                "phone_match": true, "address_match": false, "name_match": true,
                "is_directory": false, "is_aggregator": false
            }
        }"#;
        let v: Verdict = serde_json::from_str(wire).unwrap();
        match v.recommendation {
            Recommendation::UseUrl { ref url } => assert_eq!(url, "https://wandercpa.com/"),
            _ => panic!("expected use_url"),
        }
    }

    #[test]
    fn prompt_includes_context_and_evidence() {
        let context = BusinessContext {
            name: "Wander CPA".to_string(),
            phones: vec!["+1 323-555-0101".to_string()],
            emails: vec![],
            address: Some("1234 Wilshire Blvd".to_string()),
            city: Some("Los Angeles".to_string()),
            region: Some("CA".to_string()),
        };
        let evidence = Evidence::SearchResults {
            results: vec![SearchResult {
                position: 1,
                title: "Wander CPA - Los Angeles Accounting".to_string(),
                link: "https://wandercpa.com/".to_string(),
                snippet: "Tax and accounting services".to_string(),
            }],
        };
        let prompt = build_user_prompt(&context, &evidence);
        assert!(prompt.contains("Wander CPA"));
        assert!(prompt.contains("323-555-0101"));
        assert!(prompt.contains("https://wandercpa.com/"));
        assert!(prompt.contains("web search results"));
    }

    #[test]
    fn schema_failure_fallback_is_low_confidence_missing() {
        let v = Verdict::schema_failure();
        assert_eq!(v.verdict, VerdictKind::Missing);
        assert_eq!(v.confidence, 0.0);
        assert_eq!(v.reasoning, "verifier schema failure");
    }

    #[test]
    fn evidence_kind_labels() {
        let listing = Evidence::ListingOnly {
            url: "https://example.com".to_string(),
        };
        assert_eq!(listing.kind(), "listing_only");
        assert_eq!(listing.url(), Some("https://example.com"));
    }
}
