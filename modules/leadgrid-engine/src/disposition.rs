//! The disposition state machine: pure decision functions plus the
//! orchestration that drives a business through validation.
//!
//! Decisions are computed from plain values so they can be tested without a
//! database; the worker applies each decision through a `TransitionCommit`,
//! which re-checks the observed state under the row lock.

use std::collections::HashSet;

use anyhow::Context;
use chrono::Utc;
use leadgrid_common::{
    normalize_url, DiscoveryAttempt, ValidationEntry, ValidationStatus, WebsiteSource,
};
use leadgrid_store::{
    Business, NewValidationRecord, NewWorkItem, TransitionCommit, UrlChange,
};
use leadgrid_common::WorkKind;
use uuid::Uuid;

use crate::deps::EngineDeps;
use crate::prescreen::{PrescreenFailure, PrescreenOutcome};
use crate::render::{self, RenderError};
use crate::verifier::{BusinessContext, Evidence, Recommendation, Verdict, VerdictKind};
use crate::workers::WorkFailure;

// ---------------------------------------------------------------------------
// Pure decision functions
// ---------------------------------------------------------------------------

/// The complete legal edge set. Any transition not listed here is a bug in
/// the caller and is refused at commit time.
pub fn allowed_transition(from: ValidationStatus, to: ValidationStatus) -> bool {
    use ValidationStatus::*;
    matches!(
        (from, to),
        (Pending, NeedsDiscovery)
            | (Pending, Validating)
            | (Validating, ValidFromProvider)
            | (Validating, ValidFromSearch)
            | (Validating, InvalidTechnical)
            | (Validating, NeedsDiscovery)
            | (Validating, Error)
            | (NeedsDiscovery, DiscoveryInProgress)
            | (DiscoveryInProgress, Validating)
            | (DiscoveryInProgress, ConfirmedNoWebsite)
            | (DiscoveryInProgress, Error)
            // Manual re-probe path: an operator parks a business in
            // needs_verification to force it back through the deep pipeline.
            | (NeedsVerification, Validating)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrescreenDecision {
    /// The URL was never plausible (aggregator, document, bad scheme):
    /// record a missing verdict, clear it, discover.
    ClearAndDiscover,
    /// The URL looks owned but unreachable: keep it, mark invalid_technical.
    MarkInvalidTechnical,
}

pub fn on_prescreen_failure(failure: PrescreenFailure) -> PrescreenDecision {
    if failure.is_disqualifying() {
        PrescreenDecision::ClearAndDiscover
    } else {
        PrescreenDecision::MarkInvalidTechnical
    }
}

/// The terminal state a valid verdict lands in, by candidate source.
pub fn terminal_for_valid(source: WebsiteSource) -> ValidationStatus {
    match source {
        WebsiteSource::Search => ValidationStatus::ValidFromSearch,
        _ => ValidationStatus::ValidFromProvider,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictDecision {
    Valid(ValidationStatus),
    InvalidTechnical,
    ClearAndDiscover,
}

pub fn apply_verdict(kind: VerdictKind, source: WebsiteSource) -> VerdictDecision {
    match kind {
        VerdictKind::Valid => VerdictDecision::Valid(terminal_for_valid(source)),
        VerdictKind::Invalid => VerdictDecision::InvalidTechnical,
        VerdictKind::Missing => VerdictDecision::ClearAndDiscover,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryDecision {
    /// Search surfaced a fresh candidate: load it and validate.
    Validate(String),
    /// Nothing new: either no candidate, or only URLs already burned in the
    /// validation history (the loop-prevention set).
    NoWebsite,
}

/// Decide the outcome of a discovery run. The seen-set comparison is the
/// hard invariant that prevents validation/discovery ping-pong: a URL that
/// appears anywhere in the history, not just the most recent entry, can
/// never be handed back for validation.
pub fn discovery_decision(verdict: &Verdict, seen: &HashSet<String>) -> DiscoveryDecision {
    if verdict.verdict != VerdictKind::Valid {
        return DiscoveryDecision::NoWebsite;
    }
    match &verdict.recommendation {
        Recommendation::UseUrl { url } => {
            if seen.contains(&normalize_url(url)) {
                DiscoveryDecision::NoWebsite
            } else {
                DiscoveryDecision::Validate(url.clone())
            }
        }
        _ => DiscoveryDecision::NoWebsite,
    }
}

/// Audit-trail entry for one evaluation.
pub fn history_entry(url: &str, verdict: &Verdict, evidence_summary: String) -> ValidationEntry {
    ValidationEntry {
        timestamp: Utc::now(),
        url_evaluated: url.to_string(),
        verdict: verdict.verdict.to_string(),
        confidence: verdict.confidence,
        reasoning: verdict.reasoning.clone(),
        recommendation: verdict.recommendation.as_label(),
        evidence_summary,
    }
}

/// Synthetic verdict for prescreen failures, so the audit trail stays
/// uniform whether a URL died cheaply or at the verifier.
pub fn prescreen_verdict(failure: PrescreenFailure) -> Verdict {
    let (kind, recommendation) = match on_prescreen_failure(failure) {
        PrescreenDecision::ClearAndDiscover => (
            VerdictKind::Missing,
            Recommendation::ClearUrlAndMarkMissing,
        ),
        PrescreenDecision::MarkInvalidTechnical => {
            (VerdictKind::Invalid, Recommendation::MarkInvalidKeepUrl)
        }
    };
    Verdict {
        verdict: kind,
        confidence: 1.0,
        reasoning: format!("prescreen failed: {failure}"),
        recommendation,
        match_signals: Default::default(),
    }
}

pub fn business_context(business: &Business) -> BusinessContext {
    BusinessContext {
        name: business.name.clone(),
        phones: business.phone.iter().cloned().collect(),
        emails: Vec::new(),
        address: business.address.clone(),
        city: business.city.clone(),
        region: business.region.clone(),
    }
}

fn discover_item(business_id: Uuid) -> NewWorkItem {
    NewWorkItem::new(
        WorkKind::DiscoverWebsite,
        serde_json::json!({ "business_id": business_id }),
        business_id.to_string(),
    )
}

pub fn validate_item(business_id: Uuid) -> NewWorkItem {
    NewWorkItem::new(
        WorkKind::ValidateBusiness,
        serde_json::json!({ "business_id": business_id }),
        business_id.to_string(),
    )
}

pub fn generation_item(business_id: Uuid) -> NewWorkItem {
    NewWorkItem::new(
        WorkKind::SubmitGeneration,
        serde_json::json!({ "business_id": business_id }),
        business_id.to_string(),
    )
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Drive one business through the validation stages. Called by the
/// validate-business worker with the leased item's id.
///
/// Idempotent: a business already terminal completes without side effect;
/// a business found mid-flight resumes from its current state.
pub async fn run_validation(
    deps: &EngineDeps,
    business_id: Uuid,
    item_id: Uuid,
) -> Result<(), WorkFailure> {
    let business = Business::find_by_id(business_id, &deps.pool)
        .await
        .map_err(WorkFailure::from_store)?;

    if business.status().is_terminal() {
        tracing::debug!(business_id = %business_id, status = %business.status(), "Already terminal; completing");
        return Ok(());
    }

    if campaign_cancelled(deps, &business).await? {
        tracing::info!(business_id = %business_id, "Campaign cancelled; skipping validation");
        return Ok(());
    }

    // Route out of the entry states first, in its own committed step.
    let business = match business.status() {
        ValidationStatus::Pending => match &business.website_url {
            None => {
                let mut commit = TransitionCommit::new(
                    business_id,
                    ValidationStatus::Pending,
                    ValidationStatus::NeedsDiscovery,
                );
                commit.discovery_attempt = Some((
                    "provider".to_string(),
                    DiscoveryAttempt {
                        attempted: true,
                        timestamp: Utc::now(),
                        found_url: None,
                        verdict: None,
                    },
                ));
                commit.follow_up = Some(discover_item(business_id));
                commit.complete_item = Some(item_id);
                commit
                    .apply(&deps.pool, &deps.queue)
                    .await
                    .map_err(WorkFailure::from_store)?;
                Business::set_discovery_queued(business_id, &deps.pool)
                    .await
                    .map_err(WorkFailure::from_store)?;
                return Ok(());
            }
            Some(url) => {
                let mut commit = TransitionCommit::new(
                    business_id,
                    ValidationStatus::Pending,
                    ValidationStatus::Validating,
                );
                commit.source = Some(WebsiteSource::Provider);
                commit.discovery_attempt = Some((
                    "provider".to_string(),
                    DiscoveryAttempt {
                        attempted: true,
                        timestamp: Utc::now(),
                        found_url: Some(url.clone()),
                        verdict: None,
                    },
                ));
                commit
                    .apply(&deps.pool, &deps.queue)
                    .await
                    .map_err(WorkFailure::from_store)?
            }
        },
        ValidationStatus::NeedsVerification => {
            TransitionCommit::new(
                business_id,
                ValidationStatus::NeedsVerification,
                ValidationStatus::Validating,
            )
            .apply(&deps.pool, &deps.queue)
            .await
            .map_err(WorkFailure::from_store)?
        }
        ValidationStatus::Validating => business,
        other => {
            // A validate item against a discovery-side state is stale work
            // from a previous attempt; completing it is the idempotent move.
            tracing::warn!(business_id = %business_id, status = %other, "Validate item in non-validating state; completing");
            return Ok(());
        }
    };

    let Some(candidate) = business.website_url.clone() else {
        // Validating with no URL should be impossible; treat as invariant
        // violation so it surfaces loudly but retries once.
        return Err(WorkFailure::invariant(format!(
            "business {business_id} validating without a candidate URL"
        )));
    };

    validate_candidate(deps, &business, &candidate, item_id).await
}

/// Prescreen → render → verify → apply verdict, for a business already in
/// `validating` with candidate `url`.
async fn validate_candidate(
    deps: &EngineDeps,
    business: &Business,
    url: &str,
    item_id: Uuid,
) -> Result<(), WorkFailure> {
    let business_id = business.id;
    let source = business.metadata().source.unwrap_or(WebsiteSource::Provider);

    // Stage: prescreen.
    let outcome = deps.prescreener.prescreen(url).await;

    if let PrescreenOutcome::Fail(failure) = outcome {
        let verdict = prescreen_verdict(failure);
        tracing::info!(business_id = %business_id, url, reason = %failure, "Prescreen failed");

        return match on_prescreen_failure(failure) {
            PrescreenDecision::ClearAndDiscover => {
                let mut commit = TransitionCommit::new(
                    business_id,
                    ValidationStatus::Validating,
                    ValidationStatus::NeedsDiscovery,
                );
                commit.url_change = UrlChange::Clear;
                commit.source = Some(WebsiteSource::None);
                commit.history_entry =
                    Some(history_entry(url, &verdict, format!("prescreen: {failure}")));
                commit.follow_up = Some(discover_item(business_id));
                commit.complete_item = Some(item_id);
                commit
                    .apply(&deps.pool, &deps.queue)
                    .await
                    .map_err(WorkFailure::from_store)?;
                Business::set_discovery_queued(business_id, &deps.pool)
                    .await
                    .map_err(WorkFailure::from_store)?;
                Ok(())
            }
            PrescreenDecision::MarkInvalidTechnical => {
                let mut commit = TransitionCommit::new(
                    business_id,
                    ValidationStatus::Validating,
                    ValidationStatus::InvalidTechnical,
                );
                commit.history_entry =
                    Some(history_entry(url, &verdict, format!("prescreen: {failure}")));
                commit.complete_item = Some(item_id);
                commit
                    .apply(&deps.pool, &deps.queue)
                    .await
                    .map_err(WorkFailure::from_store)?;
                Ok(())
            }
        };
    }

    // Stage: render. A bot wall degrades the evidence instead of failing.
    let evidence = match deps.renderer.render(url).await {
        Ok(page) => Evidence::RenderedPage { page },
        Err(RenderError::BotWall) => {
            tracing::info!(business_id = %business_id, url, "Bot wall; verifying on listing evidence only");
            Evidence::ListingOnly {
                url: url.to_string(),
            }
        }
        Err(err @ RenderError::Timeout) => {
            return Err(WorkFailure::transient(anyhow::anyhow!(err)));
        }
        Err(RenderError::NavigationFailed(reason)) => {
            let verdict = prescreen_verdict(PrescreenFailure::TransportFailure);
            let mut commit = TransitionCommit::new(
                business_id,
                ValidationStatus::Validating,
                ValidationStatus::InvalidTechnical,
            );
            commit.history_entry = Some(history_entry(
                url,
                &verdict,
                format!("render: navigation failed: {reason}"),
            ));
            commit.complete_item = Some(item_id);
            commit
                .apply(&deps.pool, &deps.queue)
                .await
                .map_err(WorkFailure::from_store)?;
            return Ok(());
        }
    };

    // Stage: verify.
    let context = business_context(business);
    let verdict = deps
        .verifier
        .verify(&context, &evidence)
        .await
        .map_err(WorkFailure::transient)?;

    let quality = match &evidence {
        Evidence::RenderedPage { page } => Some(render::quality_score(page)),
        _ => None,
    };

    let record = NewValidationRecord {
        business_id,
        url_evaluated: url.to_string(),
        evidence_kind: evidence.kind().to_string(),
        evidence: serde_json::to_value(&evidence)
            .context("serialize evidence")
            .map_err(WorkFailure::permanent)?,
        verdict: serde_json::to_value(&verdict)
            .context("serialize verdict")
            .map_err(WorkFailure::permanent)?,
        model: deps.verifier.model_name().to_string(),
    };

    let summary = evidence_summary(&evidence);

    match apply_verdict(verdict.verdict, source) {
        VerdictDecision::Valid(terminal) => {
            let mut commit =
                TransitionCommit::new(business_id, ValidationStatus::Validating, terminal);
            commit.history_entry = Some(history_entry(url, &verdict, summary));
            commit.quality_score = quality;
            commit.validation_record = Some(record);
            commit.complete_item = Some(item_id);
            commit
                .apply(&deps.pool, &deps.queue)
                .await
                .map_err(WorkFailure::from_store)?;
        }
        VerdictDecision::InvalidTechnical => {
            let mut commit = TransitionCommit::new(
                business_id,
                ValidationStatus::Validating,
                ValidationStatus::InvalidTechnical,
            );
            commit.history_entry = Some(history_entry(url, &verdict, summary));
            commit.quality_score = quality;
            commit.validation_record = Some(record);
            commit.complete_item = Some(item_id);
            commit
                .apply(&deps.pool, &deps.queue)
                .await
                .map_err(WorkFailure::from_store)?;
        }
        VerdictDecision::ClearAndDiscover => {
            let mut commit = TransitionCommit::new(
                business_id,
                ValidationStatus::Validating,
                ValidationStatus::NeedsDiscovery,
            );
            commit.url_change = UrlChange::Clear;
            if business.metadata().source.is_none() {
                commit.source = Some(WebsiteSource::None);
            }
            commit.history_entry = Some(history_entry(url, &verdict, summary));
            commit.validation_record = Some(record);
            commit.follow_up = Some(discover_item(business_id));
            commit.complete_item = Some(item_id);
            commit
                .apply(&deps.pool, &deps.queue)
                .await
                .map_err(WorkFailure::from_store)?;
            Business::set_discovery_queued(business_id, &deps.pool)
                .await
                .map_err(WorkFailure::from_store)?;
        }
    }

    Ok(())
}

fn evidence_summary(evidence: &Evidence) -> String {
    match evidence {
        Evidence::RenderedPage { page } => format!(
            "rendered: title={:?} phones={} emails={} words={}",
            page.title,
            page.phones.len(),
            page.emails.len(),
            page.word_count
        ),
        Evidence::SearchResults { results } => format!("search: {} organic results", results.len()),
        Evidence::ListingOnly { .. } => "listing-only (bot wall)".to_string(),
    }
}

pub async fn campaign_cancelled(deps: &EngineDeps, business: &Business) -> Result<bool, WorkFailure> {
    let Some(zone_id) = business.zone_id else {
        return Ok(false);
    };
    let zone = leadgrid_store::Zone::find_by_id(zone_id, &deps.pool)
        .await
        .map_err(WorkFailure::from_store)?;
    let campaign = leadgrid_store::Campaign::find_by_id(zone.campaign_id, &deps.pool)
        .await
        .map_err(WorkFailure::from_store)?;
    Ok(campaign.is_cancelled())
}
