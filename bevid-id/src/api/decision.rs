//! Decision endpoint
//!
//! Accept runs the gating rule and, when allowed, the enrichment cascade.
//! Retry sends the user back to the identify page. Flag marks the result as
//! uncertain.

use axum::{extract::State, routing::post, Json, Router};
use bevid_common::events::WizardEvent;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::session::{Page, UserDecision};
use crate::{html, ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: UserDecision,
}

/// What an accepted (or otherwise decided) prediction led to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// Details generated by the enrichment endpoint
    Enriched,
    /// Enrichment offline; placeholder shown
    Placeholder,
    /// Gating withheld details
    Blocked,
    /// Every enrichment model failed
    EnrichmentFailed,
    Flagged,
    Retry,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Enriched => "enriched",
            DecisionOutcome::Placeholder => "placeholder",
            DecisionOutcome::Blocked => "blocked",
            DecisionOutcome::EnrichmentFailed => "enrichment_failed",
            DecisionOutcome::Flagged => "flagged",
            DecisionOutcome::Retry => "retry",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub decision: UserDecision,
    pub outcome: DecisionOutcome,
    pub result_html: String,
    /// Page the wizard shows next
    pub current_page: usize,
}

/// POST /api/decision
///
/// **Request:** `{"decision": "accept" | "retry" | "flag"}`
///
/// **Errors:**
/// - 409 Conflict: accept without any prediction, or the prediction was
///   replaced or cleared while details were being fetched
pub async fn decide(
    State(state): State<AppState>,
    Json(payload): Json<DecisionRequest>,
) -> ApiResult<Json<DecisionResponse>> {
    let decision = payload.decision;

    // Accept is tied to the prediction it fetched details for
    let (accepted, outcome, result_html) = match decision {
        UserDecision::Accept => {
            let (id, outcome, html) = accept(&state).await?;
            (Some(id), outcome, html)
        }
        UserDecision::Retry => {
            state.session.write().await.clear_for_retry();
            state.event_bus.emit_lossy(WizardEvent::PageChanged {
                page: Page::Identify.index(),
                timestamp: Utc::now(),
            });
            (None, DecisionOutcome::Retry, String::new())
        }
        UserDecision::Flag => (
            None,
            DecisionOutcome::Flagged,
            html::FLAGGED_NOTICE.to_string(),
        ),
    };

    let current_page = {
        let mut session = state.session.write().await;
        if let Some(id) = accepted {
            if !session.is_latest(id) {
                warn!(
                    outcome = outcome.as_str(),
                    "Prediction changed while details were fetched, discarding result"
                );
                return Err(ApiError::Conflict(
                    "The prediction changed while details were being fetched. Accept the new prediction instead."
                        .to_string(),
                ));
            }
        }
        session.user_decision = Some(decision);
        session.result_panel = result_html.clone();
        if decision != UserDecision::Retry {
            session.current_page = Page::Decide;
        }
        session.current_page.index()
    };

    info!(
        decision = decision.as_str(),
        outcome = outcome.as_str(),
        "Decision recorded"
    );
    state.event_bus.emit_lossy(WizardEvent::DecisionMade {
        decision: decision.as_str().to_string(),
        outcome: outcome.as_str().to_string(),
        timestamp: Utc::now(),
    });
    state
        .event_bus
        .emit_lossy(WizardEvent::status("result-panel", result_html.clone()));

    Ok(Json(DecisionResponse {
        decision,
        outcome,
        result_html,
        current_page,
    }))
}

/// Gate the latest prediction and enrich it when allowed
///
/// Returns the id of the prediction the result belongs to.
async fn accept(state: &AppState) -> ApiResult<(Uuid, DecisionOutcome, String)> {
    // Clone out so the session lock is not held across the HTTP cascade
    let latest = state.session.read().await.latest_prediction.clone();
    let Some(latest) = latest else {
        return Err(ApiError::Conflict(
            "No prediction to accept. Run one of the identify methods first.".to_string(),
        ));
    };

    let prediction = &latest.prediction;
    let confidence = prediction.confidence();

    if !state.policy.allows_enrichment(latest.source, prediction) {
        info!(
            label = %prediction.label,
            confidence,
            "Enrichment blocked by gating rule"
        );
        return Ok((
            latest.id,
            DecisionOutcome::Blocked,
            html::BLOCKED_NOTICE.to_string(),
        ));
    }

    match state
        .enricher
        .enrich(&prediction.label, confidence, latest.source)
        .await
    {
        Ok(enrichment) => {
            let outcome = match enrichment {
                crate::services::Enrichment::Offline => DecisionOutcome::Placeholder,
                crate::services::Enrichment::Generated { .. } => DecisionOutcome::Enriched,
            };
            let panel =
                html::enrichment_panel(&prediction.label, confidence, latest.source, &enrichment);
            Ok((latest.id, outcome, panel))
        }
        Err(e) => {
            error!("Enrichment failed: {}", e);
            Ok((
                latest.id,
                DecisionOutcome::EnrichmentFailed,
                html::enrichment_failed_panel(&e.to_string()),
            ))
        }
    }
}

/// Build decision routes
pub fn decision_routes() -> Router<AppState> {
    Router::new().route("/api/decision", post(decide))
}
