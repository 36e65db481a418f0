//! Prediction endpoint
//!
//! Both classifiers run outside this service. Their output is posted here,
//! assessed by the decision policy and rendered into that source's review
//! panel.

use axum::{extract::State, routing::post, Json, Router};
use bevid_common::events::WizardEvent;
use bevid_common::policy::{Assessment, Prediction, PredictionSource};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::session::LatestPrediction;
use crate::{html, ApiResult, AppState};

/// Request payload: classifier output tagged with its source
///
/// **Request:** `{"source": "knn", "label": "Beer", "confidences": {"Beer": 0.9}}`
#[derive(Debug, Deserialize)]
pub struct PredictionRequest {
    pub source: PredictionSource,
    #[serde(flatten)]
    pub prediction: Prediction,
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub assessment: Assessment,
    pub tier_message_html: String,
    /// Safety notice when a false negative is suspected, else empty
    pub warning_html: String,
    pub candidates_html: String,
}

/// POST /api/predictions
///
/// **Errors:**
/// - 400 Bad Request: empty label or a confidence outside 0.0-1.0
pub async fn submit_prediction(
    State(state): State<AppState>,
    Json(payload): Json<PredictionRequest>,
) -> ApiResult<Json<PredictionResponse>> {
    let source = payload.source;
    let assessment = state.policy.assess(source, &payload.prediction)?;

    let tier_message = html::tier_message(&assessment);
    let warning = if assessment.false_negative {
        html::SAFETY_NOTICE.to_string()
    } else {
        String::new()
    };

    {
        let mut session = state.session.write().await;
        if source == PredictionSource::Knn && session.trained_on.is_none() {
            warn!("KNN prediction received before the classifier was trained");
        }

        let panel = session.panel_mut(source);
        panel.tier_message = tier_message.clone();
        panel.warning = warning.clone();
        panel.assessment = Some(assessment.clone());

        session.pred_status.clear();
        session.latest_prediction = Some(LatestPrediction::new(source, payload.prediction));
    }

    info!(
        source = source.as_str(),
        label = %assessment.label,
        confidence = assessment.confidence,
        tier = assessment.tier.as_str(),
        false_negative = assessment.false_negative,
        blocked = assessment.blocked,
        "Assessed prediction"
    );

    state.event_bus.emit_lossy(WizardEvent::PredictionAssessed {
        source,
        label: assessment.label.clone(),
        confidence: assessment.confidence,
        tier: assessment.tier,
        false_negative: assessment.false_negative,
        blocked: assessment.blocked,
        timestamp: Utc::now(),
    });
    state
        .event_bus
        .emit_lossy(WizardEvent::status("pred-status", String::new()));

    Ok(Json(PredictionResponse {
        candidates_html: html::candidate_list(&assessment.candidates),
        tier_message_html: tier_message,
        warning_html: warning,
        assessment,
    }))
}

/// Build prediction routes
pub fn prediction_routes() -> Router<AppState> {
    Router::new().route("/api/predictions", post(submit_prediction))
}
