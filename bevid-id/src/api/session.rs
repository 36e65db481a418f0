//! Session endpoints

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use bevid_common::events::WizardEvent;
use chrono::Utc;
use tracing::info;

use crate::session::WizardSession;
use crate::AppState;

/// GET /api/session
pub async fn get_session(State(state): State<AppState>) -> Json<WizardSession> {
    Json(state.session.read().await.clone())
}

/// POST /api/session/reset
///
/// Restores the initial session. Saved training examples are kept.
pub async fn reset_session(State(state): State<AppState>) -> Json<WizardSession> {
    let session = {
        let mut session = state.session.write().await;
        session.reset();
        session.clone()
    };

    info!("Wizard session reset");
    state.event_bus.emit_lossy(WizardEvent::SessionReset {
        timestamp: Utc::now(),
    });

    Json(session)
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/session", get(get_session))
        .route("/api/session/reset", post(reset_session))
}
