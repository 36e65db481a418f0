//! bevid-id library interface
//!
//! Beverage identification wizard: labeling, training bookkeeping, decision
//! policy on classifier output, and gated enrichment. Exposed as a library
//! for integration testing.

pub mod api;
pub mod error;
pub mod html;
pub mod services;
pub mod session;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use bevid_common::events::EventBus;
use bevid_common::policy::DecisionPolicy;
use bevid_common::store::Dataset;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::services::Enricher;
use crate::session::WizardSession;

/// Module name reported by health and SSE
pub const MODULE_NAME: &str = "bevid-id";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Tier breakpoints and alcohol vocabulary
    pub policy: Arc<DecisionPolicy>,
    /// Labeled training examples (write-through persisted)
    pub dataset: Dataset,
    /// Wizard session
    pub session: Arc<RwLock<WizardSession>>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Enrichment service (remote cascade or offline placeholder)
    pub enricher: Arc<Enricher>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        policy: DecisionPolicy,
        dataset: Dataset,
        enricher: Enricher,
        event_bus: EventBus,
    ) -> Self {
        Self {
            policy: Arc::new(policy),
            dataset,
            session: Arc::new(RwLock::new(WizardSession::default())),
            event_bus,
            enricher: Arc::new(enricher),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // UI routes (HTML pages)
        .merge(api::ui_routes())
        // API routes
        .merge(api::training_routes())
        .merge(api::prediction_routes())
        .merge(api::decision_routes())
        .merge(api::session_routes())
        .merge(api::health_routes())
        .route("/events", axum::routing::get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
