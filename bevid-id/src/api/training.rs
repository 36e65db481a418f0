//! Labeling and training endpoints
//!
//! Feature vectors come from the external feature extractor; this service
//! stores them with their labels and records when the external KNN
//! classifier was trained.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use bevid_common::events::WizardEvent;
use bevid_common::labels::{self, DEFAULT_LABEL, IMAGENET_ALCOHOL_KEYWORDS, KNN_LABELS};
use bevid_common::store::{self, NewExample, TrainingExample};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::{html, ApiError, ApiResult, AppState};

/// Request payload for saving a labeled example
#[derive(Debug, Deserialize)]
pub struct SaveExampleRequest {
    /// Feature vector of the uploaded image; empty when no image was selected
    #[serde(default)]
    pub features: Vec<f32>,
    pub label: String,
    /// Thumbnail data URL shown in the dataset browser
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// Status line update plus dataset size
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status_html: String,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct DatasetResponse {
    pub name: String,
    pub count: usize,
    pub label_counts: BTreeMap<String, usize>,
    pub examples: Vec<TrainingExample>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed: usize,
}

#[derive(Debug, Serialize)]
pub struct LabelsResponse {
    pub labels: Vec<&'static str>,
    pub default_label: &'static str,
    pub non_alcoholic_label: &'static str,
    pub alcohol_keywords: Vec<&'static str>,
}

/// Set the labeling status line and broadcast it
async fn set_train_status(state: &AppState, status: String) {
    state.session.write().await.train_status = status.clone();
    state
        .event_bus
        .emit_lossy(WizardEvent::status("train-status", status));
}

/// Set the training-step status line and broadcast it
async fn set_train_step_status(state: &AppState, status: String) {
    state.session.write().await.train_step_status = status.clone();
    state
        .event_bus
        .emit_lossy(WizardEvent::status("train-step-status", status));
}

/// POST /api/examples
///
/// **Request:** `{"features": [..], "label": "Beer", "thumbnail": "data:..."}`
///
/// **Errors:**
/// - 400 Bad Request: no features (no image selected) or unknown label
pub async fn save_example(
    State(state): State<AppState>,
    Json(payload): Json<SaveExampleRequest>,
) -> ApiResult<Json<StatusResponse>> {
    if payload.features.is_empty() {
        set_train_status(&state, html::no_image_status()).await;
        return Err(ApiError::BadRequest(
            "No image selected. Please upload an image first.".to_string(),
        ));
    }

    if !labels::is_knn_label(&payload.label) {
        return Err(ApiError::BadRequest(format!(
            "Unknown label '{}'",
            payload.label
        )));
    }

    let (example, count) = state
        .dataset
        .create(NewExample {
            x: payload.features,
            y: payload.label,
            thumbnail: payload.thumbnail,
        })
        .await?;

    info!(label = %example.y, count, "Saved training example");

    let status = html::saved_status(&example.y, count);
    set_train_status(&state, status.clone()).await;
    state.event_bus.emit_lossy(WizardEvent::ExampleSaved {
        example_id: example.id,
        label: example.y,
        count,
        timestamp: Utc::now(),
    });

    Ok(Json(StatusResponse {
        status_html: status,
        count,
    }))
}

/// GET /api/examples
pub async fn list_examples(State(state): State<AppState>) -> ApiResult<Json<DatasetResponse>> {
    let examples = state.dataset.list().await?;

    Ok(Json(DatasetResponse {
        name: state.dataset.name().to_string(),
        count: examples.len(),
        label_counts: store::label_counts(&examples),
        examples,
    }))
}

/// DELETE /api/examples
pub async fn clear_examples(State(state): State<AppState>) -> ApiResult<Json<ClearResponse>> {
    let removed = state.dataset.clear().await?;

    set_train_status(&state, html::INITIAL_TRAIN_STATUS.to_string()).await;
    state.event_bus.emit_lossy(WizardEvent::DatasetCleared {
        removed,
        timestamp: Utc::now(),
    });

    Ok(Json(ClearResponse { removed }))
}

/// POST /api/train
///
/// Training itself runs in the external classifier; this records that it
/// happened over the current dataset.
///
/// **Errors:**
/// - 409 Conflict: no examples saved yet
pub async fn train(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let count = state.dataset.count().await?;

    if count == 0 {
        warn!("Train requested with an empty dataset");
        set_train_step_status(&state, html::no_examples_status()).await;
        return Err(ApiError::Conflict(
            "No examples saved yet. Add labeled images before training.".to_string(),
        ));
    }

    let status = html::trained_status(count);
    {
        let mut session = state.session.write().await;
        session.trained_on = Some(count);
        session.train_step_status = status.clone();
    }

    info!(count, "KNN classifier trained");
    state
        .event_bus
        .emit_lossy(WizardEvent::status("train-step-status", status.clone()));
    state.event_bus.emit_lossy(WizardEvent::ModelTrained {
        example_count: count,
        timestamp: Utc::now(),
    });

    Ok(Json(StatusResponse {
        status_html: status,
        count,
    }))
}

/// GET /api/labels
pub async fn list_labels() -> Json<LabelsResponse> {
    Json(LabelsResponse {
        labels: KNN_LABELS.to_vec(),
        default_label: DEFAULT_LABEL,
        non_alcoholic_label: labels::NON_ALCOHOLIC_LABEL,
        alcohol_keywords: IMAGENET_ALCOHOL_KEYWORDS.to_vec(),
    })
}

/// Build labeling and training routes
pub fn training_routes() -> Router<AppState> {
    Router::new()
        .route("/api/labels", get(list_labels))
        .route(
            "/api/examples",
            get(list_examples).post(save_example).delete(clear_examples),
        )
        .route("/api/train", post(train))
}
