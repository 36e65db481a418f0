//! Wizard events and the EventBus
//!
//! Every status change the wizard shows is also broadcast here so connected
//! pages can refresh without polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::policy::{ConfidenceTier, PredictionSource};

/// Wizard event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WizardEvent {
    /// A labeled example was saved to the training dataset
    ExampleSaved {
        example_id: Uuid,
        label: String,
        /// Dataset size after the save
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// The training dataset was emptied
    DatasetCleared {
        removed: usize,
        timestamp: DateTime<Utc>,
    },

    /// The custom classifier was trained
    ModelTrained {
        example_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A prediction was run through the decision policy
    PredictionAssessed {
        source: PredictionSource,
        label: String,
        confidence: f64,
        tier: ConfidenceTier,
        false_negative: bool,
        blocked: bool,
        timestamp: DateTime<Utc>,
    },

    /// The user accepted, retried or flagged the latest prediction
    DecisionMade {
        decision: String,
        outcome: String,
        timestamp: DateTime<Utc>,
    },

    /// Status text of a wizard panel changed
    StatusChanged {
        /// Panel id (e.g. "train-status")
        panel: String,
        html: String,
        timestamp: DateTime<Utc>,
    },

    /// The wizard moved to another page
    PageChanged {
        page: usize,
        timestamp: DateTime<Utc>,
    },

    /// Session returned to its initial state
    SessionReset {
        timestamp: DateTime<Utc>,
    },
}

impl WizardEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            WizardEvent::ExampleSaved { .. } => "ExampleSaved",
            WizardEvent::DatasetCleared { .. } => "DatasetCleared",
            WizardEvent::ModelTrained { .. } => "ModelTrained",
            WizardEvent::PredictionAssessed { .. } => "PredictionAssessed",
            WizardEvent::DecisionMade { .. } => "DecisionMade",
            WizardEvent::StatusChanged { .. } => "StatusChanged",
            WizardEvent::PageChanged { .. } => "PageChanged",
            WizardEvent::SessionReset { .. } => "SessionReset",
        }
    }

    pub fn status(panel: &str, html: impl Into<String>) -> Self {
        WizardEvent::StatusChanged {
            panel: panel.to_string(),
            html: html.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Broadcast channel for wizard events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WizardEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Old events are dropped once `capacity` unread events are buffered.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<WizardEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: WizardEvent,
    ) -> Result<usize, broadcast::error::SendError<WizardEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: WizardEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
