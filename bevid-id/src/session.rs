//! Wizard session state
//!
//! One session per process: the wizard is a single-user, local tool.

use bevid_common::policy::{Assessment, Prediction, PredictionSource};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::html;

/// Wizard pages, in navigation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Welcome,
    LabelExamples,
    Train,
    Identify,
    Review,
    Decide,
}

impl Page {
    pub const ALL: [Page; 6] = [
        Page::Welcome,
        Page::LabelExamples,
        Page::Train,
        Page::Identify,
        Page::Review,
        Page::Decide,
    ];

    /// Page at a 0-based index
    pub fn from_index(index: usize) -> Option<Page> {
        Self::ALL.get(index).copied()
    }

    pub fn index(&self) -> usize {
        match self {
            Page::Welcome => 0,
            Page::LabelExamples => 1,
            Page::Train => 2,
            Page::Identify => 3,
            Page::Review => 4,
            Page::Decide => 5,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Page::Welcome => "Beverage Identifier",
            Page::LabelExamples => "Step 1: Label Examples (for KNN)",
            Page::Train => "Step 2: Train the KNN Model",
            Page::Identify => "Step 3: Identify a Beverage",
            Page::Review => "Step 4: Review Results",
            Page::Decide => "Step 5: Your Decision",
        }
    }

    /// Short name for the progress list
    pub fn short_name(&self) -> &'static str {
        match self {
            Page::Welcome => "Welcome",
            Page::LabelExamples => "Label",
            Page::Train => "Train",
            Page::Identify => "Identify",
            Page::Review => "Review",
            Page::Decide => "Decide",
        }
    }

    pub fn previous(&self) -> Option<Page> {
        self.index().checked_sub(1).and_then(Page::from_index)
    }

    pub fn next(&self) -> Option<Page> {
        Page::from_index(self.index() + 1)
    }
}

/// Review panel of one classifier
#[derive(Debug, Clone, Serialize)]
pub struct SourcePanel {
    pub tier_message: String,
    /// Safety notice when a false negative is suspected, else empty
    pub warning: String,
    pub assessment: Option<Assessment>,
}

impl SourcePanel {
    fn initial(source: PredictionSource) -> Self {
        let tier_message = match source {
            PredictionSource::Pretrained => html::INITIAL_PRETRAINED_MESSAGE,
            PredictionSource::Knn => html::INITIAL_KNN_MESSAGE,
        };
        Self {
            tier_message: tier_message.to_string(),
            warning: String::new(),
            assessment: None,
        }
    }
}

/// Most recent prediction from either classifier
#[derive(Debug, Clone, Serialize)]
pub struct LatestPrediction {
    /// Fresh per submission; a decision is committed only against the same id
    pub id: Uuid,
    pub source: PredictionSource,
    pub prediction: Prediction,
}

impl LatestPrediction {
    pub fn new(source: PredictionSource, prediction: Prediction) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            prediction,
        }
    }
}

/// What the user chose on the decision page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserDecision {
    /// Accept the prediction and show details
    Accept,
    /// Go back and identify another photo
    Retry,
    /// Flag the prediction as uncertain
    Flag,
}

impl UserDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserDecision::Accept => "accept",
            UserDecision::Retry => "retry",
            UserDecision::Flag => "flag",
        }
    }
}

/// Wizard session
#[derive(Debug, Clone, Serialize)]
pub struct WizardSession {
    pub current_page: Page,
    /// Status line on the labeling page
    pub train_status: String,
    /// Status line on the training page
    pub train_step_status: String,
    /// Status line on the identify page
    pub pred_status: String,
    pub pretrained: SourcePanel,
    pub knn: SourcePanel,
    pub latest_prediction: Option<LatestPrediction>,
    /// Example count of the last training run
    pub trained_on: Option<usize>,
    pub user_decision: Option<UserDecision>,
    /// Result panel on the decision page
    pub result_panel: String,
}

impl Default for WizardSession {
    fn default() -> Self {
        Self {
            current_page: Page::Welcome,
            train_status: html::INITIAL_TRAIN_STATUS.to_string(),
            train_step_status: html::INITIAL_TRAIN_STEP_STATUS.to_string(),
            pred_status: html::INITIAL_PRED_STATUS.to_string(),
            pretrained: SourcePanel::initial(PredictionSource::Pretrained),
            knn: SourcePanel::initial(PredictionSource::Knn),
            latest_prediction: None,
            trained_on: None,
            user_decision: None,
            result_panel: String::new(),
        }
    }
}

impl WizardSession {
    /// Restore the initial state ("Start over")
    pub fn reset(&mut self) {
        *self = WizardSession::default();
    }

    /// Clear results and return to the identify page ("Try another photo")
    ///
    /// Labeling and training state are kept.
    pub fn clear_for_retry(&mut self) {
        self.result_panel.clear();
        self.pretrained = SourcePanel::initial(PredictionSource::Pretrained);
        self.knn = SourcePanel::initial(PredictionSource::Knn);
        self.pred_status = html::INITIAL_PRED_STATUS.to_string();
        self.latest_prediction = None;
        self.user_decision = Some(UserDecision::Retry);
        self.current_page = Page::Identify;
    }

    /// Whether `id` still names the latest prediction
    pub fn is_latest(&self, id: Uuid) -> bool {
        self.latest_prediction
            .as_ref()
            .is_some_and(|latest| latest.id == id)
    }

    pub fn panel_mut(&mut self, source: PredictionSource) -> &mut SourcePanel {
        match source {
            PredictionSource::Pretrained => &mut self.pretrained,
            PredictionSource::Knn => &mut self.knn,
        }
    }

    pub fn panel(&self, source: PredictionSource) -> &SourcePanel {
        match source {
            PredictionSource::Pretrained => &self.pretrained,
            PredictionSource::Knn => &self.knn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_page_navigation() {
        assert_eq!(Page::from_index(3), Some(Page::Identify));
        assert_eq!(Page::from_index(6), None);
        assert_eq!(Page::Welcome.previous(), None);
        assert_eq!(Page::Decide.next(), None);
        assert_eq!(Page::Train.next(), Some(Page::Identify));
        for (i, page) in Page::ALL.iter().enumerate() {
            assert_eq!(page.index(), i);
        }
    }

    #[test]
    fn test_retry_keeps_training_state() {
        let mut session = WizardSession::default();
        session.trained_on = Some(4);
        session.train_status = "saved".to_string();
        session.result_panel = "panel".to_string();
        session.knn.warning = "warn".to_string();
        session.latest_prediction = Some(LatestPrediction::new(
            PredictionSource::Knn,
            Prediction::new("Beer", BTreeMap::new()),
        ));

        session.clear_for_retry();

        assert_eq!(session.current_page, Page::Identify);
        assert_eq!(session.trained_on, Some(4));
        assert_eq!(session.train_status, "saved");
        assert!(session.result_panel.is_empty());
        assert!(session.knn.warning.is_empty());
        assert!(session.latest_prediction.is_none());
        assert_eq!(session.user_decision, Some(UserDecision::Retry));
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut session = WizardSession::default();
        session.trained_on = Some(2);
        session.current_page = Page::Decide;
        session.reset();

        assert_eq!(session.current_page, Page::Welcome);
        assert_eq!(session.trained_on, None);
        assert_eq!(session.train_status, html::INITIAL_TRAIN_STATUS);
    }

    #[test]
    fn test_is_latest_tracks_resubmission() {
        let mut session = WizardSession::default();
        let first = LatestPrediction::new(
            PredictionSource::Pretrained,
            Prediction::new("beer glass", BTreeMap::new()),
        );
        let first_id = first.id;
        session.latest_prediction = Some(first);
        assert!(session.is_latest(first_id));

        session.latest_prediction = Some(LatestPrediction::new(
            PredictionSource::Pretrained,
            Prediction::new("beer glass", BTreeMap::new()),
        ));
        assert!(!session.is_latest(first_id));

        session.clear_for_retry();
        assert!(!session.is_latest(first_id));
    }
}
