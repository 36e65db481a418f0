//! Tiered-confidence decision policy
//!
//! Converts a raw classification (a label plus per-class confidence scores)
//! into:
//! - a confidence tier (High / Moderate / Low)
//! - a false-negative flag (the drink may contain alcohol although the
//!   classifier says otherwise)
//! - a gating decision for detailed enrichment
//!
//! **Default Thresholds:**
//! - High: ≥0.85
//! - Moderate: 0.60-0.85
//! - Low: <0.60
//!
//! Both breakpoints are inclusive.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::labels::{self, NON_ALCOHOLIC_LABEL};

/// Default lower bound of the High tier
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Default lower bound of the Moderate tier; also the enrichment gate
pub const MEDIUM_CONFIDENCE_THRESHOLD: f64 = 0.60;

/// Number of ranked candidates kept in an assessment
pub const TOP_N_CANDIDATES: usize = 3;

/// Decision policy errors
#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    /// Invalid input (empty label, out-of-range scores, bad thresholds)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Risk tier derived from the top confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Moderate,
    Low,
}

impl ConfidenceTier {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Moderate => "moderate",
            ConfidenceTier::Low => "low",
        }
    }

    /// Human-readable tier name
    pub fn display_name(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "High confidence",
            ConfidenceTier::Moderate => "Moderate confidence",
            ConfidenceTier::Low => "Low confidence",
        }
    }

    pub fn color(&self) -> MessageColor {
        match self {
            ConfidenceTier::High => MessageColor::Green,
            ConfidenceTier::Moderate => MessageColor::Orange,
            ConfidenceTier::Low => MessageColor::Red,
        }
    }
}

/// Tier breakpoints
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Lower bound (inclusive) of the High tier
    #[serde(default = "default_high")]
    pub high: f64,
    /// Lower bound (inclusive) of the Moderate tier
    #[serde(default = "default_medium")]
    pub medium: f64,
}

fn default_high() -> f64 {
    HIGH_CONFIDENCE_THRESHOLD
}

fn default_medium() -> f64 {
    MEDIUM_CONFIDENCE_THRESHOLD
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high: HIGH_CONFIDENCE_THRESHOLD,
            medium: MEDIUM_CONFIDENCE_THRESHOLD,
        }
    }
}

impl Thresholds {
    /// Create validated thresholds
    pub fn new(high: f64, medium: f64) -> Result<Self, PolicyError> {
        let thresholds = Self { high, medium };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Require `0 <= medium <= high <= 1`
    pub fn validate(&self) -> Result<(), PolicyError> {
        let in_range = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_range(self.high) || !in_range(self.medium) || self.medium > self.high {
            return Err(PolicyError::InvalidInput(format!(
                "Thresholds must satisfy 0 <= medium <= high <= 1 (high={}, medium={})",
                self.high, self.medium
            )));
        }
        Ok(())
    }

    /// Map a confidence onto a tier. Non-finite confidences are Low.
    pub fn tier(&self, confidence: f64) -> ConfidenceTier {
        if !confidence.is_finite() {
            ConfidenceTier::Low
        } else if confidence >= self.high {
            ConfidenceTier::High
        } else if confidence >= self.medium {
            ConfidenceTier::Moderate
        } else {
            ConfidenceTier::Low
        }
    }
}

/// Tier for `confidence` using the default breakpoints (0.85 / 0.60)
pub fn tier(confidence: f64) -> ConfidenceTier {
    Thresholds::default().tier(confidence)
}

/// Which classifier produced a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionSource {
    /// General-purpose ImageNet classifier, no training needed
    Pretrained,
    /// KNN classifier trained on the user's labeled examples
    Knn,
}

impl PredictionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionSource::Pretrained => "pretrained",
            PredictionSource::Knn => "knn",
        }
    }

    /// Name shown to the user next to a result
    pub fn display_name(&self) -> &'static str {
        match self {
            PredictionSource::Pretrained => "Pretrained MobileNet (ImageNet)",
            PredictionSource::Knn => "Custom KNN Model",
        }
    }
}

/// Raw classifier output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted (top) label
    pub label: String,
    /// Confidence per class label (0.0-1.0)
    #[serde(default)]
    pub confidences: BTreeMap<String, f64>,
}

impl Prediction {
    pub fn new(label: impl Into<String>, confidences: BTreeMap<String, f64>) -> Self {
        Self {
            label: label.into(),
            confidences,
        }
    }

    /// Confidence of the predicted label, 0.0 when the map lacks it
    pub fn confidence(&self) -> f64 {
        self.confidences.get(&self.label).copied().unwrap_or(0.0)
    }

    /// Confidence entries sorted by descending score (ties by label)
    pub fn ranked(&self) -> Vec<(&str, f64)> {
        let mut entries: Vec<(&str, f64)> = self
            .confidences
            .iter()
            .map(|(label, score)| (label.as_str(), *score))
            .collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }

    fn validate(&self) -> Result<(), PolicyError> {
        if self.label.trim().is_empty() {
            return Err(PolicyError::InvalidInput(
                "Prediction label must not be empty".to_string(),
            ));
        }
        for (label, score) in &self.confidences {
            if !score.is_finite() || *score < 0.0 || *score > 1.0 {
                return Err(PolicyError::InvalidInput(format!(
                    "Confidence for '{}' out of range: {}",
                    label, score
                )));
            }
        }
        Ok(())
    }
}

/// False-negative heuristic
///
/// - `Knn`: the label equals the non-alcoholic sentinel exactly.
/// - `Pretrained`: no key of `confidences` contains any of `keywords`
///   (substring, case-insensitive).
pub fn is_false_negative<S: AsRef<str>>(
    source: PredictionSource,
    label: &str,
    confidences: &BTreeMap<String, f64>,
    keywords: &[S],
) -> bool {
    match source {
        PredictionSource::Knn => label == NON_ALCOHOLIC_LABEL,
        PredictionSource::Pretrained => !confidences
            .keys()
            .any(|class| labels::contains_keyword(class, keywords)),
    }
}

/// Gating rule: enrichment runs only for a non-false-negative prediction whose
/// confidence reaches the Moderate tier.
pub fn enrichment_allowed(false_negative: bool, confidence: f64, thresholds: &Thresholds) -> bool {
    !false_negative && confidence >= thresholds.medium
}

/// Banner color of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageColor {
    Green,
    Orange,
    Red,
}

impl MessageColor {
    /// CSS color used by the HTML fragments
    pub fn css(&self) -> &'static str {
        match self {
            MessageColor::Green => "#27ae60",
            MessageColor::Orange => "#e67e22",
            MessageColor::Red => "#c0392b",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageIcon {
    Check,
    Warning,
    Danger,
    Stop,
}

/// Plain-language explanation of an assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainMessage {
    pub text: String,
    pub color: MessageColor,
    pub icon: MessageIcon,
}

/// One ranked candidate with its own tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub label: String,
    pub score: f64,
    pub tier: ConfidenceTier,
}

/// Full policy verdict for one prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub source: PredictionSource,
    pub label: String,
    /// Confidence of `label` (0.0 when absent from the map)
    pub confidence: f64,
    pub tier: ConfidenceTier,
    pub false_negative: bool,
    pub is_alcohol: bool,
    /// Detailed enrichment is withheld
    pub blocked: bool,
    /// Top candidates, descending by score
    pub candidates: Vec<Candidate>,
    pub message: PlainMessage,
}

/// Decision policy
///
/// Holds the breakpoints and vocabulary used to assess predictions from
/// either classifier.
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    thresholds: Thresholds,
    alcohol_keywords: Vec<String>,
    top_n: usize,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

impl DecisionPolicy {
    /// Create a policy with the default ImageNet keyword list
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            alcohol_keywords: labels::default_alcohol_keywords(),
            top_n: TOP_N_CANDIDATES,
        }
    }

    /// Replace the keyword list (stored lowercase)
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.alcohol_keywords = keywords.into_iter().map(|k| k.to_lowercase()).collect();
        self
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn alcohol_keywords(&self) -> &[String] {
        &self.alcohol_keywords
    }

    pub fn tier(&self, confidence: f64) -> ConfidenceTier {
        self.thresholds.tier(confidence)
    }

    pub fn is_false_negative(&self, source: PredictionSource, prediction: &Prediction) -> bool {
        is_false_negative(
            source,
            &prediction.label,
            &prediction.confidences,
            &self.alcohol_keywords,
        )
    }

    /// Whether detailed enrichment may be shown for this prediction
    pub fn allows_enrichment(&self, source: PredictionSource, prediction: &Prediction) -> bool {
        enrichment_allowed(
            self.is_false_negative(source, prediction),
            prediction.confidence(),
            &self.thresholds,
        )
    }

    /// Assess a prediction
    ///
    /// # Errors
    /// Returns error if the label is empty or any score is outside 0.0-1.0
    pub fn assess(
        &self,
        source: PredictionSource,
        prediction: &Prediction,
    ) -> Result<Assessment, PolicyError> {
        prediction.validate()?;

        let confidence = prediction.confidence();
        let tier = self.tier(confidence);
        let false_negative = self.is_false_negative(source, prediction);
        let is_alcohol = match source {
            PredictionSource::Knn => prediction.label != NON_ALCOHOLIC_LABEL,
            PredictionSource::Pretrained => {
                labels::contains_keyword(&prediction.label, &self.alcohol_keywords)
            }
        };
        let blocked = !enrichment_allowed(false_negative, confidence, &self.thresholds);

        let candidates = prediction
            .ranked()
            .into_iter()
            .take(self.top_n)
            .map(|(label, score)| Candidate {
                label: label.to_string(),
                score,
                tier: self.tier(score),
            })
            .collect();

        Ok(Assessment {
            source,
            label: prediction.label.clone(),
            confidence,
            tier,
            false_negative,
            is_alcohol,
            blocked,
            candidates,
            message: build_message(tier, is_alcohol, false_negative),
        })
    }
}

fn build_message(tier: ConfidenceTier, is_alcohol: bool, false_negative: bool) -> PlainMessage {
    let (text, color, icon) = if false_negative {
        (
            "The model thinks this may NOT contain alcohol, but it is not certain. \
             Please check the physical label before acting on this result.",
            MessageColor::Red,
            MessageIcon::Danger,
        )
    } else {
        match tier {
            ConfidenceTier::High if is_alcohol => (
                "The model is confident this is an alcoholic beverage.",
                MessageColor::Green,
                MessageIcon::Check,
            ),
            ConfidenceTier::High => (
                "The model is confident this does not appear to be alcoholic.",
                MessageColor::Green,
                MessageIcon::Check,
            ),
            ConfidenceTier::Moderate => (
                "The model is not fully sure. Please review the options below and confirm which looks right.",
                MessageColor::Orange,
                MessageIcon::Warning,
            ),
            ConfidenceTier::Low => (
                "The model is uncertain about this image. We recommend checking the physical label \
                 before relying on this result.",
                MessageColor::Red,
                MessageIcon::Stop,
            ),
        }
    };

    PlainMessage {
        text: text.to_string(),
        color,
        icon,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confidences(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(l, s)| (l.to_string(), *s)).collect()
    }

    #[test]
    fn test_tier_boundaries_are_inclusive() {
        assert_eq!(tier(0.85), ConfidenceTier::High);
        assert_eq!(tier(0.60), ConfidenceTier::Moderate);
        assert_eq!(tier(0.849_999), ConfidenceTier::Moderate);
        assert_eq!(tier(0.599_999), ConfidenceTier::Low);
    }

    #[test]
    fn test_tier_extremes() {
        assert_eq!(tier(1.0), ConfidenceTier::High);
        assert_eq!(tier(0.0), ConfidenceTier::Low);
        assert_eq!(tier(f64::NAN), ConfidenceTier::Low);
        assert_eq!(tier(f64::INFINITY), ConfidenceTier::Low);
    }

    #[test]
    fn test_custom_thresholds() {
        let thresholds = Thresholds::new(0.9, 0.5).unwrap();
        assert_eq!(thresholds.tier(0.85), ConfidenceTier::Moderate);
        assert_eq!(thresholds.tier(0.5), ConfidenceTier::Moderate);
        assert_eq!(thresholds.tier(0.49), ConfidenceTier::Low);
    }

    #[test]
    fn test_thresholds_validation() {
        assert!(Thresholds::new(0.5, 0.6).is_err(), "medium above high");
        assert!(Thresholds::new(1.5, 0.6).is_err(), "high above 1");
        assert!(Thresholds::new(0.85, -0.1).is_err(), "negative medium");
        assert!(Thresholds::new(f64::NAN, 0.6).is_err());
        assert!(Thresholds::new(0.7, 0.7).is_ok(), "equal bounds allowed");
    }

    #[test]
    fn test_knn_false_negative_is_exact_sentinel_match() {
        let map = confidences(&[("Non-alcoholic", 0.9), ("Beer", 0.1)]);
        let kws = labels::IMAGENET_ALCOHOL_KEYWORDS;

        assert!(is_false_negative(PredictionSource::Knn, "Non-alcoholic", &map, kws));
        assert!(!is_false_negative(PredictionSource::Knn, "non-alcoholic", &map, kws));
        assert!(!is_false_negative(PredictionSource::Knn, "Beer", &map, kws));
    }

    #[test]
    fn test_pretrained_false_negative_checks_every_key() {
        let kws = labels::IMAGENET_ALCOHOL_KEYWORDS;

        // Top label is not alcoholic, but another key mentions wine
        let map = confidences(&[("water bottle", 0.7), ("Red Wine", 0.2)]);
        assert!(!is_false_negative(PredictionSource::Pretrained, "water bottle", &map, kws));

        // No key mentions alcohol
        let map = confidences(&[("water bottle", 0.7), ("pop bottle", 0.2)]);
        assert!(is_false_negative(PredictionSource::Pretrained, "water bottle", &map, kws));

        // Empty map: nothing alcoholic seen
        assert!(is_false_negative(
            PredictionSource::Pretrained,
            "water bottle",
            &BTreeMap::new(),
            kws
        ));
    }

    #[test]
    fn test_gating_rule() {
        let t = Thresholds::default();
        assert!(enrichment_allowed(false, 0.60, &t));
        assert!(enrichment_allowed(false, 0.95, &t));
        assert!(!enrichment_allowed(false, 0.59, &t));
        assert!(!enrichment_allowed(true, 0.99, &t));
        assert!(!enrichment_allowed(false, f64::NAN, &t));
    }

    #[test]
    fn test_missing_label_confidence_is_zero() {
        let prediction = Prediction::new("Gin", confidences(&[("Rum", 0.8)]));
        assert_eq!(prediction.confidence(), 0.0);

        let policy = DecisionPolicy::default();
        let assessment = policy.assess(PredictionSource::Knn, &prediction).unwrap();
        assert_eq!(assessment.tier, ConfidenceTier::Low);
        assert!(assessment.blocked);
    }

    #[test]
    fn test_assess_high_confidence_alcohol() {
        let policy = DecisionPolicy::default();
        let prediction = Prediction::new(
            "Whisky",
            confidences(&[("Whisky", 0.9), ("Rum", 0.07), ("Gin", 0.02), ("Beer", 0.01)]),
        );

        let a = policy.assess(PredictionSource::Knn, &prediction).unwrap();
        assert_eq!(a.tier, ConfidenceTier::High);
        assert!(a.is_alcohol);
        assert!(!a.false_negative);
        assert!(!a.blocked);
        assert_eq!(a.message.color, MessageColor::Green);
        assert_eq!(a.message.icon, MessageIcon::Check);

        let labels: Vec<&str> = a.candidates.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Whisky", "Rum", "Gin"]);
        assert_eq!(a.candidates[1].tier, ConfidenceTier::Low);
    }

    #[test]
    fn test_assess_false_negative_overrides_tier_message() {
        let policy = DecisionPolicy::default();
        let prediction = Prediction::new("Non-alcoholic", confidences(&[("Non-alcoholic", 0.97)]));

        let a = policy.assess(PredictionSource::Knn, &prediction).unwrap();
        assert_eq!(a.tier, ConfidenceTier::High);
        assert!(a.false_negative);
        assert!(!a.is_alcohol);
        assert!(a.blocked);
        assert_eq!(a.message.icon, MessageIcon::Danger);
    }

    #[test]
    fn test_assess_pretrained_high_but_not_alcoholic_top_label() {
        let policy = DecisionPolicy::default();
        let prediction = Prediction::new(
            "water bottle",
            confidences(&[("water bottle", 0.9), ("wine bottle", 0.05)]),
        );

        let a = policy.assess(PredictionSource::Pretrained, &prediction).unwrap();
        assert!(!a.false_negative);
        assert!(!a.is_alcohol);
        assert!(!a.blocked);
        assert!(a.message.text.contains("does not appear to be alcoholic"));
    }

    #[test]
    fn test_assess_moderate_and_low_messages() {
        let policy = DecisionPolicy::default();

        let moderate = Prediction::new("beer glass", confidences(&[("beer glass", 0.7)]));
        let a = policy.assess(PredictionSource::Pretrained, &moderate).unwrap();
        assert_eq!(a.message.icon, MessageIcon::Warning);
        assert!(!a.blocked);

        let low = Prediction::new("beer glass", confidences(&[("beer glass", 0.3)]));
        let a = policy.assess(PredictionSource::Pretrained, &low).unwrap();
        assert_eq!(a.message.icon, MessageIcon::Stop);
        assert!(a.blocked);
    }

    #[test]
    fn test_assess_rejects_invalid_input() {
        let policy = DecisionPolicy::default();

        let empty = Prediction::new("  ", BTreeMap::new());
        assert!(policy.assess(PredictionSource::Knn, &empty).is_err());

        let out_of_range = Prediction::new("Beer", confidences(&[("Beer", 1.2)]));
        assert!(matches!(
            policy.assess(PredictionSource::Knn, &out_of_range),
            Err(PolicyError::InvalidInput(_))
        ));

        let nan = Prediction::new("Beer", confidences(&[("Beer", f64::NAN)]));
        assert!(policy.assess(PredictionSource::Knn, &nan).is_err());
    }

    #[test]
    fn test_custom_keywords_are_lowercased() {
        let policy = DecisionPolicy::default().with_keywords(vec!["MEAD".to_string()]);
        let prediction = Prediction::new("Mead horn", confidences(&[("Mead horn", 0.9)]));
        assert!(!policy.is_false_negative(PredictionSource::Pretrained, &prediction));
        assert!(policy.allows_enrichment(PredictionSource::Pretrained, &prediction));
    }
}
