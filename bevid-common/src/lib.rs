//! # bevid Common Library
//!
//! Shared code for the beverage identifier including:
//! - Label vocabulary and alcohol keywords
//! - The tiered-confidence decision policy
//! - Write-through key-value persistence and the training dataset
//! - Configuration loading
//! - Wizard event types and the EventBus

pub mod config;
pub mod error;
pub mod events;
pub mod labels;
pub mod policy;
pub mod sse;
pub mod store;

pub use error::{Error, Result};
pub use policy::{ConfidenceTier, DecisionPolicy, Prediction, PredictionSource, Thresholds};
