//! Services used by the wizard handlers

pub mod enrichment;
pub mod enrichment_client;

pub use enrichment::{build_prompt, Enricher, Enrichment};
pub use enrichment_client::{
    AttemptFailure, Completion, EnrichmentClient, EnrichmentClientConfig, EnrichmentError,
    FailedAttempt,
};
