//! Beverage enrichment
//!
//! Turns an accepted classification into plain-language details. Without an
//! API key the service stays offline and returns a placeholder instead of
//! calling out.

use bevid_common::config::EnrichmentConfig;
use bevid_common::policy::PredictionSource;
use std::time::Duration;
use tracing::info;

use super::enrichment_client::{EnrichmentClient, EnrichmentClientConfig, EnrichmentError};
use crate::html::percent;

/// Enrichment result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrichment {
    /// No endpoint configured
    Offline,
    /// Text generated by `model`
    Generated { model: String, text: String },
}

/// Enrichment service
pub enum Enricher {
    Remote(EnrichmentClient),
    Offline,
}

impl Enricher {
    /// Build from configuration; a missing API key yields the offline service
    pub fn from_config(
        config: &EnrichmentConfig,
        api_key: Option<String>,
    ) -> Result<Self, EnrichmentError> {
        let Some(api_key) = api_key else {
            info!("No enrichment API key configured, enrichment runs offline");
            return Ok(Enricher::Offline);
        };

        let client = EnrichmentClient::new(EnrichmentClientConfig {
            endpoint: config.endpoint.clone(),
            models: config.models.clone(),
            api_key,
            api_version: config.api_version.clone(),
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        })?;

        info!(
            "Enrichment enabled: {} ({} models)",
            client.endpoint(),
            client.models().len()
        );
        Ok(Enricher::Remote(client))
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Enricher::Offline)
    }

    /// Fetch details for an accepted classification
    pub async fn enrich(
        &self,
        label: &str,
        confidence: f64,
        source: PredictionSource,
    ) -> Result<Enrichment, EnrichmentError> {
        match self {
            Enricher::Offline => Ok(Enrichment::Offline),
            Enricher::Remote(client) => {
                tracing::debug!(label = %label, source = source.as_str(), "Requesting enrichment");
                let completion = client.complete(&build_prompt(label, confidence)).await?;
                Ok(Enrichment::Generated {
                    model: completion.model,
                    text: completion.text,
                })
            }
        }
    }
}

/// Prompt asking for simple-English details about a classified beverage
pub fn build_prompt(label: &str, confidence: f64) -> String {
    format!(
        "You are helping a non-native speaker identify an alcoholic beverage they photographed.\n\
         The image classifier identified this as: {}\n\
         Classifier confidence: {}%\n\n\
         Please provide in plain, simple English (suitable for someone with limited language skills):\n\
         1. What type of alcohol this is (category and subcategory)\n\
         2. Typical alcohol content (ABV range or proof)\n\
         3. Where it originates from\n\
         4. What foods it pairs well with\n\
         5. One brief safety note about alcohol consumption\n\n\
         Keep each point to 1-2 sentences. Use simple vocabulary.",
        label,
        percent(confidence)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_mentions_label_and_percentage() {
        let prompt = build_prompt("Red Wine", 0.734);
        assert!(prompt.contains("identified this as: Red Wine"));
        assert!(prompt.contains("Classifier confidence: 73%"));
        assert!(prompt.contains("ABV"));
    }

    #[test]
    fn test_missing_key_is_offline() {
        let enricher = Enricher::from_config(&EnrichmentConfig::default(), None).unwrap();
        assert!(enricher.is_offline());
    }

    #[test]
    fn test_empty_model_list_with_key_fails() {
        let config = EnrichmentConfig {
            models: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(
            Enricher::from_config(&config, Some("key".to_string())),
            Err(EnrichmentError::NoModels)
        ));
    }

    #[tokio::test]
    async fn test_offline_enrich_returns_placeholder() {
        let enrichment = Enricher::Offline
            .enrich("Beer", 0.9, PredictionSource::Knn)
            .await
            .unwrap();
        assert_eq!(enrichment, Enrichment::Offline);
    }
}
