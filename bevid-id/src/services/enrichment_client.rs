//! Enrichment API client
//!
//! Sends one prompt to a messages-style LLM endpoint, walking an ordered list
//! of model identifiers:
//! - 2xx: parse the reply and stop
//! - 404 / 429 / 503 (model missing, rate limited, overloaded): skip to the
//!   next model
//! - transport failure (connect, timeout): skip to the next model
//! - any other status: abort
//!
//! When every model is skipped the caller gets a combined failure listing
//! each attempt.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = "bevid/0.1.0";

/// Statuses after which the next model is tried
pub const SKIPPABLE_STATUSES: [StatusCode; 3] = [
    StatusCode::NOT_FOUND,
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::SERVICE_UNAVAILABLE,
];

/// Enrichment client errors
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("No enrichment models configured")]
    NoModels,

    #[error("API error {status} from {model}: {body}")]
    ApiError {
        model: String,
        status: u16,
        body: String,
    },

    #[error("Parse error from {model}: {reason}")]
    ParseError { model: String, reason: String },

    #[error("All enrichment models failed: {}", summarize(.0))]
    AllModelsFailed(Vec<FailedAttempt>),
}

fn summarize(attempts: &[FailedAttempt]) -> String {
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Why one model was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    Status(u16),
    Transport(String),
}

/// One skipped model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    pub model: String,
    pub failure: AttemptFailure,
}

impl fmt::Display for FailedAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            AttemptFailure::Status(code) => write!(f, "{} (HTTP {})", self.model, code),
            AttemptFailure::Transport(reason) => write!(f, "{} ({})", self.model, reason),
        }
    }
}

/// Successful completion
#[derive(Debug, Clone)]
pub struct Completion {
    /// Model that answered
    pub model: String,
    pub text: String,
    /// Models skipped before `model` answered
    pub skipped: Vec<FailedAttempt>,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Client settings
#[derive(Debug, Clone)]
pub struct EnrichmentClientConfig {
    pub endpoint: String,
    pub models: Vec<String>,
    pub api_key: String,
    pub api_version: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Enrichment API client
pub struct EnrichmentClient {
    http_client: reqwest::Client,
    config: EnrichmentClientConfig,
}

impl EnrichmentClient {
    /// # Errors
    /// `NoModels` for an empty model list; `NetworkError` if the HTTP client
    /// cannot be built
    pub fn new(config: EnrichmentClientConfig) -> Result<Self, EnrichmentError> {
        if config.models.is_empty() {
            return Err(EnrichmentError::NoModels);
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| EnrichmentError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn models(&self) -> &[String] {
        &self.config.models
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Run `prompt` through the model cascade
    pub async fn complete(&self, prompt: &str) -> Result<Completion, EnrichmentError> {
        let mut skipped = Vec::new();

        for model in &self.config.models {
            tracing::debug!(model = %model, endpoint = %self.config.endpoint, "Querying enrichment API");

            let body = MessagesRequest {
                model,
                max_tokens: self.config.max_tokens,
                messages: [Message {
                    role: "user",
                    content: prompt,
                }],
            };

            let response = match self
                .http_client
                .post(&self.config.endpoint)
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", &self.config.api_version)
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(model = %model, error = %e, "Enrichment request failed, trying next model");
                    skipped.push(FailedAttempt {
                        model: model.clone(),
                        failure: AttemptFailure::Transport(e.to_string()),
                    });
                    continue;
                }
            };

            let status = response.status();

            if SKIPPABLE_STATUSES.contains(&status) {
                tracing::warn!(model = %model, status = status.as_u16(), "Enrichment model unavailable, trying next model");
                skipped.push(FailedAttempt {
                    model: model.clone(),
                    failure: AttemptFailure::Status(status.as_u16()),
                });
                continue;
            }

            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                return Err(EnrichmentError::ApiError {
                    model: model.clone(),
                    status: status.as_u16(),
                    body: error_text,
                });
            }

            let parsed: MessagesResponse =
                response
                    .json()
                    .await
                    .map_err(|e| EnrichmentError::ParseError {
                        model: model.clone(),
                        reason: e.to_string(),
                    })?;

            let text = parsed
                .content
                .into_iter()
                .find_map(|block| block.text)
                .ok_or_else(|| EnrichmentError::ParseError {
                    model: model.clone(),
                    reason: "response has no text content".to_string(),
                })?;

            tracing::info!(
                model = %model,
                skipped = skipped.len(),
                "Retrieved enrichment"
            );

            return Ok(Completion {
                model: model.clone(),
                text,
                skipped,
            });
        }

        Err(EnrichmentError::AllModelsFailed(skipped))
    }
}
