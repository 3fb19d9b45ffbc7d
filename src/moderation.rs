//! Moderation gate.
//!
//! `Classifier` is the raw call and reports every failure as an error.
//! `ModerationGate` bounds the call with a timeout and applies the fail-open
//! policy in one place: any error or timeout is logged and treated as
//! `Verdict::Clean`, so a classifier outage never blocks chat.

use crate::config::Config;
use crate::error::ModerationError;
use crate::metrics::RelayMetrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Flagged,
    Clean,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Verdict, ModerationError>;
}

/// OpenAI moderation request body
#[derive(Debug, Serialize)]
struct ModerationRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    #[serde(default)]
    flagged: bool,
}

/// Classifier backed by OpenAI's `/v1/moderations` endpoint.
pub struct OpenAiModerator {
    client: reqwest::Client,
    api_key: Option<String>,
    url: String,
    model: String,
    timeout: Duration,
}

impl OpenAiModerator {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            api_key: config.openai_api_key.clone(),
            url: config.openai_moderation_url.clone(),
            model: config.openai_moderation_model.clone(),
            timeout: config.moderation_timeout(),
        }
    }
}

#[async_trait]
impl Classifier for OpenAiModerator {
    async fn classify(&self, text: &str) -> Result<Verdict, ModerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ModerationError::NotConfigured)?;

        let request = ModerationRequest {
            model: &self.model,
            input: text,
        };

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModerationError::Timeout
                } else {
                    ModerationError::Transport(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModerationError::Status { status, body });
        }

        let parsed: ModerationResponse = response.json().await?;
        let first = parsed
            .results
            .first()
            .ok_or(ModerationError::EmptyResponse)?;

        Ok(if first.flagged {
            Verdict::Flagged
        } else {
            Verdict::Clean
        })
    }
}

pub struct ModerationGate {
    classifier: Arc<dyn Classifier>,
    timeout: Duration,
    metrics: Arc<RelayMetrics>,
}

impl ModerationGate {
    pub fn new(classifier: Arc<dyn Classifier>, timeout: Duration, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            classifier,
            timeout,
            metrics,
        }
    }

    /// Classify `text`, failing open.
    pub async fn classify(&self, text: &str) -> Verdict {
        self.metrics.record_moderation_call();

        match tokio::time::timeout(self.timeout, self.classifier.classify(text)).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(ModerationError::NotConfigured)) => {
                debug!("Moderation skipped: no credentials configured");
                Verdict::Clean
            }
            Ok(Err(e)) => {
                self.metrics.record_moderation_failure();
                warn!("Moderation failed, allowing message: {}", e);
                Verdict::Clean
            }
            Err(_) => {
                self.metrics.record_moderation_failure();
                warn!(
                    "Moderation timed out after {:?}, allowing message",
                    self.timeout
                );
                Verdict::Clean
            }
        }
    }
}
