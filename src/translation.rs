//! Translation adapter.
//!
//! A `TranslationService` performs the network call and reports failures as
//! errors. `TranslationAdapter` decides whether a call is needed at all
//! (empty or unsupported target codes pass through) and applies the
//! fail-open policy: any error or timeout returns the original text.

use crate::config::{Config, TranslationBackend};
use crate::error::TranslationError;
use crate::i18n::Language;
use crate::metrics::RelayMetrics;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait TranslationService: Send + Sync {
    async fn translate(&self, text: &str, target: Language) -> Result<String, TranslationError>;
}

/// Returns every message unchanged.
pub struct Passthrough;

#[async_trait]
impl TranslationService for Passthrough {
    async fn translate(&self, text: &str, _target: Language) -> Result<String, TranslationError> {
        Ok(text.to_string())
    }
}

// ==================== Google ====================

/// Google's keyless `translate_a/single` endpoint (`client=gtx`).
pub struct GoogleTranslator {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl GoogleTranslator {
    pub fn new(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }
}

/// Join the translated segments of a `translate_a/single` response.
///
/// The body is a nested array; element `[0]` holds one `[translated, source, ...]`
/// entry per sentence.
fn parse_google_response(body: &serde_json::Value) -> Result<String, TranslationError> {
    let segments = body
        .get(0)
        .and_then(|v| v.as_array())
        .ok_or_else(|| TranslationError::Decode("missing segment list".to_string()))?;

    let translated: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(|s| s.as_str()))
        .collect();

    if translated.is_empty() {
        return Err(TranslationError::Decode("no translated segments".to_string()));
    }
    Ok(translated)
}

#[async_trait]
impl TranslationService for GoogleTranslator {
    async fn translate(&self, text: &str, target: Language) -> Result<String, TranslationError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", target.google_code()),
                ("dt", "t"),
                ("q", text),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TranslationError::Status { status, body });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TranslationError::Decode(e.to_string()))?;

        parse_google_response(&body)
    }
}

// ==================== OpenAI ====================

/// OpenAI Chat Completion request for translation
#[derive(Debug, Serialize)]
struct TranslationRequest {
    model: String,
    messages: Vec<Message>,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<String>,
}

/// Check if a model is a reasoning model that doesn't support temperature
fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("gpt-5")
        || model.starts_with("o1")
        || model.starts_with("o3")
        || model.starts_with("o4")
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

fn build_translation_system_prompt(target_language: &str) -> String {
    format!(
        r#"You translate chat messages between strangers into {}.

Rules:
- Reply with the translation only, no quotes, notes or explanations
- If the message is already in {}, reply with it unchanged
- Keep emojis, URLs, @mentions and #hashtags as they are
- Keep the tone and register of the original (casual stays casual)"#,
        target_language, target_language
    )
}

pub struct OpenAiTranslator {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    timeout: Duration,
}

impl OpenAiTranslator {
    pub fn new(client: reqwest::Client, config: &Config) -> Result<Self> {
        let Some(api_key) = config.openai_api_key.clone() else {
            bail!("TRANSLATION_BACKEND=openai requires OPENAI_API_KEY");
        };

        Ok(Self {
            client,
            api_key,
            url: config.openai_api_url.clone(),
            model: config.openai_model.clone(),
            timeout: config.translation_timeout(),
        })
    }

    fn build_request(&self, text: &str, target: Language) -> TranslationRequest {
        let is_reasoning = is_reasoning_model(&self.model);

        TranslationRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: build_translation_system_prompt(target.name()),
                },
                Message {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            // Reasoning models spend tokens before answering
            max_completion_tokens: if is_reasoning { 4000 } else { 1000 },
            temperature: if is_reasoning { None } else { Some(0.3) },
            reasoning_effort: if is_reasoning {
                Some("low".to_string())
            } else {
                None
            },
        }
    }
}

#[async_trait]
impl TranslationService for OpenAiTranslator {
    async fn translate(&self, text: &str, target: Language) -> Result<String, TranslationError> {
        let request = self.build_request(text, target);

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(TranslationError::Status { status, body });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::Decode(e.to_string()))?;

        chat_response
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TranslationError::Decode("response contained no choices".to_string()))
    }
}

fn map_send_error(e: reqwest::Error) -> TranslationError {
    if e.is_timeout() {
        TranslationError::Timeout
    } else {
        TranslationError::Transport(e)
    }
}

// ==================== Adapter ====================

pub struct TranslationAdapter {
    service: Arc<dyn TranslationService>,
    timeout: Duration,
    metrics: Arc<RelayMetrics>,
}

impl TranslationAdapter {
    pub fn new(
        service: Arc<dyn TranslationService>,
        timeout: Duration,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            service,
            timeout,
            metrics,
        }
    }

    /// Build the service selected by `TRANSLATION_BACKEND`.
    pub fn service_from_config(
        client: reqwest::Client,
        config: &Config,
    ) -> Result<Arc<dyn TranslationService>> {
        Ok(match config.translation_backend {
            TranslationBackend::Google => Arc::new(GoogleTranslator::new(
                client,
                config.google_translate_url.clone(),
                config.translation_timeout(),
            )),
            TranslationBackend::OpenAi => Arc::new(OpenAiTranslator::new(client, config)?),
            TranslationBackend::None => Arc::new(Passthrough),
        })
    }

    /// Translate `text` into the language identified by `dest_code`.
    ///
    /// Returns `text` unchanged when the code is empty or unsupported, when
    /// the text is blank, and when the service fails or times out.
    pub async fn translate(&self, text: &str, dest_code: &str) -> String {
        let Ok(target) = Language::from_code(dest_code) else {
            debug!("No translation for language code '{}'", dest_code);
            return text.to_string();
        };

        if text.trim().is_empty() {
            return text.to_string();
        }

        self.metrics.record_translation_call();

        match tokio::time::timeout(self.timeout, self.service.translate(text, target)).await {
            Ok(Ok(translated)) => translated,
            Ok(Err(e)) => {
                self.metrics.record_translation_failure();
                warn!("Translation to {} failed, delivering original: {}", target, e);
                text.to_string()
            }
            Err(_) => {
                self.metrics.record_translation_failure();
                warn!(
                    "Translation to {} timed out after {:?}, delivering original",
                    target, self.timeout
                );
                text.to_string()
            }
        }
    }
}
