use anyhow::{bail, Result};
use std::time::Duration;

/// Which external service backs the translation adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationBackend {
    /// Google's public `translate_a/single` endpoint
    Google,
    /// OpenAI chat completions
    OpenAi,
    /// No translation, every message is passed through
    None,
}

impl TranslationBackend {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAi),
            "none" | "off" => Ok(Self::None),
            other => bail!(
                "Unknown TRANSLATION_BACKEND '{}'. Expected google, openai or none",
                other
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub allow_anonymous: bool,

    // OpenAI (moderation and optional translation)
    pub openai_api_key: Option<String>,
    pub openai_moderation_url: String,
    pub openai_moderation_model: String,
    pub moderation_timeout_secs: u64,
    pub openai_api_url: String,
    pub openai_model: String,

    // Translation
    pub translation_backend: TranslationBackend,
    pub google_translate_url: String,
    pub translation_timeout_secs: u64,

    // Accounts
    pub flag_ban_threshold: u32,
    pub accounts_file: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: env_parse("PORT", 8080),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            allow_anonymous: env_parse("ALLOW_ANONYMOUS", true),

            // Missing key is not an error: moderation fails open
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            openai_moderation_url: std::env::var("OPENAI_MODERATION_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/moderations".to_string()),
            openai_moderation_model: std::env::var("OPENAI_MODERATION_MODEL")
                .unwrap_or_else(|_| "omni-moderation-latest".to_string()),
            moderation_timeout_secs: env_parse("MODERATION_TIMEOUT_SECS", 10),
            openai_api_url: std::env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string()),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),

            translation_backend: TranslationBackend::parse(
                &std::env::var("TRANSLATION_BACKEND").unwrap_or_else(|_| "google".to_string()),
            )?,
            google_translate_url: std::env::var("GOOGLE_TRANSLATE_URL").unwrap_or_else(|_| {
                "https://translate.googleapis.com/translate_a/single".to_string()
            }),
            translation_timeout_secs: env_parse("TRANSLATION_TIMEOUT_SECS", 10),

            flag_ban_threshold: env_parse::<u32>("FLAG_BAN_THRESHOLD", 3).max(1),
            accounts_file: std::env::var("ACCOUNTS_FILE").ok(),
        })
    }

    pub fn moderation_timeout(&self) -> Duration {
        Duration::from_secs(self.moderation_timeout_secs)
    }

    pub fn translation_timeout(&self) -> Duration {
        Duration::from_secs(self.translation_timeout_secs)
    }

    /// Whether a WebSocket upgrade from `origin` may proceed.
    ///
    /// An empty allow-list accepts every origin, including requests that
    /// carry no `Origin` header at all.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        match origin {
            Some(origin) => self
                .allowed_origins
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(origin.trim_end_matches('/'))),
            None => false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        port: 8080,
        allowed_origins: vec![],
        allow_anonymous: true,
        openai_api_key: Some("test-openai-key".to_string()),
        openai_moderation_url: "https://api.openai.com/v1/moderations".to_string(),
        openai_moderation_model: "omni-moderation-latest".to_string(),
        moderation_timeout_secs: 10,
        openai_api_url: "https://api.openai.com/v1/chat/completions".to_string(),
        openai_model: "gpt-4o-mini".to_string(),
        translation_backend: TranslationBackend::None,
        google_translate_url: "https://translate.googleapis.com/translate_a/single".to_string(),
        translation_timeout_secs: 10,
        flag_ban_threshold: 3,
        accounts_file: None,
    }
}
