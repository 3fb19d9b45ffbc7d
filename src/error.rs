//! Error taxonomy for the relay core.
//!
//! Only `AuthError` ever reaches a client as a refusal. Transport errors from
//! the moderation gate and the translation adapter are turned into their
//! fail-open defaults at the call site, and sends to a vanished connection are
//! dropped without an error value at all.

use crate::session::ConnectionId;
use thiserror::Error;

/// Credential problems on connect. No session is created.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("invalid credential")]
    InvalidCredential,
    #[error("account is banned")]
    Banned,
}

/// Failures talking to the content classifier.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("moderation credentials are not configured")]
    NotConfigured,
    #[error("moderation request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("moderation API error ({status}): {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("moderation response contained no results")]
    EmptyResponse,
    #[error("moderation request timed out")]
    Timeout,
}

/// Failures talking to the translation service.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translation request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("translation API error ({status}): {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("translation response could not be decoded: {0}")]
    Decode(String),
    #[error("translation request timed out")]
    Timeout,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(ConnectionId),
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("failed to read accounts file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse accounts file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown identity: {0}")]
    UnknownIdentity(String),
}
