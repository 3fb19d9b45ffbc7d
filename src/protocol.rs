//! JSON payloads exchanged over the chat socket.
//!
//! Inbound frames are `{"message": "..."}`. Outbound frames are one of:
//! - `{"status": "waiting" | "paired", "message"?: "..."}`
//! - `{"author": "<label>", "message": "...", "avatar": "..."}`
//! - `{"author": "System", "message": "..."}`

use serde::{Deserialize, Serialize};

pub const SYSTEM_AUTHOR: &str = "System";

/// Close code sent when a session is terminated for policy violations.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

pub const SEARCHING_MESSAGE: &str = "Searching for a chat partner...";
pub const FLAG_WARNING: &str = "The text you have submitted has been flagged as inappropriate. \
Your account has been flagged for inappropriate behavior. \
Incurring three flags will result in an account ban.";
pub const BANNED_NOTICE: &str = "Your account has been banned.";
pub const STRIKES_EXHAUSTED_NOTICE: &str =
    "You have been disconnected for repeatedly sending inappropriate content.";

pub fn entered_notice(label: &str) -> String {
    format!("{} has entered the chat.", label)
}

pub fn chatting_with_notice(label: &str) -> String {
    format!("You are now chatting with {}.", label)
}

pub fn left_notice(label: &str) -> String {
    format!("{} has left the chat.", label)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Waiting,
    Paired,
}

/// A payload delivered to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Status {
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Chat {
        author: String,
        message: String,
        avatar: Option<String>,
    },
    System {
        author: &'static str,
        message: String,
    },
}

impl Outbound {
    pub fn system(message: impl Into<String>) -> Self {
        Outbound::System {
            author: SYSTEM_AUTHOR,
            message: message.into(),
        }
    }
}

/// What the socket writer task receives on a connection's outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    Event(Outbound),
    Close { code: u16, reason: String },
}

impl ServerFrame {
    pub fn waiting() -> Self {
        ServerFrame::Event(Outbound::Status {
            status: Status::Waiting,
            message: Some(SEARCHING_MESSAGE.to_string()),
        })
    }

    pub fn paired() -> Self {
        ServerFrame::Event(Outbound::Status {
            status: Status::Paired,
            message: None,
        })
    }

    pub fn system(message: impl Into<String>) -> Self {
        ServerFrame::Event(Outbound::system(message))
    }

    pub fn chat(author: &str, message: String, avatar: Option<String>) -> Self {
        ServerFrame::Event(Outbound::Chat {
            author: author.to_string(),
            message,
            avatar,
        })
    }

    pub fn policy_close(reason: &str) -> Self {
        ServerFrame::Close {
            code: CLOSE_POLICY_VIOLATION,
            reason: reason.to_string(),
        }
    }
}

/// Client text frame.
#[derive(Debug, Clone, Deserialize)]
pub struct TextMessage {
    #[serde(default)]
    pub message: String,
}

/// Events the engine reacts to for an already-joined connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    TextMessage { message: String },
    Disconnect { code: Option<u16> },
}
