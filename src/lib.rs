pub mod accounts;
pub mod config;
pub mod engine;
pub mod error;
pub mod i18n;
pub mod matchmaker;
pub mod metrics;
pub mod moderation;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod session;
pub mod translation;
