//! The chat engine: one explicitly constructed instance per process, shared
//! by `Arc` with every connection handler.
//!
//! All registry, queue and pairing mutations go through `Lobby` behind a
//! single mutex. The mutex is never held across an `.await`; moderation,
//! translation and account calls happen with it released.

use crate::accounts::{AccountDirectory, MemoryAccounts};
use crate::config::Config;
use crate::error::AuthError;
use crate::matchmaker::{Departure, Lobby, LobbyStats};
use crate::metrics::{MetricsReport, RelayMetrics};
use crate::moderation::{Classifier, ModerationGate, OpenAiModerator};
use crate::protocol::{InboundEvent, ServerFrame};
use crate::session::{ConnectionId, Identity, Profile};
use crate::translation::{TranslationAdapter, TranslationService};
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub moderation_timeout: Duration,
    pub translation_timeout: Duration,
    /// Moderation strikes before an anonymous session is closed
    pub ban_threshold: u32,
    pub allow_anonymous: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            moderation_timeout: Duration::from_secs(10),
            translation_timeout: Duration::from_secs(10),
            ban_threshold: 3,
            allow_anonymous: true,
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            moderation_timeout: config.moderation_timeout(),
            translation_timeout: config.translation_timeout(),
            ban_threshold: config.flag_ban_threshold,
            allow_anonymous: config.allow_anonymous,
        }
    }
}

/// A credential that passed authentication, not yet placed in the lobby.
#[derive(Debug, Clone)]
pub struct Admission {
    identity: Option<Identity>,
    profile: Profile,
}

impl Admission {
    pub fn label(&self) -> &str {
        self.identity
            .as_ref()
            .map(|i| i.email.as_str())
            .unwrap_or(crate::session::ANONYMOUS_LABEL)
    }
}

/// A joined connection: its id plus the receiving end of its outbox.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub outbox: mpsc::UnboundedReceiver<ServerFrame>,
}

pub struct ChatEngine {
    lobby: Mutex<Lobby>,
    pub(crate) gate: ModerationGate,
    pub(crate) translator: TranslationAdapter,
    pub(crate) accounts: Arc<dyn AccountDirectory>,
    pub(crate) metrics: Arc<RelayMetrics>,
    pub(crate) settings: EngineSettings,
}

impl ChatEngine {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        translation: Arc<dyn TranslationService>,
        accounts: Arc<dyn AccountDirectory>,
        settings: EngineSettings,
    ) -> Self {
        let metrics = Arc::new(RelayMetrics::new());

        Self {
            lobby: Mutex::new(Lobby::new()),
            gate: ModerationGate::new(classifier, settings.moderation_timeout, metrics.clone()),
            translator: TranslationAdapter::new(
                translation,
                settings.translation_timeout,
                metrics.clone(),
            ),
            accounts,
            metrics,
            settings,
        }
    }

    /// Wire up the OpenAI moderator, the configured translation backend and
    /// the in-memory account directory.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = reqwest::Client::new();

        let classifier: Arc<dyn Classifier> =
            Arc::new(OpenAiModerator::new(client.clone(), config));
        if config.openai_api_key.is_none() {
            warn!("OPENAI_API_KEY not set: moderation is disabled and every message passes");
        }

        let translation = TranslationAdapter::service_from_config(client, config)?;

        let accounts: Arc<dyn AccountDirectory> = match &config.accounts_file {
            Some(path) => Arc::new(
                MemoryAccounts::from_file(path, config.flag_ban_threshold)
                    .context(format!("Failed to load accounts from {}", path))?,
            ),
            None => {
                warn!("ACCOUNTS_FILE not set: no token will authenticate");
                Arc::new(MemoryAccounts::new(config.flag_ban_threshold))
            }
        };

        Ok(Self::new(
            classifier,
            translation,
            accounts,
            EngineSettings::from(config),
        ))
    }

    pub(crate) fn lobby(&self) -> MutexGuard<'_, Lobby> {
        self.lobby.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check a connect credential. On failure no session exists and the
    /// connection must be refused.
    pub async fn admit(&self, token: Option<&str>) -> Result<Admission, AuthError> {
        let result = self.authenticate(token).await;
        match &result {
            Ok(admission) => debug!("Admitted {}", admission.label()),
            Err(e) => {
                self.metrics.record_connection_refused();
                info!("Refusing connection: {}", e);
            }
        }
        result
    }

    async fn authenticate(&self, token: Option<&str>) -> Result<Admission, AuthError> {
        let token = token.map(str::trim).filter(|t| !t.is_empty());

        let Some(token) = token else {
            if !self.settings.allow_anonymous {
                return Err(AuthError::MissingCredential);
            }
            return Ok(Admission {
                identity: None,
                profile: Profile::default(),
            });
        };

        let identity = self.accounts.authenticate(token).await?;
        if self.accounts.is_banned(&identity).await {
            return Err(AuthError::Banned);
        }
        let profile = self.accounts.profile(&identity).await;

        Ok(Admission {
            identity: Some(identity),
            profile,
        })
    }

    /// Register an admitted connection and pair it or park it.
    pub fn join(&self, admission: Admission) -> Connection {
        let (tx, rx) = mpsc::unbounded_channel();
        let label = admission.label().to_string();

        let placement = self.lobby().connect(admission.identity, admission.profile, tx);

        self.metrics.record_connection_accepted();
        match placement.partner {
            Some(partner) => {
                self.metrics.record_pairing();
                info!("{} ({}) connected and paired with {}", placement.id, label, partner);
            }
            None => info!("{} ({}) connected and is waiting", placement.id, label),
        }

        Connection {
            id: placement.id,
            outbox: rx,
        }
    }

    /// `admit` followed by `join`.
    pub async fn connect(&self, token: Option<&str>) -> Result<Connection, AuthError> {
        let admission = self.admit(token).await?;
        Ok(self.join(admission))
    }

    /// Dispatch an event for a joined connection.
    pub async fn handle(&self, id: ConnectionId, event: InboundEvent) {
        match event {
            InboundEvent::TextMessage { message } => self.on_message(id, &message).await,
            InboundEvent::Disconnect { code } => {
                debug!("{} disconnected (code {:?})", id, code);
                self.disconnect(id);
            }
        }
    }

    /// Remove a connection, requeueing its partner if it had one. Safe to
    /// call more than once.
    pub fn disconnect(&self, id: ConnectionId) -> Option<Departure> {
        let departure = self.lobby().disconnect(id)?;

        if departure.requeued.is_some() {
            self.metrics.record_requeue();
        }
        info!("{} terminated (was {:?})", id, departure.previous);
        Some(departure)
    }

    pub fn stats(&self) -> LobbyStats {
        self.lobby().stats()
    }

    pub fn metrics(&self) -> MetricsReport {
        self.metrics.report()
    }

    /// Waiting connections, oldest first.
    pub fn waiting(&self) -> Vec<ConnectionId> {
        self.lobby().waiting()
    }

    pub fn partner_of(&self, id: ConnectionId) -> Option<ConnectionId> {
        self.lobby().partner_of(id)
    }

    /// See `Lobby::is_consistent`.
    pub fn is_consistent(&self) -> bool {
        self.lobby().is_consistent()
    }
}
