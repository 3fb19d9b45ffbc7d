//! Message relay: moderation, per-reader translation, delivery.

use crate::accounts::FlagOutcome;
use crate::engine::ChatEngine;
use crate::matchmaker::Route;
use crate::moderation::Verdict;
use crate::protocol::{self, ServerFrame};
use crate::session::ConnectionId;
use tracing::{debug, info, warn};

impl ChatEngine {
    /// Relay one inbound text from `sender`.
    ///
    /// Unpaired senders are ignored. Flagged text is never delivered; it
    /// triggers the warning/ban escalation instead. Clean text is translated
    /// once for each side and echoed to the sender as well as sent to the
    /// partner. Both deliveries are best effort.
    pub async fn on_message(&self, sender: ConnectionId, raw: &str) {
        let route = self.lobby().route(sender);
        let Some(route) = route else {
            self.metrics.record_message_dropped_unpaired();
            debug!("Dropping message from unpaired {}", sender);
            return;
        };

        if self.gate.classify(raw).await == Verdict::Flagged {
            self.metrics.record_message_flagged();
            self.escalate(&route).await;
            return;
        }

        let (to_sender, to_partner) = tokio::join!(
            self.translator.translate(raw, &route.sender_language),
            self.translator.translate(raw, &route.partner_language),
        );

        let mut lobby = self.lobby();
        lobby.deliver(
            sender,
            ServerFrame::chat(&route.label, to_sender, route.avatar.clone()),
        );

        // The partner may have left or been re-paired while we were translating
        if lobby.partner_of(sender) == Some(route.partner) {
            lobby.deliver(
                route.partner,
                ServerFrame::chat(&route.label, to_partner, route.avatar.clone()),
            );
            self.metrics.record_message_relayed();
        } else {
            debug!(
                "Partner {} of {} is gone, message not delivered",
                route.partner, sender
            );
        }
    }

    async fn escalate(&self, route: &Route) {
        let sender = route.sender;

        let Some(identity) = &route.identity else {
            let strikes = self.lobby().record_strike(sender);
            match strikes {
                Some(n) if n >= self.settings.ban_threshold => {
                    info!("Closing anonymous {} after {} strikes", sender, n);
                    self.force_close(sender, protocol::STRIKES_EXHAUSTED_NOTICE);
                }
                _ => self.warn_sender(sender),
            }
            return;
        };

        match self.accounts.increment_flag(identity).await {
            Ok(FlagOutcome {
                banned_now: true,
                count,
            }) => {
                self.metrics.record_ban();
                info!("Banning {} after {} flags", identity.email, count);
                self.force_close(sender, protocol::BANNED_NOTICE);
            }
            Ok(FlagOutcome { count, .. }) => {
                debug!("{} flagged ({} so far)", identity.email, count);
                self.warn_sender(sender);
            }
            Err(e) => {
                warn!("Failed to record flag for {}: {}", identity.email, e);
                self.warn_sender(sender);
            }
        }
    }

    fn warn_sender(&self, sender: ConnectionId) {
        self.lobby()
            .deliver(sender, ServerFrame::system(protocol::FLAG_WARNING));
    }

    /// Final warning, closing notice, close frame, then teardown. The
    /// teardown requeues the partner like any other disconnect.
    fn force_close(&self, sender: ConnectionId, notice: &str) {
        let departure = {
            let mut lobby = self.lobby();
            lobby.deliver(sender, ServerFrame::system(protocol::FLAG_WARNING));
            lobby.deliver(sender, ServerFrame::system(notice));
            lobby.deliver(sender, ServerFrame::policy_close(notice));
            lobby.disconnect(sender)
        };

        if departure.and_then(|d| d.requeued).is_some() {
            self.metrics.record_requeue();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{AccountSeed, MemoryAccounts};
    use crate::engine::{Connection, EngineSettings};
    use crate::error::{ModerationError, TranslationError};
    use crate::i18n::Language;
    use crate::moderation::Classifier;
    use crate::protocol::{Outbound, Status};
    use crate::translation::TranslationService;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Flags any text containing "badword".
    struct KeywordClassifier;

    #[async_trait]
    impl Classifier for KeywordClassifier {
        async fn classify(&self, text: &str) -> Result<Verdict, ModerationError> {
            Ok(if text.contains("badword") {
                Verdict::Flagged
            } else {
                Verdict::Clean
            })
        }
    }

    /// Tags text with the target code, except English which passes unchanged.
    struct TaggingTranslator;

    #[async_trait]
    impl TranslationService for TaggingTranslator {
        async fn translate(&self, text: &str, target: Language) -> Result<String, TranslationError> {
            if target == Language::ENGLISH {
                Ok(text.to_string())
            } else {
                Ok(format!("{}:{}", target, text))
            }
        }
    }

    fn account(n: u32, language: &str) -> AccountSeed {
        AccountSeed {
            user_id: n.to_string(),
            email: format!("user{}@example.com", n),
            token: format!("token-{}", n),
            language: Some(language.to_string()),
            avatar_url: Some(format!("avatar-{}", n)),
            flags: 0,
        }
    }

    fn engine() -> ChatEngine {
        let accounts = MemoryAccounts::new(3);
        accounts.add_account(account(1, "en"));
        accounts.add_account(account(2, "es"));
        accounts.add_account(account(3, "fr"));

        ChatEngine::new(
            Arc::new(KeywordClassifier),
            Arc::new(TaggingTranslator),
            Arc::new(accounts),
            EngineSettings::default(),
        )
    }

    fn drain(conn: &mut Connection) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = conn.outbox.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn chats(frames: &[ServerFrame]) -> Vec<(String, String, Option<String>)> {
        frames
            .iter()
            .filter_map(|f| match f {
                ServerFrame::Event(Outbound::Chat {
                    author,
                    message,
                    avatar,
                }) => Some((author.clone(), message.clone(), avatar.clone())),
                _ => None,
            })
            .collect()
    }

    fn system_notices(frames: &[ServerFrame]) -> Vec<String> {
        frames
            .iter()
            .filter_map(|f| match f {
                ServerFrame::Event(Outbound::System { message, .. }) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    async fn paired_pair(engine: &ChatEngine) -> (Connection, Connection) {
        let mut a = engine.connect(Some("token-1")).await.unwrap();
        let mut b = engine.connect(Some("token-2")).await.unwrap();
        drain(&mut a);
        drain(&mut b);
        (a, b)
    }

    #[tokio::test]
    async fn test_message_translated_for_each_reader() {
        let engine = engine();
        let (mut a, mut b) = paired_pair(&engine).await;

        engine.on_message(a.id, "hello").await;

        assert_eq!(
            chats(&drain(&mut a)),
            vec![(
                "user1@example.com".to_string(),
                "hello".to_string(),
                Some("avatar-1".to_string())
            )]
        );
        assert_eq!(
            chats(&drain(&mut b)),
            vec![(
                "user1@example.com".to_string(),
                "es:hello".to_string(),
                Some("avatar-1".to_string())
            )]
        );
        assert_eq!(engine.metrics().messages_relayed, 1);
    }

    #[tokio::test]
    async fn test_unpaired_message_is_dropped() {
        let engine = engine();
        let mut a = engine.connect(Some("token-1")).await.unwrap();
        drain(&mut a);

        engine.on_message(a.id, "anyone there?").await;

        assert!(drain(&mut a).is_empty());
        assert_eq!(engine.metrics().messages_dropped_unpaired, 1);
    }

    #[tokio::test]
    async fn test_flagged_message_warns_sender_only() {
        let engine = engine();
        let (mut a, mut b) = paired_pair(&engine).await;

        engine.on_message(a.id, "badword").await;

        let frames_a = drain(&mut a);
        assert!(chats(&frames_a).is_empty());
        assert_eq!(system_notices(&frames_a), vec![protocol::FLAG_WARNING]);
        assert!(drain(&mut b).is_empty());
        assert_eq!(engine.partner_of(a.id), Some(b.id));
    }

    #[tokio::test]
    async fn test_third_flag_bans_and_closes() {
        let engine = engine();
        let (mut a, mut b) = paired_pair(&engine).await;

        engine.on_message(a.id, "badword 1").await;
        engine.on_message(a.id, "badword 2").await;
        let frames = drain(&mut a);
        assert_eq!(system_notices(&frames).len(), 2);
        assert!(!frames.iter().any(|f| matches!(f, ServerFrame::Close { .. })));

        engine.on_message(a.id, "badword 3").await;
        let frames = drain(&mut a);
        assert_eq!(
            system_notices(&frames),
            vec![protocol::FLAG_WARNING, protocol::BANNED_NOTICE]
        );
        assert!(matches!(
            frames.last(),
            Some(ServerFrame::Close { code: 1008, .. })
        ));

        // The partner goes back to waiting
        let frames_b = drain(&mut b);
        assert_eq!(
            system_notices(&frames_b),
            vec!["user1@example.com has left the chat."]
        );
        assert_eq!(engine.waiting(), vec![b.id]);
        assert_eq!(engine.metrics().bans, 1);

        // Banned accounts can no longer connect
        assert_eq!(
            engine.connect(Some("token-1")).await.unwrap_err(),
            crate::error::AuthError::Banned
        );
        assert!(engine.is_consistent());
    }

    #[tokio::test]
    async fn test_anonymous_strikes_close_session() {
        let engine = engine();
        let mut anon = engine.connect(None).await.unwrap();
        let mut b = engine.connect(Some("token-2")).await.unwrap();
        drain(&mut anon);
        drain(&mut b);

        engine.on_message(anon.id, "badword").await;
        engine.on_message(anon.id, "badword").await;
        assert_eq!(system_notices(&drain(&mut anon)).len(), 2);

        engine.on_message(anon.id, "badword").await;
        let frames = drain(&mut anon);
        assert_eq!(
            system_notices(&frames),
            vec![protocol::FLAG_WARNING, protocol::STRIKES_EXHAUSTED_NOTICE]
        );
        assert!(matches!(frames.last(), Some(ServerFrame::Close { .. })));
        assert_eq!(engine.metrics().bans, 0);
        assert_eq!(engine.waiting(), vec![b.id]);
    }

    #[tokio::test]
    async fn test_message_after_partner_left_is_not_delivered() {
        let engine = engine();
        let (mut a, b) = paired_pair(&engine).await;

        engine.disconnect(b.id);
        drain(&mut a);
        engine.on_message(a.id, "still there?").await;

        assert!(chats(&drain(&mut a)).is_empty());
    }

    #[tokio::test]
    async fn test_status_sequence_on_join() {
        let engine = engine();
        let mut a = engine.connect(Some("token-1")).await.unwrap();
        let frames = drain(&mut a);
        assert!(matches!(
            frames.as_slice(),
            [ServerFrame::Event(Outbound::Status {
                status: Status::Waiting,
                ..
            })]
        ));
    }
}
