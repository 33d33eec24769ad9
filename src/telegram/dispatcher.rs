//! Inbound update dispatch
//!
//! One dispatcher instance receives every inbound update, whichever
//! deployment mode delivered it. It authenticates webhook deliveries,
//! guarantees the session is initialized before any handler runs, routes by
//! payload kind, and wraps handler failures so a broken turn never takes
//! the session down.

use std::sync::Arc;

use thiserror::Error;

use crate::telegram::handlers::ConversationEngine;
use crate::telegram::session::BotSession;
use crate::telegram::update::{InboundUpdate, UpdatePayload};

/// Dispatch outcome for deliveries that were accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// The update was routed to a handler
    Handled,
    /// The update carried nothing this bot acts on
    Ignored,
}

/// Errors surfaced to the delivery layer (HTTP status selection).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("webhook token mismatch")]
    Unauthorized,
    #[error("bot session failed to initialize")]
    SessionUnavailable,
}

/// Routes inbound updates through the conversation engine.
pub struct UpdateDispatcher {
    secret: String,
    session: Arc<BotSession>,
    engine: Arc<ConversationEngine>,
}

/// First characters of a secret, for audit logs. Never log the full value.
fn truncate_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(6).collect();
    format!("{}…", visible)
}

impl UpdateDispatcher {
    pub fn new(secret: String, session: Arc<BotSession>, engine: Arc<ConversationEngine>) -> Self {
        Self {
            secret,
            session,
            engine,
        }
    }

    /// Handles one inbound update.
    ///
    /// `token` is the authenticity token the delivery carried (the path
    /// segment for webhook deliveries; the polling loop passes the
    /// configured secret through). A mismatch rejects the update before any
    /// state is touched.
    pub async fn handle(&self, token: &str, update: InboundUpdate) -> Result<Ack, DispatchError> {
        if token != self.secret {
            log::warn!(
                "Rejected update {}: token mismatch (got '{}')",
                update.update_id,
                truncate_secret(token)
            );
            return Err(DispatchError::Unauthorized);
        }

        // No handler runs before the session is initialized; a duplicate
        // concurrent initialization collapses inside the session manager
        if !self.session.ensure_started().await {
            log::error!("Dropping update {}: session failed to initialize", update.update_id);
            return Err(DispatchError::SessionUnavailable);
        }

        log::info!(
            "Dispatching update {} from user {} ({})",
            update.update_id,
            update.user_id,
            payload_kind(&update.payload)
        );

        let outcome = match &update.payload {
            UpdatePayload::Command { name, args } => self.engine.handle_command(&update, name, args).await,
            UpdatePayload::Text(text) => self.engine.handle_text(&update, text).await,
            UpdatePayload::Photo { file_id } => self.engine.handle_photo(&update, file_id).await,
            UpdatePayload::CallbackQuery { id, data } => self.engine.handle_callback(&update, id, data).await,
        };

        if let Err(e) = outcome {
            // A handler failure is recovered here: log with context, tell
            // the user something short, keep the session alive
            log::error!(
                "Handler failed for update {} (user {}, {}): {}",
                update.update_id,
                update.user_id,
                payload_kind(&update.payload),
                e
            );
            self.engine.send_failure_notice(update.chat_id).await;
        }

        Ok(Ack::Handled)
    }
}

fn payload_kind(payload: &UpdatePayload) -> &'static str {
    match payload {
        UpdatePayload::Command { .. } => "command",
        UpdatePayload::Text(_) => "text",
        UpdatePayload::Photo { .. } => "photo",
        UpdatePayload::CallbackQuery { .. } => "callback",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::ledger::routing::FolderConfig;
    use crate::ledger::store::LedgerStore;
    use crate::ledger::uploads::AttachmentStore;
    use crate::telegram::conversation::ConversationStore;
    use crate::telegram::session::{RunMode, WebhookApi};
    use crate::telegram::transport::Messenger;
    use crate::testing::{CountingWebhookApi, MockAttachments, MockLedger, RecordingMessenger};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct Harness {
        dispatcher: UpdateDispatcher,
        messenger: Arc<RecordingMessenger>,
        api: Arc<CountingWebhookApi>,
    }

    fn harness() -> Harness {
        let store = Arc::new(ConversationStore::new(Duration::from_secs(60)));
        let messenger = Arc::new(RecordingMessenger::default());
        let engine = Arc::new(ConversationEngine::new(
            store,
            Arc::new(MockLedger::default()) as Arc<dyn LedgerStore>,
            Arc::new(MockAttachments::default()) as Arc<dyn AttachmentStore>,
            FolderConfig::default(),
            Arc::clone(&messenger) as Arc<dyn Messenger>,
        ));
        let api = Arc::new(CountingWebhookApi::default());
        let session = Arc::new(BotSession::new(
            Arc::clone(&api) as Arc<dyn WebhookApi>,
            RunMode::Webhook,
            Some("https://bot.test".to_string()),
            "right".to_string(),
        ));
        Harness {
            dispatcher: UpdateDispatcher::new("right".to_string(), session, engine),
            messenger,
            api,
        }
    }

    fn command_update(name: &str) -> InboundUpdate {
        InboundUpdate {
            update_id: 99,
            user_id: 7,
            chat_id: 7,
            payload: UpdatePayload::Command {
                name: name.to_string(),
                args: vec![],
            },
        }
    }

    #[tokio::test]
    async fn wrong_token_is_rejected_before_any_handler_runs() {
        let h = harness();
        let result = h.dispatcher.handle("wrong", command_update("start")).await;

        assert_eq!(result, Err(DispatchError::Unauthorized));
        // No handler ran: nothing was sent, no session was initialized
        assert!(h.messenger.all_to(7).is_empty());
        assert_eq!(h.api.registrations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_update_initializes_session_then_routes() {
        let h = harness();
        let result = h.dispatcher.handle("right", command_update("start")).await;

        assert_eq!(result, Ok(Ack::Handled));
        assert_eq!(h.api.registrations.load(Ordering::SeqCst), 1);
        assert!(!h.messenger.all_to(7).is_empty());

        // A second update does not re-initialize
        h.dispatcher.handle("right", command_update("help")).await.unwrap();
        assert_eq!(h.api.registrations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn session_init_failure_drops_the_update() {
        let h = harness();
        h.api.fail_register.store(true, Ordering::SeqCst);

        let result = h.dispatcher.handle("right", command_update("start")).await;
        assert_eq!(result, Err(DispatchError::SessionUnavailable));
        assert!(h.messenger.all_to(7).is_empty());
    }

    #[tokio::test]
    async fn handler_failure_becomes_a_user_notice_not_an_error() {
        let h = harness();
        h.messenger.set_fail_next_sends(1);

        let result = h.dispatcher.handle("right", command_update("help")).await;
        // The dispatcher recovers: the delivery is acknowledged
        assert_eq!(result, Ok(Ack::Handled));
        // The degraded notice went out after the failed send
        assert!(h.messenger.all_to(7).last().unwrap().contains("Something went wrong"));
    }

    #[test]
    fn truncate_secret_keeps_a_short_prefix() {
        assert_eq!(truncate_secret("1234567890"), "123456…");
        assert_eq!(truncate_secret("ab"), "ab…");
    }
}
