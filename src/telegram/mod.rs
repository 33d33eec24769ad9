//! Telegram bot integration: session lifecycle, dispatch, conversations

pub mod bot;
pub mod conversation;
pub mod dispatcher;
pub mod handlers;
pub mod polling;
pub mod session;
pub mod transport;
pub mod update;
pub mod webhook;

// Re-exports for convenience
pub use bot::{create_bot, setup_bot_commands, Command};
pub use conversation::{spawn_timeout_sweeper, ConversationState, ConversationStore};
pub use dispatcher::{Ack, DispatchError, UpdateDispatcher};
pub use handlers::ConversationEngine;
pub use session::{BotSession, RunMode, SessionState, SessionStatus, TelegramWebhookApi, WebhookApi};
pub use transport::{Messenger, TelegramMessenger};
pub use update::{InboundUpdate, UpdatePayload};
pub use webhook::{create_router, run_server, WebState};
