//! Tallybot - Telegram bot front end for a spreadsheet-backed financial ledger
//!
//! This library provides the bot lifecycle and conversation orchestration
//! layer: one live session per process, idempotent webhook registration,
//! a per-user conversation state machine with cancellation and timeout,
//! and destination routing for uploaded receipts.
//!
//! # Module Structure
//!
//! - `core`: Configuration, errors, and logging
//! - `ledger`: Ledger/attachment collaborator contracts and destination routing
//! - `telegram`: Session management, dispatch, conversations, HTTP surface
//! - `testing`: Doubles for the transport and collaborator seams

pub mod cli;
pub mod core;
pub mod ledger;
pub mod telegram;
pub mod testing;

// Re-export commonly used types for convenience
pub use self::core::{config, AppError, AppResult};
pub use ledger::{DestinationRoute, DriveGateway, FolderConfig, LedgerGateway};
pub use telegram::{
    create_bot, BotSession, ConversationEngine, ConversationStore, InboundUpdate, RunMode, TelegramMessenger,
    TelegramWebhookApi, UpdateDispatcher,
};
