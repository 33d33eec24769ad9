//! Outbound messaging transport
//!
//! [`Messenger`] is transport-agnostic; [`TelegramMessenger`] implements it
//! via teloxide. Handlers talk to the trait so conversations can be driven
//! in tests without a Telegram connection.

use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{CallbackQueryId, FileId, InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};

use crate::core::error::AppResult;

/// One row of inline keyboard buttons: (label, callback data) pairs.
pub type ButtonRow = Vec<(String, String)>;

/// Abstraction over the chat transport used by handlers.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Sends a plain text message.
    async fn send_text(&self, chat_id: i64, text: &str) -> AppResult<()>;
    /// Sends an HTML-formatted message.
    async fn send_html(&self, chat_id: i64, text: &str) -> AppResult<()>;
    /// Sends an HTML message with an inline keyboard.
    async fn send_menu(&self, chat_id: i64, text: &str, rows: Vec<ButtonRow>) -> AppResult<()>;
    /// Acknowledges a callback query so the client stops its spinner.
    async fn answer_callback(&self, callback_id: &str) -> AppResult<()>;
    /// Downloads a file from the provider into memory.
    async fn download_file(&self, file_id: &str) -> AppResult<Vec<u8>>;
}

/// Teloxide-based implementation of [`Messenger`].
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn keyboard_from_rows(rows: Vec<ButtonRow>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(
        rows.into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(label, data)| InlineKeyboardButton::callback(label, data))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>(),
    )
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> AppResult<()> {
        self.bot.send_message(ChatId(chat_id), text).await?;
        Ok(())
    }

    async fn send_html(&self, chat_id: i64, text: &str) -> AppResult<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    async fn send_menu(&self, chat_id: i64, text: &str, rows: Vec<ButtonRow>) -> AppResult<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard_from_rows(rows))
            .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> AppResult<()> {
        self.bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()))
            .await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> AppResult<Vec<u8>> {
        let file = self.bot.get_file(FileId(file_id.to_string())).await?;
        let mut buffer: Vec<u8> = Vec::new();
        self.bot.download_file(&file.path, &mut buffer).await?;
        log::info!("Downloaded file {} ({} bytes)", file_id, buffer.len());
        Ok(buffer)
    }
}
