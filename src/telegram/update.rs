//! Inbound update envelope
//!
//! One immutable envelope per provider update, constructed from the wire
//! payload and consumed exactly once by the dispatcher. Keeping the envelope
//! independent of the provider types keeps the conversation layer testable
//! without a Telegram connection.

use teloxide::types::{Update, UpdateKind};

/// Payload kinds the dispatcher routes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePayload {
    /// A slash command with its arguments, e.g. `/add_expense 2026-08-01 ...`
    Command { name: String, args: Vec<String> },
    Text(String),
    Photo { file_id: String },
    CallbackQuery { id: String, data: String },
}

/// One inbound event from the messaging provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub user_id: i64,
    pub chat_id: i64,
    pub payload: UpdatePayload,
}

/// Splits command text like `/add_expense@tallybot 2026-08-01 50` into the
/// command name (lowercased, bot mention stripped) and its arguments.
fn parse_command(text: &str) -> Option<(String, Vec<String>)> {
    let stripped = text.strip_prefix('/')?;
    let mut parts = stripped.split_whitespace();
    let raw_name = parts.next()?;
    let name = raw_name.split('@').next().unwrap_or(raw_name).to_lowercase();
    if name.is_empty() {
        return None;
    }
    let args = parts.map(|s| s.to_string()).collect();
    Some((name, args))
}

impl InboundUpdate {
    /// Builds an envelope from a provider update.
    ///
    /// Returns `None` for update kinds this bot does not handle (edits,
    /// member changes, etc.); the caller acknowledges and drops those.
    pub fn from_telegram(update: &Update) -> Option<Self> {
        let update_id = i64::from(update.id.0);

        match &update.kind {
            UpdateKind::Message(msg) => {
                let user = msg.from.as_ref()?;
                let user_id = i64::try_from(user.id.0).ok()?;
                let chat_id = msg.chat.id.0;

                let payload = if let Some(photos) = msg.photo() {
                    // Telegram sends multiple sizes; the last one is the largest
                    let photo = photos.last()?;
                    UpdatePayload::Photo {
                        file_id: photo.file.id.0.clone(),
                    }
                } else {
                    let text = msg.text()?;
                    match parse_command(text) {
                        Some((name, args)) => UpdatePayload::Command { name, args },
                        None => UpdatePayload::Text(text.to_string()),
                    }
                };

                Some(Self {
                    update_id,
                    user_id,
                    chat_id,
                    payload,
                })
            }
            UpdateKind::CallbackQuery(q) => {
                let user_id = i64::try_from(q.from.id.0).ok()?;
                // Button presses on expired messages carry no chat; private
                // chat ids equal the user id, which is where our menus live
                let chat_id = q.message.as_ref().map(|m| m.chat().id.0).unwrap_or(user_id);
                let data = q.data.clone()?;

                Some(Self {
                    update_id,
                    user_id,
                    chat_id,
                    payload: UpdatePayload::CallbackQuery {
                        id: q.id.0.clone(),
                        data,
                    },
                })
            }
            _ => None,
        }
    }
}
