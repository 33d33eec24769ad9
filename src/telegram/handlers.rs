//! Conversation turn handlers
//!
//! The engine owns the per-user state store and the external collaborators
//! (ledger, attachment store) and drives one conversation turn per inbound
//! payload. Everything here is transport-agnostic: replies go through the
//! [`Messenger`] trait so the whole flow runs in tests against recording
//! doubles.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};

use crate::core::error::AppResult;
use crate::ledger::routing::FolderConfig;
use crate::ledger::store::{ExpenseEntry, LedgerStore};
use crate::ledger::uploads::AttachmentStore;
use crate::telegram::bot::Command;
use crate::telegram::conversation::{ConversationState, ConversationStore};
use crate::telegram::transport::{ButtonRow, Messenger};
use crate::telegram::update::InboundUpdate;

const WELCOME_TEXT: &str = "\
🚀 <b>Ledger Assistant</b>

📋 <b>Quick start</b>
┣ 📊 /add_expense — record an expense
┣ 💰 /categories — expense categories
┣ ⚙️ /settings — create agents and suppliers
┗ 📈 /report — monthly summary

💡 /help for details | ❌ /cancel to abort";

const HELP_TEXT: &str = "\
📖 <b>Usage guide</b>

🔧 <b>Basic commands</b>
• /start — main menu
• /help — this message
• /cancel — cancel the current operation

📊 <b>Adding expenses</b> (/add_expense)
• Format: <code>/add_expense date category amount description [note]</code>
• Example: <code>/add_expense 2026-08-01 Purchasing 50 nails</code>
• You can attach a receipt photo after saving

💰 <b>Categories</b> (/categories)
• Lists every category the ledger accepts

⚙️ <b>Settings</b> (/settings)
• Create agents, suppliers, and persons

📈 <b>Reports</b> (/report)
• Shows the current month's totals

💡 <b>Tip: you can send a receipt photo right after recording an expense</b>";

const CATEGORIES_TEXT: &str = "\
📋 <b>Expense categories</b>

• 🛒 Purchasing — supplies and goods
• ⚡ Electricity Bill
• 🚰 Water Bill
• 📶 WiFi Bill
• 👷 Worker Salary
• 🧾 Other Bill: &lt;description&gt;

Use these names with <code>/add_expense</code>";

const CANCELLED_TEXT: &str = "✅ Operation cancelled. Use /start to begin again.";
const UNKNOWN_COMMAND_TEXT: &str = "🤔 Unknown command. Use /help to see what I can do.";
const FREE_TEXT_HINT: &str = "💡 Use /start for the menu or /help to see what I can do.";
const MENU_PROMPT: &str = "Please use the menu buttons, or /cancel to abort.";
const STALE_BUTTON_TEXT: &str = "This menu has expired. Use /start to open a fresh one.";
const RECEIPT_PROMPT: &str = "📎 Send a photo of the receipt to attach it, or reply \"skip\".";
const GENERIC_FAILURE_TEXT: &str = "⚠️ Something went wrong. Please try again.";

/// Words accepted as "no receipt" in the receipt-decision step
const SKIP_WORDS: &[&str] = &["skip", "no", "no receipt", "none"];

/// Drives the per-user conversation state machine.
pub struct ConversationEngine {
    store: Arc<ConversationStore>,
    ledger: Arc<dyn LedgerStore>,
    attachments: Arc<dyn AttachmentStore>,
    folders: FolderConfig,
    messenger: Arc<dyn Messenger>,
}

/// Parses /add_expense arguments into an entry, or a user-facing validation
/// message. Dates are `YYYY-MM-DD`; amounts must be positive numbers.
fn parse_expense_args(args: &[String]) -> Result<ExpenseEntry, String> {
    if args.len() < 4 {
        return Err(
            "⚠️ <b>Missing arguments</b>\n\nFormat:\n<code>/add_expense date category amount description [note]</code>\n\
             Example: <code>/add_expense 2026-08-01 Purchasing 50 nails</code>"
                .to_string(),
        );
    }

    let date = args[0].clone();
    if NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_err() {
        return Err("⚠️ Date must be in YYYY-MM-DD format".to_string());
    }

    let category = args[1].clone();
    let amount: f64 = args[2]
        .parse()
        .map_err(|_| "⚠️ Amount must be a positive number".to_string())?;
    if amount <= 0.0 || !amount.is_finite() {
        return Err("⚠️ Amount must be a positive number".to_string());
    }

    Ok(ExpenseEntry {
        date,
        category,
        amount,
        description: args[3].clone(),
        note: args[4..].join(" "),
        receipt_url: None,
    })
}

fn main_menu_rows() -> Vec<ButtonRow> {
    vec![
        vec![("📇 Create Agent".to_string(), "settings:agent".to_string())],
        vec![("🏭 Create Supplier".to_string(), "settings:supplier".to_string())],
        vec![("🧑 Create Person".to_string(), "settings:person".to_string())],
        vec![("❓ Help".to_string(), "menu:help".to_string())],
    ]
}

impl ConversationEngine {
    pub fn new(
        store: Arc<ConversationStore>,
        ledger: Arc<dyn LedgerStore>,
        attachments: Arc<dyn AttachmentStore>,
        folders: FolderConfig,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            store,
            ledger,
            attachments,
            folders,
            messenger,
        }
    }

    /// Handles a slash command.
    pub async fn handle_command(&self, update: &InboundUpdate, name: &str, args: &[String]) -> AppResult<()> {
        let chat_id = update.chat_id;
        let Some(command) = Command::from_name(name) else {
            log::info!("Unknown command /{} from user {}", name, update.user_id);
            return self.messenger.send_text(chat_id, UNKNOWN_COMMAND_TEXT).await;
        };

        log::info!("Received /{} from user {}", name, update.user_id);

        match command {
            Command::Start | Command::Settings => {
                let conv = self.store.entry(update.user_id, chat_id).await;
                let mut guard = conv.lock().await;
                // Entering the menu always discards any half-finished flow
                guard.reset();
                guard.state = ConversationState::MainMenu;
                guard.touch();
                drop(guard);
                self.messenger.send_menu(chat_id, WELCOME_TEXT, main_menu_rows()).await
            }
            Command::Help => self.messenger.send_html(chat_id, HELP_TEXT).await,
            Command::Categories => self.messenger.send_html(chat_id, CATEGORIES_TEXT).await,
            Command::Cancel => {
                let conv = self.store.entry(update.user_id, chat_id).await;
                let mut guard = conv.lock().await;
                guard.reset();
                guard.touch();
                drop(guard);
                self.messenger.send_text(chat_id, CANCELLED_TEXT).await
            }
            Command::Report => self.handle_report(chat_id).await,
            Command::AddExpense => self.handle_add_expense(update, args).await,
        }
    }

    async fn handle_report(&self, chat_id: i64) -> AppResult<()> {
        if !self.ledger.is_available() {
            return self
                .messenger
                .send_html(chat_id, "📈 Reports are not available: the ledger store is not configured.")
                .await;
        }

        let now = Utc::now();
        match self.ledger.monthly_totals(now.year(), now.month()).await {
            Some(totals) => {
                let text = format!(
                    "📈 <b>Summary for {}-{:02}</b>\n\n\
                     💵 Sales: <code>{:.2}</code>\n\
                     💸 Expenses: <code>{:.2}</code>\n\
                     🧮 Net: <code>{:.2}</code>",
                    now.year(),
                    now.month(),
                    totals.total_sales,
                    totals.total_expenses,
                    totals.net_profit()
                );
                self.messenger.send_html(chat_id, &text).await
            }
            None => {
                self.messenger
                    .send_text(chat_id, "❌ Could not fetch the report. Please try again later.")
                    .await
            }
        }
    }

    async fn handle_add_expense(&self, update: &InboundUpdate, args: &[String]) -> AppResult<()> {
        let chat_id = update.chat_id;
        let entry = match parse_expense_args(args) {
            Ok(entry) => entry,
            Err(validation_message) => {
                return self.messenger.send_html(chat_id, &validation_message).await;
            }
        };

        log::info!(
            "Appending expense for user {}: {} {} {:.2}",
            update.user_id,
            entry.date,
            entry.category,
            entry.amount
        );

        if !self.ledger.append_expense(&entry).await {
            log::error!("Expense append failed for user {}", update.user_id);
            // State untouched: re-sending the same command retries
            return self
                .messenger
                .send_text(chat_id, "❌ Failed to add the expense record. Please try again.")
                .await;
        }

        let conv = self.store.entry(update.user_id, chat_id).await;
        let mut guard = conv.lock().await;
        guard.reset();
        guard.state = ConversationState::AwaitingReceiptDecision;
        guard
            .scratch
            .insert("expense_category".to_string(), entry.category.clone());
        guard.touch();
        drop(guard);

        let mut text = format!(
            "✅ <b>Expense recorded</b>\n\n\
             📅 Date: <code>{}</code>\n\
             🏷 Category: <code>{}</code>\n\
             💰 Amount: <code>{:.2}</code>\n\
             📝 Description: <code>{}</code>\n",
            entry.date, entry.category, entry.amount, entry.description
        );
        if !entry.note.is_empty() {
            text.push_str(&format!("📌 Note: <code>{}</code>\n", entry.note));
        }
        text.push('\n');
        text.push_str(RECEIPT_PROMPT);

        self.messenger.send_html(chat_id, &text).await
    }

    /// Handles free-form text according to the user's current state.
    pub async fn handle_text(&self, update: &InboundUpdate, text: &str) -> AppResult<()> {
        let chat_id = update.chat_id;
        let conv = self.store.entry(update.user_id, chat_id).await;
        let mut guard = conv.lock().await;
        guard.touch();

        let trimmed = text.trim();
        match guard.state {
            ConversationState::Idle => {
                drop(guard);
                self.messenger.send_text(chat_id, FREE_TEXT_HINT).await
            }
            ConversationState::MainMenu => {
                drop(guard);
                self.messenger.send_text(chat_id, MENU_PROMPT).await
            }
            ConversationState::AwaitingAgentName => {
                if trimmed.is_empty() {
                    drop(guard);
                    return self.messenger.send_text(chat_id, "Please enter the agent's name.").await;
                }
                guard.scratch.insert("agent_name".to_string(), trimmed.to_string());
                guard.state = ConversationState::AwaitingAgentId;
                drop(guard);
                self.messenger
                    .send_text(chat_id, "Now enter the agent's IC number.")
                    .await
            }
            ConversationState::AwaitingAgentId => {
                let name = guard.scratch.get("agent_name").cloned().unwrap_or_default();
                // The persist happens inside this user's turn, which is
                // exactly the serialization we want
                if self.ledger.append_agent(&name, trimmed).await {
                    guard.reset();
                    drop(guard);
                    self.messenger
                        .send_html(
                            chat_id,
                            &format!("✅ Agent <b>{}</b> created (IC: <code>{}</code>).", name, trimmed),
                        )
                        .await
                } else {
                    // Keep the state so re-sending the IC retries the persist
                    drop(guard);
                    self.messenger
                        .send_text(chat_id, "❌ Failed to save the agent. Please send the IC again.")
                        .await
                }
            }
            ConversationState::AwaitingSupplierName => {
                if trimmed.is_empty() {
                    drop(guard);
                    return self
                        .messenger
                        .send_text(chat_id, "Please enter the supplier's name.")
                        .await;
                }
                guard.scratch.insert("supplier_name".to_string(), trimmed.to_string());
                guard.state = ConversationState::AwaitingSupplierCategory;
                drop(guard);
                self.messenger
                    .send_text(chat_id, "Now enter the supplier's category.")
                    .await
            }
            ConversationState::AwaitingSupplierCategory => {
                let name = guard.scratch.get("supplier_name").cloned().unwrap_or_default();
                if self.ledger.append_supplier(&name, trimmed).await {
                    guard.reset();
                    drop(guard);
                    self.messenger
                        .send_html(chat_id, &format!("✅ Supplier <b>{}</b> created.", name))
                        .await
                } else {
                    drop(guard);
                    self.messenger
                        .send_text(chat_id, "❌ Failed to save the supplier. Please send the category again.")
                        .await
                }
            }
            ConversationState::AwaitingPersonName => {
                if trimmed.is_empty() {
                    drop(guard);
                    return self.messenger.send_text(chat_id, "Please enter the person's name.").await;
                }
                if self.ledger.append_person(trimmed).await {
                    guard.reset();
                    drop(guard);
                    self.messenger
                        .send_html(chat_id, &format!("✅ Person <b>{}</b> created.", trimmed))
                        .await
                } else {
                    drop(guard);
                    self.messenger
                        .send_text(chat_id, "❌ Failed to save the person. Please send the name again.")
                        .await
                }
            }
            ConversationState::AwaitingReceiptDecision => {
                if SKIP_WORDS.contains(&trimmed.to_lowercase().as_str()) {
                    guard.reset();
                    drop(guard);
                    self.messenger.send_text(chat_id, "👍 Saved without a receipt.").await
                } else {
                    drop(guard);
                    self.messenger.send_text(chat_id, RECEIPT_PROMPT).await
                }
            }
        }
    }

    /// Handles a photo according to the user's current state.
    pub async fn handle_photo(&self, update: &InboundUpdate, file_id: &str) -> AppResult<()> {
        let chat_id = update.chat_id;
        let conv = self.store.entry(update.user_id, chat_id).await;
        let mut guard = conv.lock().await;
        guard.touch();

        if guard.state != ConversationState::AwaitingReceiptDecision {
            log::info!("Photo from user {} ignored in state {:?}", update.user_id, guard.state);
            drop(guard);
            return self
                .messenger
                .send_text(
                    chat_id,
                    "📸 Photo received. Record an expense with /add_expense to attach receipts.",
                )
                .await;
        }

        let category = guard.scratch.get("expense_category").cloned().unwrap_or_default();

        let bytes = match self.messenger.download_file(file_id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("Failed to download receipt from user {}: {}", update.user_id, e);
                drop(guard);
                return self
                    .messenger
                    .send_text(chat_id, "❌ Could not read the photo. Please send it again.")
                    .await;
            }
        };

        let route = self.folders.resolve(&category);
        if !route.is_routed() {
            log::warn!(
                "No destination folder resolved for category '{}' (user {})",
                category,
                update.user_id
            );
        }

        let file_name = format!("receipt_{}.jpg", Utc::now().format("%Y%m%d_%H%M%S"));
        match self.attachments.upload(bytes, &route, "image/jpeg", &file_name).await {
            Ok(uploaded) => {
                guard.reset();
                drop(guard);
                let text = if uploaded.public_link.is_empty() {
                    "📎 Receipt uploaded.".to_string()
                } else {
                    format!("📎 Receipt uploaded: {}", uploaded.public_link)
                };
                self.messenger.send_text(chat_id, &text).await
            }
            Err(e) => {
                log::error!("Receipt upload failed for user {}: {}", update.user_id, e);
                // Keep the state: the user can resend the photo
                drop(guard);
                self.messenger
                    .send_text(chat_id, "❌ Failed to upload the receipt. Please send the photo again.")
                    .await
            }
        }
    }

    /// Handles an inline-keyboard button press.
    pub async fn handle_callback(&self, update: &InboundUpdate, callback_id: &str, data: &str) -> AppResult<()> {
        let chat_id = update.chat_id;
        // Best-effort ack so the client stops its loading spinner
        if let Err(e) = self.messenger.answer_callback(callback_id).await {
            log::warn!("Failed to answer callback {}: {}", callback_id, e);
        }

        if data == "menu:help" {
            return self.messenger.send_html(chat_id, HELP_TEXT).await;
        }

        let target = match data {
            "settings:agent" => Some((ConversationState::AwaitingAgentName, "Enter the agent's name.")),
            "settings:supplier" => Some((ConversationState::AwaitingSupplierName, "Enter the supplier's name.")),
            "settings:person" => Some((ConversationState::AwaitingPersonName, "Enter the person's name.")),
            _ => None,
        };

        let Some((next_state, prompt)) = target else {
            log::info!("Ignoring unknown callback data '{}' from user {}", data, update.user_id);
            return Ok(());
        };

        let conv = self.store.entry(update.user_id, chat_id).await;
        let mut guard = conv.lock().await;
        guard.touch();

        // The sub-flow buttons only exist on the main menu; a press from any
        // other state is a stale keyboard
        if guard.state != ConversationState::MainMenu {
            log::info!(
                "Stale menu button '{}' from user {} in state {:?}",
                data,
                update.user_id,
                guard.state
            );
            drop(guard);
            return self.messenger.send_text(chat_id, STALE_BUTTON_TEXT).await;
        }

        guard.scratch.clear();
        guard.state = next_state;
        drop(guard);
        self.messenger.send_text(chat_id, prompt).await
    }

    /// Best-effort degraded reply used by the dispatcher when a handler
    /// fails unexpectedly.
    pub async fn send_failure_notice(&self, chat_id: i64) {
        if let Err(e) = self.messenger.send_text(chat_id, GENERIC_FAILURE_TEXT).await {
            log::error!("Failed to send failure notice to chat {}: {}", chat_id, e);
        }
    }
}
