//! Testing doubles for the transport and collaborator seams
//!
//! Used by the `#[cfg(test)]` modules and the `tests/` integration tests to
//! drive full conversation flows without a Telegram connection or live
//! gateways. Recording doubles capture what the bot would have sent;
//! counting doubles verify idempotency properties.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use crate::core::error::{AppError, AppResult};
use crate::ledger::routing::DestinationRoute;
use crate::ledger::store::{ExpenseEntry, LedgerStore, MonthlyTotals};
use crate::ledger::uploads::{AttachmentStore, UploadedFile};
use crate::telegram::session::WebhookApi;
use crate::telegram::transport::{ButtonRow, Messenger};

fn simulated(msg: &str) -> AppError {
    AppError::Io(std::io::Error::other(msg.to_string()))
}

/// Messenger double that records everything sent.
#[derive(Default)]
pub struct RecordingMessenger {
    /// (chat_id, text) for every outgoing message, menus included
    pub sent: Mutex<Vec<(i64, String)>>,
    /// callback ids that were answered
    pub answered: Mutex<Vec<String>>,
    /// file ids requested for download
    pub downloads: Mutex<Vec<String>>,
    /// number of upcoming send calls that should fail
    fail_next_sends: AtomicUsize,
}

impl RecordingMessenger {
    /// All texts sent to one chat, in order.
    pub fn all_to(&self, chat_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .map(|sent| {
                sent.iter()
                    .filter(|(chat, _)| *chat == chat_id)
                    .map(|(_, text)| text.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All texts sent to one chat, in order. Alias for [`all_to`](Self::all_to).
    pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.all_to(chat_id)
    }

    /// Makes the next `count` send calls fail.
    pub fn set_fail_next_sends(&self, count: usize) {
        self.fail_next_sends.store(count, Ordering::SeqCst);
    }

    fn record(&self, chat_id: i64, text: &str) -> AppResult<()> {
        let remaining = self.fail_next_sends.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next_sends.store(remaining - 1, Ordering::SeqCst);
            return Err(simulated("simulated send failure"));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((chat_id, text.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> AppResult<()> {
        self.record(chat_id, text)
    }

    async fn send_html(&self, chat_id: i64, text: &str) -> AppResult<()> {
        self.record(chat_id, text)
    }

    async fn send_menu(&self, chat_id: i64, text: &str, _rows: Vec<ButtonRow>) -> AppResult<()> {
        self.record(chat_id, text)
    }

    async fn answer_callback(&self, callback_id: &str) -> AppResult<()> {
        if let Ok(mut answered) = self.answered.lock() {
            answered.push(callback_id.to_string());
        }
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> AppResult<Vec<u8>> {
        if let Ok(mut downloads) = self.downloads.lock() {
            downloads.push(file_id.to_string());
        }
        // JPEG magic bytes, enough to stand in for a receipt photo
        Ok(vec![0xFF, 0xD8, 0xFF, 0xE0])
    }
}

/// Ledger double recording appended rows.
pub struct MockLedger {
    pub expenses: Mutex<Vec<ExpenseEntry>>,
    pub agents: Mutex<Vec<(String, String)>>,
    pub suppliers: Mutex<Vec<(String, String)>>,
    pub persons: Mutex<Vec<String>>,
    pub totals: Mutex<Option<MonthlyTotals>>,
    fail_appends: AtomicBool,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self {
            expenses: Mutex::new(Vec::new()),
            agents: Mutex::new(Vec::new()),
            suppliers: Mutex::new(Vec::new()),
            persons: Mutex::new(Vec::new()),
            totals: Mutex::new(Some(MonthlyTotals {
                total_sales: 100.0,
                total_expenses: 40.0,
            })),
            fail_appends: AtomicBool::new(false),
        }
    }
}

impl MockLedger {
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    fn failing(&self) -> bool {
        self.fail_appends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerStore for MockLedger {
    async fn append_expense(&self, entry: &ExpenseEntry) -> bool {
        if self.failing() {
            return false;
        }
        if let Ok(mut expenses) = self.expenses.lock() {
            expenses.push(entry.clone());
        }
        true
    }

    async fn append_agent(&self, name: &str, ic: &str) -> bool {
        if self.failing() {
            return false;
        }
        if let Ok(mut agents) = self.agents.lock() {
            agents.push((name.to_string(), ic.to_string()));
        }
        true
    }

    async fn append_supplier(&self, name: &str, category: &str) -> bool {
        if self.failing() {
            return false;
        }
        if let Ok(mut suppliers) = self.suppliers.lock() {
            suppliers.push((name.to_string(), category.to_string()));
        }
        true
    }

    async fn append_person(&self, name: &str) -> bool {
        if self.failing() {
            return false;
        }
        if let Ok(mut persons) = self.persons.lock() {
            persons.push(name.to_string());
        }
        true
    }

    async fn monthly_totals(&self, _year: i32, _month: u32) -> Option<MonthlyTotals> {
        self.totals.lock().ok().and_then(|t| *t)
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// One recorded upload call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub folder_id: Option<String>,
    pub category: String,
    pub mime_type: String,
    pub file_name: String,
    pub byte_count: usize,
}

/// Attachment store double recording uploads.
#[derive(Default)]
pub struct MockAttachments {
    pub uploads: Mutex<Vec<RecordedUpload>>,
    fail: AtomicBool,
}

impl MockAttachments {
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AttachmentStore for MockAttachments {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        route: &DestinationRoute,
        mime_type: &str,
        file_name: &str,
    ) -> AppResult<UploadedFile> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Upload("simulated upload failure".to_string()));
        }
        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.push(RecordedUpload {
                folder_id: route.folder_id.clone(),
                category: route.category.clone(),
                mime_type: mime_type.to_string(),
                file_name: file_name.to_string(),
                byte_count: bytes.len(),
            });
        }
        Ok(UploadedFile {
            file_id: "mock-file-1".to_string(),
            public_link: "https://files.test/mock-file-1".to_string(),
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Webhook API double counting provider calls.
#[derive(Default)]
pub struct CountingWebhookApi {
    pub registrations: AtomicUsize,
    pub unregistrations: AtomicUsize,
    pub fail_register: AtomicBool,
    pub fail_unregister: AtomicBool,
}

#[async_trait]
impl WebhookApi for CountingWebhookApi {
    async fn register(&self, _url: &Url) -> AppResult<()> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(simulated("simulated register failure"));
        }
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn unregister(&self) -> AppResult<()> {
        if self.fail_unregister.load(Ordering::SeqCst) {
            return Err(simulated("simulated unregister failure"));
        }
        self.unregistrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn install_commands(&self) -> AppResult<()> {
        Ok(())
    }
}
