use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

use crate::core::error::{AppError, AppResult};

/// Bot token
/// Read from BOT_TOKEN or TELEGRAM_TOKEN environment variable.
/// Mandatory: startup fails when neither is set (see `ensure_bot_token`).
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELEGRAM_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

/// Externally reachable base URL used to build the webhook callback URL
/// Read from SERVICE_URL environment variable (e.g. https://bot.example.com)
pub static SERVICE_URL: Lazy<Option<String>> = Lazy::new(|| {
    env::var("SERVICE_URL").ok().and_then(|value| {
        let trimmed = value.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
});

/// HTTP server port
/// Read from PORT environment variable
/// Default: 5000
pub static PORT: Lazy<u16> = Lazy::new(|| env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(5000));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: app.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "app.log".to_string()));

/// Ledger store gateway endpoint (spreadsheet-backed collaborator)
/// Read from LEDGER_API_URL environment variable
/// Unset means the ledger gateway is disabled and appends report failure.
pub static LEDGER_API_URL: Lazy<Option<String>> = Lazy::new(|| {
    env::var("LEDGER_API_URL").ok().and_then(|value| {
        let trimmed = value.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
});

/// Attachment store gateway endpoint (document-storage collaborator)
/// Read from DRIVE_API_URL environment variable
pub static DRIVE_API_URL: Lazy<Option<String>> = Lazy::new(|| {
    env::var("DRIVE_API_URL").ok().and_then(|value| {
        let trimmed = value.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
});

/// Returns the bot token or a configuration error when it is missing.
///
/// The token is the only mandatory setting; everything else degrades
/// gracefully when unset.
pub fn ensure_bot_token() -> AppResult<&'static str> {
    if BOT_TOKEN.is_empty() {
        return Err(AppError::Config(
            "BOT_TOKEN (or TELEGRAM_TOKEN) environment variable is not set".to_string(),
        ));
    }
    Ok(BOT_TOKEN.as_str())
}

/// Conversation state machine configuration
pub mod conversation {
    use once_cell::sync::Lazy;
    use std::env;
    use std::time::Duration;

    /// Idle window after which a conversation is reset to Idle (in seconds)
    /// Read from CONVERSATION_TIMEOUT_SECS environment variable
    /// Default: 300 seconds (5 minutes)
    pub static TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| {
        env::var("CONVERSATION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300)
    });

    /// Interval between idle-conversation sweeps (in milliseconds)
    pub const SWEEP_INTERVAL_MS: u64 = 5000;

    /// Conversation idle timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(*TIMEOUT_SECS)
    }

    /// Sweep interval duration
    pub fn sweep_interval() -> Duration {
        Duration::from_millis(SWEEP_INTERVAL_MS)
    }
}

/// Session lifecycle configuration
pub mod session {
    use super::Duration;

    /// Grace period to wait for the session task to acknowledge a stop (in seconds)
    pub const STOP_GRACE_SECS: u64 = 5;

    /// Long-poll timeout for getUpdates in polling mode (in seconds)
    pub const POLL_TIMEOUT_SECS: u32 = 25;

    /// Delay before retrying after a polling error (in seconds)
    pub const POLL_RETRY_DELAY_SECS: u64 = 5;

    /// Stop grace period duration
    pub fn stop_grace() -> Duration {
        Duration::from_secs(STOP_GRACE_SECS)
    }

    /// Polling error retry delay duration
    pub fn poll_retry_delay() -> Duration {
        Duration::from_secs(POLL_RETRY_DELAY_SECS)
    }
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for outbound HTTP requests (in seconds)
    /// Covers Telegram API calls and gateway requests; uploads of receipt
    /// photos stay well under this.
    pub const REQUEST_TIMEOUT_SECS: u64 = 60;

    /// Request timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// Builds the webhook callback URL for the configured deployment.
///
/// Returns `None` when SERVICE_URL is not set; webhook registration is
/// impossible in that case and the caller reports a lifecycle error.
pub fn webhook_url(service_url: &str, token: &str) -> String {
    format!("{}/webhook/{}", service_url.trim_end_matches('/'), token)
}
