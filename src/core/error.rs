use thiserror::Error;

/// Centralized error types for the application
///
/// All errors in the application are converted to this enum for consistent error handling.
/// Uses `thiserror` for automatic error conversion and display formatting.
#[derive(Error, Debug)]
pub enum AppError {
    /// Telegram API errors
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// Telegram file download errors
    #[error("Telegram download error: {0}")]
    TelegramDownload(#[from] teloxide::DownloadError),

    /// HTTP/Fetch errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors (missing mandatory settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ledger store collaborator errors
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Attachment store collaborator errors
    #[error("Upload error: {0}")]
    Upload(String),

    /// Validation errors (bad user input)
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;
