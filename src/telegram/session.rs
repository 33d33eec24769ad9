//! Bot session lifecycle
//!
//! Exactly one live bot session exists per process. All lifecycle
//! transitions (start, stop, restart, webhook registration) are serialized
//! by a single async mutex; status reads take a cheap snapshot and never
//! wait on a transition. Webhook registration is idempotent: a caller that
//! finds the session already registered for the target URL returns success
//! without touching the provider again.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use teloxide::prelude::*;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::config;
use crate::core::error::AppResult;
use crate::telegram::bot::setup_bot_commands;

/// Read-only session snapshot exposed to health/status callers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStatus {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub restart_count: u32,
    pub webhook_url: Option<String>,
}

/// Lifecycle states. `Starting` may fail back to `Stopped`; every other
/// transition goes through the arrows `Stopped -> Starting -> Running ->
/// Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Deployment mode. The webhook variant is the production default; polling
/// drives the same dispatcher from a supervised loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Webhook,
    Polling,
}

/// Provider calls the session manager needs for webhook management.
/// Kept behind a trait so lifecycle logic is testable without a network.
#[async_trait]
pub trait WebhookApi: Send + Sync {
    /// Registers the externally reachable callback URL with the provider.
    async fn register(&self, url: &Url) -> AppResult<()>;
    /// Removes any registered callback URL.
    async fn unregister(&self) -> AppResult<()>;
    /// Installs the command menu shown in the provider UI.
    async fn install_commands(&self) -> AppResult<()>;
}

/// Teloxide-backed implementation of [`WebhookApi`].
pub struct TelegramWebhookApi {
    bot: Bot,
}

impl TelegramWebhookApi {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl WebhookApi for TelegramWebhookApi {
    async fn register(&self, url: &Url) -> AppResult<()> {
        self.bot.set_webhook(url.clone()).await?;
        Ok(())
    }

    async fn unregister(&self) -> AppResult<()> {
        self.bot.delete_webhook().await?;
        Ok(())
    }

    async fn install_commands(&self) -> AppResult<()> {
        setup_bot_commands(&self.bot).await?;
        Ok(())
    }
}

/// Supervised task handle owned by the running session (polling loop).
#[derive(Default)]
struct SessionTask {
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

/// Owns the single live bot session.
pub struct BotSession {
    api: Arc<dyn WebhookApi>,
    mode: RunMode,
    service_url: Option<String>,
    token: String,
    /// Serializes every lifecycle transition; also owns the supervised task
    transitions: tokio::sync::Mutex<SessionTask>,
    status: std::sync::Mutex<SessionStatus>,
    state: std::sync::Mutex<SessionState>,
}

impl BotSession {
    pub fn new(api: Arc<dyn WebhookApi>, mode: RunMode, service_url: Option<String>, token: String) -> Self {
        Self {
            api,
            mode,
            service_url,
            token,
            transitions: tokio::sync::Mutex::new(SessionTask::default()),
            status: std::sync::Mutex::new(SessionStatus::default()),
            state: std::sync::Mutex::new(SessionState::Stopped),
        }
    }

    /// Read-only snapshot for health/status callers. Never blocks on a
    /// transition in flight.
    pub fn status(&self) -> SessionStatus {
        self.status.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.status.lock().map(|s| s.running).unwrap_or(false)
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().map(|s| *s).unwrap_or(SessionState::Stopped)
    }

    fn set_state(&self, next: SessionState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    fn mark_started(&self, webhook_url: Option<String>) {
        if let Ok(mut status) = self.status.lock() {
            status.running = true;
            status.started_at = Some(Utc::now());
            status.restart_count += 1;
            status.webhook_url = webhook_url;
        }
    }

    fn mark_stopped(&self) {
        if let Ok(mut status) = self.status.lock() {
            status.running = false;
            status.webhook_url = None;
        }
    }

    /// Registers the webhook with the provider, idempotently.
    ///
    /// Callers racing an in-flight setup wait on the transition lock; the
    /// loser then sees the session running with the same URL and returns
    /// without a second registration call. Returns false on lifecycle
    /// failure, leaving the session `Stopped` and safe to retry.
    pub async fn setup_webhook(&self) -> bool {
        let _guard = self.transitions.lock().await;

        let Some(service_url) = self.service_url.as_deref() else {
            log::error!("Cannot register webhook: SERVICE_URL is not set");
            return false;
        };
        let target = config::webhook_url(service_url, &self.token);

        {
            let snapshot = self.status();
            if snapshot.running && snapshot.webhook_url.as_deref() == Some(target.as_str()) {
                log::info!("Webhook already registered; setup is a no-op");
                return true;
            }
        }

        self.set_state(SessionState::Starting);

        let parsed = match Url::parse(&target) {
            Ok(url) => url,
            Err(e) => {
                log::error!("Invalid webhook URL {}: {}", target, e);
                self.set_state(SessionState::Stopped);
                return false;
            }
        };

        // Drop any stale registration first so the provider state is clean
        if let Err(e) = self.api.unregister().await {
            log::debug!("Pre-registration webhook delete failed (ignored): {}", e);
        }

        match self.api.register(&parsed).await {
            Ok(()) => {
                if let Err(e) = self.api.install_commands().await {
                    log::warn!("Failed to install command menu: {}", e);
                }
                self.mark_started(Some(target.clone()));
                self.set_state(SessionState::Running);
                log::info!("Webhook registered: {}", redact_token(&target, &self.token));
                true
            }
            Err(e) => {
                log::error!("Webhook registration failed: {}", e);
                self.mark_stopped();
                self.set_state(SessionState::Stopped);
                false
            }
        }
    }

    /// Starts the session in webhook mode. Starting an already-running
    /// session is equivalent to a restart.
    pub async fn start(&self) -> bool {
        if self.is_running() {
            return self.restart().await;
        }
        self.setup_webhook().await
    }

    /// Spawns a supervised session task (the polling loop) and marks the
    /// session running. An already-running session is stopped first.
    pub async fn start_supervised<F, Fut>(&self, run: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut task = self.transitions.lock().await;
        if self.is_running() {
            log::info!("Existing session detected; stopping it before starting a new one");
            self.stop_task(&mut task).await;
        }

        self.set_state(SessionState::Starting);
        let cancel = CancellationToken::new();
        self.mark_started(None);
        task.handle = Some(tokio::spawn(run(cancel.clone())));
        task.cancel = Some(cancel);
        self.set_state(SessionState::Running);
        log::info!("Session task started");
        true
    }

    /// Signals the running session task to halt and waits up to the grace
    /// period. Internal: callers must hold the transition lock.
    async fn stop_task(&self, task: &mut SessionTask) -> bool {
        self.set_state(SessionState::Stopping);

        if let Some(cancel) = task.cancel.take() {
            cancel.cancel();
        }

        let clean = match task.handle.take() {
            Some(handle) => match tokio::time::timeout(config::session::stop_grace(), handle).await {
                Ok(_) => true,
                Err(_) => {
                    log::warn!(
                        "Session task did not stop within {}s; detaching",
                        config::session::STOP_GRACE_SECS
                    );
                    false
                }
            },
            // Webhook-mode sessions have no task to wait on
            None => true,
        };

        self.mark_stopped();
        self.set_state(SessionState::Stopped);
        clean
    }

    /// Stops the session. Returns whether it stopped cleanly within the
    /// grace period. A stop issued while a start is in flight waits for the
    /// start to resolve first (both serialize on the transition lock).
    pub async fn stop(&self) -> bool {
        let mut task = self.transitions.lock().await;
        if !self.is_running() {
            log::info!("Session already stopped");
            return true;
        }
        let clean = self.stop_task(&mut task).await;
        log::info!("Session stopped (clean: {})", clean);
        clean
    }

    /// Stop followed by start.
    pub async fn restart(&self) -> bool {
        self.stop().await;
        self.setup_webhook().await
    }

    /// Best-effort teardown on shutdown: unregister the webhook, stop the
    /// session, mark it stopped. Failures in one sub-step are logged and do
    /// not abort the remaining steps. Safe to call when nothing was ever
    /// started.
    pub async fn teardown_webhook(&self) {
        log::info!("Tearing down bot session...");
        let mut task = self.transitions.lock().await;

        if let Err(e) = self.api.unregister().await {
            log::error!("Failed to unregister webhook during teardown: {}", e);
        }

        self.stop_task(&mut task).await;
        log::info!("Teardown complete");
    }

    /// Makes sure the session is initialized before an update is handled.
    ///
    /// In webhook mode a missing session triggers registration; duplicate
    /// concurrent attempts collapse onto one registration inside
    /// `setup_webhook`. In polling mode the loop is started at boot, so
    /// this only reports the current state.
    pub async fn ensure_started(&self) -> bool {
        if self.is_running() {
            return true;
        }
        match self.mode {
            RunMode::Webhook => self.setup_webhook().await,
            RunMode::Polling => {
                log::warn!("Update received while the polling session is not running");
                false
            }
        }
    }
}

/// Replaces the secret token inside a webhook URL for log output.
fn redact_token(url: &str, token: &str) -> String {
    if token.is_empty() {
        return url.to_string();
    }
    let visible: String = token.chars().take(6).collect();
    url.replace(token, &format!("{}…", visible))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::CountingWebhookApi;
    use std::sync::atomic::Ordering;

    fn session_with(api: Arc<CountingWebhookApi>) -> Arc<BotSession> {
        Arc::new(BotSession::new(
            api,
            RunMode::Webhook,
            Some("https://bot.test".to_string()),
            "123:secret".to_string(),
        ))
    }

    #[tokio::test]
    async fn concurrent_setup_performs_one_registration() {
        let api = Arc::new(CountingWebhookApi::default());
        let session = session_with(Arc::clone(&api));

        let (a, b) = tokio::join!(
            {
                let s = Arc::clone(&session);
                async move { s.setup_webhook().await }
            },
            {
                let s = Arc::clone(&session);
                async move { s.setup_webhook().await }
            }
        );

        assert!(a && b);
        assert_eq!(api.registrations.load(Ordering::SeqCst), 1);
        assert!(session.is_running());
        assert_eq!(session.state(), SessionState::Running);
    }

    #[tokio::test]
    async fn setup_is_idempotent_when_already_registered() {
        let api = Arc::new(CountingWebhookApi::default());
        let session = session_with(Arc::clone(&api));

        assert!(session.setup_webhook().await);
        assert!(session.setup_webhook().await);
        assert_eq!(api.registrations.load(Ordering::SeqCst), 1);
        assert_eq!(session.status().restart_count, 1);
    }

    #[tokio::test]
    async fn registration_failure_leaves_session_stopped_and_retryable() {
        let api = Arc::new(CountingWebhookApi::default());
        api.fail_register.store(true, Ordering::SeqCst);
        let session = session_with(Arc::clone(&api));

        assert!(!session.setup_webhook().await);
        assert!(!session.is_running());
        assert_eq!(session.state(), SessionState::Stopped);

        api.fail_register.store(false, Ordering::SeqCst);
        assert!(session.setup_webhook().await);
        assert!(session.is_running());
    }

    #[tokio::test]
    async fn missing_service_url_fails_without_registering() {
        let api = Arc::new(CountingWebhookApi::default());
        let session = BotSession::new(Arc::clone(&api) as Arc<dyn WebhookApi>, RunMode::Webhook, None, "t".to_string());

        assert!(!session.setup_webhook().await);
        assert_eq!(api.registrations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn start_on_running_session_restarts() {
        let api = Arc::new(CountingWebhookApi::default());
        let session = session_with(Arc::clone(&api));

        assert!(session.start().await);
        assert!(session.start().await);
        // Restart re-registers: two registrations, two recorded starts
        assert_eq!(api.registrations.load(Ordering::SeqCst), 2);
        assert_eq!(session.status().restart_count, 2);
    }

    #[tokio::test]
    async fn supervised_task_stops_cleanly_within_grace() {
        let api = Arc::new(CountingWebhookApi::default());
        let session = session_with(api);

        session
            .start_supervised(|cancel| async move {
                cancel.cancelled().await;
            })
            .await;
        assert!(session.is_running());

        assert!(session.stop().await);
        assert!(!session.is_running());
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn stop_when_never_started_is_a_no_op() {
        let api = Arc::new(CountingWebhookApi::default());
        let session = session_with(api);
        assert!(session.stop().await);
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn teardown_is_idempotent_and_best_effort() {
        let api = Arc::new(CountingWebhookApi::default());
        // Unregister failures must not abort the remaining teardown steps
        api.fail_unregister.store(true, Ordering::SeqCst);
        let session = session_with(Arc::clone(&api));

        session.teardown_webhook().await;
        session.teardown_webhook().await;
        assert!(!session.is_running());
        assert_eq!(api.unregistrations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn teardown_after_setup_unregisters() {
        let api = Arc::new(CountingWebhookApi::default());
        let session = session_with(Arc::clone(&api));

        assert!(session.setup_webhook().await);
        session.teardown_webhook().await;
        assert!(!session.is_running());
        assert!(session.status().webhook_url.is_none());
        // One delete before registration, one during teardown
        assert_eq!(api.unregistrations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn redact_token_hides_the_secret() {
        let url = "https://bot.test/webhook/123456789:AAAbbb";
        let redacted = redact_token(url, "123456789:AAAbbb");
        assert!(!redacted.contains("AAAbbb"));
        assert!(redacted.contains("123456…"));
    }
}
