use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;

use tallybot::cli::{Cli, Commands};
use tallybot::core::{config, init_logger, log_integrations_configuration};
use tallybot::ledger::routing::FolderConfig;
use tallybot::ledger::store::{LedgerGateway, LedgerStore};
use tallybot::ledger::uploads::{AttachmentStore, DriveGateway};
use tallybot::telegram::conversation::{spawn_timeout_sweeper, ConversationStore};
use tallybot::telegram::polling::run_polling_loop;
use tallybot::telegram::session::{BotSession, RunMode, TelegramWebhookApi, WebhookApi};
use tallybot::telegram::transport::{Messenger, TelegramMessenger};
use tallybot::telegram::webhook::{run_server, WebState};
use tallybot::telegram::{create_bot, ConversationEngine, UpdateDispatcher};

/// Main entry point for the ledger bot
///
/// Parses CLI arguments and dispatches to the appropriate subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, configuration, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();

    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logger (console + file)
    init_logger(&config::LOG_FILE_PATH)?;

    // The bot token is the only mandatory setting
    config::ensure_bot_token()?;

    match cli.command {
        Some(Commands::Run { polling }) => {
            let mode = if polling { RunMode::Polling } else { RunMode::Webhook };
            run_bot(mode).await
        }
        Some(Commands::SetupWebhook) => run_webhook_admin(true).await,
        Some(Commands::TeardownWebhook) => run_webhook_admin(false).await,
        None => {
            // No command specified - default to running in webhook mode
            log::info!("No command specified, running bot in webhook mode");
            run_bot(RunMode::Webhook).await
        }
    }
}

/// One-shot webhook registration/unregistration for deployment scripts.
async fn run_webhook_admin(register: bool) -> Result<()> {
    let bot = create_bot()?;
    let api = TelegramWebhookApi::new(bot);
    let session = BotSession::new(
        Arc::new(api),
        RunMode::Webhook,
        config::SERVICE_URL.clone(),
        config::BOT_TOKEN.clone(),
    );

    if register {
        if session.setup_webhook().await {
            log::info!("Webhook registered");
            Ok(())
        } else {
            Err(anyhow::anyhow!("webhook registration failed"))
        }
    } else {
        session.teardown_webhook().await;
        Ok(())
    }
}

/// Run the ledger bot
async fn run_bot(mode: RunMode) -> Result<()> {
    log::info!("Starting bot (mode: {:?})...", mode);

    let folders = FolderConfig::from_env();
    log_integrations_configuration(&folders);

    // Create bot instance and collaborator gateways
    let bot = create_bot()?;
    let messenger: Arc<dyn Messenger> = Arc::new(TelegramMessenger::new(bot.clone()));
    let ledger: Arc<dyn LedgerStore> = Arc::new(LedgerGateway::from_env());
    let attachments: Arc<dyn AttachmentStore> = Arc::new(DriveGateway::from_env());

    // Conversation state store + engine
    let store = Arc::new(ConversationStore::new(config::conversation::timeout()));
    let engine = Arc::new(ConversationEngine::new(
        Arc::clone(&store),
        ledger,
        attachments,
        folders,
        Arc::clone(&messenger),
    ));

    // Session manager and dispatcher share ownership of the single session
    let api: Arc<dyn WebhookApi> = Arc::new(TelegramWebhookApi::new(bot.clone()));
    let session = Arc::new(BotSession::new(
        api,
        mode,
        config::SERVICE_URL.clone(),
        config::BOT_TOKEN.clone(),
    ));
    let dispatcher = Arc::new(UpdateDispatcher::new(
        config::BOT_TOKEN.clone(),
        Arc::clone(&session),
        engine,
    ));

    // Background timer expiring idle conversations
    let sweeper = spawn_timeout_sweeper(Arc::clone(&store), Arc::clone(&messenger));

    match mode {
        RunMode::Webhook => {
            // Register at boot; a failure is retryable via GET /setup_webhook
            if !session.setup_webhook().await {
                log::error!("Initial webhook registration failed; retry via GET /setup_webhook");
            }
        }
        RunMode::Polling => {
            let bot_poll = bot.clone();
            let dispatcher_poll = Arc::clone(&dispatcher);
            let secret = config::BOT_TOKEN.clone();
            session
                .start_supervised(move |cancel| run_polling_loop(bot_poll, dispatcher_poll, secret, cancel))
                .await;
        }
    }

    // HTTP surface runs in both modes (webhook delivery, status, health)
    let web_state = WebState {
        dispatcher: Arc::clone(&dispatcher),
        session: Arc::clone(&session),
    };
    let server = tokio::spawn(async move {
        if let Err(e) = run_server(*config::PORT, web_state).await {
            log::error!("Web server error: {}", e);
        }
    });

    log::info!("================================================");
    log::info!("Bot initialization complete");
    log::info!("Ready to receive updates!");
    log::info!("================================================");

    shutdown_signal().await;

    // Termination always tears the webhook down, even if startup never
    // finished registering it
    log::info!("Shutting down gracefully...");
    session.teardown_webhook().await;
    sweeper.abort();
    server.abort();

    Ok(())
}

/// Completes when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
