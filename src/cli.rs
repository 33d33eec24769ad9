use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tallybot")]
#[command(author, version, about = "Telegram bot front end for a spreadsheet-backed financial ledger", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot (webhook mode by default)
    Run {
        /// Use long polling instead of a registered webhook
        #[arg(long)]
        polling: bool,
    },

    /// Register the webhook with the provider and exit
    SetupWebhook,

    /// Unregister the webhook from the provider and exit
    TeardownWebhook,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
