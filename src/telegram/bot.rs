//! Bot initialization and command definitions
//!
//! This module contains:
//! - Command enum definition
//! - Bot instance creation
//! - Command menu registration

use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::core::config;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Copy, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "I can:")]
pub enum Command {
    #[command(description = "show the main menu")]
    Start,
    #[command(description = "show usage help")]
    Help,
    #[command(description = "create agents, suppliers, and persons")]
    Settings,
    #[command(description = "cancel the current operation")]
    Cancel,
    #[command(description = "list expense categories")]
    Categories,
    #[command(description = "show the current month's summary")]
    Report,
    #[command(rename = "add_expense", description = "add an expense record")]
    AddExpense,
}

impl Command {
    /// Command table lookup by name (without the leading slash).
    ///
    /// `saleinvoice` is an accepted legacy alias for `add_expense`; older
    /// deployments registered the expense command under that name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "settings" | "setting" => Some(Self::Settings),
            "cancel" => Some(Self::Cancel),
            "categories" => Some(Self::Categories),
            "report" => Some(Self::Report),
            "add_expense" | "addexpense" | "saleinvoice" => Some(Self::AddExpense),
            _ => None,
        }
    }
}

/// Creates a Bot instance with a timeout-configured HTTP client
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Failed to create the underlying HTTP client
pub fn create_bot() -> anyhow::Result<Bot> {
    let client = ClientBuilder::new().timeout(config::network::timeout()).build()?;
    Ok(Bot::with_client(config::BOT_TOKEN.clone(), client))
}

/// Sets up bot commands in the Telegram UI
///
/// # Arguments
/// * `bot` - Bot instance to configure
///
/// # Returns
/// * `Ok(())` - Commands set successfully
/// * `Err(RequestError)` - Failed to set commands
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    use teloxide::types::BotCommand;

    bot.set_my_commands(vec![
        BotCommand::new("start", "show the main menu"),
        BotCommand::new("help", "show usage help"),
        BotCommand::new("settings", "create agents, suppliers, and persons"),
        BotCommand::new("cancel", "cancel the current operation"),
        BotCommand::new("categories", "list expense categories"),
        BotCommand::new("report", "show the current month's summary"),
        BotCommand::new("add_expense", "add an expense record"),
    ])
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_lookup_by_name() {
        assert_eq!(Command::from_name("start"), Some(Command::Start));
        assert_eq!(Command::from_name("Cancel"), Some(Command::Cancel));
        assert_eq!(Command::from_name("add_expense"), Some(Command::AddExpense));
        assert_eq!(Command::from_name("SaleInvoice"), Some(Command::AddExpense));
        assert_eq!(Command::from_name("bogus"), None);
    }

    #[test]
    fn test_command_descriptions_present() {
        let commands = Command::descriptions();
        let command_list = format!("{}", commands);

        assert!(command_list.contains("I can"));
        assert!(command_list.contains("start"));
        assert!(command_list.contains("add_expense"));
        assert!(command_list.contains("cancel"));
    }
}
