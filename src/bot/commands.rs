//! Bot commands registered with Telegram

use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "start the bot")]
    Start,
    #[command(description = "show help")]
    Help,
    #[command(description = "search documents")]
    Search(String),
    #[command(description = "recently added documents")]
    Recent,
    #[command(description = "documents in the inbox")]
    Inbox,
    #[command(description = "Paperless statistics")]
    Stats,
}
