//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `message_handler`: Handles incoming text, photo, and document messages
//! - `callback_handler`: Handles inline keyboard callback queries
//! - `dialogue_manager`: The state machine behind both handlers
//! - `ui_builder`: Creates keyboards and formats messages
//! - `actions`: Callback payload encoding
//! - `delivery`: Sends replies to Telegram

pub mod actions;
pub mod callback_handler;
pub mod commands;
pub mod delivery;
pub mod dialogue_manager;
pub mod message_handler;
pub mod ui_builder;

pub use callback_handler::callback_handler;
pub use commands::Command;
pub use dialogue_manager::{BotSettings, Inbound, Interaction, Outcome, Reply};
pub use message_handler::message_handler;

/// Shared handler dependencies
pub struct App {
    pub interaction: Interaction,
    /// Used to accept `/command@bot_username` in group chats
    pub bot_username: String,
}
