//! Sends [`Reply`] values to Telegram

use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, ParseMode};
use teloxide::RequestError;
use tracing::{debug, error};

use super::dialogue_manager::Reply;
use super::ui_builder::Keyboard;

/// Split callback toasts from the replies that go to the chat
pub fn take_toast(replies: Vec<Reply>) -> (Option<String>, Vec<Reply>) {
    let mut toast = None;
    let mut rest = Vec::with_capacity(replies.len());
    for reply in replies {
        match reply {
            Reply::Toast(text) => toast = Some(text),
            other => rest.push(other),
        }
    }
    (toast, rest)
}

/// Deliver replies in order
///
/// `origin` is the message whose button was pressed; edits fall back to a new
/// message when it is unknown. Send failures are logged and do not stop later
/// replies.
pub async fn deliver(bot: &Bot, chat_id: ChatId, origin: Option<MessageId>, replies: Vec<Reply>) {
    for reply in replies {
        let result = match reply {
            Reply::Send { text, keyboard } => send_html(bot, chat_id, text, keyboard).await,
            Reply::Edit { text, keyboard } => match origin {
                Some(message_id) => edit_html(bot, chat_id, message_id, text, keyboard).await,
                None => send_html(bot, chat_id, text, keyboard).await,
            },
            Reply::File(file) => {
                debug!(chat_id = %chat_id, filename = %file.filename, size = file.bytes.len(), "Sending document");
                bot.send_document(chat_id, InputFile::memory(file.bytes).file_name(file.filename))
                    .await
                    .map(|_| ())
            }
            Reply::Toast(text) => {
                debug!(chat_id = %chat_id, text = %text, "Dropping toast outside a callback");
                Ok(())
            }
        };

        if let Err(e) = result {
            error!(chat_id = %chat_id, error = %e, "Failed to deliver reply");
        }
    }
}

async fn send_html(
    bot: &Bot,
    chat_id: ChatId,
    text: String,
    keyboard: Option<Keyboard>,
) -> Result<(), RequestError> {
    let mut request = bot.send_message(chat_id, text).parse_mode(ParseMode::Html);
    if let Some(keyboard) = keyboard {
        request = request.reply_markup(keyboard.to_markup());
    }
    request.await?;
    Ok(())
}

async fn edit_html(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    text: String,
    keyboard: Option<Keyboard>,
) -> Result<(), RequestError> {
    let mut request = bot
        .edit_message_text(chat_id, message_id, text)
        .parse_mode(ParseMode::Html);
    if let Some(keyboard) = keyboard {
        request = request.reply_markup(keyboard.to_markup());
    }
    match request.await {
        Ok(_) => Ok(()),
        // Pressing a button that re-renders the same screen is not an error
        Err(RequestError::Api(teloxide::ApiError::MessageNotModified)) => Ok(()),
        Err(e) => Err(e),
    }
}
