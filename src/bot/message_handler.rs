//! Message Handler module for processing incoming Telegram messages

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use teloxide::prelude::*;
use teloxide::types::FileId;
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};

use super::commands::Command;
use super::delivery::deliver;
use super::dialogue_manager::{megabytes, Inbound, Reply};
use super::App;
use crate::config::TELEGRAM_DOWNLOAD_LIMIT_BYTES;
use crate::dialogue::ChatDialogue;
use crate::localization::{t, t_args};

/// A file attached to a message
struct Attachment {
    file_id: FileId,
    filename: String,
    size: u64,
}

/// Turn message text into an event; unknown commands show the help text
pub fn text_event(text: &str, bot_username: &str) -> Inbound {
    if text.starts_with('/') {
        match Command::parse(text, bot_username) {
            Ok(command) => Inbound::Command(command),
            Err(e) => {
                debug!(text, error = %e, "Unrecognized command");
                Inbound::Command(Command::Help)
            }
        }
    } else {
        Inbound::Text(text.to_string())
    }
}

/// Name given to photos, which arrive without a filename
pub fn photo_filename(sent_at: DateTime<Utc>) -> String {
    format!("photo_{}.jpg", sent_at.format("%Y%m%d_%H%M%S"))
}

fn attachment(msg: &Message) -> Option<Attachment> {
    if let Some(doc) = msg.document() {
        return Some(Attachment {
            file_id: doc.file.id.clone(),
            filename: doc
                .file_name
                .clone()
                .unwrap_or_else(|| format!("document_{}", msg.id.0)),
            size: u64::from(doc.file.size),
        });
    }
    // Telegram sends every resolution; the last one is the largest
    let photo = msg.photo()?.last()?;
    Some(Attachment {
        file_id: photo.file.id.clone(),
        filename: photo_filename(msg.date),
        size: u64::from(photo.file.size),
    })
}

/// Download a file from Telegram into memory
pub async fn download_file(bot: &Bot, file_id: FileId) -> Result<Vec<u8>> {
    let file = bot.get_file(file_id).await?;
    let url = format!("{}file/bot{}/{}", bot.api_url(), bot.token(), file.path);

    let response = reqwest::get(&url)
        .await
        .context("failed to reach Telegram file storage")?
        .error_for_status()?;
    let bytes = response.bytes().await?;
    Ok(bytes.to_vec())
}

/// Handle incoming text, document and photo messages
pub async fn message_handler(
    bot: Bot,
    msg: Message,
    dialogue: ChatDialogue,
    app: Arc<App>,
) -> Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = user.id.0;
    let chat_id = msg.chat.id;

    let (event, status) = if let Some(text) = msg.text() {
        (text_event(text, &app.bot_username), None)
    } else if let Some(file) = attachment(&msg) {
        match receive_upload(&bot, chat_id, &app, user_id, file).await {
            Some(received) => received,
            None => return Ok(()),
        }
    } else {
        debug!(user_id, "Ignoring message without text or file");
        return Ok(());
    };

    let state = dialogue.get().await?.unwrap_or_default();
    let outcome = app.interaction.handle(user_id, state, event).await;
    dialogue.update(outcome.state).await?;

    clear_status(&bot, chat_id, status).await;
    deliver(&bot, chat_id, None, outcome.replies).await;
    Ok(())
}

/// Fetch an attachment from Telegram, or tell the user why not
///
/// Access is checked first so that files from strangers are never downloaded.
/// The "Uploading…" status goes out before the download and is handed back so
/// it can be removed once Paperless has answered.
async fn receive_upload(
    bot: &Bot,
    chat_id: ChatId,
    app: &App,
    user_id: u64,
    file: Attachment,
) -> Option<(Inbound, Option<Message>)> {
    if !app.interaction.settings().is_authorized(user_id) {
        warn!(user_id, "Rejected upload from unauthorized user");
        deliver(bot, chat_id, None, vec![Reply::text(t("access-denied"))]).await;
        return None;
    }

    if file.size > TELEGRAM_DOWNLOAD_LIMIT_BYTES {
        info!(user_id, size = file.size, "Attachment exceeds the bot download limit");
        let text = t_args("upload-too-large", &[("size", &megabytes(file.size))]);
        deliver(bot, chat_id, None, vec![Reply::text(text)]).await;
        return None;
    }

    let status = match bot.send_message(chat_id, t("upload-in-progress")).await {
        Ok(status) => Some(status),
        Err(e) => {
            warn!(user_id, error = %e, "Failed to send upload status");
            None
        }
    };

    match download_file(bot, file.file_id).await {
        Ok(bytes) => {
            debug!(user_id, filename = %file.filename, size = bytes.len(), "Attachment downloaded");
            let event = Inbound::Upload {
                bytes,
                filename: file.filename,
            };
            Some((event, status))
        }
        Err(e) => {
            error!(user_id, error = %e, "Failed to download attachment");
            clear_status(bot, chat_id, status).await;
            deliver(bot, chat_id, None, vec![Reply::text(t("error-telegram"))]).await;
            None
        }
    }
}

async fn clear_status(bot: &Bot, chat_id: ChatId, status: Option<Message>) {
    if let Some(status) = status {
        if let Err(e) = bot.delete_message(chat_id, status.id).await {
            warn!(chat_id = %chat_id, error = %e, "Failed to delete status message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_text_event() {
        assert_eq!(
            text_event("/search rent", "paperless_bot"),
            Inbound::Command(Command::Search("rent".to_string()))
        );
        assert_eq!(
            text_event("/nonsense", "paperless_bot"),
            Inbound::Command(Command::Help)
        );
        assert_eq!(
            text_event("electricity bill", "paperless_bot"),
            Inbound::Text("electricity bill".to_string())
        );
    }

    #[test]
    fn test_photo_filename() {
        let sent_at = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(photo_filename(sent_at), "photo_20250309_140507.jpg");
    }
}
