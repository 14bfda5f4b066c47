//! Callback Handler module for processing inline keyboard callback queries

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{debug, warn};

use super::actions::Action;
use super::delivery::{deliver, take_toast};
use super::dialogue_manager::Inbound;
use super::App;
use crate::dialogue::ChatDialogue;
use crate::localization::t;

/// Handle callback queries from inline keyboards
pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    dialogue: ChatDialogue,
    app: Arc<App>,
) -> Result<()> {
    let user_id = q.from.id.0;
    debug!(user_id, data = ?q.data, "Received callback query from user");

    let Some(action) = q.data.as_deref().and_then(Action::decode) else {
        warn!(user_id, data = ?q.data, "Unknown callback payload");
        bot.answer_callback_query(q.id.clone())
            .text(t("toast-stale"))
            .await?;
        return Ok(());
    };

    let state = dialogue.get().await?.unwrap_or_default();
    let outcome = app
        .interaction
        .handle(user_id, state, Inbound::Callback(action))
        .await;
    dialogue.update(outcome.state).await?;

    // Answer first so the client stops its spinner before slow sends
    let (toast, replies) = take_toast(outcome.replies);
    let mut answer = bot.answer_callback_query(q.id.clone());
    if let Some(text) = toast {
        answer = answer.text(text);
    }
    if let Err(e) = answer.await {
        warn!(user_id, error = %e, "Failed to answer callback query");
    }

    let (chat_id, origin) = match &q.message {
        Some(message) => (message.chat().id, Some(message.id())),
        None => (ChatId::from(q.from.id), None),
    };
    deliver(&bot, chat_id, origin, replies).await;
    Ok(())
}
