use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use secrecy::ExposeSecret;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::dispatching::{HandlerExt, UpdateFilterExt};
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use paperless_bot::bot::{self, App, BotSettings, Command, Interaction};
use paperless_bot::config::Config;
use paperless_bot::dialogue::ChatState;
use paperless_bot::health;
use paperless_bot::localization::init_localization;
use paperless_bot::paperless::{PaperlessApi, PaperlessClient};
use paperless_bot::paperless_errors::PaperlessError;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(&config);

    info!("Starting Paperless Telegram Bot");

    // Liveness must not wait on Paperless, which may be retrying for minutes
    let health_addr = SocketAddr::from(([0, 0, 0, 0], config.health_port));
    health::start(health_addr)
        .await
        .with_context(|| format!("failed to bind health endpoint on {health_addr}"))?;

    init_localization()?;

    let client = PaperlessClient::new(
        &config.paperless_url,
        &config.paperless_token,
        config.inbox_tag.clone(),
        config.recovery.clone(),
    )?;

    // A bad token is fatal; an unreachable server is not
    match client.statistics().await {
        Ok(stats) => info!(
            url = %config.paperless_url,
            documents = ?stats.documents_total,
            "Connected to Paperless"
        ),
        Err(PaperlessError::Unauthorized) => bail!("Paperless rejected PAPERLESS_TOKEN"),
        Err(e) => warn!(url = %config.paperless_url, error = %e, "Paperless is not reachable yet"),
    }
    if let Err(e) = client.resolve_inbox_tag().await {
        warn!(error = %e, "No inbox tag resolved; inbox features are unavailable until one exists");
    }

    let bot = Bot::new(config.telegram_bot_token.expose_secret());
    let me = bot.get_me().await.context("failed to reach Telegram")?;
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!(error = %e, "Failed to register bot commands");
    }
    info!(username = %me.username(), "Bot initialized, starting dispatcher");

    let app = Arc::new(App {
        interaction: Interaction::new(Arc::new(client), BotSettings::from_config(&config)),
        bot_username: me.username().to_string(),
    });

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .enter_dialogue::<Message, InMemStorage<ChatState>, ChatState>()
                .endpoint(bot::message_handler),
        )
        .branch(
            Update::filter_callback_query()
                .enter_dialogue::<CallbackQuery, InMemStorage<ChatState>, ChatState>()
                .endpoint(bot::callback_handler),
        );

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![InMemStorage::<ChatState>::new(), app])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
