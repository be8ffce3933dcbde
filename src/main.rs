use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;

use gaufromatic::prelude::*;

/// Persona and channel lore fed to the completion API as system context.
const CONTEXT_FILE: &str = "file_context.txt";

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting Gaufromatic v{}", env!("CARGO_PKG_VERSION"));

    let config = BotConfig::from_env()?;

    let file_context = match std::fs::read_to_string(CONTEXT_FILE) {
        Ok(content) => content,
        Err(_) => {
            warn!("{} not found, using empty context", CONTEXT_FILE);
            String::new()
        }
    };

    let openai = Arc::new(OpenAiClient::new(
        config.openai_api_key.clone(),
        config.model_name.clone(),
        file_context,
        config.history_length,
    ));

    let ledger = Arc::new(CreditsLedger::load(&config.credits_file)?);
    let emotes = Arc::new(EmoteFilter::load(&config.emotes_file).await?);

    let facts = Arc::new(FactBroadcaster::new(
        Arc::clone(&openai),
        config.channels[0].clone(),
        config.fact_cooldown_secs,
        config.twitch_client_id.clone(),
        config.twitch_client_secret.clone(),
    ));

    let connection = TwitchConnection::new(TwitchConfig {
        username: config.username.clone(),
        oauth_token: config.oauth_token.clone(),
        channels: config.channels.clone(),
    });

    let dispatcher = Arc::new(Dispatcher::new(
        &config,
        Arc::clone(&openai),
        ledger,
        emotes,
        Arc::clone(&facts),
    ));

    let bot = ChatBot::new(Box::new(connection), dispatcher, facts);
    bot.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");
    bot.shutdown().await?;

    Ok(())
}
