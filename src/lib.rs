//! # Gaufromatic
//!
//! French-speaking Twitch chat bot for the `gaufregentille` channel. It
//! relays chat to an OpenAI-style completion API and posts formatted
//! replies, runs a waffle-credit slot machine, and broadcasts translated
//! useless facts while the stream is live.
//!
//! ## Features
//!
//! - **Command dispatch**: first-match-wins routing with a shared LLM
//!   cooldown and per-user limiters
//! - **Gaufrette economy**: flat-file credits ledger, slot machine,
//!   leaderboard, owner grants
//! - **Emote hygiene**: expansion of `:Name:` spellings and a strip pass
//!   over raw LLM output
//! - **Useless facts**: periodic fact broadcasts translated to French,
//!   gated on the channel being live
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gaufromatic::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BotConfig::from_env()?;
//!
//!     let openai = Arc::new(OpenAiClient::new(
//!         config.openai_api_key.clone(),
//!         config.model_name.clone(),
//!         String::new(),
//!         config.history_length,
//!     ));
//!     let ledger = Arc::new(CreditsLedger::load(&config.credits_file)?);
//!     let emotes = Arc::new(EmoteFilter::load(&config.emotes_file).await?);
//!     let facts = Arc::new(FactBroadcaster::new(
//!         Arc::clone(&openai),
//!         config.channels[0].clone(),
//!         config.fact_cooldown_secs,
//!         config.twitch_client_id.clone(),
//!         config.twitch_client_secret.clone(),
//!     ));
//!
//!     let connection = TwitchConnection::new(TwitchConfig {
//!         username: config.username.clone(),
//!         oauth_token: config.oauth_token.clone(),
//!         channels: config.channels.clone(),
//!     });
//!     let dispatcher = Arc::new(Dispatcher::new(&config, openai, ledger, emotes, Arc::clone(&facts)));
//!
//!     let bot = ChatBot::new(Box::new(connection), dispatcher, facts);
//!     bot.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     bot.shutdown().await
//! }
//! ```

pub mod bot;
pub mod config;
pub mod openai;
pub mod platforms;
pub mod types;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::credits::CreditsLedger;
    pub use crate::bot::dispatcher::Dispatcher;
    pub use crate::bot::emotes::{EmoteConfig, EmoteFilter};
    pub use crate::bot::facts::FactBroadcaster;
    pub use crate::bot::ChatBot;
    pub use crate::config::BotConfig;
    pub use crate::openai::OpenAiClient;
    pub use crate::platforms::{
        twitch::{TwitchConfig, TwitchConnection},
        PlatformConnection,
    };
    pub use crate::types::ChatMessage;
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
