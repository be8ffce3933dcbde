// src/config/mod.rs - Environment-driven bot configuration

use anyhow::{Context, Result};
use log::{debug, info};
use std::env;

/// Message prefixes that make the bot react as if it had been addressed
/// directly. Checked after explicit commands, before the generic prefix.
pub const NAME_TRIGGERS: [&str; 5] = ["gaufromatic", "le bot", "lebot", "gaufrobot", "gaugromatic"];

/// Twitch caps a single PRIVMSG well below this; replies longer than this
/// are split into staggered chunks instead of being truncated.
pub const MAX_MESSAGE_LENGTH: usize = 399;

/// Delay between two chunks of a split reply.
pub const CHUNK_STAGGER_MS: u64 = 150;

/// Everything the bot reads from the environment, with the literal
/// defaults the bot has always shipped with.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub username: String,
    pub oauth_token: String,
    pub channels: Vec<String>,
    /// Generic LLM command names, lowercase, e.g. `["!gpt"]`.
    pub command_names: Vec<String>,
    /// Channel owner, the only account allowed to grant credits.
    pub owner: String,
    /// Users the bot reacts to spontaneously (per-user cooldown applies).
    pub tracked_users: Vec<String>,
    pub send_username: bool,
    pub enable_tts: bool,
    pub enable_channel_points: bool,
    /// Shared cooldown across all LLM-backed actions, seconds.
    pub llm_cooldown_secs: u64,
    /// Per-user cooldown for spontaneous reactions, seconds.
    pub reaction_cooldown_secs: u64,
    /// Per-user cooldown for the slot machine, seconds.
    pub slot_cooldown_secs: u64,
    /// Minimum delay between two fact broadcasts, seconds.
    pub fact_cooldown_secs: u64,
    pub openai_api_key: String,
    pub model_name: String,
    pub history_length: usize,
    /// Helix credentials for the live-status gate. Optional: without them
    /// the automatic fact timer stays silent and only `!fact` works.
    pub twitch_client_id: Option<String>,
    pub twitch_client_secret: Option<String>,
    pub credits_file: String,
    pub emotes_file: String,
}

impl BotConfig {
    /// Load the full configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let username = env::var("TWITCH_USER")
            .context("TWITCH_USER environment variable not set")?;

        let oauth_token = env::var("TWITCH_AUTH")
            .context("TWITCH_AUTH environment variable not set")?;

        if !oauth_token.starts_with("oauth:") {
            return Err(anyhow::anyhow!(
                "TWITCH_AUTH must start with 'oauth:' - got: {}...",
                &oauth_token[..std::cmp::min(10, oauth_token.len())]
            ));
        }

        let openai_api_key = env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set")?;

        let channels = split_list(&env_or("CHANNELS", "gaufregentille"));
        if channels.is_empty() {
            return Err(anyhow::anyhow!("No channels specified in CHANNELS"));
        }

        let command_names: Vec<String> = split_list(&env_or("COMMAND_NAME", "!gpt"))
            .into_iter()
            .map(|c| c.to_lowercase())
            .collect();

        let owner = env_or("CHANNEL_OWNER", "gaufregentille").to_lowercase();

        let tracked_users: Vec<String> =
            split_list(&env_or("TRACKED_USERS", "garryaulait,pandibullee,gaufregentille"))
                .into_iter()
                .map(|u| u.to_lowercase())
                .collect();

        let config = Self {
            username,
            oauth_token,
            channels,
            command_names,
            owner,
            tracked_users,
            send_username: env_flag("SEND_USERNAME", true),
            enable_tts: env_flag("ENABLE_TTS", false),
            enable_channel_points: env_flag("ENABLE_CHANNEL_POINTS", false),
            llm_cooldown_secs: env_number("COOLDOWN_DURATION", 10),
            reaction_cooldown_secs: env_number("USER_REACTION_COOLDOWN", 120),
            slot_cooldown_secs: env_number("SLOT_COOLDOWN", 900),
            fact_cooldown_secs: env_number("FACT_COOLDOWN", 1200),
            openai_api_key,
            model_name: env_or("MODEL_NAME", "gpt-3.5-turbo"),
            history_length: env_number("HISTORY_LENGTH", 5) as usize,
            twitch_client_id: env::var("TWITCH_CLIENT_ID").ok(),
            twitch_client_secret: env::var("TWITCH_CLIENT_SECRET").ok(),
            credits_file: env_or("CREDITS_FILE", "user_credits.json"),
            emotes_file: env_or("EMOTES_FILE", "emotes.yaml"),
        };

        info!(
            "Loaded config for bot '{}' on {} channel(s), commands {:?}",
            config.username,
            config.channels.len(),
            config.command_names
        );
        debug!("Channels: {:?}", config.channels);

        Ok(config)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Accepts "true"/"false" the way the original env files spelled them.
fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => value.trim().eq_ignore_ascii_case("true"),
        Err(_) => default,
    }
}

fn env_number(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parse a comma-separated list, trimming entries and dropping empties.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_drops_empties() {
        assert_eq!(
            split_list(" gaufregentille, garryaulait ,,"),
            vec!["gaufregentille".to_string(), "garryaulait".to_string()]
        );
        assert!(split_list("").is_empty());
    }
}
