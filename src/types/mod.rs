// src/types/mod.rs - Message types that flow through the bot

use serde::{Deserialize, Serialize};

/// One chat message as parsed from the platform connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub channel: String,
    pub username: String,
    pub display_name: Option<String>,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub user_badges: Vec<String>,
    pub is_mod: bool,
    pub is_subscriber: bool,
    /// Message sent by the bot's own account. The dispatcher skips these,
    /// otherwise the bot would answer itself in a loop.
    pub is_self: bool,
    /// IRC `custom-reward-id` tag, present when the message came in through
    /// a channel-point redemption.
    pub reward_id: Option<String>,
    /// Bits attached to the message, if any.
    pub bits: Option<u64>,
}

impl ChatMessage {
    /// Build a bare message for a given user and text. Real traffic comes
    /// from the IRC parser; this is for tests and internal plumbing.
    pub fn simple(channel: &str, username: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            username: username.to_string(),
            display_name: None,
            content: content.to_string(),
            timestamp: chrono::Utc::now(),
            user_badges: Vec::new(),
            is_mod: false,
            is_subscriber: false,
            is_self: false,
            reward_id: None,
            bits: None,
        }
    }
}
