// src/bot/dispatcher.rs - Routes each chat message to at most one action

use anyhow::{Context, Result};
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{sleep, Duration, Instant};

use crate::bot::credit_commands::CreditCommands;
use crate::bot::credits::CreditsLedger;
use crate::bot::emotes::EmoteFilter;
use crate::bot::facts::FactBroadcaster;
use crate::config::{BotConfig, CHUNK_STAGGER_MS, MAX_MESSAGE_LENGTH, NAME_TRIGGERS};
use crate::openai::OpenAiClient;
use crate::types::ChatMessage;

/// Where the TTS toggle drops its audio.
const TTS_FILE: &str = "public/file.mp3";

/// The message handler. Matching is first-match-wins: explicit commands,
/// then bot-name triggers, then the tracked-user reaction, then the
/// generic LLM prefix, then channel-point redemptions.
pub struct Dispatcher {
    openai: Arc<OpenAiClient>,
    emotes: Arc<EmoteFilter>,
    facts: Arc<FactBroadcaster>,
    credits: CreditCommands,
    command_names: Vec<String>,
    tracked_users: Vec<String>,
    send_username: bool,
    enable_tts: bool,
    enable_channel_points: bool,
    /// One shared limiter across every LLM-backed action, armed each time
    /// an LLM reply goes out. Deliberately not per-user or per-channel.
    llm_cooldown: Duration,
    last_llm_reply: RwLock<Option<Instant>>,
    /// Per-username limiter for the passive reaction rule, so frequent
    /// chatters do not get a reply to every single line.
    reaction_cooldown: Duration,
    last_reactions: RwLock<HashMap<String, Instant>>,
}

impl Dispatcher {
    pub fn new(
        config: &BotConfig,
        openai: Arc<OpenAiClient>,
        ledger: Arc<CreditsLedger>,
        emotes: Arc<EmoteFilter>,
        facts: Arc<FactBroadcaster>,
    ) -> Self {
        Self {
            openai,
            emotes,
            facts,
            credits: CreditCommands::new(ledger, config.owner.clone(), config.slot_cooldown_secs),
            command_names: config.command_names.clone(),
            tracked_users: config.tracked_users.clone(),
            send_username: config.send_username,
            enable_tts: config.enable_tts,
            enable_channel_points: config.enable_channel_points,
            llm_cooldown: Duration::from_secs(config.llm_cooldown_secs),
            last_llm_reply: RwLock::new(None),
            reaction_cooldown: Duration::from_secs(config.reaction_cooldown_secs),
            last_reactions: RwLock::new(HashMap::new()),
        }
    }

    /// Handle one incoming message, performing at most one action.
    pub async fn handle(
        &self,
        message: &ChatMessage,
        sender: &mpsc::Sender<(String, String)>,
    ) -> Result<()> {
        if message.is_self {
            return Ok(());
        }

        let lower = message.content.to_lowercase();

        if lower.starts_with("!fact") {
            return self.handle_fact(message, sender).await;
        }

        if lower.starts_with("!conseil") {
            let prompt = format!(
                "Tu es Gaufromatic. Donne un conseil inutile mais assuré à {}.",
                message.username
            );
            return self.llm_reply(message, &prompt, true, false, sender).await;
        }

        if self.credits.process_message(&lower, message, sender).await? {
            return Ok(());
        }

        if NAME_TRIGGERS.iter().any(|trigger| lower.starts_with(trigger)) {
            let prompt = format!("Tu es Gaufromatic. Réagis à ce message : {}", message.content);
            return self.llm_reply(message, &prompt, true, false, sender).await;
        }

        if self.tracked_users.contains(&message.username.to_lowercase()) {
            // Both limiters stay silent here: nobody asked the bot anything
            if self.llm_cooldown_remaining().await.is_some() {
                return Ok(());
            }
            if !self.claim_reaction_slot(&message.username).await {
                debug!("Reaction to {} suppressed by cooldown", message.username);
                return Ok(());
            }
            let prompt = format!(
                "Tu es Gaufromatic. Réagis au message de {} : {}",
                message.username, message.content
            );
            return self.llm_reply(message, &prompt, false, false, sender).await;
        }

        if let Some(text) = self.strip_command_prefix(&message.content) {
            let prompt = if self.send_username {
                format!("{} : {}", message.username, text)
            } else {
                text.to_string()
            };
            return self.llm_reply(message, &prompt, true, true, sender).await;
        }

        if self.enable_channel_points && message.reward_id.is_some() {
            let prompt = if self.send_username {
                format!("{} : {}", message.username, message.content)
            } else {
                message.content.clone()
            };
            return self.llm_reply(message, &prompt, true, true, sender).await;
        }

        Ok(())
    }

    /// `!fact`: skips the live gate, keeps the time gate.
    async fn handle_fact(
        &self,
        message: &ChatMessage,
        sender: &mpsc::Sender<(String, String)>,
    ) -> Result<()> {
        if let Some(remaining) = self.facts.remaining().await {
            let response = format!(
                "⏳ Pas si vite ! Prochain fait inutile dans {:.1}s.",
                remaining.as_secs_f64()
            );
            sender
                .send((message.channel.clone(), response))
                .await
                .context("Response channel closed")?;
            return Ok(());
        }

        // Fire and forget so a slow fact API never stalls the chat loop
        let facts = Arc::clone(&self.facts);
        let sender = sender.clone();
        let channel = message.channel.clone();
        tokio::spawn(async move {
            if let Err(e) = facts.broadcast(&channel, &sender).await {
                error!("Manual fact broadcast failed: {}", e);
            }
        });
        Ok(())
    }

    /// Run one LLM-backed action: shared cooldown, completion call,
    /// sanitize/expand/append formatting, chunked send.
    async fn llm_reply(
        &self,
        message: &ChatMessage,
        prompt: &str,
        announce_cooldown: bool,
        with_tts: bool,
        sender: &mpsc::Sender<(String, String)>,
    ) -> Result<()> {
        if let Some(remaining) = self.llm_cooldown_remaining().await {
            if announce_cooldown {
                let response = format!(
                    "⏳ Doucement ! Encore {:.1}s avant ma prochaine réponse.",
                    remaining.as_secs_f64()
                );
                sender
                    .send((message.channel.clone(), response))
                    .await
                    .context("Response channel closed")?;
            }
            return Ok(());
        }

        let response = match self.openai.complete(prompt).await {
            Ok(response) => response,
            Err(e) => {
                // Chat never sees completion failures, only the operator
                error!("Completion failed for {}: {:#}", message.username, e);
                return Ok(());
            }
        };

        let formatted = self
            .emotes
            .append_random(&self.emotes.expand(&self.emotes.sanitize(&response)));

        self.send_chunked(&message.channel, &formatted, sender).await?;
        *self.last_llm_reply.write().await = Some(Instant::now());
        info!("Replied to {} in #{}", message.username, message.channel);

        if with_tts && self.enable_tts {
            let openai = Arc::clone(&self.openai);
            tokio::spawn(async move {
                if let Err(e) = openai.speech(&formatted, TTS_FILE).await {
                    error!("TTS synthesis failed: {:#}", e);
                }
            });
        }

        Ok(())
    }

    /// Split an over-long reply at the protocol limit and stagger the
    /// chunks instead of truncating.
    async fn send_chunked(
        &self,
        channel: &str,
        text: &str,
        sender: &mpsc::Sender<(String, String)>,
    ) -> Result<()> {
        for (i, chunk) in split_for_chat(text, MAX_MESSAGE_LENGTH).into_iter().enumerate() {
            if i > 0 {
                sleep(Duration::from_millis(CHUNK_STAGGER_MS)).await;
            }
            sender
                .send((channel.to_string(), chunk))
                .await
                .context("Response channel closed")?;
        }
        Ok(())
    }

    async fn llm_cooldown_remaining(&self) -> Option<Duration> {
        let last_reply = (*self.last_llm_reply.read().await)?;
        self.llm_cooldown
            .checked_sub(last_reply.elapsed())
            .filter(|d| !d.is_zero())
    }

    /// Check-and-arm the per-user reaction limiter. Returns false when the
    /// user was reacted to too recently.
    async fn claim_reaction_slot(&self, username: &str) -> bool {
        let mut reactions = self.last_reactions.write().await;
        if let Some(last) = reactions.get(username) {
            if last.elapsed() < self.reaction_cooldown {
                return false;
            }
        }
        reactions.insert(username.to_string(), Instant::now());
        true
    }

    /// Strip the generic command prefix (`!gpt` by default),
    /// case-insensitively, returning the remaining query text.
    fn strip_command_prefix<'a>(&self, content: &'a str) -> Option<&'a str> {
        for command in &self.command_names {
            if let Some(head) = content.get(..command.len()) {
                if head.eq_ignore_ascii_case(command) {
                    return Some(content[command.len()..].trim());
                }
            }
        }
        None
    }
}

/// Cut `text` into consecutive chunks of at most `max_chars` characters
/// (not bytes: replies are mostly French and full of emotes).
fn split_for_chat(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::emotes::EmoteConfig;
    use tempfile::tempdir;

    fn test_config() -> BotConfig {
        BotConfig {
            username: "gaufromatic".to_string(),
            oauth_token: "oauth:test".to_string(),
            channels: vec!["gaufregentille".to_string()],
            command_names: vec!["!gpt".to_string()],
            owner: "gaufregentille".to_string(),
            tracked_users: vec!["garryaulait".to_string()],
            send_username: true,
            enable_tts: false,
            enable_channel_points: false,
            llm_cooldown_secs: 10,
            reaction_cooldown_secs: 120,
            slot_cooldown_secs: 900,
            fact_cooldown_secs: 1200,
            openai_api_key: "sk-test".to_string(),
            model_name: "gpt-3.5-turbo".to_string(),
            history_length: 5,
            twitch_client_id: None,
            twitch_client_secret: None,
            credits_file: "unused".to_string(),
            emotes_file: "unused".to_string(),
        }
    }

    fn dispatcher_in(dir: &tempfile::TempDir) -> Dispatcher {
        let config = test_config();
        let openai = Arc::new(OpenAiClient::new(
            config.openai_api_key.clone(),
            config.model_name.clone(),
            String::new(),
            config.history_length,
        ));
        let ledger = Arc::new(CreditsLedger::load(dir.path().join("credits.json")).unwrap());
        let emotes = Arc::new(EmoteFilter::from_config(EmoteConfig::default()).unwrap());
        let facts = Arc::new(FactBroadcaster::new(
            Arc::clone(&openai),
            "gaufregentille".to_string(),
            config.fact_cooldown_secs,
            None,
            None,
        ));
        Dispatcher::new(&config, openai, ledger, emotes, facts)
    }

    #[tokio::test]
    async fn own_messages_are_ignored() {
        let dir = tempdir().unwrap();
        let dispatcher = dispatcher_in(&dir);
        let (tx, mut rx) = mpsc::channel(16);

        let mut message = ChatMessage::simple("gaufregentille", "gaufromatic", "!gaufrettes");
        message.is_self = true;

        dispatcher.handle(&message, &tx).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn explicit_commands_win_over_the_tracked_user_rule() {
        let dir = tempdir().unwrap();
        let dispatcher = dispatcher_in(&dir);
        let (tx, mut rx) = mpsc::channel(16);

        // garryaulait is tracked, but !gaufrettes must still route to the
        // ledger, not to a spontaneous LLM reaction
        let message = ChatMessage::simple("gaufregentille", "garryaulait", "!gaufrettes");
        dispatcher.handle(&message, &tx).await.unwrap();

        let (channel, reply) = rx.recv().await.unwrap();
        assert_eq!(channel, "gaufregentille");
        assert_eq!(reply, "🧇 garryaulait, tu as 100 gaufrettes.");
    }

    #[tokio::test]
    async fn generic_command_on_cooldown_gets_a_wait_reply() {
        let dir = tempdir().unwrap();
        let dispatcher = dispatcher_in(&dir);
        let (tx, mut rx) = mpsc::channel(16);

        *dispatcher.last_llm_reply.write().await = Some(Instant::now());

        let message = ChatMessage::simple("gaufregentille", "bob", "!gpt raconte une blague");
        dispatcher.handle(&message, &tx).await.unwrap();

        let (_, reply) = rx.recv().await.unwrap();
        assert!(reply.starts_with("⏳ Doucement !"), "reply: {}", reply);
    }

    #[tokio::test]
    async fn tracked_user_on_reaction_cooldown_is_silent() {
        let dir = tempdir().unwrap();
        let dispatcher = dispatcher_in(&dir);
        let (tx, mut rx) = mpsc::channel(16);

        // First reaction slot is claimed; the follow-up message inside the
        // window must produce nothing at all
        assert!(dispatcher.claim_reaction_slot("garryaulait").await);

        let message = ChatMessage::simple("gaufregentille", "garryaulait", "je chatte beaucoup");
        dispatcher.handle(&message, &tx).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unmatched_messages_produce_no_reply() {
        let dir = tempdir().unwrap();
        let dispatcher = dispatcher_in(&dir);
        let (tx, mut rx) = mpsc::channel(16);

        let message = ChatMessage::simple("gaufregentille", "bob", "bonjour tout le monde");
        dispatcher.handle(&message, &tx).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn prefix_stripping_is_case_insensitive_and_trims() {
        let dir = tempdir().unwrap();
        let dispatcher = dispatcher_in(&dir);
        assert_eq!(dispatcher.strip_command_prefix("!GPT  salut  "), Some("salut"));
        assert_eq!(dispatcher.strip_command_prefix("!gptsalut"), Some("salut"));
        assert_eq!(dispatcher.strip_command_prefix("salut !gpt"), None);
    }

    #[test]
    fn long_replies_split_at_the_protocol_limit() {
        let text = "a".repeat(MAX_MESSAGE_LENGTH * 2 + 1);
        let chunks = split_for_chat(&text, MAX_MESSAGE_LENGTH);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), MAX_MESSAGE_LENGTH);
        assert_eq!(chunks[1].len(), MAX_MESSAGE_LENGTH);
        assert_eq!(chunks[2].len(), 1);
    }

    #[test]
    fn splitting_counts_characters_not_bytes() {
        // 400 two-byte characters: one full chunk plus one leftover
        let text = "é".repeat(MAX_MESSAGE_LENGTH + 1);
        let chunks = split_for_chat(&text, MAX_MESSAGE_LENGTH);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), MAX_MESSAGE_LENGTH);
        assert_eq!(chunks[1], "é");
    }
}
