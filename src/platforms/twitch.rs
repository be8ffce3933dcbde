use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::platforms::PlatformConnection;
use crate::types::ChatMessage;

// Type aliases for cleaner code
type WebSocketWriter = Arc<RwLock<futures_util::stream::SplitSink<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>, Message>>>;

const TWITCH_IRC_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Configuration for the Twitch IRC connection
#[derive(Debug, Clone)]
pub struct TwitchConfig {
    pub username: String,
    pub oauth_token: String, // oauth:your_token_here
    pub channels: Vec<String>,
}

/// Everything the IRC parser can hand back to the reader task.
enum IrcEvent {
    /// A regular chat message, ready for the dispatcher.
    Message(ChatMessage),
    /// A sub/resub/cheer event with the thank-you reply to post.
    Celebration { channel: String, reply: String },
}

/// Twitch IRC connection over WebSocket
pub struct TwitchConnection {
    config: TwitchConfig,
    message_sender: Option<broadcast::Sender<ChatMessage>>,
    websocket_writer: Option<WebSocketWriter>,
    is_connected: Arc<RwLock<bool>>,
}

impl TwitchConnection {
    pub fn new(config: TwitchConfig) -> Self {
        Self {
            config,
            message_sender: None,
            websocket_writer: None,
            is_connected: Arc::new(RwLock::new(false)),
        }
    }

    /// Send one raw IRC command through the writer, logging failures.
    async fn send_raw(&self, raw: String) -> Result<()> {
        if let Some(writer) = &self.websocket_writer {
            writer
                .write()
                .await
                .send(Message::Text(raw))
                .await
                .context("Failed to send IRC command")?;
            Ok(())
        } else {
            Err(anyhow::anyhow!("Not connected to Twitch"))
        }
    }
}

#[async_trait]
impl PlatformConnection for TwitchConnection {
    async fn connect(&mut self) -> Result<()> {
        info!("Connecting to Twitch IRC...");

        let url = Url::parse(TWITCH_IRC_URL).context("Failed to parse Twitch WebSocket URL")?;

        let (ws_stream, _) = connect_async(url)
            .await
            .context("Failed to connect to Twitch WebSocket")?;

        let (write, read) = ws_stream.split();

        let writer_arc: WebSocketWriter = Arc::new(RwLock::new(write));
        let writer_for_reader = Arc::clone(&writer_arc);
        self.websocket_writer = Some(Arc::clone(&writer_arc));

        // Authenticate, then request tags so messages carry badges, bits
        // and reward ids
        let handshake = [
            format!("PASS {}\r\n", self.config.oauth_token),
            format!("NICK {}\r\n", self.config.username),
            "CAP REQ :twitch.tv/tags twitch.tv/commands\r\n".to_string(),
        ];
        for line in handshake {
            writer_arc
                .write()
                .await
                .send(Message::Text(line))
                .await
                .context("Failed to authenticate with Twitch")?;
        }

        for channel in &self.config.channels {
            let join_msg = format!("JOIN #{}\r\n", channel);
            writer_arc
                .write()
                .await
                .send(Message::Text(join_msg))
                .await
                .with_context(|| format!("Failed to join channel: {}", channel))?;
            info!("Joined channel: #{}", channel);
        }

        let (tx, _) = broadcast::channel(1000);
        self.message_sender = Some(tx.clone());

        *self.is_connected.write().await = true;

        let message_sender = tx;
        let is_connected = Arc::clone(&self.is_connected);
        let self_nick = self.config.username.to_lowercase();

        tokio::spawn(async move {
            let mut read = read;
            info!("Twitch message reader started");

            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received: {}", text);

                        for line in text.split("\r\n").map(str::trim).filter(|l| !l.is_empty()) {
                            // Keepalive
                            if line.starts_with("PING") {
                                let pong = format!("{}\r\n", line.replacen("PING", "PONG", 1));
                                if let Err(e) =
                                    writer_for_reader.write().await.send(Message::Text(pong)).await
                                {
                                    error!("Failed to send PONG: {}", e);
                                }
                                continue;
                            }

                            match parse_irc_line(line, &self_nick) {
                                Some(IrcEvent::Message(chat_msg)) => {
                                    debug!(
                                        "Parsed message from {}: {}",
                                        chat_msg.username, chat_msg.content
                                    );
                                    if let Err(e) = message_sender.send(chat_msg) {
                                        warn!("Failed to broadcast message: {}", e);
                                    }
                                }
                                Some(IrcEvent::Celebration { channel, reply }) => {
                                    let privmsg =
                                        format!("PRIVMSG #{} :{}\r\n", channel, reply);
                                    if let Err(e) = writer_for_reader
                                        .write()
                                        .await
                                        .send(Message::Text(privmsg))
                                        .await
                                    {
                                        error!("Failed to send celebration reply: {}", e);
                                    }
                                }
                                None => {}
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) =
                            writer_for_reader.write().await.send(Message::Pong(payload)).await
                        {
                            error!("Failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(close_frame))) => {
                        info!("WebSocket connection closed: {:?}", close_frame);
                        break;
                    }
                    Some(Ok(_)) => {
                        debug!("Ignoring non-text frame");
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        warn!("WebSocket stream ended");
                        break;
                    }
                }
            }

            *is_connected.write().await = false;
            warn!("Twitch connection handler exited");
        });

        info!("Successfully connected to Twitch IRC");
        Ok(())
    }

    async fn send_message(&self, channel: &str, message: &str) -> Result<()> {
        let privmsg = format!("PRIVMSG #{} :{}\r\n", channel, message);
        self.send_raw(privmsg).await?;
        debug!("Sent message to #{}: {}", channel, message);
        Ok(())
    }

    async fn whisper(&self, username: &str, message: &str) -> Result<()> {
        // Whispers ride on a regular channel, tmi-style
        let channel = self
            .config
            .channels
            .first()
            .context("No channel available for whisper")?;
        self.send_raw(format!("PRIVMSG #{} :/w {} {}\r\n", channel, username, message))
            .await
    }

    async fn ban(&self, channel: &str, username: &str, reason: &str) -> Result<()> {
        self.send_raw(format!("PRIVMSG #{} :/ban {} {}\r\n", channel, username, reason))
            .await
    }

    async fn unban(&self, channel: &str, username: &str) -> Result<()> {
        self.send_raw(format!("PRIVMSG #{} :/unban {}\r\n", channel, username))
            .await
    }

    async fn clear(&self, channel: &str) -> Result<()> {
        self.send_raw(format!("PRIVMSG #{} :/clear\r\n", channel)).await
    }

    async fn is_connected(&self) -> bool {
        *self.is_connected.read().await
    }

    fn get_message_receiver(&self) -> Option<broadcast::Receiver<ChatMessage>> {
        self.message_sender.as_ref().map(|sender| sender.subscribe())
    }

    fn get_channels(&self) -> Vec<String> {
        self.config.channels.clone()
    }

    async fn disconnect(&mut self) -> Result<()> {
        *self.is_connected.write().await = false;
        self.websocket_writer = None;
        self.message_sender = None;
        info!("Disconnected from Twitch");
        Ok(())
    }
}

/// Parse one IRC line into an event the reader task can act on.
fn parse_irc_line(line: &str, self_nick: &str) -> Option<IrcEvent> {
    if line.contains(" PRIVMSG ") {
        let message = parse_privmsg(line, self_nick)?;
        if let Some(bits) = message.bits {
            if bits > 0 {
                return Some(IrcEvent::Celebration {
                    channel: message.channel.clone(),
                    reply: format!(
                        "✨ {} a lâché {} bits ! C'est pas des miettes !",
                        message.username, bits
                    ),
                });
            }
        }
        return Some(IrcEvent::Message(message));
    }

    if line.contains(" USERNOTICE ") {
        return parse_usernotice(line);
    }

    None
}

/// Parse the IRCv3 tag block into a key/value map.
/// Format: `@badges=...;display-name=...;mod=1 :rest of the line`
fn split_tags(line: &str) -> (HashMap<&str, &str>, &str) {
    let mut tags = HashMap::new();
    let rest = match line.strip_prefix('@') {
        Some(tagged) => {
            let (tag_block, rest) = tagged.split_once(' ').unwrap_or((tagged, ""));
            for tag in tag_block.split(';') {
                if let Some((key, value)) = tag.split_once('=') {
                    tags.insert(key, value);
                }
            }
            rest
        }
        None => line,
    };
    (tags, rest)
}

/// Parse a PRIVMSG line into a ChatMessage.
/// Format: `@tags :user!user@host PRIVMSG #channel :message`
fn parse_privmsg(line: &str, self_nick: &str) -> Option<ChatMessage> {
    let (tags, rest) = split_tags(line);
    let rest = rest.strip_prefix(':')?;

    let (prefix, rest) = rest.split_once(" PRIVMSG ")?;
    let username = prefix.split('!').next()?.to_string();
    if username.is_empty() {
        debug!("PRIVMSG without username: {}", line);
        return None;
    }

    let (channel, content) = rest.split_once(" :")?;

    let display_name = tags
        .get("display-name")
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string());
    let badges: Vec<String> = tags
        .get("badges")
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.split(',')
                .filter_map(|b| b.split('/').next())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Some(ChatMessage {
        channel: channel.trim_start_matches('#').to_string(),
        is_self: username.eq_ignore_ascii_case(self_nick),
        username,
        display_name,
        content: content.to_string(),
        timestamp: chrono::Utc::now(),
        user_badges: badges,
        is_mod: tags.get("mod") == Some(&"1"),
        is_subscriber: tags.get("subscriber") == Some(&"1"),
        reward_id: tags
            .get("custom-reward-id")
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string()),
        bits: tags.get("bits").and_then(|v| v.parse().ok()),
    })
}

/// Parse a USERNOTICE line (subs and resubs) into the thank-you to post.
/// Format: `@tags :tmi.twitch.tv USERNOTICE #channel[ :message]`
fn parse_usernotice(line: &str) -> Option<IrcEvent> {
    let (tags, rest) = split_tags(line);
    let rest = rest.strip_prefix(':')?;

    let (_, rest) = rest.split_once(" USERNOTICE ")?;
    let channel = rest
        .split_once(" :")
        .map(|(c, _)| c)
        .unwrap_or(rest)
        .trim()
        .trim_start_matches('#')
        .to_string();

    let username = tags.get("login").filter(|v| !v.is_empty())?;

    let reply = match tags.get("msg-id").copied() {
        Some("sub") => format!(
            "Merci {} pour ton abonnement ! Tu viens de faire pleurer une gaufre.",
            username
        ),
        Some("resub") => {
            let months = tags
                .get("msg-param-cumulative-months")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(1);
            format!(
                "Merci {} pour {} mois de soutien ! Tu dois aimer les gaufres au suk.",
                username, months
            )
        }
        _ => return None,
    };

    Some(IrcEvent::Celebration { channel, reply })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PRIVMSG: &str = "@badges=broadcaster/1;display-name=GaufreGentille;mod=0;subscriber=1 :gaufregentille!gaufregentille@gaufregentille.tmi.twitch.tv PRIVMSG #gaufregentille :!slot";

    #[test]
    fn parses_tagged_privmsg() {
        let msg = parse_privmsg(SAMPLE_PRIVMSG, "gaufromatic").unwrap();
        assert_eq!(msg.channel, "gaufregentille");
        assert_eq!(msg.username, "gaufregentille");
        assert_eq!(msg.display_name.as_deref(), Some("GaufreGentille"));
        assert_eq!(msg.content, "!slot");
        assert!(msg.is_subscriber);
        assert!(!msg.is_mod);
        assert!(!msg.is_self);
        assert!(msg.user_badges.contains(&"broadcaster".to_string()));
    }

    #[test]
    fn flags_own_messages_as_self() {
        let line = "@display-name=Gaufromatic :gaufromatic!gaufromatic@gaufromatic.tmi.twitch.tv PRIVMSG #gaufregentille :coucou";
        let msg = parse_privmsg(line, "gaufromatic").unwrap();
        assert!(msg.is_self);
    }

    #[test]
    fn privmsg_with_bits_becomes_cheer_reply() {
        let line = "@bits=250;display-name=Garry :garryaulait!garryaulait@garryaulait.tmi.twitch.tv PRIVMSG #gaufregentille :cheer250 gg";
        match parse_irc_line(line, "gaufromatic") {
            Some(IrcEvent::Celebration { channel, reply }) => {
                assert_eq!(channel, "gaufregentille");
                assert!(reply.contains("garryaulait"));
                assert!(reply.contains("250 bits"));
            }
            _ => panic!("expected a cheer reply"),
        }
    }

    #[test]
    fn usernotice_resub_thanks_with_months() {
        let line = "@login=pandibullee;msg-id=resub;msg-param-cumulative-months=7 :tmi.twitch.tv USERNOTICE #gaufregentille :toujours là";
        match parse_irc_line(line, "gaufromatic") {
            Some(IrcEvent::Celebration { channel, reply }) => {
                assert_eq!(channel, "gaufregentille");
                assert!(reply.contains("pandibullee"));
                assert!(reply.contains("7 mois"));
            }
            _ => panic!("expected a resub reply"),
        }
    }

    #[test]
    fn ignores_unrelated_lines() {
        assert!(parse_irc_line(":tmi.twitch.tv 376 gaufromatic :>", "gaufromatic").is_none());
        assert!(parse_irc_line("@msg-id=raid :tmi.twitch.tv USERNOTICE #gaufregentille", "gaufromatic").is_none());
    }

    #[test]
    fn channel_point_redemption_carries_reward_id() {
        let line = "@custom-reward-id=abc-123;display-name=Pandi :pandibullee!pandibullee@pandibullee.tmi.twitch.tv PRIVMSG #gaufregentille :raconte une blague";
        let msg = parse_privmsg(line, "gaufromatic").unwrap();
        assert_eq!(msg.reward_id.as_deref(), Some("abc-123"));
    }
}
