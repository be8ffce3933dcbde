// src/bot/facts.rs - Periodic useless-fact broadcasts, translated by the LLM

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Duration, Instant};

use crate::openai::OpenAiClient;

const FACT_URL: &str = "https://uselessfacts.jsph.pl/api/v2/facts/random?language=en";
const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const STREAMS_URL: &str = "https://api.twitch.tv/helix/streams";

/// How often the automatic task wakes up to see whether a broadcast is due.
const TICK_SECS: u64 = 60;

#[derive(Deserialize)]
struct UselessFact {
    text: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct StreamsResponse {
    data: Vec<serde_json::Value>,
}

/// Helix client-credentials client used only for the live/offline check.
/// The token is fetched lazily on first use and cached for the process
/// lifetime.
struct HelixClient {
    http: Client,
    client_id: String,
    client_secret: String,
    token: RwLock<Option<String>>,
}

impl HelixClient {
    async fn token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }

        let url = format!(
            "{}?client_id={}&client_secret={}&grant_type=client_credentials",
            TOKEN_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.client_secret)
        );
        let response = self
            .http
            .post(url)
            .send()
            .await
            .context("Twitch token request failed")?
            .error_for_status()
            .context("Twitch token endpoint returned an error status")?
            .json::<TokenResponse>()
            .await
            .context("Could not parse Twitch token response")?;

        *self.token.write().await = Some(response.access_token.clone());
        debug!("Fetched Helix app access token");
        Ok(response.access_token)
    }

    async fn is_live(&self, login: &str) -> Result<bool> {
        let token = self.token().await?;
        let url = format!("{}?user_login={}", STREAMS_URL, urlencoding::encode(login));
        let response = self
            .http
            .get(url)
            .header("Client-ID", &self.client_id)
            .bearer_auth(token)
            .send()
            .await
            .context("Helix streams request failed")?
            .error_for_status()
            .context("Helix streams endpoint returned an error status")?
            .json::<StreamsResponse>()
            .await
            .context("Could not parse Helix streams response")?;

        Ok(!response.data.is_empty())
    }
}

/// Fetches a random fact, has the LLM translate it to French and posts it
/// to chat, at most once per cooldown window. The automatic timer only
/// fires while the channel is live; `!fact` skips the live gate.
pub struct FactBroadcaster {
    http: Client,
    openai: Arc<OpenAiClient>,
    /// Broadcast target; also the login used for the live check.
    channel: String,
    cooldown: Duration,
    last_sent: RwLock<Option<Instant>>,
    helix: Option<HelixClient>,
}

impl FactBroadcaster {
    pub fn new(
        openai: Arc<OpenAiClient>,
        channel: String,
        cooldown_secs: u64,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        let helix = match (client_id, client_secret) {
            (Some(client_id), Some(client_secret)) => Some(HelixClient {
                http: Client::new(),
                client_id,
                client_secret,
                token: RwLock::new(None),
            }),
            _ => {
                warn!("No Helix credentials, automatic fact broadcasts disabled");
                None
            }
        };

        Self {
            http: Client::new(),
            openai,
            channel,
            cooldown: Duration::from_secs(cooldown_secs),
            last_sent: RwLock::new(None),
            helix,
        }
    }

    /// Time left before the next broadcast is permitted, if any.
    pub async fn remaining(&self) -> Option<Duration> {
        let last_sent = (*self.last_sent.read().await)?;
        self.cooldown.checked_sub(last_sent.elapsed()).filter(|d| !d.is_zero())
    }

    /// Start the automatic broadcast task.
    pub fn spawn_timer(self: Arc<Self>, sender: mpsc::Sender<(String, String)>) {
        tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(TICK_SECS));
            info!("Fact broadcaster started ({}s cooldown)", self.cooldown.as_secs());
            loop {
                tick.tick().await;
                if let Err(e) = self.tick(&sender).await {
                    error!("Fact broadcast failed: {}", e);
                }
            }
        });
    }

    /// One automatic firing attempt: cooldown gate, then live gate, then
    /// the broadcast itself.
    async fn tick(&self, sender: &mpsc::Sender<(String, String)>) -> Result<()> {
        if self.remaining().await.is_some() {
            return Ok(());
        }
        let Some(helix) = &self.helix else {
            return Ok(());
        };
        if !helix.is_live(&self.channel).await? {
            debug!("{} is offline, skipping fact broadcast", self.channel);
            return Ok(());
        }
        self.broadcast(&self.channel, sender).await
    }

    /// Fetch, translate and post one fact to `channel`. The cooldown stamp
    /// is taken up front so an overlapping trigger cannot double-post.
    pub async fn broadcast(&self, channel: &str, sender: &mpsc::Sender<(String, String)>) -> Result<()> {
        self.mark_sent().await;

        let fact = self
            .http
            .get(FACT_URL)
            .send()
            .await
            .context("Fact request failed")?
            .error_for_status()
            .context("Fact API returned an error status")?
            .json::<UselessFact>()
            .await
            .context("Could not parse fact response")?;

        let prompt = format!(
            "Traduis ce fait inutile en français sans rien ajouter : {}",
            fact.text
        );
        let translated = self.openai.complete(&prompt).await?;

        let reply = format!("🦫 Useless fact : {}", translated.trim());
        sender
            .send((channel.to_string(), reply))
            .await
            .context("Response channel closed")?;

        info!("Posted a useless fact to #{}", channel);
        Ok(())
    }

    async fn mark_sent(&self) {
        *self.last_sent.write().await = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broadcaster(cooldown_secs: u64) -> FactBroadcaster {
        let openai = Arc::new(OpenAiClient::new(
            "sk-test".to_string(),
            "gpt-3.5-turbo".to_string(),
            String::new(),
            5,
        ));
        FactBroadcaster::new(openai, "gaufregentille".to_string(), cooldown_secs, None, None)
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_window_gates_consecutive_broadcasts() {
        let facts = broadcaster(1200);

        assert!(facts.remaining().await.is_none());

        facts.mark_sent().await;
        let remaining = facts.remaining().await.expect("cooldown should be armed");
        assert!(remaining <= Duration::from_secs(1200));

        tokio::time::advance(Duration::from_secs(600)).await;
        let remaining = facts.remaining().await.expect("still inside the window");
        assert_eq!(remaining, Duration::from_secs(600));

        tokio::time::advance(Duration::from_secs(600)).await;
        assert!(facts.remaining().await.is_none());
    }
}
