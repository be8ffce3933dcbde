// src/openai/mod.rs - Chat-completion client with a bounded rolling history

use anyhow::{Context, Result};
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";
const SPEECH_MODEL: &str = "tts-1";
const SPEECH_VOICE: &str = "alloy";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

impl WireMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Serialize)]
struct SpeechRequest {
    model: String,
    voice: String,
    input: String,
}

/// One-call-at-a-time client for the chat-completions API. Keeps the last
/// `history_length` exchanges as rolling context on top of a fixed system
/// prompt, the same way every iteration of the bot has.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
    system_context: String,
    history_length: usize,
    history: RwLock<VecDeque<(String, String)>>,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String, system_context: String, history_length: usize) -> Self {
        info!("Completion client ready (model {}, history {})", model, history_length);
        Self {
            client: Client::new(),
            api_key,
            model,
            system_context,
            history_length,
            history: RwLock::new(VecDeque::new()),
        }
    }

    /// Single-turn completion. The prompt and the reply are appended to the
    /// rolling history afterwards.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let messages = {
            let history = self.history.read().await;
            self.build_messages(&history, prompt)
        };

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: 1.0,
        };

        debug!("Completion request for prompt: {}", prompt);

        let response = self
            .client
            .post(COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Completion request failed")?
            .error_for_status()
            .context("Completion API returned an error status")?
            .json::<ChatResponse>()
            .await
            .context("Could not parse completion response")?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("Completion response contained no choices")?;

        {
            let mut history = self.history.write().await;
            Self::push_history(&mut history, self.history_length, prompt, &reply);
        }

        Ok(reply)
    }

    /// Synthesize `text` to an mp3 at `path` (the TTS toggle).
    pub async fn speech(&self, text: &str, path: &str) -> Result<()> {
        let request = SpeechRequest {
            model: SPEECH_MODEL.to_string(),
            voice: SPEECH_VOICE.to_string(),
            input: text.to_string(),
        };

        let bytes = self
            .client
            .post(SPEECH_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Speech request failed")?
            .error_for_status()
            .context("Speech API returned an error status")?
            .bytes()
            .await
            .context("Could not read speech response body")?;

        tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("Failed to write speech file: {}", path))?;

        debug!("Wrote {} bytes of speech to {}", bytes.len(), path);
        Ok(())
    }

    /// System context first, then the remembered exchanges oldest-first,
    /// then the new prompt.
    fn build_messages(&self, history: &VecDeque<(String, String)>, prompt: &str) -> Vec<WireMessage> {
        let mut messages = Vec::with_capacity(history.len() * 2 + 2);
        if !self.system_context.is_empty() {
            messages.push(WireMessage::new("system", &self.system_context));
        }
        for (user, assistant) in history {
            messages.push(WireMessage::new("user", user));
            messages.push(WireMessage::new("assistant", assistant));
        }
        messages.push(WireMessage::new("user", prompt));
        messages
    }

    fn push_history(
        history: &mut VecDeque<(String, String)>,
        history_length: usize,
        prompt: &str,
        reply: &str,
    ) {
        history.push_back((prompt.to_string(), reply.to_string()));
        while history.len() > history_length {
            history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiClient {
        OpenAiClient::new(
            "sk-test".to_string(),
            "gpt-3.5-turbo".to_string(),
            "Tu es Gaufromatic.".to_string(),
            5,
        )
    }

    #[test]
    fn build_messages_orders_context_history_prompt() {
        let client = client();
        let mut history = VecDeque::new();
        history.push_back(("salut".to_string(), "Salut toi Kappa".to_string()));

        let messages = client.build_messages(&history, "raconte une blague");
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages[0].content, "Tu es Gaufromatic.");
        assert_eq!(messages[3].content, "raconte une blague");
    }

    #[test]
    fn empty_system_context_is_omitted() {
        let client = OpenAiClient::new(
            "sk-test".to_string(),
            "gpt-3.5-turbo".to_string(),
            String::new(),
            5,
        );
        let messages = client.build_messages(&VecDeque::new(), "coucou");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn history_is_bounded() {
        let mut history = VecDeque::new();
        for i in 0..8 {
            OpenAiClient::push_history(&mut history, 5, &format!("q{}", i), &format!("a{}", i));
        }
        assert_eq!(history.len(), 5);
        // Oldest exchanges are the ones dropped
        assert_eq!(history.front().map(|(q, _)| q.as_str()), Some("q3"));
        assert_eq!(history.back().map(|(q, _)| q.as_str()), Some("q7"));
    }
}
