// src/bot/credit_commands.rs - Chat commands for the gaufrette economy

use anyhow::Result;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{Duration, Instant};

use crate::bot::credits::CreditsLedger;
use crate::bot::slots::{spin, SlotOutcome};
use crate::types::ChatMessage;

const LEADERBOARD_SIZE: usize = 5;

/// Handles every credits-related trigger: the slot machine, balance and
/// leaderboard queries, and the owner-only grant.
pub struct CreditCommands {
    ledger: Arc<CreditsLedger>,
    /// Channel owner, lowercase. The only account allowed to grant credits.
    owner: String,
    slot_cooldown: Duration,
    slot_cooldowns: RwLock<HashMap<String, Instant>>,
}

impl CreditCommands {
    pub fn new(ledger: Arc<CreditsLedger>, owner: String, slot_cooldown_secs: u64) -> Self {
        Self {
            ledger,
            owner: owner.to_lowercase(),
            slot_cooldown: Duration::from_secs(slot_cooldown_secs),
            slot_cooldowns: RwLock::new(HashMap::new()),
        }
    }

    /// Route one lowercased message to a credits action. Returns false when
    /// the message is none of ours.
    pub async fn process_message(
        &self,
        lower: &str,
        message: &ChatMessage,
        response_sender: &mpsc::Sender<(String, String)>,
    ) -> Result<bool> {
        if lower.starts_with("!slot") {
            self.handle_slot(message, response_sender).await?;
            return Ok(true);
        }
        if lower.starts_with("!gaufrettes") || lower.starts_with("!crédits") || lower.starts_with("!credits") {
            self.handle_balance(message, response_sender).await?;
            return Ok(true);
        }
        if lower.starts_with("!classement") {
            self.handle_leaderboard(message, response_sender).await?;
            return Ok(true);
        }
        if lower.starts_with("!ajoutercredits") {
            self.handle_grant(message, response_sender).await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn handle_slot(
        &self,
        message: &ChatMessage,
        response_sender: &mpsc::Sender<(String, String)>,
    ) -> Result<()> {
        // Per-user cooldown: on violation nothing is drawn and the
        // timestamp is left untouched
        {
            let cooldowns = self.slot_cooldowns.read().await;
            if let Some(last_play) = cooldowns.get(&message.username) {
                let remaining = self.slot_cooldown.checked_sub(last_play.elapsed());
                if let Some(remaining) = remaining.filter(|d| !d.is_zero()) {
                    let response = format!(
                        "🎰 Doucement {} ! Tu pourras rejouer dans {:.1}s.",
                        message.username,
                        remaining.as_secs_f64()
                    );
                    self.send_response(response, message, response_sender).await?;
                    return Ok(());
                }
            }
        }

        self.slot_cooldowns
            .write()
            .await
            .insert(message.username.clone(), Instant::now());

        let (reels, outcome) = spin();
        let balance = self.ledger.change(&message.username, outcome.payout()).await;

        let response = match outcome {
            SlotOutcome::Jackpot => format!(
                "🎰 {} {} {} — JACKPOT ! +50 gaufrettes pour {} (solde : {})",
                reels[0], reels[1], reels[2], message.username, balance
            ),
            SlotOutcome::Pair => format!(
                "🎰 {} {} {} — une paire ! +10 gaufrettes (solde : {})",
                reels[0], reels[1], reels[2], balance
            ),
            SlotOutcome::Loss => format!(
                "🎰 {} {} {} — perdu... -10 gaufrettes (solde : {})",
                reels[0], reels[1], reels[2], balance
            ),
        };

        self.send_response(response, message, response_sender).await
    }

    async fn handle_balance(
        &self,
        message: &ChatMessage,
        response_sender: &mpsc::Sender<(String, String)>,
    ) -> Result<()> {
        let balance = self.ledger.balance(&message.username).await;
        let response = format!("🧇 {}, tu as {} gaufrettes.", message.username, balance);
        self.send_response(response, message, response_sender).await
    }

    async fn handle_leaderboard(
        &self,
        message: &ChatMessage,
        response_sender: &mpsc::Sender<(String, String)>,
    ) -> Result<()> {
        let top = self.ledger.top(LEADERBOARD_SIZE).await;

        if top.is_empty() {
            let response = "Personne n'a encore de gaufrettes !".to_string();
            return self.send_response(response, message, response_sender).await;
        }

        let mut response = "🏆 Classement des gaufrettes : ".to_string();
        for (i, (username, balance)) in top.iter().enumerate() {
            if i > 0 {
                response.push_str(" | ");
            }
            response.push_str(&format!("{}. {} — {}", i + 1, username, balance));
        }

        self.send_response(response, message, response_sender).await
    }

    /// `!ajoutercredits <pseudo> <montant>`. Anyone but the owner is
    /// ignored without a reply, as always.
    async fn handle_grant(
        &self,
        message: &ChatMessage,
        response_sender: &mpsc::Sender<(String, String)>,
    ) -> Result<()> {
        if !message.username.eq_ignore_ascii_case(&self.owner) {
            info!(
                "Ignoring credits grant from non-owner '{}'",
                message.username
            );
            return Ok(());
        }

        let mut args = message.content.split_whitespace().skip(1);
        let (target, amount) = match (args.next(), args.next().map(str::parse::<i64>)) {
            (Some(target), Some(Ok(amount))) => (target, amount),
            _ => {
                let response = "Usage : !ajoutercredits <pseudo> <montant>".to_string();
                return self.send_response(response, message, response_sender).await;
            }
        };

        let balance = self.ledger.change(target, amount).await;
        info!("Owner granted {} credits to {}", amount, target);

        let response = format!(
            "✅ {} gaufrettes ajoutées à {} (solde : {})",
            amount, target, balance
        );
        self.send_response(response, message, response_sender).await
    }

    async fn send_response(
        &self,
        response: String,
        message: &ChatMessage,
        response_sender: &mpsc::Sender<(String, String)>,
    ) -> Result<()> {
        if let Err(e) = response_sender
            .send((message.channel.clone(), response))
            .await
        {
            warn!("Failed to send credits command response: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup(dir: &tempfile::TempDir) -> (CreditCommands, mpsc::Receiver<(String, String)>, mpsc::Sender<(String, String)>) {
        let ledger = Arc::new(CreditsLedger::load(dir.path().join("credits.json")).unwrap());
        let commands = CreditCommands::new(ledger, "gaufregentille".to_string(), 900);
        let (tx, rx) = mpsc::channel(16);
        (commands, rx, tx)
    }

    #[tokio::test(start_paused = true)]
    async fn slot_on_cooldown_is_rejected_without_a_draw() {
        let dir = tempdir().unwrap();
        let (commands, mut rx, tx) = setup(&dir);
        let message = ChatMessage::simple("gaufregentille", "bob", "!slot");

        // First play goes through and moves the balance
        assert!(commands.process_message("!slot", &message, &tx).await.unwrap());
        let (_, first_reply) = rx.recv().await.unwrap();
        assert!(first_reply.contains("🎰"));
        let balance_after_play = commands.ledger.balance("bob").await;
        assert_ne!(balance_after_play, 100);

        // Second play 60s later sits inside the 900s window
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(commands.process_message("!slot", &message, &tx).await.unwrap());
        let (_, second_reply) = rx.recv().await.unwrap();
        assert!(second_reply.contains("rejouer dans 840.0s"), "reply: {}", second_reply);
        assert_eq!(commands.ledger.balance("bob").await, balance_after_play);

        // Once the window has passed the wheel spins again
        tokio::time::advance(Duration::from_secs(840)).await;
        assert!(commands.process_message("!slot", &message, &tx).await.unwrap());
        let (_, third_reply) = rx.recv().await.unwrap();
        assert!(third_reply.contains("🎰"));
        assert!(!third_reply.contains("rejouer"));
    }

    #[tokio::test]
    async fn slot_payout_matches_the_announced_outcome() {
        let dir = tempdir().unwrap();
        let (commands, mut rx, tx) = setup(&dir);
        let message = ChatMessage::simple("gaufregentille", "bob", "!slot");

        commands.process_message("!slot", &message, &tx).await.unwrap();
        let (_, reply) = rx.recv().await.unwrap();
        let balance = commands.ledger.balance("bob").await;

        if reply.contains("JACKPOT") {
            assert_eq!(balance, 150);
        } else if reply.contains("paire") {
            assert_eq!(balance, 110);
        } else {
            assert_eq!(balance, 90);
        }
        assert!(reply.contains(&format!("solde : {}", balance)));
    }

    #[tokio::test]
    async fn balance_query_initializes_at_default() {
        let dir = tempdir().unwrap();
        let (commands, mut rx, tx) = setup(&dir);
        let message = ChatMessage::simple("gaufregentille", "bob", "!gaufrettes");

        assert!(commands.process_message("!gaufrettes", &message, &tx).await.unwrap());
        let (_, reply) = rx.recv().await.unwrap();
        assert_eq!(reply, "🧇 bob, tu as 100 gaufrettes.");
    }

    #[tokio::test]
    async fn leaderboard_ranks_descending() {
        let dir = tempdir().unwrap();
        let (commands, mut rx, tx) = setup(&dir);

        commands.ledger.set("alice", 300).await;
        commands.ledger.set("bob", 50).await;
        commands.ledger.set("carol", 120).await;

        let message = ChatMessage::simple("gaufregentille", "bob", "!classement");
        assert!(commands.process_message("!classement", &message, &tx).await.unwrap());
        let (_, reply) = rx.recv().await.unwrap();
        assert_eq!(
            reply,
            "🏆 Classement des gaufrettes : 1. alice — 300 | 2. carol — 120 | 3. bob — 50"
        );
    }

    #[tokio::test]
    async fn owner_grant_changes_balance_and_replies() {
        let dir = tempdir().unwrap();
        let (commands, mut rx, tx) = setup(&dir);
        let message = ChatMessage::simple("gaufregentille", "GaufreGentille", "!ajoutercredits bob 50");

        assert!(commands
            .process_message("!ajoutercredits bob 50", &message, &tx)
            .await
            .unwrap());
        let (_, reply) = rx.recv().await.unwrap();
        assert!(reply.contains("50 gaufrettes ajoutées à bob"));
        assert_eq!(commands.ledger.balance("bob").await, 150);
    }

    #[tokio::test]
    async fn non_owner_grant_is_silently_ignored() {
        let dir = tempdir().unwrap();
        let (commands, mut rx, tx) = setup(&dir);
        let message = ChatMessage::simple("gaufregentille", "mallory", "!ajoutercredits mallory 9999");

        assert!(commands
            .process_message("!ajoutercredits mallory 9999", &message, &tx)
            .await
            .unwrap());
        assert!(rx.try_recv().is_err());
        assert!(!commands.ledger.contains("mallory").await);
    }

    #[tokio::test]
    async fn malformed_grant_gets_a_usage_reply_and_no_mutation() {
        let dir = tempdir().unwrap();
        let (commands, mut rx, tx) = setup(&dir);

        for content in ["!ajoutercredits", "!ajoutercredits bob", "!ajoutercredits bob beaucoup"] {
            let message = ChatMessage::simple("gaufregentille", "gaufregentille", content);
            assert!(commands.process_message(content, &message, &tx).await.unwrap());
            let (_, reply) = rx.recv().await.unwrap();
            assert_eq!(reply, "Usage : !ajoutercredits <pseudo> <montant>");
        }
        assert!(!commands.ledger.contains("bob").await);
    }
}
