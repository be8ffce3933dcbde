// src/bot/credits.rs - Flat-file ledger for the gaufrette economy

use log::{error, info};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;

/// Balance granted the first time the ledger sees a username.
pub const STARTING_BALANCE: i64 = 100;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to read credits file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("credits file {path:?} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Username -> balance, persisted write-through to one JSON object.
///
/// Balances are lazily created at [`STARTING_BALANCE`] on first touch and
/// never deleted. There is no floor: a user can go negative. The map is a
/// `BTreeMap` so the on-disk file and leaderboard tie-breaks are
/// deterministic (alphabetical for equal balances).
pub struct CreditsLedger {
    path: PathBuf,
    balances: RwLock<BTreeMap<String, i64>>,
}

impl CreditsLedger {
    /// Load the ledger from `path`. A missing file is an empty ledger; a
    /// file that exists but cannot be read or parsed is a startup error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();

        let balances = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| LedgerError::Read {
                path: path.clone(),
                source,
            })?;
            let parsed: BTreeMap<String, i64> =
                serde_json::from_str(&content).map_err(|source| LedgerError::Parse {
                    path: path.clone(),
                    source,
                })?;
            info!("Loaded {} credit account(s) from {}", parsed.len(), path.display());
            parsed
        } else {
            info!("No credits file at {}, starting with an empty ledger", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            path,
            balances: RwLock::new(balances),
        })
    }

    /// Current balance, creating the account at the default on first read.
    pub async fn balance(&self, username: &str) -> i64 {
        let mut balances = self.balances.write().await;
        *Self::account(&mut balances, username)
    }

    /// Apply `delta` (which may be negative) and persist. Returns the new
    /// balance.
    pub async fn change(&self, username: &str, delta: i64) -> i64 {
        let new_balance = {
            let mut balances = self.balances.write().await;
            let balance = Self::account(&mut balances, username);
            *balance += delta;
            *balance
        };
        self.persist().await;
        new_balance
    }

    /// Overwrite a balance unconditionally and persist.
    pub async fn set(&self, username: &str, amount: i64) {
        {
            let mut balances = self.balances.write().await;
            balances.insert(username.to_string(), amount);
        }
        self.persist().await;
    }

    /// The `limit` richest accounts, descending by balance. Equal balances
    /// keep the map's alphabetical order (the sort is stable).
    pub async fn top(&self, limit: usize) -> Vec<(String, i64)> {
        let balances = self.balances.read().await;
        let mut entries: Vec<(String, i64)> =
            balances.iter().map(|(user, bal)| (user.clone(), *bal)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.truncate(limit);
        entries
    }

    /// Whether the ledger has ever seen this username.
    pub async fn contains(&self, username: &str) -> bool {
        self.balances.read().await.contains_key(username)
    }

    /// The one place the default-balance policy lives.
    fn account<'a>(balances: &'a mut BTreeMap<String, i64>, username: &str) -> &'a mut i64 {
        balances.entry(username.to_string()).or_insert(STARTING_BALANCE)
    }

    /// Whole-file overwrite after every mutation. A write failure is logged
    /// and swallowed: the in-memory ledger stays authoritative for the rest
    /// of the process lifetime, as in every prior iteration of the bot.
    async fn persist(&self) {
        let json = {
            let balances = self.balances.read().await;
            match serde_json::to_string_pretty(&*balances) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize credits: {}", e);
                    return;
                }
            }
        };
        if let Err(e) = tokio::fs::write(&self.path, json).await {
            error!("Failed to save credits to {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ledger_in(dir: &tempfile::TempDir) -> CreditsLedger {
        CreditsLedger::load(dir.path().join("credits.json")).unwrap()
    }

    #[tokio::test]
    async fn unseen_user_starts_at_default() {
        let dir = tempdir().unwrap();
        let ledger = ledger_in(&dir);
        assert_eq!(ledger.balance("bob").await, STARTING_BALANCE);
    }

    #[tokio::test]
    async fn change_sums_deltas_without_clamping() {
        let dir = tempdir().unwrap();
        let ledger = ledger_in(&dir);

        assert_eq!(ledger.change("bob", 50).await, 150);
        assert_eq!(ledger.change("bob", -10).await, 140);
        // No floor: balances can go negative
        assert_eq!(ledger.change("bob", -200).await, -60);
        assert_eq!(ledger.balance("bob").await, -60);
    }

    #[tokio::test]
    async fn set_overwrites_unconditionally() {
        let dir = tempdir().unwrap();
        let ledger = ledger_in(&dir);

        ledger.change("bob", 25).await;
        ledger.set("bob", 7).await;
        assert_eq!(ledger.balance("bob").await, 7);
    }

    #[tokio::test]
    async fn top_sorts_descending_and_limits() {
        let dir = tempdir().unwrap();
        let ledger = ledger_in(&dir);

        ledger.set("alice", 300).await;
        ledger.set("bob", 50).await;
        ledger.set("carol", 120).await;
        ledger.set("dave", 120).await;

        let top = ledger.top(3).await;
        assert_eq!(top.len(), 3);
        assert_eq!(top[0], ("alice".to_string(), 300));
        // Equal balances keep alphabetical order
        assert_eq!(top[1], ("carol".to_string(), 120));
        assert_eq!(top[2], ("dave".to_string(), 120));
    }

    #[test_log::test(tokio::test)]
    async fn mutations_survive_a_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credits.json");

        {
            let ledger = CreditsLedger::load(&path).unwrap();
            ledger.change("bob", 42).await;
        }

        let reloaded = CreditsLedger::load(&path).unwrap();
        assert_eq!(reloaded.balance("bob").await, 142);
    }

    #[tokio::test]
    async fn read_does_not_persist_the_lazy_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credits.json");

        {
            let ledger = CreditsLedger::load(&path).unwrap();
            assert_eq!(ledger.balance("bob").await, STARTING_BALANCE);
        }

        // Only mutations write the file
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_file_is_a_startup_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credits.json");
        std::fs::write(&path, "{not json").unwrap();

        match CreditsLedger::load(&path) {
            Err(LedgerError::Parse { .. }) => {}
            other => panic!("expected a parse error, got {:?}", other.map(|_| ())),
        }
    }
}
