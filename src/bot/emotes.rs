// src/bot/emotes.rs - Emote expansion and LLM-output sanitization

use anyhow::{Context, Result};
use log::{info, warn};
use rand::Rng;
use regex::{NoExpand, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Externalized allow-lists. The old scripts carried several divergent
/// hard-coded lists; this file is now the single source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmoteConfig {
    /// Emotes whose `:Name:` spelling is rewritten to the bare token.
    pub expand: Vec<String>,
    /// Pool the random end-of-message emote is drawn from.
    pub random: Vec<String>,
    /// `:token:` spellings the sanitizer leaves in place.
    pub allowed: Vec<String>,
}

impl Default for EmoteConfig {
    fn default() -> Self {
        let channel_emotes = vec![
            "Kappa".to_string(),
            "OMEGALUL".to_string(),
            "PogChamp".to_string(),
            "LUL".to_string(),
            "BibleThump".to_string(),
            "4Head".to_string(),
            "FeelsStrongMan".to_string(),
            "KEKW".to_string(),
            "monkaS".to_string(),
            "gaufre1Ffee".to_string(),
            "gaufre1Justice".to_string(),
            "gaufre1Gunner".to_string(),
            "gaufre1Wut".to_string(),
            "bongoTap".to_string(),
            "catJAM".to_string(),
            "catKISS".to_string(),
            "HUH".to_string(),
            "Jigglin".to_string(),
            "PogTasty".to_string(),
            "PETTHEMODS".to_string(),
            "pedro".to_string(),
            "muted".to_string(),
            "LICKA".to_string(),
            "POLICE".to_string(),
            "RobustoAPT".to_string(),
            "ThisIsFine".to_string(),
            "VIBE".to_string(),
            "Joel".to_string(),
            "gachiHYPER".to_string(),
        ];
        Self {
            expand: channel_emotes.clone(),
            random: channel_emotes,
            allowed: vec![
                "Kappa".to_string(),
                "OMEGALUL".to_string(),
                "PogChamp".to_string(),
                "gaufreLol".to_string(),
                "LUL".to_string(),
                "PepeHands".to_string(),
                "BibleThump".to_string(),
                "4Head".to_string(),
                "FeelsStrongMan".to_string(),
                "KEKW".to_string(),
                "monkaS".to_string(),
                "gachiHYPER".to_string(),
            ],
        }
    }
}

/// Two-mode text filter over LLM output: `expand` rewrites `:Name:` to the
/// bare emote, `sanitize` strips everything emote-like that is not allowed.
pub struct EmoteFilter {
    /// `(":name:" matcher, bare replacement)` in list order.
    expand_patterns: Vec<(Regex, String)>,
    random_list: Vec<String>,
    allowed: Vec<String>,
    slug_re: Regex,
    token_re: Regex,
    trailing_punct_re: Regex,
}

impl EmoteFilter {
    /// Load the allow-lists from a YAML file, writing the defaults first if
    /// the file does not exist yet.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            warn!("Emote config not found, creating default: {}", path.display());
            let yaml = serde_yaml::to_string(&EmoteConfig::default())
                .context("Failed to serialize default emote config")?;
            tokio::fs::write(path, yaml)
                .await
                .with_context(|| format!("Failed to write default emote config to: {}", path.display()))?;
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read emote config: {}", path.display()))?;
        let config: EmoteConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse emote config: {}", path.display()))?;

        info!(
            "Loaded emote config: {} expandable, {} random, {} allowed",
            config.expand.len(),
            config.random.len(),
            config.allowed.len()
        );
        Self::from_config(config)
    }

    pub fn from_config(config: EmoteConfig) -> Result<Self> {
        let mut expand_patterns = Vec::with_capacity(config.expand.len());
        for name in &config.expand {
            let re = RegexBuilder::new(&format!(":{}:", regex::escape(name)))
                .case_insensitive(true)
                .build()
                .with_context(|| format!("Invalid emote name in config: {}", name))?;
            expand_patterns.push((re, name.clone()));
        }

        Ok(Self {
            expand_patterns,
            random_list: config.random,
            allowed: config.allowed,
            // Slug words like "winking-face-with-tongue" the model emits in
            // place of real emoji
            slug_re: RegexBuilder::new(r"\b[a-z0-9]+(?:-[a-z0-9]+)+\b")
                .case_insensitive(true)
                .build()
                .context("slug pattern")?,
            token_re: Regex::new(r":([A-Za-z0-9_]+):").context("token pattern")?,
            trailing_punct_re: Regex::new(r"[.!?]+$").context("punctuation pattern")?,
        })
    }

    /// Rewrite `:Name:` to the bare `Name` for every configured emote, in
    /// list order, one pass per entry.
    pub fn expand(&self, text: &str) -> String {
        let mut text = text.to_string();
        for (re, name) in &self.expand_patterns {
            text = re.replace_all(&text, NoExpand(name)).into_owned();
        }
        text
    }

    /// Trim, strip trailing punctuation runs, then append one random emote.
    /// With an empty pool the stripped text comes back unchanged.
    pub fn append_random(&self, text: &str) -> String {
        let text = self
            .trailing_punct_re
            .replace(text.trim(), "")
            .into_owned();

        if self.random_list.is_empty() {
            return text;
        }
        let mut rng = rand::rng();
        let emote = &self.random_list[rng.random_range(0..self.random_list.len())];
        format!("{} {}", text, emote)
    }

    /// Defensive strip pass over raw LLM output. Unlike [`expand`], allowed
    /// tokens keep their `:token:` spelling; everything else emote-shaped
    /// goes away.
    ///
    /// [`expand`]: EmoteFilter::expand
    pub fn sanitize(&self, text: &str) -> String {
        let text = self.slug_re.replace_all(text, "");

        let text = self.token_re.replace_all(&text, |caps: &regex::Captures| {
            if self.allowed.iter().any(|e| e == &caps[1]) {
                caps[0].to_string()
            } else {
                String::new()
            }
        });

        let text: String = text.chars().filter(|c| !is_emoji(*c)).collect();
        text.trim().to_string()
    }
}

/// Code-point ranges the original filter stripped: dingbats, private use,
/// and the emoji planes.
fn is_emoji(c: char) -> bool {
    matches!(u32::from(c),
        0x2700..=0x27BF | 0xE000..=0xF8FF | 0x1F000..=0x1FAFF)
}
