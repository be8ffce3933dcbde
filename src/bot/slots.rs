// src/bot/slots.rs - Slot machine rules for the gaufrette economy

use rand::Rng;

/// Fixed reel alphabet. A play draws three symbols independently and
/// uniformly from this set.
pub const SYMBOLS: [&str; 9] = ["🍒", "🍋", "🍉", "🍇", "🔔", "⭐", "🍀", "💎", "🦫"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOutcome {
    /// Three identical symbols.
    Jackpot,
    /// Exactly one pair.
    Pair,
    /// Three distinct symbols.
    Loss,
}

impl SlotOutcome {
    pub fn classify(a: &str, b: &str, c: &str) -> Self {
        if a == b && b == c {
            SlotOutcome::Jackpot
        } else if a == b || b == c || a == c {
            SlotOutcome::Pair
        } else {
            SlotOutcome::Loss
        }
    }

    /// Credits delta applied to the player.
    pub fn payout(self) -> i64 {
        match self {
            SlotOutcome::Jackpot => 50,
            SlotOutcome::Pair => 10,
            SlotOutcome::Loss => -10,
        }
    }
}

/// One play: three uniform draws and their classification.
pub fn spin() -> ([&'static str; 3], SlotOutcome) {
    let mut rng = rand::rng();
    let mut draw = || SYMBOLS[rng.random_range(0..SYMBOLS.len())];
    let reels = [draw(), draw(), draw()];
    (reels, SlotOutcome::classify(reels[0], reels[1], reels[2]))
}
