//! Streak transition logic
//!
//! Pure functions: given a challenge's progress snapshot and a settled bet
//! outcome, compute the next streak value and any newly unlocked levels.
//! Persistence is the coordinator's job; nothing here touches the database.

use crate::catalog::{CatalogEntry, Difficulty, Tier};
use crate::models::BetResult;

/// Snapshot of the fields the transition depends on
#[derive(Debug, Clone)]
pub struct LevelProgress {
    pub tier: Tier,
    pub difficulty: Difficulty,
    /// Qualification floor; taken from the bet link snapshot, not the live
    /// catalog, so historical bets keep the floor they were placed under
    pub min_odds: f64,
    pub current_streak: u32,
    /// Levels 1-4 already unlocked (claimed or not)
    pub unlocked: [bool; 4],
}

/// A level newly unlocked by this transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelUnlock {
    pub level: u8,
    pub amount_cents: i64,
}

/// Result of applying one settled bet to one challenge
#[derive(Debug, Clone)]
pub struct StreakOutcome {
    /// False when the bet was ignored (below the odds floor or a push)
    pub counted: bool,
    pub new_streak: u32,
    pub unlocks: Vec<LevelUnlock>,
}

impl StreakOutcome {
    fn unchanged(streak: u32) -> Self {
        Self {
            counted: false,
            new_streak: streak,
            unlocks: Vec::new(),
        }
    }
}

/// Apply a settled bet outcome to a challenge's progress.
///
/// A bet below the odds floor is ignored entirely: it neither extends nor
/// resets the streak, win or lose. A qualifying win extends the streak and
/// unlocks every still-locked level whose threshold the new streak meets,
/// in ascending order. A qualifying loss resets the streak to zero; levels
/// already unlocked are permanent. A push never changes anything.
pub fn apply(progress: &LevelProgress, result: BetResult, odds: f64) -> StreakOutcome {
    match result {
        // Pending bets never reach settlement; treat defensively as a no-op
        BetResult::Pending | BetResult::Push => StreakOutcome::unchanged(progress.current_streak),
        BetResult::Won | BetResult::Lost if odds < progress.min_odds => {
            StreakOutcome::unchanged(progress.current_streak)
        }
        BetResult::Won => {
            let new_streak = progress.current_streak + 1;
            StreakOutcome {
                counted: true,
                new_streak,
                unlocks: unlock_reached_levels(progress, new_streak),
            }
        }
        BetResult::Lost => StreakOutcome {
            counted: true,
            new_streak: 0,
            unlocks: Vec::new(),
        },
    }
}

/// Collect every still-locked level whose threshold the streak now meets.
/// In practice a streak grows by one so at most one level unlocks per win,
/// but an out-of-band streak jump must unlock every threshold it crossed.
fn unlock_reached_levels(progress: &LevelProgress, streak: u32) -> Vec<LevelUnlock> {
    let thresholds = progress.difficulty.thresholds();
    let entry = CatalogEntry::get(progress.tier, progress.difficulty);

    let mut unlocks = Vec::new();
    for level in 1..=4u8 {
        let idx = (level - 1) as usize;
        if !progress.unlocked[idx] && streak >= thresholds[idx] {
            unlocks.push(LevelUnlock {
                level,
                amount_cents: entry.reward_for_level(level),
            });
        }
    }
    unlocks
}

/// Level currently being worked toward: one past the highest unlocked level,
/// capped at 4.
pub fn current_level(unlocked: &[bool; 4]) -> u8 {
    let highest = unlocked.iter().rposition(|&u| u).map(|i| i as u8 + 1);
    match highest {
        Some(level) => (level + 1).min(4),
        None => 1,
    }
}
