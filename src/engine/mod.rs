//! Challenge progression engine
//!
//! Coordinates challenge lifecycle, bet settlement, reward accrual and
//! payout processing over a shared [`EngineDb`].
//!
//! # Architecture
//!
//! ```text
//! purchase ──► ChallengeManager ─┐
//! place bet ─► BetManager ───────┤
//! settle ────► BetSettlement ────┼──► engine.db
//!              Coordinator       │
//! claim ─────► RewardLedger ─────┤
//! payout ────► PayoutProcessor ──┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let engine = Engine::open(&db_path)?;
//! let challenge = engine.challenges().purchase("user-1", Tier::T1k, Difficulty::Beginner)?;
//! engine.bets().place("user-1", 1.8, 1_000, &[challenge.id.clone()])?;
//! ```

mod bets;
mod ledger;
mod manager;
mod payout;
mod settlement;
mod streak;

pub use bets::BetManager;
pub use ledger::{ClaimOutcome, RewardLedger};
pub use manager::{ChallengeList, ChallengeManager, ChallengeSummary, MAX_ACTIVE_CHALLENGES};
pub use payout::{PayoutList, PayoutProcessor, MIN_PAYOUT_CENTS};
pub use settlement::{BetSettlementCoordinator, SettlementSummary};
pub use streak::{apply as apply_streak, current_level, LevelProgress, LevelUnlock, StreakOutcome};

use anyhow::Result;
use rusqlite::{OptionalExtension, Transaction};

use crate::catalog::{Difficulty, Tier};
use crate::error::EngineError;
use crate::models::{Bet, BetResult, Challenge, ChallengeStatus, LevelState};
use crate::store::EngineDb;

/// External payment collaborator. The engine never moves real funds; a reset
/// only proceeds once the rail confirms the fee charge.
pub trait PaymentRail {
    /// Charge the discounted reset fee. Returns an external payment reference.
    fn charge_reset_fee(
        &self,
        user_id: &str,
        challenge_id: &str,
        amount_cents: i64,
    ) -> Result<String, EngineError>;
}

/// Rail that approves every charge. Stands in for the real checkout flow in
/// the server binary; real rails live behind the same trait.
pub struct AutoApproveRail;

impl PaymentRail for AutoApproveRail {
    fn charge_reset_fee(
        &self,
        user_id: &str,
        challenge_id: &str,
        amount_cents: i64,
    ) -> Result<String, EngineError> {
        let reference = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            "approved reset fee of {} cents for {} on challenge {} (ref {})",
            amount_cents,
            user_id,
            challenge_id,
            reference
        );
        Ok(reference)
    }
}

/// Central handle for all engine operations
///
/// Thread-safe through the internal mutex on the database connection; clone
/// freely, all clones share one ledger.
#[derive(Clone)]
pub struct Engine {
    db: EngineDb,
}

impl Engine {
    /// Open the engine against the default database location
    pub fn new() -> Result<Self> {
        Ok(Self {
            db: EngineDb::open_default()?,
        })
    }

    /// Open the engine against a specific database path
    pub fn open(path: &std::path::Path) -> Result<Self> {
        Ok(Self {
            db: EngineDb::open(path)?,
        })
    }

    /// Wrap an already-open database (tests)
    pub fn with_db(db: EngineDb) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &EngineDb {
        &self.db
    }

    pub fn challenges(&self) -> ChallengeManager {
        ChallengeManager::new(self.db.clone())
    }

    pub fn bets(&self) -> BetManager {
        BetManager::new(self.db.clone())
    }

    pub fn settlement(&self) -> BetSettlementCoordinator {
        BetSettlementCoordinator::new(self.db.clone())
    }

    pub fn rewards(&self) -> RewardLedger {
        RewardLedger::new(self.db.clone())
    }

    pub fn payouts(&self) -> PayoutProcessor {
        PayoutProcessor::new(self.db.clone())
    }
}

fn bad_column(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

/// Load a challenge row plus its four level-state rows
pub(crate) fn load_challenge(
    tx: &Transaction<'_>,
    id: &str,
) -> Result<Option<Challenge>, EngineError> {
    let base = tx
        .query_row(
            r#"SELECT id, user_id, tier, difficulty, min_odds, current_level, current_streak,
                      best_streak, total_rewards_earned_cents, total_pending_cents,
                      price_cents, reset_fee_cents, purchased_at, expires_at, status
               FROM challenges WHERE id = ?1"#,
            rusqlite::params![id],
            challenge_row_mapper,
        )
        .optional()?;

    let Some(mut challenge) = base else {
        return Ok(None);
    };
    challenge.levels = load_levels(tx, id)?;
    Ok(Some(challenge))
}

/// Map a full challenge row (levels filled in separately)
pub(crate) fn challenge_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Challenge> {
    let tier_notional: i64 = row.get(2)?;
    let tier = Tier::from_notional(tier_notional)
        .ok_or_else(|| bad_column(2, format!("unknown tier {}", tier_notional)))?;
    let difficulty_s: String = row.get(3)?;
    let difficulty = Difficulty::from_str(&difficulty_s)
        .ok_or_else(|| bad_column(3, format!("unknown difficulty {}", difficulty_s)))?;
    let status_s: String = row.get(14)?;
    let status = ChallengeStatus::from_str(&status_s)
        .ok_or_else(|| bad_column(14, format!("unknown challenge status {}", status_s)))?;

    Ok(Challenge {
        id: row.get(0)?,
        user_id: row.get(1)?,
        tier,
        difficulty,
        min_odds: row.get(4)?,
        current_level: row.get::<_, i64>(5)? as u8,
        current_streak: row.get::<_, i64>(6)? as u32,
        best_streak: row.get::<_, i64>(7)? as u32,
        levels: std::array::from_fn(|_| LevelState::Locked),
        total_rewards_earned_cents: row.get(8)?,
        total_pending_cents: row.get(9)?,
        price_cents: row.get(10)?,
        reset_fee_cents: row.get(11)?,
        purchased_at: row.get(12)?,
        expires_at: row.get(13)?,
        status,
    })
}

/// Load the four level-state rows for a challenge
pub(crate) fn load_levels(
    tx: &Transaction<'_>,
    challenge_id: &str,
) -> Result<[LevelState; 4], EngineError> {
    let mut stmt = tx.prepare(
        "SELECT level, state, reward_id FROM challenge_levels WHERE challenge_id = ?1 ORDER BY level",
    )?;
    let rows = stmt.query_map(rusqlite::params![challenge_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
        ))
    })?;

    let mut levels: [LevelState; 4] = std::array::from_fn(|_| LevelState::Locked);
    for row in rows {
        let (level, state, reward_id) = row?;
        if !(1..=4).contains(&level) {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Integer,
                format!("level {} out of range", level).into(),
            )
            .into());
        }
        levels[(level - 1) as usize] = match state.as_str() {
            "locked" => LevelState::Locked,
            "unlocked" => LevelState::Unlocked {
                reward_id: reward_id.ok_or_else(|| {
                    bad_column(2, format!("unlocked level {} without reward id", level))
                })?,
            },
            "claimed" => LevelState::Claimed,
            other => return Err(bad_column(1, format!("unknown level state {}", other)).into()),
        };
    }
    Ok(levels)
}

/// Load a bet row
pub(crate) fn load_bet(tx: &Transaction<'_>, id: &str) -> Result<Option<Bet>, EngineError> {
    let bet = tx
        .query_row(
            r#"SELECT id, user_id, odds, stake_cents, result, settlement_applied,
                      placed_at, settled_at
               FROM bets WHERE id = ?1"#,
            rusqlite::params![id],
            |row| {
                let result_s: String = row.get(4)?;
                let result = BetResult::from_str(&result_s)
                    .ok_or_else(|| bad_column(4, format!("unknown bet result {}", result_s)))?;
                Ok(Bet {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    odds: row.get(2)?,
                    stake_cents: row.get(3)?,
                    result,
                    settlement_applied: row.get::<_, i64>(5)? != 0,
                    placed_at: row.get(6)?,
                    settled_at: row.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(bet)
}
