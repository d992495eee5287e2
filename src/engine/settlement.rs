//! Bet settlement fan-out
//!
//! Receives a settled bet, folds the outcome into every linked challenge via
//! the streak transition, and records unlocked rewards. All updates for one
//! settlement event commit or roll back together, and an already-applied
//! event no-ops on re-delivery.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::streak::{self, LevelProgress};
use super::{load_bet, load_challenge};
use crate::error::EngineError;
use crate::models::ChallengeStatus;
use crate::store::EngineDb;

/// What one settlement event did
#[derive(Debug, Clone, Serialize)]
pub struct SettlementSummary {
    pub bet_id: String,
    /// False when the event had already been applied (re-delivery)
    pub applied: bool,
    pub challenges_updated: usize,
    /// Linked challenges no longer active at settlement time
    pub challenges_skipped: usize,
    pub levels_unlocked: usize,
}

/// Drives streak and reward updates when a bet settles
pub struct BetSettlementCoordinator {
    db: EngineDb,
}

impl BetSettlementCoordinator {
    pub fn new(db: EngineDb) -> Self {
        Self { db }
    }

    /// Apply a settled bet to every challenge it was linked to.
    ///
    /// Challenges that stopped being active since placement are skipped with
    /// their state untouched; the rest process normally. The idempotency
    /// marker on the bet is set in the same transaction as the challenge
    /// updates, so a redelivered event cannot double-apply.
    pub fn on_bet_settled(&self, bet_id: &str) -> Result<SettlementSummary, EngineError> {
        let summary = self.db.run_in_tx(|tx| {
            let bet = load_bet(tx, bet_id)?.ok_or(EngineError::NotFound("bet"))?;
            if !bet.result.is_settled() {
                return Err(EngineError::Validation(
                    "bet has no settlement outcome yet".to_string(),
                ));
            }
            if bet.settlement_applied {
                return Ok(SettlementSummary {
                    bet_id: bet.id,
                    applied: false,
                    challenges_updated: 0,
                    challenges_skipped: 0,
                    levels_unlocked: 0,
                });
            }

            let mut stmt = tx.prepare(
                "SELECT challenge_id, min_odds FROM bet_challenge_links
                 WHERE bet_id = ?1 ORDER BY challenge_id",
            )?;
            let links: Vec<(String, f64)> = stmt
                .query_map(rusqlite::params![bet_id], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<Result<_, _>>()?;
            drop(stmt);

            let mut updated = 0;
            let mut skipped = 0;
            let mut unlocked = 0;
            for (challenge_id, link_min_odds) in &links {
                let challenge =
                    load_challenge(tx, challenge_id)?.ok_or(EngineError::NotFound("challenge"))?;
                if challenge.status != ChallengeStatus::Active {
                    debug!("skipping inactive challenge {} at settlement", challenge_id);
                    skipped += 1;
                    continue;
                }

                let mut unlocked_flags: [bool; 4] =
                    std::array::from_fn(|i| challenge.levels[i].is_unlocked());
                let progress = LevelProgress {
                    tier: challenge.tier,
                    difficulty: challenge.difficulty,
                    // the placement-time snapshot governs qualification
                    min_odds: *link_min_odds,
                    current_streak: challenge.current_streak,
                    unlocked: unlocked_flags,
                };
                let outcome = streak::apply(&progress, bet.result, bet.odds);
                if !outcome.counted {
                    continue;
                }

                let now = Utc::now().timestamp_millis();
                let mut unlocked_cents = 0;
                for unlock in &outcome.unlocks {
                    let reward_id = Uuid::new_v4().to_string();
                    tx.execute(
                        r#"INSERT INTO challenge_rewards
                           (id, challenge_id, level, amount_cents, status, unlocked_at)
                           VALUES (?1, ?2, ?3, ?4, 'pending', ?5)"#,
                        rusqlite::params![
                            reward_id,
                            challenge_id,
                            unlock.level,
                            unlock.amount_cents,
                            now
                        ],
                    )?;
                    tx.execute(
                        "UPDATE challenge_levels SET state = 'unlocked', reward_id = ?1
                         WHERE challenge_id = ?2 AND level = ?3 AND state = 'locked'",
                        rusqlite::params![reward_id, challenge_id, unlock.level],
                    )?;
                    unlocked_flags[(unlock.level - 1) as usize] = true;
                    unlocked_cents += unlock.amount_cents;
                }

                tx.execute(
                    r#"UPDATE challenges SET
                           current_streak = ?1,
                           best_streak = MAX(best_streak, ?1),
                           current_level = ?2,
                           total_rewards_earned_cents = total_rewards_earned_cents + ?3,
                           total_pending_cents = total_pending_cents + ?3
                       WHERE id = ?4"#,
                    rusqlite::params![
                        outcome.new_streak,
                        streak::current_level(&unlocked_flags),
                        unlocked_cents,
                        challenge_id
                    ],
                )?;

                updated += 1;
                unlocked += outcome.unlocks.len();
            }

            tx.execute(
                "UPDATE bets SET settlement_applied = 1 WHERE id = ?1",
                rusqlite::params![bet_id],
            )?;

            Ok(SettlementSummary {
                bet_id: bet.id,
                applied: true,
                challenges_updated: updated,
                challenges_skipped: skipped,
                levels_unlocked: unlocked,
            })
        })?;

        if summary.applied {
            info!(
                "settlement of bet {} applied ({} updated, {} skipped, {} level(s) unlocked)",
                bet_id,
                summary.challenges_updated,
                summary.challenges_skipped,
                summary.levels_unlocked
            );
        } else {
            debug!("settlement of bet {} already applied, ignoring re-delivery", bet_id);
        }
        Ok(summary)
    }
}
