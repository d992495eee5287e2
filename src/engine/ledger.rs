//! Reward accrual and claiming
//!
//! Pending rewards transition to paid through a compare-and-set on the row
//! status, so two concurrent claims for the same reward row can never both
//! credit the balance. The available balance is derived, never stored:
//! paid rewards minus non-rejected payouts.

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use super::load_challenge;
use crate::error::EngineError;
use crate::models::{ChallengeReward, RewardStatus};
use crate::store::EngineDb;

/// Result of a claim call
#[derive(Debug, Clone, Serialize)]
pub struct ClaimOutcome {
    pub claimed_cents: i64,
    pub claimed_rewards: usize,
    pub new_available_cents: i64,
}

/// Accrual ledger for unlocked rewards and the user's claimable balance
pub struct RewardLedger {
    db: EngineDb,
}

impl RewardLedger {
    pub fn new(db: EngineDb) -> Self {
        Self { db }
    }

    /// Claim pending rewards: one challenge's when `challenge_id` is given,
    /// otherwise every pending reward the user has. Rewards on expired
    /// challenges stay claimable; each row pays out exactly once.
    pub fn claim(
        &self,
        user_id: &str,
        challenge_id: Option<&str>,
    ) -> Result<ClaimOutcome, EngineError> {
        let outcome = self.db.run_in_tx(|tx| {
            if let Some(cid) = challenge_id {
                load_challenge(tx, cid)?
                    .filter(|c| c.user_id == user_id)
                    .ok_or(EngineError::NotFound("challenge"))?;
            }

            let mut stmt = tx.prepare(
                r#"SELECT r.id, r.challenge_id, r.amount_cents
                   FROM challenge_rewards r
                   JOIN challenges c ON c.id = r.challenge_id
                   WHERE c.user_id = ?1 AND r.status = 'pending'
                     AND (?2 IS NULL OR r.challenge_id = ?2)
                   ORDER BY r.unlocked_at"#,
            )?;
            let pending: Vec<(String, String, i64)> = stmt
                .query_map(rusqlite::params![user_id, challenge_id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<Result<_, _>>()?;
            drop(stmt);

            let now = Utc::now().timestamp_millis();
            let mut claimed_cents = 0;
            let mut claimed_rewards = 0;
            for (reward_id, owning_challenge, amount_cents) in &pending {
                // Compare-and-set: only the transition that actually flips
                // the row gets to credit the balance.
                let flipped = tx.execute(
                    "UPDATE challenge_rewards SET status = 'paid', paid_at = ?1
                     WHERE id = ?2 AND status = 'pending'",
                    rusqlite::params![now, reward_id],
                )?;
                if flipped == 0 {
                    continue;
                }

                tx.execute(
                    "UPDATE challenge_levels SET state = 'claimed'
                     WHERE challenge_id = ?1 AND reward_id = ?2",
                    rusqlite::params![owning_challenge, reward_id],
                )?;
                tx.execute(
                    "UPDATE challenges SET total_pending_cents = total_pending_cents - ?1
                     WHERE id = ?2",
                    rusqlite::params![amount_cents, owning_challenge],
                )?;
                claimed_cents += amount_cents;
                claimed_rewards += 1;
            }

            Ok(ClaimOutcome {
                claimed_cents,
                claimed_rewards,
                new_available_cents: available_balance_in(tx, user_id)?,
            })
        })?;

        if outcome.claimed_rewards > 0 {
            info!(
                "{} claimed {} cents across {} reward(s)",
                user_id, outcome.claimed_cents, outcome.claimed_rewards
            );
        }
        Ok(outcome)
    }

    /// Sum of paid rewards minus every payout that still reserves funds
    pub fn available_balance(&self, user_id: &str) -> Result<i64, EngineError> {
        let conn = self.db.conn();
        available_balance_in(&conn, user_id)
    }

    /// All reward rows for a challenge, lowest level first
    pub fn rewards_for_challenge(
        &self,
        challenge_id: &str,
    ) -> Result<Vec<ChallengeReward>, EngineError> {
        self.db.run_in_tx(|tx| {
            let mut stmt = tx.prepare(
                "SELECT id, challenge_id, level, amount_cents, status, unlocked_at, paid_at
                 FROM challenge_rewards WHERE challenge_id = ?1 ORDER BY level",
            )?;
            let rewards: Vec<ChallengeReward> = stmt
                .query_map([challenge_id], |row| {
                    let status_s: String = row.get(4)?;
                    let status = RewardStatus::from_str(&status_s).ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            4,
                            rusqlite::types::Type::Text,
                            format!("unknown reward status {}", status_s).into(),
                        )
                    })?;
                    Ok(ChallengeReward {
                        id: row.get(0)?,
                        challenge_id: row.get(1)?,
                        level: row.get::<_, i64>(2)? as u8,
                        amount_cents: row.get(3)?,
                        status,
                        unlocked_at: row.get(5)?,
                        paid_at: row.get(6)?,
                    })
                })?
                .collect::<Result<_, _>>()?;
            Ok(rewards)
        })
    }
}

/// Balance computation against an existing connection or transaction, so
/// payout reservation can check it atomically with its insert.
pub(crate) fn available_balance_in(
    conn: &Connection,
    user_id: &str,
) -> Result<i64, EngineError> {
    let paid: i64 = conn.query_row(
        r#"SELECT COALESCE(SUM(r.amount_cents), 0)
           FROM challenge_rewards r
           JOIN challenges c ON c.id = r.challenge_id
           WHERE c.user_id = ?1 AND r.status = 'paid'"#,
        rusqlite::params![user_id],
        |r| r.get(0),
    )?;
    let reserved: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount_cents), 0) FROM payouts
         WHERE user_id = ?1 AND status != 'rejected'",
        rusqlite::params![user_id],
        |r| r.get(0),
    )?;
    Ok(paid - reserved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Difficulty, Tier};
    use crate::engine::{BetManager, ChallengeManager};
    use crate::models::{BetResult, LevelState};

    struct Harness {
        db: EngineDb,
        challenges: ChallengeManager,
        bets: BetManager,
        ledger: RewardLedger,
    }

    fn harness() -> Harness {
        let db = EngineDb::open_in_memory().unwrap();
        Harness {
            challenges: ChallengeManager::new(db.clone()),
            bets: BetManager::new(db.clone()),
            ledger: RewardLedger::new(db.clone()),
            db,
        }
    }

    impl Harness {
        /// Purchase a beginner 1k challenge and win enough to unlock level 1
        fn unlocked_challenge(&self, user_id: &str) -> String {
            let c = self
                .challenges
                .purchase(user_id, Tier::T1k, Difficulty::Beginner)
                .unwrap();
            for _ in 0..3 {
                let bet = self
                    .bets
                    .place(user_id, 1.8, 1_000, &[c.id.clone()])
                    .unwrap();
                self.bets.settle(&bet.id, BetResult::Won).unwrap();
            }
            c.id
        }
    }

    #[test]
    fn test_claim_moves_pending_to_available() {
        let h = harness();
        let cid = h.unlocked_challenge("u1");

        let outcome = h.ledger.claim("u1", Some(cid.as_str())).unwrap();
        assert_eq!(outcome.claimed_cents, 300);
        assert_eq!(outcome.claimed_rewards, 1);
        assert_eq!(outcome.new_available_cents, 300);

        let after = h.challenges.get(&cid).unwrap();
        assert_eq!(after.total_pending_cents, 0);
        assert_eq!(after.total_rewards_earned_cents, 300);
        assert_eq!(after.levels[0], LevelState::Claimed);
        assert_eq!(h.ledger.available_balance("u1").unwrap(), 300);

        let rewards = h.ledger.rewards_for_challenge(&cid).unwrap();
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].level, 1);
        assert_eq!(rewards[0].status, RewardStatus::Paid);
        assert!(rewards[0].paid_at.is_some());
    }

    #[test]
    fn test_second_claim_finds_nothing() {
        let h = harness();
        let cid = h.unlocked_challenge("u1");

        h.ledger.claim("u1", Some(cid.as_str())).unwrap();
        let again = h.ledger.claim("u1", Some(cid.as_str())).unwrap();
        assert_eq!(again.claimed_cents, 0);
        assert_eq!(again.claimed_rewards, 0);
        assert_eq!(again.new_available_cents, 300, "no double credit");
    }

    #[test]
    fn test_claim_without_scope_collects_all_challenges() {
        let h = harness();
        h.unlocked_challenge("u1");
        h.unlocked_challenge("u1");

        let outcome = h.ledger.claim("u1", None).unwrap();
        assert_eq!(outcome.claimed_cents, 600);
        assert_eq!(outcome.claimed_rewards, 2);
    }

    #[test]
    fn test_claim_is_scoped_to_the_user() {
        let h = harness();
        let cid = h.unlocked_challenge("owner");

        let err = h.ledger.claim("intruder", Some(cid.as_str())).unwrap_err();
        assert!(matches!(err, EngineError::NotFound("challenge")));

        let nothing = h.ledger.claim("intruder", None).unwrap();
        assert_eq!(nothing.claimed_cents, 0);
        assert_eq!(h.ledger.available_balance("owner").unwrap(), 0);
    }

    #[test]
    fn test_rewards_survive_expiry_and_stay_claimable() {
        let h = harness();
        let cid = h.unlocked_challenge("u1");
        h.db.conn()
            .execute(
                "UPDATE challenges SET status = 'expired' WHERE id = ?1",
                rusqlite::params![cid],
            )
            .unwrap();

        let outcome = h.ledger.claim("u1", Some(cid.as_str())).unwrap();
        assert_eq!(outcome.claimed_cents, 300);
    }

    #[test]
    fn test_forfeited_rewards_are_not_claimable() {
        let h = harness();
        let cid = h.unlocked_challenge("u1");
        h.challenges.cancel(&cid).unwrap();

        let outcome = h.ledger.claim("u1", None).unwrap();
        assert_eq!(outcome.claimed_cents, 0);
        assert_eq!(h.ledger.available_balance("u1").unwrap(), 0);
    }
}
