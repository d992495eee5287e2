//! Challenge lifecycle operations
//!
//! Purchase (with the atomic active-count cap), listing with computed
//! time-remaining, the expiry sweep, discounted resets and administrative
//! cancellation.

use chrono::Utc;
use rusqlite::Transaction;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::{load_challenge, PaymentRail};
use crate::catalog::{CatalogEntry, Difficulty, Tier};
use crate::error::EngineError;
use crate::models::{Challenge, ChallengeStatus, LevelState};
use crate::store::EngineDb;

/// A user may hold at most this many active challenges
pub const MAX_ACTIVE_CHALLENGES: usize = 5;

/// Challenge window length: 45 days
const CHALLENGE_WINDOW_MS: i64 = 45 * 24 * 60 * 60 * 1000;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// A challenge plus presentation fields derived at query time
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeSummary {
    #[serde(flatten)]
    pub challenge: Challenge,
    /// Whole days until expiry, rounded up, never negative
    pub days_remaining: i64,
}

/// Listing result for one user
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeList {
    pub challenges: Vec<ChallengeSummary>,
    pub can_create_more: bool,
    pub current_count: usize,
    pub max_allowed: usize,
}

/// Lifecycle operations for challenge accounts
pub struct ChallengeManager {
    db: EngineDb,
}

impl ChallengeManager {
    pub fn new(db: EngineDb) -> Self {
        Self { db }
    }

    /// Create a challenge after purchase confirmation.
    ///
    /// The active-count check shares the insert's transaction, so two
    /// concurrent purchases cannot both slip under the cap.
    pub fn purchase(
        &self,
        user_id: &str,
        tier: Tier,
        difficulty: Difficulty,
    ) -> Result<Challenge, EngineError> {
        let challenge = self
            .db
            .run_in_tx(|tx| create_challenge_in_tx(tx, user_id, tier, difficulty))?;
        info!(
            "challenge {} purchased by {} (tier {}, {})",
            challenge.id,
            user_id,
            tier.notional(),
            difficulty.as_str()
        );
        Ok(challenge)
    }

    /// List a user's challenges. Active only by default; `include_inactive`
    /// adds expired and cancelled history (their rewards stay claimable).
    pub fn list(&self, user_id: &str, include_inactive: bool) -> Result<ChallengeList, EngineError> {
        let now = Utc::now().timestamp_millis();
        self.db.run_in_tx(|tx| {
            let sql = if include_inactive {
                "SELECT id FROM challenges WHERE user_id = ?1 ORDER BY purchased_at DESC"
            } else {
                "SELECT id FROM challenges WHERE user_id = ?1 AND status = 'active'
                 ORDER BY purchased_at DESC"
            };
            let mut stmt = tx.prepare(sql)?;
            let ids: Vec<String> = stmt
                .query_map(rusqlite::params![user_id], |row| row.get(0))?
                .collect::<Result<_, _>>()?;

            let mut challenges = Vec::with_capacity(ids.len());
            for id in &ids {
                let challenge =
                    load_challenge(tx, id)?.ok_or(EngineError::NotFound("challenge"))?;
                challenges.push(ChallengeSummary {
                    days_remaining: days_remaining(challenge.expires_at, now),
                    challenge,
                });
            }

            let active = count_active(tx, user_id)?;
            Ok(ChallengeList {
                challenges,
                can_create_more: active < MAX_ACTIVE_CHALLENGES,
                current_count: active,
                max_allowed: MAX_ACTIVE_CHALLENGES,
            })
        })
    }

    /// Load one challenge by id
    pub fn get(&self, challenge_id: &str) -> Result<Challenge, EngineError> {
        self.db.run_in_tx(|tx| {
            load_challenge(tx, challenge_id)?.ok_or(EngineError::NotFound("challenge"))
        })
    }

    /// Expire every active challenge whose window has closed. Unlocked
    /// rewards stay claimable; only further streak progress stops.
    /// Returns the number of challenges expired.
    pub fn expire_due(&self, now_ms: i64) -> Result<usize, EngineError> {
        let expired = self.db.run_in_tx(|tx| {
            let n = tx.execute(
                "UPDATE challenges SET status = 'expired'
                 WHERE status = 'active' AND expires_at < ?1",
                rusqlite::params![now_ms],
            )?;
            Ok(n)
        })?;
        if expired > 0 {
            info!("expiry sweep closed {} challenge(s)", expired);
        }
        Ok(expired)
    }

    /// Start a fresh challenge window after expiry, for half the original
    /// purchase price. The fee goes through the payment collaborator first;
    /// the new record is only created once the charge is confirmed. The old
    /// record is kept untouched for history.
    pub fn reset(
        &self,
        challenge_id: &str,
        rail: &dyn PaymentRail,
    ) -> Result<Challenge, EngineError> {
        let old = self.db.run_in_tx(|tx| {
            let challenge =
                load_challenge(tx, challenge_id)?.ok_or(EngineError::NotFound("challenge"))?;
            if challenge.status != ChallengeStatus::Expired {
                return Err(EngineError::NotExpired);
            }
            Ok(challenge)
        })?;

        let reference =
            rail.charge_reset_fee(&old.user_id, &old.id, old.reset_fee_cents)?;

        let fresh = self.db.run_in_tx(|tx| {
            create_challenge_in_tx(tx, &old.user_id, old.tier, old.difficulty)
        })?;
        info!(
            "challenge {} reset as {} (fee {} cents, payment {})",
            old.id, fresh.id, old.reset_fee_cents, reference
        );
        Ok(fresh)
    }

    /// Administrative cancel. Unclaimed pending rewards are forfeited (the
    /// rows are kept for audit); anything already paid stays paid.
    pub fn cancel(&self, challenge_id: &str) -> Result<Challenge, EngineError> {
        self.db.run_in_tx(|tx| {
            let challenge =
                load_challenge(tx, challenge_id)?.ok_or(EngineError::NotFound("challenge"))?;
            if challenge.status == ChallengeStatus::Cancelled {
                return Ok(challenge);
            }

            tx.execute(
                "UPDATE challenge_rewards SET status = 'forfeited'
                 WHERE challenge_id = ?1 AND status = 'pending'",
                rusqlite::params![challenge_id],
            )?;
            tx.execute(
                "UPDATE challenges SET status = 'cancelled', total_pending_cents = 0
                 WHERE id = ?1",
                rusqlite::params![challenge_id],
            )?;

            load_challenge(tx, challenge_id)?.ok_or(EngineError::NotFound("challenge"))
        })
    }
}

/// Whole days until expiry, rounded up and clamped at zero
fn days_remaining(expires_at: i64, now: i64) -> i64 {
    let diff = expires_at - now;
    if diff <= 0 {
        0
    } else {
        (diff + DAY_MS - 1) / DAY_MS
    }
}

fn count_active(tx: &Transaction<'_>, user_id: &str) -> Result<usize, EngineError> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM challenges WHERE user_id = ?1 AND status = 'active'",
        rusqlite::params![user_id],
        |r| r.get(0),
    )?;
    Ok(count as usize)
}

/// Insert a fresh challenge plus its four locked level rows. The cap check
/// runs inside the caller's transaction.
pub(crate) fn create_challenge_in_tx(
    tx: &Transaction<'_>,
    user_id: &str,
    tier: Tier,
    difficulty: Difficulty,
) -> Result<Challenge, EngineError> {
    let active = count_active(tx, user_id)?;
    if active >= MAX_ACTIVE_CHALLENGES {
        return Err(EngineError::LimitExceeded {
            active,
            max: MAX_ACTIVE_CHALLENGES,
        });
    }

    let entry = CatalogEntry::get(tier, difficulty);
    let now = Utc::now().timestamp_millis();
    let challenge = Challenge {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        tier,
        difficulty,
        min_odds: difficulty.min_odds(),
        current_level: 1,
        current_streak: 0,
        best_streak: 0,
        levels: std::array::from_fn(|_| LevelState::Locked),
        total_rewards_earned_cents: 0,
        total_pending_cents: 0,
        price_cents: entry.price_cents,
        reset_fee_cents: entry.price_cents / 2,
        purchased_at: now,
        expires_at: now + CHALLENGE_WINDOW_MS,
        status: ChallengeStatus::Active,
    };

    tx.execute(
        r#"INSERT INTO challenges
           (id, user_id, tier, difficulty, min_odds, current_level, current_streak,
            best_streak, total_rewards_earned_cents, total_pending_cents,
            price_cents, reset_fee_cents, purchased_at, expires_at, status)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"#,
        rusqlite::params![
            challenge.id,
            challenge.user_id,
            tier.notional(),
            difficulty.as_str(),
            challenge.min_odds,
            challenge.current_level,
            challenge.current_streak,
            challenge.best_streak,
            challenge.total_rewards_earned_cents,
            challenge.total_pending_cents,
            challenge.price_cents,
            challenge.reset_fee_cents,
            challenge.purchased_at,
            challenge.expires_at,
            challenge.status.as_str(),
        ],
    )?;
    for level in 1..=4 {
        tx.execute(
            "INSERT INTO challenge_levels (challenge_id, level, state) VALUES (?1, ?2, 'locked')",
            rusqlite::params![challenge.id, level],
        )?;
    }

    Ok(challenge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AutoApproveRail;

    struct DecliningRail;

    impl PaymentRail for DecliningRail {
        fn charge_reset_fee(&self, _: &str, _: &str, _: i64) -> Result<String, EngineError> {
            Err(EngineError::Validation(
                "reset fee payment was declined".to_string(),
            ))
        }
    }

    fn manager() -> ChallengeManager {
        ChallengeManager::new(EngineDb::open_in_memory().unwrap())
    }

    fn backdate_expiry(m: &ChallengeManager, challenge_id: &str) {
        m.db.conn()
            .execute(
                "UPDATE challenges SET expires_at = ?1 WHERE id = ?2",
                rusqlite::params![Utc::now().timestamp_millis() - 1000, challenge_id],
            )
            .unwrap();
    }

    #[test]
    fn test_purchase_snapshots_catalog_values() {
        let m = manager();
        let c = m.purchase("u1", Tier::T1k, Difficulty::Pro).unwrap();
        assert_eq!(c.min_odds, 2.0);
        assert_eq!(c.price_cents, 4_900);
        assert_eq!(c.reset_fee_cents, 2_450);
        assert_eq!(c.status, ChallengeStatus::Active);
        assert!(c.levels.iter().all(|l| *l == LevelState::Locked));
        assert_eq!(c.expires_at - c.purchased_at, CHALLENGE_WINDOW_MS);
    }

    #[test]
    fn test_list_reports_cap_headroom() {
        let m = manager();
        m.purchase("u1", Tier::T1k, Difficulty::Beginner).unwrap();
        m.purchase("u1", Tier::T5k, Difficulty::Pro).unwrap();

        let list = m.list("u1", false).unwrap();
        assert_eq!(list.current_count, 2);
        assert_eq!(list.max_allowed, MAX_ACTIVE_CHALLENGES);
        assert!(list.can_create_more);
        assert_eq!(list.challenges.len(), 2);
        assert_eq!(list.challenges[0].days_remaining, 45);
    }

    #[test]
    fn test_sixth_purchase_hits_the_cap() {
        let m = manager();
        for _ in 0..5 {
            m.purchase("u1", Tier::T1k, Difficulty::Beginner).unwrap();
        }
        let err = m.purchase("u1", Tier::T1k, Difficulty::Beginner).unwrap_err();
        assert!(matches!(
            err,
            EngineError::LimitExceeded { active: 5, max: 5 }
        ));

        // The cap is per user
        assert!(m.purchase("u2", Tier::T1k, Difficulty::Beginner).is_ok());
    }

    #[test]
    fn test_expire_due_only_touches_overdue_actives() {
        let m = manager();
        let stale = m.purchase("u1", Tier::T1k, Difficulty::Beginner).unwrap();
        let fresh = m.purchase("u1", Tier::T1k, Difficulty::Beginner).unwrap();
        backdate_expiry(&m, &stale.id);

        let expired = m.expire_due(Utc::now().timestamp_millis()).unwrap();
        assert_eq!(expired, 1);
        assert_eq!(m.get(&stale.id).unwrap().status, ChallengeStatus::Expired);
        assert_eq!(m.get(&fresh.id).unwrap().status, ChallengeStatus::Active);

        // Re-running the sweep is a no-op
        assert_eq!(m.expire_due(Utc::now().timestamp_millis()).unwrap(), 0);
    }

    #[test]
    fn test_expired_challenges_free_cap_slots() {
        let m = manager();
        let ids: Vec<String> = (0..5)
            .map(|_| m.purchase("u1", Tier::T1k, Difficulty::Beginner).unwrap().id)
            .collect();
        backdate_expiry(&m, &ids[0]);
        m.expire_due(Utc::now().timestamp_millis()).unwrap();

        assert!(m.purchase("u1", Tier::T1k, Difficulty::Beginner).is_ok());
    }

    #[test]
    fn test_reset_requires_expiry() {
        let m = manager();
        let c = m.purchase("u1", Tier::T1k, Difficulty::Beginner).unwrap();
        let err = m.reset(&c.id, &AutoApproveRail).unwrap_err();
        assert!(matches!(err, EngineError::NotExpired));
    }

    #[test]
    fn test_reset_creates_a_new_record() {
        let m = manager();
        let old = m.purchase("u1", Tier::T5k, Difficulty::Pro).unwrap();
        backdate_expiry(&m, &old.id);
        m.expire_due(Utc::now().timestamp_millis()).unwrap();

        let fresh = m.reset(&old.id, &AutoApproveRail).unwrap();
        assert_ne!(fresh.id, old.id);
        assert_eq!(fresh.tier, old.tier);
        assert_eq!(fresh.difficulty, old.difficulty);
        assert_eq!(fresh.current_streak, 0);
        assert_eq!(fresh.status, ChallengeStatus::Active);

        // History untouched
        assert_eq!(m.get(&old.id).unwrap().status, ChallengeStatus::Expired);
    }

    #[test]
    fn test_reset_aborts_when_the_fee_charge_fails() {
        let m = manager();
        let old = m.purchase("u1", Tier::T1k, Difficulty::Beginner).unwrap();
        backdate_expiry(&m, &old.id);
        m.expire_due(Utc::now().timestamp_millis()).unwrap();

        assert!(m.reset(&old.id, &DecliningRail).is_err());
        let list = m.list("u1", false).unwrap();
        assert_eq!(list.current_count, 0, "no challenge without a confirmed fee");
    }

    #[test]
    fn test_cancel_forfeits_pending_rewards() {
        let m = manager();
        let c = m.purchase("u1", Tier::T1k, Difficulty::Beginner).unwrap();

        // Simulate an unlocked level with a pending reward
        {
            let conn = m.db.conn();
            conn.execute(
                "INSERT INTO challenge_rewards (id, challenge_id, level, amount_cents, status, unlocked_at)
                 VALUES ('r1', ?1, 1, 300, 'pending', 0)",
                rusqlite::params![c.id],
            )
            .unwrap();
            conn.execute(
                "UPDATE challenge_levels SET state = 'unlocked', reward_id = 'r1'
                 WHERE challenge_id = ?1 AND level = 1",
                rusqlite::params![c.id],
            )
            .unwrap();
            conn.execute(
                "UPDATE challenges SET total_pending_cents = 300, total_rewards_earned_cents = 300
                 WHERE id = ?1",
                rusqlite::params![c.id],
            )
            .unwrap();
        }

        let cancelled = m.cancel(&c.id).unwrap();
        assert_eq!(cancelled.status, ChallengeStatus::Cancelled);
        assert_eq!(cancelled.total_pending_cents, 0);

        let status: String = m
            .db
            .conn()
            .query_row(
                "SELECT status FROM challenge_rewards WHERE id = 'r1'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(status, "forfeited");
    }

    #[test]
    fn test_days_remaining_rounds_up_and_clamps() {
        assert_eq!(days_remaining(DAY_MS, 0), 1);
        assert_eq!(days_remaining(DAY_MS + 1, 0), 2);
        assert_eq!(days_remaining(0, DAY_MS), 0);
        assert_eq!(days_remaining(45 * DAY_MS, 0), 45);
    }
}
