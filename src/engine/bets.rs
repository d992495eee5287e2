//! Bet placement and settlement recording
//!
//! Placement is where challenge linkage happens: every referenced challenge
//! must be active, owned by the bettor, and satisfied by the bet's odds. The
//! link rows snapshot the qualification parameters so later ladder changes or
//! expiry never alter whether this bet qualified.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::{load_bet, load_challenge, BetSettlementCoordinator, SettlementSummary};
use crate::error::EngineError;
use crate::models::{Bet, BetChallengeLink, BetResult, ChallengeStatus};
use crate::store::EngineDb;

/// Placement and settlement entry points for wagers
pub struct BetManager {
    db: EngineDb,
}

impl BetManager {
    pub fn new(db: EngineDb) -> Self {
        Self { db }
    }

    /// Place a bet, optionally linked to one or more challenges.
    ///
    /// Fails with `OddsBelowMinimum` when any referenced challenge's odds
    /// floor is not met; qualification problems surface at placement time
    /// rather than being silently dropped at settlement.
    pub fn place(
        &self,
        user_id: &str,
        odds: f64,
        stake_cents: i64,
        challenge_ids: &[String],
    ) -> Result<Bet, EngineError> {
        if !odds.is_finite() || odds <= 1.0 {
            return Err(EngineError::Validation(
                "odds must be a decimal greater than 1.0".to_string(),
            ));
        }
        if stake_cents <= 0 {
            return Err(EngineError::Validation(
                "stake must be positive".to_string(),
            ));
        }
        let mut deduped = challenge_ids.to_vec();
        deduped.sort();
        deduped.dedup();
        if deduped.len() != challenge_ids.len() {
            return Err(EngineError::Validation(
                "duplicate challenge reference".to_string(),
            ));
        }

        let bet = self.db.run_in_tx(|tx| {
            let bet = Bet {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                odds,
                stake_cents,
                result: BetResult::Pending,
                settlement_applied: false,
                placed_at: Utc::now().timestamp_millis(),
                settled_at: None,
            };

            tx.execute(
                r#"INSERT INTO bets
                   (id, user_id, odds, stake_cents, result, settlement_applied, placed_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)"#,
                rusqlite::params![
                    bet.id,
                    bet.user_id,
                    bet.odds,
                    bet.stake_cents,
                    bet.result.as_str(),
                    bet.placed_at,
                ],
            )?;

            for challenge_id in challenge_ids {
                let challenge = load_challenge(tx, challenge_id)?
                    .filter(|c| c.user_id == user_id)
                    .ok_or(EngineError::NotFound("challenge"))?;
                if challenge.status != ChallengeStatus::Active {
                    return Err(EngineError::Validation(format!(
                        "challenge {} is no longer active",
                        challenge_id
                    )));
                }
                if odds < challenge.min_odds {
                    return Err(EngineError::OddsBelowMinimum {
                        odds,
                        min_odds: challenge.min_odds,
                    });
                }

                let link = BetChallengeLink {
                    bet_id: bet.id.clone(),
                    challenge_id: challenge_id.clone(),
                    min_odds: challenge.min_odds,
                    difficulty: challenge.difficulty,
                };
                tx.execute(
                    "INSERT INTO bet_challenge_links (bet_id, challenge_id, min_odds, difficulty)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![
                        link.bet_id,
                        link.challenge_id,
                        link.min_odds,
                        link.difficulty.as_str(),
                    ],
                )?;
            }
            Ok(bet)
        })?;

        info!(
            "bet {} placed by {} at odds {} ({} challenge link(s))",
            bet.id,
            user_id,
            odds,
            challenge_ids.len()
        );
        Ok(bet)
    }

    /// Record a settlement outcome and fold it into the linked challenges.
    ///
    /// Re-delivering the same outcome is a no-op; a conflicting outcome for
    /// an already-settled bet is rejected.
    pub fn settle(
        &self,
        bet_id: &str,
        result: BetResult,
    ) -> Result<SettlementSummary, EngineError> {
        if !result.is_settled() {
            return Err(EngineError::Validation(
                "settlement result must be won, lost or push".to_string(),
            ));
        }

        self.db.run_in_tx(|tx| {
            let bet = load_bet(tx, bet_id)?.ok_or(EngineError::NotFound("bet"))?;
            match bet.result {
                BetResult::Pending => {
                    tx.execute(
                        "UPDATE bets SET result = ?1, settled_at = ?2 WHERE id = ?3",
                        rusqlite::params![
                            result.as_str(),
                            Utc::now().timestamp_millis(),
                            bet_id
                        ],
                    )?;
                    Ok(())
                }
                prior if prior == result => Ok(()),
                prior => Err(EngineError::Validation(format!(
                    "bet already settled as {}",
                    prior.as_str()
                ))),
            }
        })?;

        BetSettlementCoordinator::new(self.db.clone()).on_bet_settled(bet_id)
    }

    /// Load one bet by id
    pub fn get(&self, bet_id: &str) -> Result<Bet, EngineError> {
        self.db
            .run_in_tx(|tx| load_bet(tx, bet_id)?.ok_or(EngineError::NotFound("bet")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Difficulty, Tier};
    use crate::engine::ChallengeManager;

    fn setup() -> (BetManager, ChallengeManager, EngineDb) {
        let db = EngineDb::open_in_memory().unwrap();
        (
            BetManager::new(db.clone()),
            ChallengeManager::new(db.clone()),
            db,
        )
    }

    #[test]
    fn test_place_links_with_snapshot() {
        let (bets, challenges, db) = setup();
        let c = challenges.purchase("u1", Tier::T1k, Difficulty::Pro).unwrap();

        let bet = bets.place("u1", 2.5, 1_000, &[c.id.clone()]).unwrap();
        assert_eq!(bet.result, BetResult::Pending);

        let (min_odds, difficulty): (f64, String) = db
            .conn()
            .query_row(
                "SELECT min_odds, difficulty FROM bet_challenge_links WHERE bet_id = ?1",
                rusqlite::params![bet.id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(min_odds, 2.0);
        assert_eq!(difficulty, "pro");
    }

    #[test]
    fn test_place_rejects_sub_floor_odds() {
        let (bets, challenges, _db) = setup();
        let c = challenges.purchase("u1", Tier::T1k, Difficulty::Pro).unwrap();

        let err = bets.place("u1", 1.8, 1_000, &[c.id]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::OddsBelowMinimum { min_odds, .. } if min_odds == 2.0
        ));
    }

    #[test]
    fn test_place_rejects_foreign_or_unknown_challenges() {
        let (bets, challenges, _db) = setup();
        let c = challenges.purchase("owner", Tier::T1k, Difficulty::Beginner).unwrap();

        let err = bets.place("intruder", 2.0, 1_000, &[c.id]).unwrap_err();
        assert!(matches!(err, EngineError::NotFound("challenge")));

        let err = bets
            .place("u1", 2.0, 1_000, &["missing".to_string()])
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound("challenge")));
    }

    #[test]
    fn test_place_rejects_inactive_challenge() {
        let (bets, challenges, db) = setup();
        let c = challenges.purchase("u1", Tier::T1k, Difficulty::Beginner).unwrap();
        db.conn()
            .execute(
                "UPDATE challenges SET status = 'expired' WHERE id = ?1",
                rusqlite::params![c.id],
            )
            .unwrap();

        let err = bets.place("u1", 2.0, 1_000, &[c.id]).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_place_validates_inputs() {
        let (bets, _challenges, _db) = setup();
        assert!(bets.place("u1", 1.0, 1_000, &[]).is_err());
        assert!(bets.place("u1", f64::NAN, 1_000, &[]).is_err());
        assert!(bets.place("u1", 2.0, 0, &[]).is_err());
        assert!(bets
            .place("u1", 2.0, 100, &["a".to_string(), "a".to_string()])
            .is_err());
    }

    #[test]
    fn test_settle_rejects_conflicting_result() {
        let (bets, _challenges, _db) = setup();
        let bet = bets.place("u1", 2.0, 1_000, &[]).unwrap();

        bets.settle(&bet.id, BetResult::Won).unwrap();
        let err = bets.settle(&bet.id, BetResult::Lost).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(bets.get(&bet.id).unwrap().result, BetResult::Won);
    }

    #[test]
    fn test_settle_requires_a_final_result() {
        let (bets, _challenges, _db) = setup();
        let bet = bets.place("u1", 2.0, 1_000, &[]).unwrap();
        assert!(bets.settle(&bet.id, BetResult::Pending).is_err());
    }
}
