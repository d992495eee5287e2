//! Payout request processing
//!
//! Validates withdrawal requests against the available balance and keeps the
//! authoritative status ledger. A pending row already reserves its amount;
//! real fund movement happens on external rails, which report back through
//! the status transition calls.

use chrono::Utc;
use rusqlite::{OptionalExtension, Transaction};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::ledger::available_balance_in;
use crate::error::EngineError;
use crate::models::{Payout, PayoutDetails, PayoutMethod, PayoutStatus};
use crate::store::EngineDb;

/// Smallest payout the platform will process: €10
pub const MIN_PAYOUT_CENTS: i64 = 1_000;

/// Payout history plus the balance it is drawn against
#[derive(Debug, Clone, Serialize)]
pub struct PayoutList {
    pub payouts: Vec<Payout>,
    pub available_cents: i64,
}

/// Withdrawal requests and their status ledger
pub struct PayoutProcessor {
    db: EngineDb,
}

impl PayoutProcessor {
    pub fn new(db: EngineDb) -> Self {
        Self { db }
    }

    /// Record a withdrawal request. The balance check shares the insert's
    /// transaction, so the reservation is atomic: once this returns, the
    /// amount is no longer available to a concurrent request.
    pub fn request(
        &self,
        user_id: &str,
        amount_cents: i64,
        method: PayoutMethod,
        details: &serde_json::Value,
    ) -> Result<Payout, EngineError> {
        if amount_cents < MIN_PAYOUT_CENTS {
            return Err(EngineError::BelowMinimum {
                min_cents: MIN_PAYOUT_CENTS,
            });
        }
        let details =
            PayoutDetails::from_request(method, details).map_err(EngineError::InvalidDetails)?;

        let payout = self.db.run_in_tx(|tx| {
            let available = available_balance_in(tx, user_id)?;
            if amount_cents > available {
                return Err(EngineError::InsufficientBalance {
                    requested_cents: amount_cents,
                    available_cents: available,
                });
            }

            let now = Utc::now().timestamp_millis();
            let payout = Payout {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                amount_cents,
                method,
                details: details.clone(),
                status: PayoutStatus::Pending,
                created_at: now,
                updated_at: now,
            };
            let details_json = serde_json::to_string(&payout.details)
                .map_err(|e| EngineError::Validation(e.to_string()))?;
            tx.execute(
                r#"INSERT INTO payouts
                   (id, user_id, amount_cents, method, details, status, created_at, updated_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                rusqlite::params![
                    payout.id,
                    payout.user_id,
                    payout.amount_cents,
                    method.as_str(),
                    details_json,
                    payout.status.as_str(),
                    payout.created_at,
                    payout.updated_at,
                ],
            )?;
            Ok(payout)
        })?;

        info!(
            "payout {} of {} cents requested by {} via {}",
            payout.id,
            amount_cents,
            user_id,
            method.as_str()
        );
        Ok(payout)
    }

    /// Payout history for a user, newest first, with the current balance
    pub fn list(&self, user_id: &str) -> Result<PayoutList, EngineError> {
        self.db.run_in_tx(|tx| {
            let mut stmt = tx.prepare(
                r#"SELECT id, user_id, amount_cents, method, details, status,
                          created_at, updated_at
                   FROM payouts WHERE user_id = ?1 ORDER BY created_at DESC"#,
            )?;
            let payouts: Vec<Payout> = stmt
                .query_map(rusqlite::params![user_id], payout_row_mapper)?
                .collect::<Result<_, _>>()?;
            drop(stmt);

            Ok(PayoutList {
                payouts,
                available_cents: available_balance_in(tx, user_id)?,
            })
        })
    }

    /// External rails picked the request up
    pub fn mark_processing(&self, payout_id: &str) -> Result<Payout, EngineError> {
        self.transition(payout_id, PayoutStatus::Processing, &[PayoutStatus::Pending])
    }

    /// Funds were sent; terminal
    pub fn mark_completed(&self, payout_id: &str) -> Result<Payout, EngineError> {
        self.transition(payout_id, PayoutStatus::Completed, &[PayoutStatus::Processing])
    }

    /// Request was rejected; the amount stops being reserved and is
    /// available again immediately
    pub fn mark_rejected(&self, payout_id: &str) -> Result<Payout, EngineError> {
        self.transition(
            payout_id,
            PayoutStatus::Rejected,
            &[PayoutStatus::Pending, PayoutStatus::Processing],
        )
    }

    fn transition(
        &self,
        payout_id: &str,
        to: PayoutStatus,
        from: &[PayoutStatus],
    ) -> Result<Payout, EngineError> {
        let payout = self.db.run_in_tx(|tx| {
            let current = load_payout(tx, payout_id)?.ok_or(EngineError::NotFound("payout"))?;
            if !from.contains(&current.status) {
                return Err(EngineError::Validation(format!(
                    "payout cannot move from {} to {}",
                    current.status.as_str(),
                    to.as_str()
                )));
            }
            tx.execute(
                "UPDATE payouts SET status = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![to.as_str(), Utc::now().timestamp_millis(), payout_id],
            )?;
            load_payout(tx, payout_id)?.ok_or(EngineError::NotFound("payout"))
        })?;

        info!("payout {} moved to {}", payout_id, to.as_str());
        Ok(payout)
    }
}

fn payout_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Payout> {
    let bad = |idx: usize, msg: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
    };

    let method_s: String = row.get(3)?;
    let method = PayoutMethod::from_str(&method_s)
        .ok_or_else(|| bad(3, format!("unknown payout method {}", method_s)))?;
    let details_s: String = row.get(4)?;
    let details: PayoutDetails = serde_json::from_str(&details_s)
        .map_err(|e| bad(4, format!("bad payout details: {}", e)))?;
    let status_s: String = row.get(5)?;
    let status = PayoutStatus::from_str(&status_s)
        .ok_or_else(|| bad(5, format!("unknown payout status {}", status_s)))?;

    Ok(Payout {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount_cents: row.get(2)?,
        method,
        details,
        status,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn load_payout(tx: &Transaction<'_>, id: &str) -> Result<Option<Payout>, EngineError> {
    let payout = tx
        .query_row(
            r#"SELECT id, user_id, amount_cents, method, details, status,
                      created_at, updated_at
               FROM payouts WHERE id = ?1"#,
            rusqlite::params![id],
            payout_row_mapper,
        )
        .optional()?;
    Ok(payout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Difficulty, Tier};
    use crate::engine::{BetManager, ChallengeManager, RewardLedger};
    use crate::models::BetResult;

    struct Harness {
        processor: PayoutProcessor,
        ledger: RewardLedger,
        challenges: ChallengeManager,
        bets: BetManager,
    }

    fn harness() -> Harness {
        let db = EngineDb::open_in_memory().unwrap();
        Harness {
            processor: PayoutProcessor::new(db.clone()),
            ledger: RewardLedger::new(db.clone()),
            challenges: ChallengeManager::new(db.clone()),
            bets: BetManager::new(db),
        }
    }

    fn bank_details() -> serde_json::Value {
        serde_json::json!({"iban": "DE89370400440532013000", "account_name": "Jo Doe"})
    }

    impl Harness {
        /// Earn and claim €1000 on a pro 1k challenge (levels 1 and 2)
        fn fund_user(&self, user_id: &str) -> i64 {
            let c = self
                .challenges
                .purchase(user_id, Tier::T1k, Difficulty::Pro)
                .unwrap();
            for _ in 0..4 {
                let bet = self
                    .bets
                    .place(user_id, 2.2, 1_000, &[c.id.clone()])
                    .unwrap();
                self.bets.settle(&bet.id, BetResult::Won).unwrap();
            }
            self.ledger.claim(user_id, None).unwrap().new_available_cents
        }
    }

    #[test]
    fn test_below_minimum_is_rejected_regardless_of_balance() {
        let h = harness();
        h.fund_user("u1");
        let err = h
            .processor
            .request("u1", 500, PayoutMethod::Bank, &bank_details())
            .unwrap_err();
        assert!(matches!(err, EngineError::BelowMinimum { .. }));
    }

    #[test]
    fn test_invalid_details_are_rejected() {
        let h = harness();
        h.fund_user("u1");
        let err = h
            .processor
            .request(
                "u1",
                1_000,
                PayoutMethod::Crypto,
                &serde_json::json!({"wallet_address": "0xabc"}),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidDetails(_)));
    }

    #[test]
    fn test_request_reserves_the_amount() {
        let h = harness();
        let funded = h.fund_user("u1");
        assert_eq!(funded, 500 + 15_000);

        h.processor
            .request("u1", 10_000, PayoutMethod::Bank, &bank_details())
            .unwrap();
        assert_eq!(h.ledger.available_balance("u1").unwrap(), funded - 10_000);

        // The remainder is not enough for another 10k
        let err = h
            .processor
            .request("u1", 10_000, PayoutMethod::Bank, &bank_details())
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_rejection_restores_the_balance() {
        let h = harness();
        let funded = h.fund_user("u1");
        let payout = h
            .processor
            .request("u1", 10_000, PayoutMethod::Paypal, &serde_json::json!({"email": "jo@example.com"}))
            .unwrap();

        h.processor.mark_rejected(&payout.id).unwrap();
        assert_eq!(h.ledger.available_balance("u1").unwrap(), funded);
    }

    #[test]
    fn test_completion_keeps_funds_debited() {
        let h = harness();
        let funded = h.fund_user("u1");
        let payout = h
            .processor
            .request("u1", 10_000, PayoutMethod::Bank, &bank_details())
            .unwrap();

        h.processor.mark_processing(&payout.id).unwrap();
        let done = h.processor.mark_completed(&payout.id).unwrap();
        assert_eq!(done.status, PayoutStatus::Completed);
        assert_eq!(h.ledger.available_balance("u1").unwrap(), funded - 10_000);
    }

    #[test]
    fn test_transition_guards() {
        let h = harness();
        h.fund_user("u1");
        let payout = h
            .processor
            .request("u1", 1_000, PayoutMethod::Bank, &bank_details())
            .unwrap();

        // pending cannot jump straight to completed
        assert!(h.processor.mark_completed(&payout.id).is_err());

        h.processor.mark_processing(&payout.id).unwrap();
        h.processor.mark_completed(&payout.id).unwrap();

        // completed is terminal
        assert!(h.processor.mark_rejected(&payout.id).is_err());
        assert!(h.processor.mark_processing(&payout.id).is_err());
    }

    #[test]
    fn test_list_returns_history_and_balance() {
        let h = harness();
        let funded = h.fund_user("u1");
        h.processor
            .request("u1", 1_000, PayoutMethod::Bank, &bank_details())
            .unwrap();
        h.processor
            .request("u1", 2_000, PayoutMethod::Paypal, &serde_json::json!({"email": "jo@example.com"}))
            .unwrap();

        let list = h.processor.list("u1").unwrap();
        assert_eq!(list.payouts.len(), 2);
        assert_eq!(list.available_cents, funded - 3_000);
    }

    #[test]
    fn test_balance_never_goes_negative() {
        let h = harness();
        let err = h
            .processor
            .request("broke", 1_000, PayoutMethod::Bank, &bank_details())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientBalance {
                available_cents: 0,
                ..
            }
        ));
    }
}
