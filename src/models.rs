//! Persisted data models
//!
//! Row types for the four ledger tables (challenges, rewards, bets, payouts)
//! plus the per-level state machine and the bet→challenge link rows. All
//! money fields are integer cents; timestamps are UTC epoch milliseconds.

use serde::{Deserialize, Serialize};

use crate::catalog::{Difficulty, Tier};

/// Lifecycle status of a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Active,
    Expired,
    Cancelled,
}

impl ChallengeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Per-level state machine. Monotonic: Locked → Unlocked → Claimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum LevelState {
    Locked,
    Unlocked { reward_id: String },
    Claimed,
}

impl LevelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Unlocked { .. } => "unlocked",
            Self::Claimed => "claimed",
        }
    }

    /// Whether the level's reward has been unlocked (claimed or not)
    pub fn is_unlocked(&self) -> bool {
        !matches!(self, Self::Locked)
    }
}

/// One purchased, time-boxed challenge account
#[derive(Debug, Clone, Serialize)]
pub struct Challenge {
    pub id: String,
    pub user_id: String,
    pub tier: Tier,
    pub difficulty: Difficulty,
    /// Odds floor snapshotted from the catalog at purchase time
    pub min_odds: f64,
    /// Level currently being worked toward (1-4)
    pub current_level: u8,
    /// Consecutive qualifying wins since the last qualifying loss
    pub current_streak: u32,
    /// Highest streak ever reached, bookkeeping only
    pub best_streak: u32,
    /// State of levels 1 through 4
    pub levels: [LevelState; 4],
    pub total_rewards_earned_cents: i64,
    pub total_pending_cents: i64,
    /// Purchase price snapshotted from the catalog
    pub price_cents: i64,
    /// Fee for a post-expiry reset: half the purchase price
    pub reset_fee_cents: i64,
    pub purchased_at: i64,
    pub expires_at: i64,
    pub status: ChallengeStatus,
}

impl Challenge {
    /// Whether all four levels have been unlocked
    pub fn is_complete(&self) -> bool {
        self.levels.iter().all(|l| l.is_unlocked())
    }
}

/// Status of a single level reward row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardStatus {
    Pending,
    Paid,
    /// Pending reward voided by an administrative cancel; kept for audit
    Forfeited,
}

impl RewardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Forfeited => "forfeited",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "forfeited" => Some(Self::Forfeited),
            _ => None,
        }
    }
}

/// One row per level unlock
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeReward {
    pub id: String,
    pub challenge_id: String,
    pub level: u8,
    pub amount_cents: i64,
    pub status: RewardStatus,
    pub unlocked_at: i64,
    pub paid_at: Option<i64>,
}

/// Outcome of a settled bet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetResult {
    Pending,
    Won,
    Lost,
    Push,
}

impl BetResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Won => "won",
            Self::Lost => "lost",
            Self::Push => "push",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "won" => Some(Self::Won),
            "lost" => Some(Self::Lost),
            "push" => Some(Self::Push),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A wager, optionally linked to challenges at placement time
#[derive(Debug, Clone, Serialize)]
pub struct Bet {
    pub id: String,
    pub user_id: String,
    /// Decimal odds, e.g. 1.85
    pub odds: f64,
    pub stake_cents: i64,
    pub result: BetResult,
    /// Set once the settlement has been folded into the linked challenges.
    /// Re-delivered settlement events no-op when this is already set.
    pub settlement_applied: bool,
    pub placed_at: i64,
    pub settled_at: Option<i64>,
}

/// Join row between a bet and a challenge, written at placement time.
/// Carries a snapshot of the qualification parameters so later ladder
/// changes or challenge expiry never alter whether this bet qualified.
#[derive(Debug, Clone, Serialize)]
pub struct BetChallengeLink {
    pub bet_id: String,
    pub challenge_id: String,
    pub min_odds: f64,
    pub difficulty: Difficulty,
}

/// Payout request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Rejected,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Whether this payout still counts against the available balance
    pub fn reserves_funds(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// Payment method for a payout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutMethod {
    Bank,
    Paypal,
    Crypto,
}

impl PayoutMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bank => "bank",
            Self::Paypal => "paypal",
            Self::Crypto => "crypto",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bank" => Some(Self::Bank),
            "paypal" => Some(Self::Paypal),
            "crypto" => Some(Self::Crypto),
            _ => None,
        }
    }
}

/// Method-specific payout destination details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayoutDetails {
    Bank { iban: String, account_name: String },
    Paypal { email: String },
    Crypto { wallet_address: String, network: String },
}

impl PayoutDetails {
    /// Validate raw request details against the chosen method
    pub fn from_request(
        method: PayoutMethod,
        details: &serde_json::Value,
    ) -> Result<Self, String> {
        let field = |name: &str| -> Result<String, String> {
            details
                .get(name)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| format!("missing required field '{}'", name))
        };

        match method {
            PayoutMethod::Bank => Ok(Self::Bank {
                iban: field("iban")?,
                account_name: field("account_name")?,
            }),
            PayoutMethod::Paypal => Ok(Self::Paypal {
                email: field("email")?,
            }),
            PayoutMethod::Crypto => Ok(Self::Crypto {
                wallet_address: field("wallet_address")?,
                network: field("network")?,
            }),
        }
    }
}

/// A withdrawal request against the available balance. The engine only keeps
/// the authoritative status; moving real funds is an external concern.
#[derive(Debug, Clone, Serialize)]
pub struct Payout {
    pub id: String,
    pub user_id: String,
    pub amount_cents: i64,
    pub method: PayoutMethod,
    pub details: PayoutDetails,
    pub status: PayoutStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrips() {
        for s in ["active", "expired", "cancelled"] {
            assert_eq!(ChallengeStatus::from_str(s).unwrap().as_str(), s);
        }
        for s in ["pending", "paid", "forfeited"] {
            assert_eq!(RewardStatus::from_str(s).unwrap().as_str(), s);
        }
        for s in ["pending", "won", "lost", "push"] {
            assert_eq!(BetResult::from_str(s).unwrap().as_str(), s);
        }
        for s in ["pending", "processing", "completed", "rejected"] {
            assert_eq!(PayoutStatus::from_str(s).unwrap().as_str(), s);
        }
    }

    #[test]
    fn test_rejected_payouts_release_funds() {
        assert!(PayoutStatus::Pending.reserves_funds());
        assert!(PayoutStatus::Processing.reserves_funds());
        assert!(PayoutStatus::Completed.reserves_funds());
        assert!(!PayoutStatus::Rejected.reserves_funds());
    }

    #[test]
    fn test_payout_details_validation() {
        let ok = serde_json::json!({"iban": "DE89370400440532013000", "account_name": "Jo Doe"});
        assert!(PayoutDetails::from_request(PayoutMethod::Bank, &ok).is_ok());

        let missing = serde_json::json!({"iban": "DE89370400440532013000"});
        let err = PayoutDetails::from_request(PayoutMethod::Bank, &missing).unwrap_err();
        assert!(err.contains("account_name"));

        let blank = serde_json::json!({"email": "   "});
        assert!(PayoutDetails::from_request(PayoutMethod::Paypal, &blank).is_err());

        let crypto = serde_json::json!({"wallet_address": "0xabc", "network": "ethereum"});
        assert!(PayoutDetails::from_request(PayoutMethod::Crypto, &crypto).is_ok());
    }
}
