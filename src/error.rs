//! Engine error taxonomy
//!
//! Every business-rule failure maps to a stable error kind plus a
//! human-readable message; callers (the HTTP layer, the CLI) must never show
//! raw storage errors to a user.

/// Error type for all engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Active challenge limit reached ({active}/{max})")]
    LimitExceeded { active: usize, max: usize },

    #[error("Bet odds {odds} are below the challenge minimum of {min_odds}")]
    OddsBelowMinimum { odds: f64, min_odds: f64 },

    #[error("Payout amount is below the minimum of {min_cents} cents")]
    BelowMinimum { min_cents: i64 },

    #[error("Missing or invalid payout details: {0}")]
    InvalidDetails(String),

    #[error("Insufficient balance: requested {requested_cents}, available {available_cents}")]
    InsufficientBalance {
        requested_cents: i64,
        available_cents: i64,
    },

    #[error("Challenge is not expired and cannot be reset")]
    NotExpired,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Concurrent update conflict, please retry")]
    TransientConflict,

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl EngineError {
    /// Stable machine-readable kind, used as the `error` field in API responses
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::LimitExceeded { .. } => "limit_exceeded",
            Self::OddsBelowMinimum { .. } => "odds_below_minimum",
            Self::BelowMinimum { .. } => "below_minimum",
            Self::InvalidDetails(_) => "invalid_details",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::NotExpired => "not_expired",
            Self::NotFound(_) => "not_found",
            Self::TransientConflict => "transient_conflict",
            Self::Storage(_) => "internal",
        }
    }

    /// Message safe to show in a UI. Storage errors are collapsed to a
    /// generic message; the full error goes to the log instead.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::LimitExceeded { max, .. } => {
                format!("You already have the maximum of {} active challenges", max)
            }
            Self::OddsBelowMinimum { min_odds, .. } => {
                format!("This bet does not meet the minimum odds of {:.2}", min_odds)
            }
            Self::BelowMinimum { min_cents } => {
                format!("Minimum payout is {:.2}", *min_cents as f64 / 100.0)
            }
            Self::InvalidDetails(msg) => msg.clone(),
            Self::InsufficientBalance {
                available_cents, ..
            } => format!(
                "Amount exceeds your available balance of {:.2}",
                *available_cents as f64 / 100.0
            ),
            Self::NotExpired => "Only expired challenges can be reset".to_string(),
            Self::NotFound(what) => format!("{} not found", what),
            Self::TransientConflict => {
                "The request conflicted with a concurrent update, please retry".to_string()
            }
            Self::Storage(_) => "Something went wrong, please try again later".to_string(),
        }
    }

    /// HTTP status code for the API layer
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_)
            | Self::OddsBelowMinimum { .. }
            | Self::BelowMinimum { .. }
            | Self::InvalidDetails(_) => 400,
            Self::NotFound(_) => 404,
            Self::LimitExceeded { .. } | Self::NotExpired | Self::InsufficientBalance { .. } => 409,
            Self::TransientConflict => 503,
            Self::Storage(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_stable() {
        let err = EngineError::LimitExceeded { active: 5, max: 5 };
        assert_eq!(err.kind(), "limit_exceeded");
        assert_eq!(err.http_status(), 409);

        let err = EngineError::BelowMinimum { min_cents: 1000 };
        assert_eq!(err.kind(), "below_minimum");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn test_storage_errors_are_not_leaked() {
        let err = EngineError::Storage(rusqlite::Error::InvalidQuery);
        assert_eq!(err.kind(), "internal");
        assert!(!err.user_message().contains("query"));
    }

    #[test]
    fn test_user_messages_are_formatted() {
        let err = EngineError::InsufficientBalance {
            requested_cents: 5000,
            available_cents: 1234,
        };
        assert!(err.user_message().contains("12.34"));
    }
}
