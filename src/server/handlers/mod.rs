//! HTTP request handlers for the engine API endpoints.

mod bets;
mod challenges;
mod payouts;
mod rewards;

pub use bets::{handle_place_bet, handle_settle};
pub use challenges::{handle_cancel, handle_challenge_list, handle_purchase, handle_reset};
pub use payouts::{handle_payout_list, handle_payout_request, handle_payout_status};
pub use rewards::handle_claim;

use super::respond_json;
use crate::catalog::CATALOG;

/// Handle GET /api/catalog
pub fn handle_catalog(request: tiny_http::Request) {
    respond_json(request, 200, serde_json::json!({ "catalog": CATALOG }));
}
