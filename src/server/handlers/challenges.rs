//! Challenge lifecycle handlers.

use serde::Deserialize;
use tiny_http::Request;

use super::super::{respond_data, respond_engine_error, respond_json};
use crate::catalog::{Difficulty, Tier};
use crate::engine::{AutoApproveRail, Engine};

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    /// Notional size, e.g. 1000
    pub tier: Tier,
    pub difficulty: Difficulty,
}

/// Handle GET /api/users/{user_id}/challenges
pub fn handle_challenge_list(engine: &Engine, user_id: &str, query: &str, request: Request) {
    let include_inactive = query.split('&').any(|p| p == "include=all");
    match engine.challenges().list(user_id, include_inactive) {
        Ok(list) => respond_data(request, 200, &list),
        Err(err) => respond_engine_error(request, err),
    }
}

/// Handle POST /api/users/{user_id}/challenges
pub fn handle_purchase(engine: &Engine, user_id: &str, body: &str, request: Request) {
    let req: PurchaseRequest = match serde_json::from_str(body) {
        Ok(req) => req,
        Err(e) => {
            respond_json(
                request,
                400,
                serde_json::json!({ "error": "invalid_json", "details": e.to_string() }),
            );
            return;
        }
    };

    match engine.challenges().purchase(user_id, req.tier, req.difficulty) {
        Ok(challenge) => respond_data(request, 201, &challenge),
        Err(err) => respond_engine_error(request, err),
    }
}

/// Handle POST /api/challenges/{id}/reset
///
/// The server binary runs with the auto-approving rail; production deploys
/// plug the real checkout flow in behind the same trait.
pub fn handle_reset(engine: &Engine, challenge_id: &str, request: Request) {
    match engine.challenges().reset(challenge_id, &AutoApproveRail) {
        Ok(challenge) => respond_data(request, 201, &challenge),
        Err(err) => respond_engine_error(request, err),
    }
}

/// Handle POST /api/challenges/{id}/cancel (administrative)
pub fn handle_cancel(engine: &Engine, challenge_id: &str, request: Request) {
    match engine.challenges().cancel(challenge_id) {
        Ok(challenge) => respond_data(request, 200, &challenge),
        Err(err) => respond_engine_error(request, err),
    }
}
