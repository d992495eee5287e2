//! Reward claim handler.

use serde::Deserialize;
use tiny_http::Request;

use super::super::{respond_data, respond_engine_error, respond_json};
use crate::engine::Engine;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClaimRequest {
    /// Claim only this challenge's rewards; omit to claim everything pending
    #[serde(default)]
    pub challenge_id: Option<String>,
}

/// Handle POST /api/users/{user_id}/claims
pub fn handle_claim(engine: &Engine, user_id: &str, body: &str, request: Request) {
    // An empty body claims everything
    let req: ClaimRequest = if body.trim().is_empty() {
        ClaimRequest::default()
    } else {
        match serde_json::from_str(body) {
            Ok(req) => req,
            Err(e) => {
                respond_json(
                    request,
                    400,
                    serde_json::json!({ "error": "invalid_json", "details": e.to_string() }),
                );
                return;
            }
        }
    };

    match engine.rewards().claim(user_id, req.challenge_id.as_deref()) {
        Ok(outcome) => respond_data(request, 200, &outcome),
        Err(err) => respond_engine_error(request, err),
    }
}
