//! Bet placement and settlement handlers.

use serde::Deserialize;
use tiny_http::Request;

use super::super::{respond_data, respond_engine_error, respond_json};
use crate::engine::Engine;
use crate::models::BetResult;

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceBetRequest {
    /// Decimal odds, e.g. 1.85
    pub odds: f64,
    pub stake_cents: i64,
    /// Challenges this bet should count toward; each must be active, owned
    /// by the bettor and satisfied by the odds
    #[serde(default)]
    pub challenge_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettleRequest {
    pub result: BetResult,
}

/// Handle POST /api/users/{user_id}/bets
pub fn handle_place_bet(engine: &Engine, user_id: &str, body: &str, request: Request) {
    let req: PlaceBetRequest = match serde_json::from_str(body) {
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

    match engine
        .bets()
        .place(user_id, req.odds, req.stake_cents, &req.challenge_ids)
    {
        Ok(bet) => respond_data(request, 201, &bet),
        Err(err) => respond_engine_error(request, err),
    }
}

/// Handle POST /api/bets/{id}/settle
pub fn handle_settle(engine: &Engine, bet_id: &str, body: &str, request: Request) {
    let req: SettleRequest = match serde_json::from_str(body) {
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

    match engine.bets().settle(bet_id, req.result) {
        Ok(summary) => respond_data(request, 200, &summary),
        Err(err) => respond_engine_error(request, err),
    }
}
