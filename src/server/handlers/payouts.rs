//! Payout request and status handlers.

use serde::Deserialize;
use tiny_http::Request;

use super::super::{respond_data, respond_engine_error, respond_json};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::models::{PayoutMethod, PayoutStatus};

#[derive(Debug, Clone, Deserialize)]
pub struct PayoutRequest {
    pub amount_cents: i64,
    pub method: PayoutMethod,
    /// Method-specific destination fields, validated against the method
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayoutStatusRequest {
    pub status: PayoutStatus,
}

/// Handle GET /api/users/{user_id}/payouts
pub fn handle_payout_list(engine: &Engine, user_id: &str, request: Request) {
    match engine.payouts().list(user_id) {
        Ok(list) => respond_data(request, 200, &list),
        Err(err) => respond_engine_error(request, err),
    }
}

/// Handle POST /api/users/{user_id}/payouts
pub fn handle_payout_request(engine: &Engine, user_id: &str, body: &str, request: Request) {
    let req: PayoutRequest = match serde_json::from_str(body) {
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
        .payouts()
        .request(user_id, req.amount_cents, req.method, &req.details)
    {
        Ok(payout) => respond_data(request, 201, &payout),
        Err(err) => respond_engine_error(request, err),
    }
}

/// Handle POST /api/payouts/{id}/status (administrative / rails callback)
pub fn handle_payout_status(engine: &Engine, payout_id: &str, body: &str, request: Request) {
    let req: PayoutStatusRequest = match serde_json::from_str(body) {
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

    let processor = engine.payouts();
    let result = match req.status {
        PayoutStatus::Processing => processor.mark_processing(payout_id),
        PayoutStatus::Completed => processor.mark_completed(payout_id),
        PayoutStatus::Rejected => processor.mark_rejected(payout_id),
        PayoutStatus::Pending => Err(EngineError::Validation(
            "a payout cannot be moved back to pending".to_string(),
        )),
    };

    match result {
        Ok(payout) => respond_data(request, 200, &payout),
        Err(err) => respond_engine_error(request, err),
    }
}
