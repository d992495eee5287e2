//! HTTP JSON API for the engine
//!
//! Thin wrapper over the engine operations: every endpoint parses a JSON
//! request, calls one engine method and serializes the result. Listens on
//! the configured address and accepts:
//! - GET  /api/ping
//! - GET  /api/catalog
//! - GET  /api/users/{user_id}/challenges  (?include=all for history)
//! - POST /api/users/{user_id}/challenges
//! - POST /api/challenges/{id}/reset
//! - POST /api/challenges/{id}/cancel      (administrative)
//! - POST /api/users/{user_id}/bets
//! - POST /api/bets/{id}/settle
//! - POST /api/users/{user_id}/claims
//! - GET  /api/users/{user_id}/payouts
//! - POST /api/users/{user_id}/payouts
//! - POST /api/payouts/{id}/status         (administrative)

mod handlers;

use std::io::Read;

use tiny_http::{Response, Server};
use tracing::{error, info};

use crate::engine::Engine;
use crate::error::EngineError;

const AUTH_HEADER: &str = "X-Streakvault-Token";
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Run the HTTP server until the process exits
pub fn run_server(
    engine: Engine,
    bind_addr: &str,
    auth_token: Option<String>,
) -> anyhow::Result<()> {
    let server = Server::http(bind_addr)
        .map_err(|e| anyhow::anyhow!("Failed to start server on {}: {}", bind_addr, e))?;
    let auth_enabled = auth_token.as_deref().is_some_and(|t| !t.trim().is_empty());
    info!(
        "API server listening on http://{} (auth: {})",
        bind_addr,
        if auth_enabled { "enabled" } else { "disabled" }
    );

    for mut request in server.incoming_requests() {
        let method = request.method().to_string();
        let url = request.url().to_string();
        let (path, query) = match url.split_once('?') {
            Some((p, q)) => (p, q),
            None => (url.as_str(), ""),
        };

        if !is_authorized(&request, auth_token.as_deref()) {
            respond_json(request, 401, serde_json::json!({ "error": "unauthorized" }));
            continue;
        }

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match (method.as_str(), segments.as_slice()) {
            ("GET", ["api", "ping"]) => {
                respond_json(
                    request,
                    200,
                    serde_json::json!({
                        "status": "ok",
                        "version": env!("CARGO_PKG_VERSION"),
                    }),
                );
            }
            ("GET", ["api", "catalog"]) => handlers::handle_catalog(request),
            ("GET", ["api", "users", user_id, "challenges"]) => {
                handlers::handle_challenge_list(&engine, user_id, query, request);
            }
            ("POST", ["api", "users", user_id, "challenges"]) => {
                let body = match read_request_body(&mut request) {
                    Ok(body) => body,
                    Err(response) => {
                        let _ = request.respond(response);
                        continue;
                    }
                };
                handlers::handle_purchase(&engine, user_id, &body, request);
            }
            ("POST", ["api", "challenges", challenge_id, "reset"]) => {
                handlers::handle_reset(&engine, challenge_id, request);
            }
            ("POST", ["api", "challenges", challenge_id, "cancel"]) => {
                handlers::handle_cancel(&engine, challenge_id, request);
            }
            ("POST", ["api", "users", user_id, "bets"]) => {
                let body = match read_request_body(&mut request) {
                    Ok(body) => body,
                    Err(response) => {
                        let _ = request.respond(response);
                        continue;
                    }
                };
                handlers::handle_place_bet(&engine, user_id, &body, request);
            }
            ("POST", ["api", "bets", bet_id, "settle"]) => {
                let body = match read_request_body(&mut request) {
                    Ok(body) => body,
                    Err(response) => {
                        let _ = request.respond(response);
                        continue;
                    }
                };
                handlers::handle_settle(&engine, bet_id, &body, request);
            }
            ("POST", ["api", "users", user_id, "claims"]) => {
                let body = match read_request_body(&mut request) {
                    Ok(body) => body,
                    Err(response) => {
                        let _ = request.respond(response);
                        continue;
                    }
                };
                handlers::handle_claim(&engine, user_id, &body, request);
            }
            ("GET", ["api", "users", user_id, "payouts"]) => {
                handlers::handle_payout_list(&engine, user_id, request);
            }
            ("POST", ["api", "users", user_id, "payouts"]) => {
                let body = match read_request_body(&mut request) {
                    Ok(body) => body,
                    Err(response) => {
                        let _ = request.respond(response);
                        continue;
                    }
                };
                handlers::handle_payout_request(&engine, user_id, &body, request);
            }
            ("POST", ["api", "payouts", payout_id, "status"]) => {
                let body = match read_request_body(&mut request) {
                    Ok(body) => body,
                    Err(response) => {
                        let _ = request.respond(response);
                        continue;
                    }
                };
                handlers::handle_payout_status(&engine, payout_id, &body, request);
            }
            _ => {
                respond_json(request, 404, serde_json::json!({ "error": "not_found" }));
            }
        }
    }

    Ok(())
}

fn is_authorized(request: &tiny_http::Request, expected: Option<&str>) -> bool {
    let Some(expected) = expected.filter(|t| !t.trim().is_empty()) else {
        return true;
    };

    request
        .headers()
        .iter()
        .find(|h| h.field.equiv(AUTH_HEADER))
        .map(|h| h.value.as_str() == expected)
        .unwrap_or(false)
}

fn json_content_type() -> tiny_http::Header {
    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap()
}

fn read_request_body(
    request: &mut tiny_http::Request,
) -> Result<String, Response<std::io::Cursor<Vec<u8>>>> {
    let mut body = String::new();
    let mut reader = request.as_reader().take((MAX_BODY_BYTES + 1) as u64);
    if let Err(e) = reader.read_to_string(&mut body) {
        error!("Failed to read request body: {}", e);
        let response = Response::from_string("{\"error\":\"bad_request\"}")
            .with_status_code(400)
            .with_header(json_content_type());
        return Err(response);
    }

    if body.len() > MAX_BODY_BYTES {
        let response = Response::from_string("{\"error\":\"payload_too_large\"}")
            .with_status_code(413)
            .with_header(json_content_type());
        return Err(response);
    }

    Ok(body)
}

/// Serialize any response payload, falling back to a logged 500
pub(crate) fn respond_data<T: serde::Serialize>(
    request: tiny_http::Request,
    status_code: u16,
    value: &T,
) {
    match serde_json::to_value(value) {
        Ok(v) => respond_json(request, status_code, v),
        Err(e) => {
            error!("failed to serialize response: {}", e);
            respond_json(request, 500, serde_json::json!({ "error": "internal" }));
        }
    }
}

pub(crate) fn respond_json(request: tiny_http::Request, status_code: u16, value: serde_json::Value) {
    let body =
        serde_json::to_string(&value).unwrap_or_else(|_| "{\"error\":\"serialize\"}".to_string());
    let response = Response::from_string(body)
        .with_status_code(status_code)
        .with_header(json_content_type());
    let _ = request.respond(response);
}

/// Map an engine error to its HTTP shape. Storage errors are logged in full
/// and surfaced generically.
pub(crate) fn respond_engine_error(request: tiny_http::Request, err: EngineError) {
    if let EngineError::Storage(inner) = &err {
        error!("storage error: {}", inner);
    }
    respond_json(
        request,
        err.http_status(),
        serde_json::json!({
            "error": err.kind(),
            "message": err.user_message(),
        }),
    );
}
