//! Serve command implementation
//!
//! Runs the HTTP API plus the periodic expiry sweep in a background thread.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info};

use streakvault::config::Config;
use streakvault::engine::Engine;
use streakvault::server;

pub fn serve_command(config: Config, bind_override: Option<String>) -> Result<()> {
    let db_path = config.db_path();
    let engine = Engine::open(&db_path)?;
    info!("engine database at {}", db_path.display());

    let bind_addr = bind_override.unwrap_or_else(|| config.bind_addr.clone());

    // Periodic expiry sweep; the manager logs what it closes
    let sweeper = engine.clone();
    let interval = Duration::from_secs(config.sweep_interval_secs.max(1));
    thread::spawn(move || loop {
        thread::sleep(interval);
        if let Err(e) = sweeper.challenges().expire_due(Utc::now().timestamp_millis()) {
            error!("expiry sweep failed: {}", e);
        }
    });

    server::run_server(engine, &bind_addr, config.auth_token.clone())
}
