//! Sweep command implementation

use anyhow::Result;
use chrono::Utc;

use streakvault::config::Config;
use streakvault::engine::Engine;

/// Expire overdue challenges once and report the count
pub fn sweep_command(config: &Config) -> Result<()> {
    let engine = Engine::open(&config.db_path())?;
    let expired = engine
        .challenges()
        .expire_due(Utc::now().timestamp_millis())?;
    println!("Expired {} challenge(s)", expired);
    Ok(())
}
