//! Init command implementation

use std::path::Path;

use anyhow::{bail, Result};
use tracing::info;

/// Default configuration content for streakvault init
pub const DEFAULT_CONFIG: &str = r#"# Streakvault Configuration
# =========================
#
# The engine keeps its ledger in a single SQLite database and exposes a
# JSON API for the platform frontend.

# Where the ledger database lives (default: ~/.streakvault/engine.db)
# db_path = "/var/lib/streakvault/engine.db"

# Address the HTTP API binds to
bind_addr = "127.0.0.1:8787"

# Optional: shared secret for API requests (sent as `X-Streakvault-Token`)
# Leave empty to disable auth (recommended for local development only)
auth_token = ""

# Seconds between expiry sweeps while serving
sweep_interval_secs = 300
"#;

/// Write the default config file
pub fn init_command(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Config file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG)?;
    info!("wrote config to {}", path.display());
    println!("Created {}", path.display());
    Ok(())
}
