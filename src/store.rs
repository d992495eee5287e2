//! SQLite database connection and schema management for the engine
//!
//! Manages the `~/.streakvault/engine.db` database with automatic schema
//! migration. All mutating operations run through [`EngineDb::run_in_tx`],
//! which wraps the unit of work in an IMMEDIATE transaction so concurrent
//! streak updates and claims serialize instead of losing updates.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::error::EngineError;

/// Database wrapper shared by all engine components
#[derive(Clone)]
pub struct EngineDb {
    conn: Arc<Mutex<Connection>>,
}

impl EngineDb {
    /// Open or create the engine database at the default location
    /// (~/.streakvault/engine.db)
    pub fn open_default() -> Result<Self> {
        Self::open(&default_db_path())
    }

    /// Open or create the engine database at a specific path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data dir: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open engine db: {}", path.display()))?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (tests)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // WAL so the sweep thread and request handlers can interleave
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_millis(250))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Get a reference to the connection (for read-only queries)
    pub fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("Engine DB lock poisoned")
    }

    /// Run a unit of work inside an IMMEDIATE transaction.
    ///
    /// On a busy/locked database the whole unit is retried once, then the
    /// failure surfaces as [`EngineError::TransientConflict`]. The closure
    /// must be safe to re-run (it only ever observes committed state).
    pub fn run_in_tx<T, F>(&self, mut op: F) -> Result<T, EngineError>
    where
        F: FnMut(&Transaction<'_>) -> Result<T, EngineError>,
    {
        const ATTEMPTS: u32 = 2;

        for attempt in 1..=ATTEMPTS {
            let mut conn = self.conn();
            let outcome = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(EngineError::Storage)
                .and_then(|tx| {
                    let value = op(&tx)?;
                    tx.commit()?;
                    Ok(value)
                });
            drop(conn);

            match outcome {
                Ok(value) => return Ok(value),
                Err(EngineError::Storage(err)) if is_busy(&err) => {
                    if attempt == ATTEMPTS {
                        return Err(EngineError::TransientConflict);
                    }
                    tracing::debug!("transaction busy, retrying: {}", err);
                    std::thread::sleep(Duration::from_millis(25));
                }
                Err(err) => return Err(err),
            }
        }
        Err(EngineError::TransientConflict)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(SCHEMA_SQL)?;
        drop(conn);
        self.run_migrations()?;
        Ok(())
    }

    /// Run any pending migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn();

        let version: i32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))
            .unwrap_or(0);

        // Migration 2: track best_streak on challenges
        if version < 2 {
            let has_best_streak: bool = conn
                .prepare("SELECT COUNT(*) FROM pragma_table_info('challenges') WHERE name = 'best_streak'")
                .and_then(|mut s| s.query_row([], |r| r.get::<_, i32>(0)))
                .map(|c| c > 0)
                .unwrap_or(false);

            if !has_best_streak {
                conn.execute_batch(
                    "ALTER TABLE challenges ADD COLUMN best_streak INTEGER NOT NULL DEFAULT 0;",
                )?;
            }
            conn.execute("INSERT OR REPLACE INTO schema_version VALUES (2)", [])?;
        }

        Ok(())
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::DatabaseBusy
                || e.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

/// Default database location under the user's home directory
pub fn default_db_path() -> PathBuf {
    data_dir().join("engine.db")
}

/// Default data directory (~/.streakvault)
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".streakvault")
}

/// SQL schema for the engine database
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Challenge accounts (one row per purchase; resets create new rows)
CREATE TABLE IF NOT EXISTS challenges (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    tier INTEGER NOT NULL,
    difficulty TEXT NOT NULL,
    min_odds REAL NOT NULL,
    current_level INTEGER NOT NULL DEFAULT 1,
    current_streak INTEGER NOT NULL DEFAULT 0,
    best_streak INTEGER NOT NULL DEFAULT 0,
    total_rewards_earned_cents INTEGER NOT NULL DEFAULT 0,
    total_pending_cents INTEGER NOT NULL DEFAULT 0,
    price_cents INTEGER NOT NULL,
    reset_fee_cents INTEGER NOT NULL,
    purchased_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'active'
);
CREATE INDEX IF NOT EXISTS idx_challenges_user ON challenges(user_id);
CREATE INDEX IF NOT EXISTS idx_challenges_user_status ON challenges(user_id, status);
CREATE INDEX IF NOT EXISTS idx_challenges_expiry ON challenges(status, expires_at);

-- Per-level state machine: locked -> unlocked -> claimed
CREATE TABLE IF NOT EXISTS challenge_levels (
    challenge_id TEXT NOT NULL,
    level INTEGER NOT NULL,
    state TEXT NOT NULL DEFAULT 'locked',
    reward_id TEXT,
    PRIMARY KEY (challenge_id, level),
    FOREIGN KEY (challenge_id) REFERENCES challenges(id)
);

-- One row per level unlock
CREATE TABLE IF NOT EXISTS challenge_rewards (
    id TEXT PRIMARY KEY,
    challenge_id TEXT NOT NULL,
    level INTEGER NOT NULL,
    amount_cents INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    unlocked_at INTEGER NOT NULL,
    paid_at INTEGER,
    FOREIGN KEY (challenge_id) REFERENCES challenges(id)
);
CREATE INDEX IF NOT EXISTS idx_rewards_challenge ON challenge_rewards(challenge_id);
CREATE INDEX IF NOT EXISTS idx_rewards_status ON challenge_rewards(status);

-- Wagers; challenge linkage lives in bet_challenge_links
CREATE TABLE IF NOT EXISTS bets (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    odds REAL NOT NULL,
    stake_cents INTEGER NOT NULL DEFAULT 0,
    result TEXT NOT NULL DEFAULT 'pending',
    settlement_applied INTEGER NOT NULL DEFAULT 0,
    placed_at INTEGER NOT NULL,
    settled_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_bets_user ON bets(user_id);

-- Bet -> challenge links with placement-time qualification snapshot
CREATE TABLE IF NOT EXISTS bet_challenge_links (
    bet_id TEXT NOT NULL,
    challenge_id TEXT NOT NULL,
    min_odds REAL NOT NULL,
    difficulty TEXT NOT NULL,
    PRIMARY KEY (bet_id, challenge_id),
    FOREIGN KEY (bet_id) REFERENCES bets(id),
    FOREIGN KEY (challenge_id) REFERENCES challenges(id)
);

-- Withdrawal requests; a non-rejected row reserves its amount
CREATE TABLE IF NOT EXISTS payouts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    method TEXT NOT NULL,
    details TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_payouts_user ON payouts(user_id);
CREATE INDEX IF NOT EXISTS idx_payouts_user_status ON payouts(user_id, status);
"#;
