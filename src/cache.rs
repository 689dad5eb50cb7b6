use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Source of "now" for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for expiry tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Deterministic cache key for a request URL: the first eight bytes of its
/// SHA-256 digest as a decimal `u64`.
pub fn resolution_key(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head).to_string()
}

/// Page-wide key/value store with per-entry expiry, persisted in SQLite.
///
/// Reads treat expired rows as absent; writes never fail the caller.
#[derive(Clone)]
pub struct Cache {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl Cache {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cache: create directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("cache: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("cache: set WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .context("cache: set busy timeout")?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("cache: open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now().timestamp_millis();
        let conn = self.conn.lock();
        let row: Option<(String, i64)> = match conn
            .query_row(
                "SELECT value, expires_at FROM cache_entries WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
        {
            Ok(row) => row,
            Err(err) => {
                warn!(key, error = %err, "cache: read failed");
                return None;
            }
        };
        let (raw, expires_at) = row?;
        if now > expires_at {
            let _ = conn.execute(
                "DELETE FROM cache_entries WHERE key = ?1 AND expires_at = ?2",
                params![key, expires_at],
            );
            debug!(key, "cache: entry expired");
            return None;
        }
        serde_json::from_str(&raw).ok()
    }

    pub fn set(&self, key: &str, value: &Value, ttl_minutes: u32) {
        if let Err(err) = self.try_set(key, value, ttl_minutes) {
            warn!(key, error = %err, "cache: write dropped");
        }
    }

    fn try_set(&self, key: &str, value: &Value, ttl_minutes: u32) -> Result<()> {
        let expires_at = self.clock.now() + Duration::minutes(i64::from(ttl_minutes));
        let raw = serde_json::to_string(value)?;
        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO cache_entries (key, value, expires_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET
  value = excluded.value,
  expires_at = excluded.expires_at
"#,
            params![key, raw, expires_at.timestamp_millis()],
        )?;
        Ok(())
    }

    /// Deletes every expired row, returning how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now().timestamp_millis();
        let conn = self.conn.lock();
        let removed = conn
            .execute(
                "DELETE FROM cache_entries WHERE expires_at < ?1",
                params![now],
            )
            .context("cache: purge expired entries")?;
        Ok(removed)
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").finish_non_exhaustive()
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, Utc::now().timestamp()],
        )?;
    }
    Ok(())
}

const MIGRATIONS: &[&str] = &[r#"
CREATE TABLE IF NOT EXISTS cache_entries (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_expires_at ON cache_entries(expires_at);
"#];

pub fn default_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("reddit-comments").join("cache.db"))
}
