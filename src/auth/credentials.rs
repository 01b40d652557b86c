// Persistent credential cache backed by SQLite
// Survives process restarts; failures degrade to re-acquiring over the network

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::types::{CachedCredential, StrategyId};

/// Records older than this are treated as absent
pub const MAX_CREDENTIAL_AGE_HOURS: i64 = 24;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS credential_kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    acquired_at TEXT NOT NULL
)";

static PROCESS_CREDENTIAL_CACHE: Lazy<Arc<CredentialCache>> = Lazy::new(|| {
    Arc::new(match CredentialCache::default_location() {
        Some(path) => CredentialCache::open(&path),
        None => {
            tracing::warn!("No user cache directory available, credentials will not persist");
            CredentialCache::disabled()
        }
    })
});

/// Key/value store of credential payloads, one record per strategy
pub struct CredentialCache {
    /// None when persistence is disabled or the database could not be opened
    conn: Mutex<Option<Connection>>,
    max_age: Duration,
}

impl CredentialCache {
    /// Open (or create) the cache database at `path`
    ///
    /// Never fails: if the database cannot be opened the cache behaves as if
    /// it were disabled.
    pub fn open(path: &Path) -> Self {
        let conn = match open_database(path) {
            Ok(conn) => {
                tracing::debug!("Credential cache opened at {}", path.display());
                Some(conn)
            }
            Err(e) => {
                tracing::warn!("Credential cache unavailable: {:#}", e);
                None
            }
        };
        Self::with_connection(conn)
    }

    /// Cache that lives only as long as this value
    pub fn in_memory() -> Self {
        let conn = Connection::open_in_memory()
            .and_then(|conn| conn.execute(CREATE_TABLE, []).map(|_| conn))
            .map_err(|e| tracing::warn!("In-memory credential cache unavailable: {}", e))
            .ok();
        Self::with_connection(conn)
    }

    /// Cache that stores nothing
    pub fn disabled() -> Self {
        Self::with_connection(None)
    }

    fn with_connection(conn: Option<Connection>) -> Self {
        Self {
            conn: Mutex::new(conn),
            max_age: Duration::hours(MAX_CREDENTIAL_AGE_HOURS),
        }
    }

    /// Process-wide cache at the default location
    pub fn process_shared() -> Arc<CredentialCache> {
        Arc::clone(&PROCESS_CREDENTIAL_CACHE)
    }

    /// `<user cache dir>/yf-session/credentials.sqlite3`
    pub fn default_location() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("yf-session").join("credentials.sqlite3"))
    }

    pub fn is_enabled(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Overwrite the record for `strategy`; returns false if it was not stored
    pub fn store(&self, strategy: StrategyId, payload: &str) -> bool {
        self.store_at(strategy, payload, Utc::now())
    }

    pub(crate) fn store_at(&self, strategy: StrategyId, payload: &str, acquired_at: DateTime<Utc>) -> bool {
        let guard = self.conn.lock();
        let Some(conn) = guard.as_ref() else {
            return false;
        };

        match conn.execute(
            "INSERT OR REPLACE INTO credential_kv (key, value, acquired_at) VALUES (?1, ?2, ?3)",
            params![strategy.as_str(), payload, acquired_at.to_rfc3339()],
        ) {
            Ok(_) => {
                tracing::debug!(strategy = %strategy, "Persisted credentials");
                true
            }
            Err(e) => {
                tracing::warn!(strategy = %strategy, "Failed to persist credentials: {}", e);
                false
            }
        }
    }

    /// Fresh record for `strategy`, or None if missing, stale, or unreadable
    pub fn lookup(&self, strategy: StrategyId) -> Option<CachedCredential> {
        let guard = self.conn.lock();
        let conn = guard.as_ref()?;

        let row = match read_record(conn, strategy) {
            Ok(row) => row?,
            Err(e) => {
                tracing::warn!(strategy = %strategy, "Failed to read cached credentials: {:#}", e);
                return None;
            }
        };
        let (payload, acquired_at) = row;

        let age = (Utc::now() - acquired_at).max(Duration::zero());
        if age > self.max_age {
            tracing::debug!(
                strategy = %strategy,
                age_hours = age.num_hours(),
                "Cached credentials are stale"
            );
            return None;
        }

        Some(CachedCredential { payload, age })
    }
}

fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
    conn.execute(CREATE_TABLE, [])
        .context("Failed to create credential table")?;
    Ok(conn)
}

fn read_record(conn: &Connection, strategy: StrategyId) -> Result<Option<(String, DateTime<Utc>)>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT value, acquired_at FROM credential_kv WHERE key = ?",
            [strategy.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .context("Failed to query credential_kv")?;

    match row {
        Some((payload, acquired_at)) => Ok(Some((payload, parse_datetime(&acquired_at)?))),
        None => Ok(None),
    }
}

/// Parse datetime from various ISO 8601 formats
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    // Handle Z suffix
    let normalized = if s.ends_with('Z') {
        s.replace('Z', "+00:00")
    } else {
        s.to_string()
    };

    DateTime::parse_from_rfc3339(&normalized)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Failed to parse datetime: {}", s))
}
