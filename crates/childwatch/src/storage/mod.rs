//! Storage layer for childwatch.
//!
//! This module provides `SQLite`-based persistent storage for alerts,
//! including the disclosed-flag lifecycle and age-based expiry.

pub mod migrations;
pub mod schema;

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{Duration, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::alert::{format_timestamp, parse_timestamp, Alert, DEFAULT_MAX_MESSAGE_LENGTH};
use crate::error::{Error, Result};

/// How long an alert is kept before [`AlertStore::delete_expired`] removes it.
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// The operations every alert store provides.
///
/// Each call is atomic from the caller's perspective and persisted before it
/// returns. Ids that do not exist are never an error.
pub trait AlertStore: Send + Sync {
    /// Insert a new alert and return its assigned id.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the alert cannot be persisted.
    fn insert(&self, message: &str, timestamp: &str, disclosed: bool) -> Result<i64>;

    /// Mark an alert as disclosed. Returns `false` if no alert has this id.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the update cannot be persisted.
    fn mark_disclosed(&self, id: i64) -> Result<bool>;

    /// Delete an alert. Returns `false` if no alert has this id.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete cannot be persisted.
    fn delete(&self, id: i64) -> Result<bool>;

    /// Delete every alert older than the retention window before `now`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete cannot be persisted.
    fn delete_expired(&self, now: NaiveDateTime) -> Result<usize>;

    /// Delete every disclosed alert.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete cannot be persisted.
    fn delete_disclosed(&self) -> Result<usize>;

    /// All alerts, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    fn list(&self) -> Result<Vec<Alert>>;
}

/// What to do with a message longer than the column bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthPolicy {
    /// Keep the first `max_message_length` characters.
    #[default]
    Truncate,
    /// Fail the insert with [`Error::MessageTooLong`].
    Reject,
}

impl std::fmt::Display for LengthPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncate => write!(f, "truncate"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Limits applied by the store on insert and expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Maximum message length in characters.
    pub max_message_length: usize,
    /// Handling of overlong messages.
    pub length_policy: LengthPolicy,
    /// Alerts strictly older than this are expired.
    pub retention: Duration,
}

impl StoreLimits {
    /// Apply the length policy to an incoming message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLong`] under [`LengthPolicy::Reject`].
    pub fn bound_message<'a>(&self, message: &'a str) -> Result<Cow<'a, str>> {
        let limit = self.max_message_length;
        let length = message.chars().count();
        if length <= limit {
            return Ok(Cow::Borrowed(message));
        }
        match self.length_policy {
            LengthPolicy::Reject => Err(Error::MessageTooLong { length, limit }),
            LengthPolicy::Truncate => {
                warn!("Truncating {}-character alert message to {}", length, limit);
                Ok(Cow::Owned(message.chars().take(limit).collect()))
            }
        }
    }
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            length_policy: LengthPolicy::default(),
            retention: Duration::hours(DEFAULT_RETENTION_HOURS),
        }
    }
}

/// `SQLite` alert store.
///
/// The connection sits behind a mutex and every operation is a single
/// statement run under the lock, so concurrent readers see either the state
/// before or after a write.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
    /// Insert and expiry limits.
    limits: StoreLimits,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_limits(path, StoreLimits::default())
    }

    /// Open or create a storage database that enforces `limits`.
    ///
    /// The limits also apply to alerts imported by schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open_with_limits(path: impl AsRef<Path>, limits: StoreLimits) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL keeps readers from blocking the ingestion writer.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;

        migrations::initialize_schema(&conn, &limits)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
            limits,
        })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        let limits = StoreLimits::default();
        migrations::initialize_schema(&conn, &limits)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
            limits: StoreLimits::default(),
        })
    }

    /// Replace the insert and expiry limits.
    #[must_use]
    pub fn with_limits(mut self, limits: StoreLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The limits this store enforces.
    #[must_use]
    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::StoreUnavailable(e.to_string()))
    }

    /// Get an alert by its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, id: i64) -> Result<Option<Alert>> {
        let conn = self.lock()?;
        let result = conn
            .query_row(
                "SELECT id, message, timestamp, disclosed FROM alerts WHERE id = ?1",
                [id],
                Self::row_to_alert,
            )
            .optional()?;
        Ok(result)
    }

    /// Get every alert that has not been disclosed yet, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_undisclosed(&self) -> Result<Vec<Alert>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r"
            SELECT id, message, timestamp, disclosed
            FROM alerts WHERE disclosed = 0
            ORDER BY timestamp DESC, id DESC
            ",
        )?;
        let alerts = stmt
            .query_map([], Self::row_to_alert)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(alerts)
    }

    /// Count total alerts in storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let conn = self.lock()?;

        let (total_alerts, disclosed_alerts, oldest_alert, newest_alert): (
            i64,
            i64,
            Option<String>,
            Option<String>,
        ) = conn.query_row(
            r"
            SELECT COUNT(*), COALESCE(SUM(disclosed), 0), MIN(timestamp), MAX(timestamp)
            FROM alerts
            ",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        drop(conn);

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_alerts,
            disclosed_alerts,
            undisclosed_alerts: total_alerts - disclosed_alerts,
            oldest_alert,
            newest_alert,
            db_size_bytes,
        })
    }

    /// Convert a database row to an Alert struct.
    fn row_to_alert(row: &rusqlite::Row) -> rusqlite::Result<Alert> {
        let disclosed: i64 = row.get(3)?;
        Ok(Alert {
            id: Some(row.get(0)?),
            message: row.get(1)?,
            timestamp: row.get(2)?,
            disclosed: disclosed == 1,
        })
    }
}

impl AlertStore for Storage {
    fn insert(&self, message: &str, timestamp: &str, disclosed: bool) -> Result<i64> {
        parse_timestamp(timestamp)?;
        let message = self.limits.bound_message(message)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO alerts (message, timestamp, disclosed) VALUES (?1, ?2, ?3)",
            params![message.as_ref(), timestamp, i64::from(disclosed)],
        )?;

        let id = conn.last_insert_rowid();
        debug!("Inserted alert with id {}", id);
        Ok(id)
    }

    fn mark_disclosed(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let affected = conn.execute("UPDATE alerts SET disclosed = 1 WHERE id = ?1", [id])?;
        if affected == 0 {
            debug!("No alert with id {} to disclose", id);
        }
        Ok(affected > 0)
    }

    fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let affected = conn.execute("DELETE FROM alerts WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    fn delete_expired(&self, now: NaiveDateTime) -> Result<usize> {
        let cutoff = format_timestamp(now - self.limits.retention);

        let conn = self.lock()?;
        let affected = conn.execute("DELETE FROM alerts WHERE timestamp < ?1", [&cutoff])?;

        if affected > 0 {
            info!("Deleted {} alerts older than {}", affected, cutoff);
        }
        Ok(affected)
    }

    fn delete_disclosed(&self) -> Result<usize> {
        let conn = self.lock()?;
        let affected = conn.execute("DELETE FROM alerts WHERE disclosed = 1", [])?;

        if affected > 0 {
            info!("Deleted {} disclosed alerts", affected);
        }
        Ok(affected)
    }

    fn list(&self) -> Result<Vec<Alert>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r"
            SELECT id, message, timestamp, disclosed
            FROM alerts ORDER BY timestamp DESC, id DESC
            ",
        )?;

        let alerts = stmt
            .query_map([], Self::row_to_alert)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(alerts)
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Total number of alerts stored.
    pub total_alerts: i64,
    /// Alerts the user has acknowledged.
    pub disclosed_alerts: i64,
    /// Alerts still waiting for acknowledgement.
    pub undisclosed_alerts: i64,
    /// Timestamp of the oldest alert.
    pub oldest_alert: Option<String>,
    /// Timestamp of the newest alert.
    pub newest_alert: Option<String>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
