//! Database migration system for childwatch.
//!
//! Schema versions are tracked in the `metadata` table. Version 2 imports
//! alert history from the legacy mobile-app layout (a `Notifications` table
//! with `Notif_*` columns) when such a database is opened.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};

use crate::alert::parse_timestamp;
use crate::error::{Error, Result};

use super::schema::SCHEMA_STATEMENTS;
use super::StoreLimits;

/// The current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Key used to store the schema version in the metadata table.
const VERSION_KEY: &str = "schema_version";

/// Table name used by the legacy mobile-app database.
const LEGACY_TABLE: &str = "Notifications";

/// Initialize the database schema.
///
/// Creates all tables and indexes if they don't exist, then runs any
/// pending migrations to bring the schema up to the current version.
///
/// # Errors
///
/// Returns an error if schema creation or migration fails.
pub fn initialize_schema(conn: &Connection, limits: &StoreLimits) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }

    let version = get_schema_version(conn)?;
    if version < CURRENT_VERSION {
        run_migrations(conn, version, limits)?;
    }

    Ok(())
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (fresh database).
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        Some(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
        None => Ok(0),
    }
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}

/// Run migrations from the given version to the current version.
fn run_migrations(conn: &Connection, from_version: i32, limits: &StoreLimits) -> Result<()> {
    for version in (from_version + 1)..=CURRENT_VERSION {
        run_migration(conn, version, limits)?;
        set_schema_version(conn, version)?;
    }
    Ok(())
}

/// Run a specific migration version.
fn run_migration(conn: &Connection, version: i32, limits: &StoreLimits) -> Result<()> {
    match version {
        // Base schema, already created by `SCHEMA_STATEMENTS`.
        1 => Ok(()),
        2 => import_legacy_notifications(conn, limits),
        _ => Err(Error::DatabaseMigration {
            message: format!("unknown migration version: {version}"),
        }),
    }
}

/// Copy rows from a legacy `Notifications` table into `alerts`, then drop it.
///
/// Rows go through the same checks as [`AlertStore::insert`]: a timestamp
/// outside the fixed format or a message refused by the length policy is
/// logged and skipped. Rows without a timestamp are discarded too.
///
/// [`AlertStore::insert`]: super::AlertStore::insert
fn import_legacy_notifications(conn: &Connection, limits: &StoreLimits) -> Result<()> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [LEGACY_TABLE],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;
    let rows: Vec<(i64, String, String, bool)> = tx
        .prepare(
            r"
            SELECT Notif_ID, CAST(Notif_Message AS TEXT), CAST(Notif_Timestamp AS TEXT),
                   CASE WHEN Notif_Disclosed = 1 THEN 1 ELSE 0 END
            FROM Notifications
            WHERE Notif_Message IS NOT NULL AND Notif_Timestamp IS NOT NULL
            ORDER BY Notif_ID
            ",
        )?
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get::<_, i64>(3)? == 1))
        })?
        .collect::<std::result::Result<_, _>>()?;

    let mut imported = 0;
    for (legacy_id, message, timestamp, disclosed) in &rows {
        if let Err(err) = parse_timestamp(timestamp) {
            warn!("Skipping legacy notification {}: {}", legacy_id, err);
            continue;
        }
        let message = match limits.bound_message(message) {
            Ok(message) => message,
            Err(err) => {
                warn!("Skipping legacy notification {}: {}", legacy_id, err);
                continue;
            }
        };
        tx.execute(
            "INSERT INTO alerts (message, timestamp, disclosed) VALUES (?1, ?2, ?3)",
            params![message.as_ref(), timestamp, i64::from(*disclosed)],
        )?;
        imported += 1;
    }
    tx.execute("DROP TABLE Notifications", [])?;
    tx.commit()?;

    info!(
        "Imported {} of {} alerts from legacy notifications table",
        imported,
        rows.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> Connection {
        Connection::open_in_memory().expect("failed to create in-memory database")
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [name],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn test_initialize_schema_creates_tables() {
        let conn = create_test_db();
        initialize_schema(&conn, &StoreLimits::default()).expect("failed to initialize schema");

        assert!(table_exists(&conn, "alerts"));
        assert!(table_exists(&conn, "metadata"));
    }

    #[test]
    fn test_initialize_schema_sets_version() {
        let conn = create_test_db();
        initialize_schema(&conn, &StoreLimits::default()).expect("failed to initialize schema");

        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_initialize_schema_idempotent() {
        let conn = create_test_db();

        initialize_schema(&conn, &StoreLimits::default()).expect("first init failed");
        initialize_schema(&conn, &StoreLimits::default()).expect("second init failed");

        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_get_schema_version_fresh_db() {
        let conn = create_test_db();
        conn.execute(
            "CREATE TABLE metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), 0);
    }

    #[test]
    fn test_invalid_schema_version() {
        let conn = create_test_db();
        conn.execute(
            "CREATE TABLE metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO metadata (key, value) VALUES ('schema_version', 'two')",
            [],
        )
        .unwrap();

        let err = get_schema_version(&conn).unwrap_err();
        assert!(err.to_string().contains("invalid schema version"));
    }

    #[test]
    fn test_run_migration_unknown_version() {
        let conn = create_test_db();
        initialize_schema(&conn, &StoreLimits::default()).unwrap();

        let err = run_migration(&conn, 999, &StoreLimits::default()).unwrap_err();
        assert!(err.to_string().contains("unknown migration version"));
    }

    #[test]
    fn test_indexes_created() {
        let conn = create_test_db();
        initialize_schema(&conn, &StoreLimits::default()).expect("failed to initialize schema");

        let indexes: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND tbl_name='alerts'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(std::result::Result::ok)
            .collect();

        assert!(indexes.iter().any(|n| n.contains("timestamp")));
        assert!(indexes.iter().any(|n| n.contains("disclosed")));
    }

    #[test]
    fn test_legacy_notifications_are_imported() {
        let conn = create_test_db();
        conn.execute_batch(
            r"
            CREATE TABLE Notifications (
                Notif_ID INTEGER PRIMARY KEY AUTOINCREMENT,
                Notif_Message VARCHAR(200) NOT NULL,
                Notif_Timestamp VARCHAR(30),
                Notif_Disclosed INTEGER
            );
            INSERT INTO Notifications (Notif_Message, Notif_Timestamp, Notif_Disclosed)
                VALUES ('child left zone', '2024-05-17 09:04:31', 0);
            INSERT INTO Notifications (Notif_Message, Notif_Timestamp, Notif_Disclosed)
                VALUES ('motion at gate', '2024-05-17 10:00:00', 1);
            INSERT INTO Notifications (Notif_Message, Notif_Timestamp, Notif_Disclosed)
                VALUES ('no timestamp', NULL, NULL);
            ",
        )
        .unwrap();

        initialize_schema(&conn, &StoreLimits::default()).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);

        let disclosed: i64 = conn
            .query_row(
                "SELECT disclosed FROM alerts WHERE message = 'motion at gate'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(disclosed, 1);
        assert!(!table_exists(&conn, "Notifications"));
    }

    fn create_legacy_table(conn: &Connection) {
        conn.execute_batch(
            r"
            CREATE TABLE Notifications (
                Notif_ID INTEGER PRIMARY KEY AUTOINCREMENT,
                Notif_Message VARCHAR(200) NOT NULL,
                Notif_Timestamp VARCHAR(30),
                Notif_Disclosed INTEGER
            );
            ",
        )
        .unwrap();
    }

    fn imported(conn: &Connection) -> Vec<(String, String)> {
        conn.prepare("SELECT message, timestamp FROM alerts ORDER BY id")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_legacy_import_skips_malformed_timestamps() {
        let conn = create_test_db();
        create_legacy_table(&conn);
        conn.execute_batch(
            r"
            INSERT INTO Notifications (Notif_Message, Notif_Timestamp, Notif_Disclosed)
                VALUES ('junk time', 'yesterday-ish', 0);
            INSERT INTO Notifications (Notif_Message, Notif_Timestamp, Notif_Disclosed)
                VALUES ('unpadded', '2024-5-7 9:0:0', 0);
            INSERT INTO Notifications (Notif_Message, Notif_Timestamp, Notif_Disclosed)
                VALUES ('kept', '2024-05-07 09:00:00', 0);
            ",
        )
        .unwrap();

        initialize_schema(&conn, &StoreLimits::default()).unwrap();

        assert_eq!(
            imported(&conn),
            vec![("kept".to_string(), "2024-05-07 09:00:00".to_string())]
        );
        assert!(!table_exists(&conn, "Notifications"));
    }

    #[test]
    fn test_legacy_import_truncates_overlong_messages() {
        let conn = create_test_db();
        create_legacy_table(&conn);
        conn.execute(
            "INSERT INTO Notifications (Notif_Message, Notif_Timestamp, Notif_Disclosed)
             VALUES (?1, '2024-05-07 09:00:00', 0)",
            ["y".repeat(500)],
        )
        .unwrap();

        initialize_schema(&conn, &StoreLimits::default()).unwrap();

        let rows = imported(&conn);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.chars().count(), 200);
    }

    #[test]
    fn test_legacy_import_rejects_overlong_messages_under_reject_policy() {
        let conn = create_test_db();
        create_legacy_table(&conn);
        conn.execute(
            "INSERT INTO Notifications (Notif_Message, Notif_Timestamp, Notif_Disclosed)
             VALUES (?1, '2024-05-07 09:00:00', 0)",
            ["y".repeat(500)],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO Notifications (Notif_Message, Notif_Timestamp, Notif_Disclosed)
             VALUES ('short', '2024-05-07 10:00:00', 1)",
            [],
        )
        .unwrap();

        let limits = StoreLimits {
            length_policy: super::super::LengthPolicy::Reject,
            ..StoreLimits::default()
        };
        initialize_schema(&conn, &limits).unwrap();

        assert_eq!(
            imported(&conn),
            vec![("short".to_string(), "2024-05-07 10:00:00".to_string())]
        );
    }

    #[test]
    fn test_legacy_import_skipped_without_legacy_table() {
        let conn = create_test_db();
        initialize_schema(&conn, &StoreLimits::default()).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
