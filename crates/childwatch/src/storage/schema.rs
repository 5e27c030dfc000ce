//! `SQLite` schema definitions for childwatch.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the alerts table.
pub const CREATE_ALERTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message VARCHAR(200) NOT NULL,
    timestamp VARCHAR(30) NOT NULL,
    disclosed INTEGER NOT NULL DEFAULT 0 CHECK (disclosed IN (0, 1))
)
";

/// SQL statement to create an index on timestamp for listing and expiry.
pub const CREATE_TIMESTAMP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_alerts_timestamp ON alerts(timestamp DESC)
";

/// SQL statement to create an index on `disclosed` for bulk deletion.
pub const CREATE_DISCLOSED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_alerts_disclosed ON alerts(disclosed)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_ALERTS_TABLE,
    CREATE_TIMESTAMP_INDEX,
    CREATE_DISCLOSED_INDEX,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.is_empty());
        }
    }

    #[test]
    fn test_create_alerts_table_contains_required_columns() {
        assert!(CREATE_ALERTS_TABLE.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(CREATE_ALERTS_TABLE.contains("message VARCHAR(200) NOT NULL"));
        assert!(CREATE_ALERTS_TABLE.contains("timestamp VARCHAR(30) NOT NULL"));
        assert!(CREATE_ALERTS_TABLE.contains("disclosed INTEGER NOT NULL DEFAULT 0"));
    }

    #[test]
    fn test_create_metadata_table_structure() {
        assert!(CREATE_METADATA_TABLE.contains("key TEXT PRIMARY KEY"));
        assert!(CREATE_METADATA_TABLE.contains("value TEXT NOT NULL"));
    }
}
