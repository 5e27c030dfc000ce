//! Error types for childwatch.
//!
//! This module defines all error types used throughout the childwatch crate.
//! Errors on the alert intake path (connection, subscription, decode,
//! storage) are handled where they occur and turned into log records; the
//! rest surface to the CLI.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for childwatch operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// The store lock was poisoned by a panicking writer.
    #[error("alert store unavailable: {0}")]
    StoreUnavailable(String),

    /// An alert message exceeds the configured length bound.
    #[error("alert message is {length} characters, limit is {limit}")]
    MessageTooLong {
        /// Length of the rejected message in characters.
        length: usize,
        /// Configured maximum length.
        limit: usize,
    },

    /// A timestamp does not match `YYYY-MM-DD HH:MM:SS`.
    #[error("invalid alert timestamp '{value}'")]
    InvalidTimestamp {
        /// The offending value.
        value: String,
    },

    // === Broker Errors ===
    /// The broker was unreachable or refused the session.
    #[error("failed to connect to broker at {endpoint}: {message}")]
    Connection {
        /// `host:port` of the broker.
        endpoint: String,
        /// Description of what went wrong.
        message: String,
    },

    /// A subscription request failed or was rejected.
    #[error("failed to subscribe to '{topic}': {message}")]
    Subscription {
        /// Topic filter that was requested.
        topic: String,
        /// Description of what went wrong.
        message: String,
    },

    /// A publish request could not be queued.
    #[error("failed to publish to '{topic}': {message}")]
    Publish {
        /// Destination topic.
        topic: String,
        /// Description of what went wrong.
        message: String,
    },

    // === Ingestion Errors ===
    /// An inbound payload is not valid UTF-8 text.
    #[error("payload is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),

    /// The notification sink failed to emit.
    #[error("failed to emit notification: {0}")]
    Notification(String),

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for childwatch operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a broker connection error.
    #[must_use]
    pub fn connection(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a subscription error.
    #[must_use]
    pub fn subscription(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscription {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create a notification error.
    #[must_use]
    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error comes from the persistence layer.
    #[must_use]
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            Self::DatabaseOpen { .. }
                | Self::DatabaseQuery(_)
                | Self::DatabaseMigration { .. }
                | Self::StoreUnavailable(_)
                | Self::MessageTooLong { .. }
                | Self::InvalidTimestamp { .. }
                | Self::DirectoryCreate { .. }
        )
    }

    /// Check if this error comes from the broker session.
    #[must_use]
    pub fn is_broker_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Subscription { .. } | Self::Publish { .. }
        )
    }
}
