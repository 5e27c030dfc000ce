//! Core alert types for childwatch.
//!
//! An [`Alert`] is one safety notification received from the broker: the
//! message text, the local time it arrived, and whether the user has
//! acknowledged (disclosed) it.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Format of every stored timestamp. Lexicographic order on strings in this
/// format is chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Maximum stored length of a timestamp column.
pub const MAX_TIMESTAMP_LENGTH: usize = 30;

/// Default maximum length of an alert message, in characters.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 200;

/// A single safety alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier (assigned by the store on insert).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// The alert text as published by the sensor station.
    pub message: String,

    /// Local arrival time, formatted with [`TIMESTAMP_FORMAT`].
    pub timestamp: String,

    /// Whether the user has acknowledged this alert.
    pub disclosed: bool,
}

impl Alert {
    /// Create a new, not yet stored, undisclosed alert.
    #[must_use]
    pub fn new(message: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            id: None,
            message: message.into(),
            timestamp: timestamp.into(),
            disclosed: false,
        }
    }

    /// Create a new alert stamped with the given local time.
    #[must_use]
    pub fn at(message: impl Into<String>, time: NaiveDateTime) -> Self {
        Self::new(message, format_timestamp(time))
    }

    /// Parse the stored timestamp back into a date-time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTimestamp`] if the stored value is malformed.
    pub fn time(&self) -> Result<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }

    /// Length of the message in characters.
    #[must_use]
    pub fn message_len(&self) -> usize {
        self.message.chars().count()
    }
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let marker = if self.disclosed { ' ' } else { '*' };
        match self.id {
            Some(id) => write!(f, "{marker} #{id} [{}] {}", self.timestamp, self.message),
            None => write!(f, "{marker} [{}] {}", self.timestamp, self.message),
        }
    }
}

/// Format a date-time the way alerts are stored.
#[must_use]
pub fn format_timestamp(time: NaiveDateTime) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp.
///
/// # Errors
///
/// Returns [`Error::InvalidTimestamp`] if `value` is longer than
/// [`MAX_TIMESTAMP_LENGTH`] or is not exactly in the zero-padded
/// [`TIMESTAMP_FORMAT`].
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    if value.len() > MAX_TIMESTAMP_LENGTH {
        return Err(Error::InvalidTimestamp {
            value: value.to_string(),
        });
    }
    let invalid = || Error::InvalidTimestamp {
        value: value.to_string(),
    };
    let parsed = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|_| invalid())?;
    // chrono accepts unpadded fields; only the canonical form keeps string
    // order equal to time order.
    if format_timestamp(parsed) != value {
        return Err(invalid());
    }
    Ok(parsed)
}

/// Source of the current local time.
///
/// Ingestion stamps alerts through this trait so tests can pin the clock.
pub trait Clock: Send + Sync {
    /// The current local wall-clock time.
    fn now(&self) -> NaiveDateTime;
}

/// The system wall clock in the local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
