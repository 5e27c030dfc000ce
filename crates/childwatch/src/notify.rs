//! User-facing notification sink.
//!
//! The host registers a [`Notifier`] to receive `(title, body)` pairs for
//! display. Any `Fn(&Notification) -> Result<()>` closure is a notifier, so
//! a UI layer can hand in a callback without defining a type.

use serde::Serialize;
use tracing::info;

use crate::config::NotificationConfig;
use crate::error::Result;

/// A notification to show the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Notification title.
    pub title: String,
    /// Notification body (the alert text).
    pub body: String,
}

impl Notification {
    /// Create a notification.
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Receives notifications for display.
///
/// Emission is best-effort: the ingestion pipeline logs a failure and keeps
/// going.
pub trait Notifier: Send + Sync {
    /// Display a notification.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Notification`] if the host cannot show it.
    fn notify(&self, notification: &Notification) -> Result<()>;
}

impl<F> Notifier for F
where
    F: Fn(&Notification) -> Result<()> + Send + Sync,
{
    fn notify(&self, notification: &Notification) -> Result<()> {
        self(notification)
    }
}

/// Notifier for headless hosts: every notification becomes an `info` record
/// tagged with the configured channel.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    channel_id: String,
}

impl LogNotifier {
    /// Create a notifier for the given channel.
    #[must_use]
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            channel_id: config.channel_id.clone(),
        }
    }

    /// The channel notifications are tagged with.
    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<()> {
        info!(
            channel = %self.channel_id,
            title = %notification.title,
            "{}",
            notification.body
        );
        Ok(())
    }
}
