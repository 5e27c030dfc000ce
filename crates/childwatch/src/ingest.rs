//! Alert ingestion: raw broker payload to notification and stored alert.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::alert::{format_timestamp, Alert, Clock};
use crate::broker::InboundMessage;
use crate::error::{Error, Result};
use crate::notify::{Notification, Notifier};
use crate::storage::AlertStore;

/// Turns inbound payloads into alerts.
///
/// Every decoded payload is notified and then persisted, each exactly once.
/// Identical payloads are not deduplicated.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn AlertStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    title: String,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a pipeline writing to `store` and notifying through `notifier`
    /// under `title`.
    pub fn new(
        store: Arc<dyn AlertStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            title: title.into(),
        }
    }

    /// Ingest one payload.
    ///
    /// The notification is emitted before the insert. A notification failure
    /// is logged and does not stop persistence; a storage failure is returned
    /// after the notification has already gone out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the payload is not UTF-8 (nothing is
    /// notified or stored), or the storage error if the insert fails.
    pub fn ingest(&self, payload: &[u8]) -> Result<Alert> {
        let message = std::str::from_utf8(payload)?;
        let mut alert = Alert::at(message, self.clock.now());

        let notification = Notification::new(self.title.as_str(), message);
        if let Err(err) = self.notifier.notify(&notification) {
            warn!("Notification for alert not shown: {}", err);
        }

        let id = self
            .store
            .insert(&alert.message, &alert.timestamp, alert.disclosed)?;
        alert.id = Some(id);
        debug!("Stored alert {} at {}", id, alert.timestamp);
        Ok(alert)
    }

    /// Ingest one payload, logging and dropping it on failure.
    pub fn on_alert(&self, payload: &[u8]) -> Option<Alert> {
        match self.ingest(payload) {
            Ok(alert) => Some(alert),
            Err(err @ Error::Decode(_)) => {
                warn!("Dropping undecodable alert payload ({} bytes): {}", payload.len(), err);
                None
            }
            Err(err) => {
                error!(
                    "Dropping alert received at {}: {}",
                    format_timestamp(self.clock.now()),
                    err
                );
                None
            }
        }
    }

    /// Ingest messages until the sending side closes the channel.
    ///
    /// Each message blocks the calling worker for one store operation.
    /// Returns the number of alerts stored.
    pub async fn run(&self, mut messages: mpsc::Receiver<InboundMessage>) -> usize {
        let mut stored = 0;
        while let Some(message) = messages.recv().await {
            debug!("Ingesting message from {}", message.topic);
            if self.on_alert(&message.payload).is_some() {
                stored += 1;
            }
        }
        info!("Alert queue closed after storing {} alerts", stored);
        stored
    }
}
