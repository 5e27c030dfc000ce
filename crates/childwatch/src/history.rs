//! Notification history for presentation layers.
//!
//! A display collaborator (UI, CLI) reads alerts and acts on them through
//! [`AlertHistory`]; it never holds the store itself.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::alert::Alert;
use crate::error::Result;
use crate::storage::AlertStore;

/// Contract for the "user acknowledged this alert" action.
pub trait OnAlertDisclosed {
    /// The user disclosed (acknowledged) alert `id`.
    fn on_alert_disclosed(&self, id: i64);
}

/// Read and acknowledge stored alerts.
#[derive(Clone)]
pub struct AlertHistory {
    store: Arc<dyn AlertStore>,
}

impl std::fmt::Debug for AlertHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertHistory").finish_non_exhaustive()
    }
}

impl AlertHistory {
    /// Create a history view over `store`.
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        Self { store }
    }

    /// All alerts, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn list_alerts(&self) -> Result<Vec<Alert>> {
        self.store.list()
    }

    /// Alerts the user has not acknowledged yet, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn pending_alerts(&self) -> Result<Vec<Alert>> {
        let mut alerts = self.store.list()?;
        alerts.retain(|alert| !alert.disclosed);
        Ok(alerts)
    }

    /// Mark alert `id` disclosed. Returns `false` if it no longer exists.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the update fails.
    pub fn disclose(&self, id: i64) -> Result<bool> {
        self.store.mark_disclosed(id)
    }

    /// Delete alert `id`. Returns `false` if it no longer exists.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete fails.
    pub fn delete(&self, id: i64) -> Result<bool> {
        self.store.delete(id)
    }

    /// Delete every disclosed alert.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete fails.
    pub fn clear_disclosed(&self) -> Result<usize> {
        self.store.delete_disclosed()
    }
}

impl OnAlertDisclosed for AlertHistory {
    fn on_alert_disclosed(&self, id: i64) {
        match self.disclose(id) {
            Ok(true) => debug!("Alert {} disclosed", id),
            Ok(false) => debug!("Alert {} already gone", id),
            Err(err) => warn!("Could not disclose alert {}: {}", id, err),
        }
    }
}
