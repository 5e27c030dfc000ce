//! Service wiring: store, notifier, pipeline and broker session.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alert::{Clock, SystemClock};
use crate::broker::{BrokerConnection, ConnectionState};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::history::AlertHistory;
use crate::ingest::Pipeline;
use crate::notify::{LogNotifier, Notifier};
use crate::storage::{AlertStore, Storage};

/// Owns the collaborators of a running alert intake.
pub struct AlertService {
    config: Config,
    store: Arc<Storage>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AlertService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertService")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl AlertService {
    /// Open the configured store and build a service around it.
    ///
    /// Notifications go to a [`LogNotifier`] until
    /// [`with_notifier`](Self::with_notifier) replaces it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(config: Config) -> Result<Self> {
        let store = Storage::open_with_limits(config.database_path(), config.store_limits())?;
        Ok(Self::with_store(config, store))
    }

    /// Build a service around an already opened store.
    #[must_use]
    pub fn with_store(config: Config, store: Storage) -> Self {
        let notifier = Arc::new(LogNotifier::new(&config.notification));
        Self {
            config,
            store: Arc::new(store),
            notifier,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the notification sink.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the clock used for timestamps and expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The effective configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared alert store.
    #[must_use]
    pub fn store(&self) -> Arc<Storage> {
        Arc::clone(&self.store)
    }

    /// A history view for presentation layers.
    #[must_use]
    pub fn history(&self) -> AlertHistory {
        AlertHistory::new(self.store.clone())
    }

    /// A pipeline writing into this service's store.
    #[must_use]
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.store.clone(),
            Arc::clone(&self.notifier),
            Arc::clone(&self.clock),
            self.config.notification.title.clone(),
        )
    }

    /// Delete alerts past the retention window.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete fails.
    pub fn expire(&self) -> Result<usize> {
        self.store.delete_expired(self.clock.now())
    }

    /// Expire old alerts, then start ingestion and the broker session.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(&self) -> RunningService {
        match self.expire() {
            Ok(removed) => info!("Startup expiry removed {} alerts", removed),
            Err(err) => warn!("Startup expiry failed: {}", err),
        }

        let (sender, receiver) = mpsc::channel(self.config.broker.queue_capacity);
        let pipeline = self.pipeline();
        let ingest = tokio::spawn(async move { pipeline.run(receiver).await });
        let connection = BrokerConnection::connect(&self.config.broker, sender);
        let sweep = self
            .config
            .sweep_interval()
            .map(|period| spawn_sweep(self.store.clone(), Arc::clone(&self.clock), period));

        RunningService {
            connection,
            ingest,
            sweep,
        }
    }
}

fn spawn_sweep(store: Arc<dyn AlertStore>, clock: Arc<dyn Clock>, period: Duration) -> JoinHandle<()> {
    info!("Expiring old alerts every {:?}", period);
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(period);
        // The first tick is immediate and startup already expired.
        ticks.tick().await;
        loop {
            ticks.tick().await;
            match store.delete_expired(clock.now()) {
                Ok(removed) => debug!("Sweep removed {} alerts", removed),
                Err(err) => warn!("Expiry sweep failed: {}", err),
            }
        }
    })
}

/// Handle to a started [`AlertService`].
#[derive(Debug)]
pub struct RunningService {
    connection: BrokerConnection,
    ingest: JoinHandle<usize>,
    sweep: Option<JoinHandle<()>>,
}

impl RunningService {
    /// Current broker connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Run until `shutdown` resolves or the broker session ends on its own.
    ///
    /// Returns the number of alerts stored.
    ///
    /// # Errors
    ///
    /// Returns the connection error if the first connect failed.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<usize>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            () = shutdown => info!("Shutdown requested"),
            () = self.connection.terminated() => debug!("Broker session ended"),
        }
        self.shutdown().await
    }

    /// Close the broker session and let queued alerts finish ingesting.
    ///
    /// Returns the number of alerts stored.
    ///
    /// # Errors
    ///
    /// Returns the connection error if the first connect failed.
    pub async fn shutdown(self) -> Result<usize> {
        if let Some(sweep) = &self.sweep {
            sweep.abort();
        }
        let closed = self.connection.close().await;
        let stored = self
            .ingest
            .await
            .map_err(|e| Error::internal(format!("ingestion task failed: {e}")))?;
        closed.map(|()| stored)
    }
}
