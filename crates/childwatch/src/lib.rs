//! `childwatch` - MQTT-driven child safety alert intake
//!
//! This library subscribes to an alert topic on an MQTT broker, turns every
//! message into a user notification and a stored alert, and keeps that alert
//! history with a disclosed flag and age-based expiry.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod alert;
pub mod broker;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod ingest;
pub mod logging;
pub mod notify;
pub mod service;
pub mod storage;

pub use alert::{Alert, Clock, SystemClock};
pub use broker::{BrokerConnection, ConnectionState};
pub use config::Config;
pub use error::{Error, Result};
pub use history::{AlertHistory, OnAlertDisclosed};
pub use ingest::Pipeline;
pub use logging::init_logging;
pub use notify::{LogNotifier, Notification, Notifier};
pub use service::{AlertService, RunningService};
pub use storage::{AlertStore, Storage, StorageStats};
