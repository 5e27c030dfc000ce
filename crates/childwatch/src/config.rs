//! Configuration management for childwatch.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::alert::DEFAULT_MAX_MESSAGE_LENGTH;
use crate::error::{Error, Result};
use crate::storage::{LengthPolicy, StoreLimits};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "childwatch";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "alerts.db";

/// rumqttc refuses keep-alive intervals shorter than this.
const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// Placeholder shown instead of secrets.
const REDACTED: &str = "********";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `CHILDWATCH_`, sections split on `__`)
/// 2. TOML config file at `~/.config/childwatch/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Broker configuration.
    pub broker: BrokerConfig,
    /// Notification configuration.
    pub notification: NotificationConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/childwatch/alerts.db`
    pub database_path: Option<PathBuf>,
    /// Alerts older than this many hours are expired.
    pub retention_hours: u32,
    /// Maximum alert message length in characters.
    pub max_message_length: usize,
    /// What to do with messages longer than `max_message_length`.
    pub overlong_messages: LengthPolicy,
    /// Run expiry every N minutes while the service runs. 0 = only at startup.
    pub sweep_interval_minutes: u32,
}

/// Broker-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker host name.
    pub host: String,
    /// Broker TCP port.
    pub port: u16,
    /// MQTT client id. Generated per process when unset.
    pub client_id: Option<String>,
    /// Topic carrying alert messages.
    pub topic: String,
    /// MQTT keep-alive interval in seconds.
    pub keep_alive_secs: u64,
    /// Pause before the transport retries a lost connection, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Capacity of the queue between the transport and ingestion.
    pub queue_capacity: usize,
    /// Optional broker user name.
    pub username: Option<String>,
    /// Optional broker password.
    pub password: Option<String>,
}

/// Notification-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Title of every alert notification.
    pub title: String,
    /// Identifier of the host notification channel.
    pub channel_id: String,
    /// Human-readable channel name.
    pub channel_name: String,
    /// Channel description shown by the host.
    pub channel_description: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            retention_hours: 24,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            overlong_messages: LengthPolicy::Truncate,
            sweep_interval_minutes: 0,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "broker.hivemq.com".to_string(),
            port: 1883,
            client_id: None,
            topic: "iot/notifications".to_string(),
            keep_alive_secs: 60,
            reconnect_delay_ms: 5_000,
            queue_capacity: 64,
            username: None,
            password: None,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "CHILD SAFETY ALERT".to_string(),
            channel_id: "child_safety_channel".to_string(),
            channel_name: "Child safety alerts".to_string(),
            channel_description: "Alerts raised by the child safety sensor station".to_string(),
        }
    }
}

impl BrokerConfig {
    /// `host:port` of the broker.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The configured client id, or a fresh one unique to this process.
    #[must_use]
    pub fn resolved_client_id(&self) -> String {
        self.client_id.clone().unwrap_or_else(|| {
            format!(
                "childwatch-{}-{}",
                std::process::id(),
                chrono::Utc::now().timestamp_millis()
            )
        })
    }

    /// Keep-alive interval as a Duration.
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Reconnect delay as a Duration.
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("CHILDWATCH_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(Error::ConfigValidation { message });

        if self.broker.host.trim().is_empty() {
            return invalid("broker.host must not be empty".to_string());
        }
        if self.broker.port == 0 {
            return invalid("broker.port must be greater than 0".to_string());
        }
        if self.broker.topic.trim().is_empty() {
            return invalid("broker.topic must not be empty".to_string());
        }
        if self.broker.keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            return invalid(format!(
                "broker.keep_alive_secs ({}) must be at least {MIN_KEEP_ALIVE_SECS}",
                self.broker.keep_alive_secs
            ));
        }
        if self.broker.queue_capacity == 0 {
            return invalid("broker.queue_capacity must be greater than 0".to_string());
        }
        if self.storage.max_message_length == 0 {
            return invalid("storage.max_message_length must be greater than 0".to_string());
        }
        if self.storage.retention_hours == 0 {
            return invalid("storage.retention_hours must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Store limits derived from the storage section.
    #[must_use]
    pub fn store_limits(&self) -> StoreLimits {
        StoreLimits {
            max_message_length: self.storage.max_message_length,
            length_policy: self.storage.overlong_messages,
            retention: chrono::Duration::hours(i64::from(self.storage.retention_hours)),
        }
    }

    /// Get the periodic expiry interval, if enabled.
    #[must_use]
    pub fn sweep_interval(&self) -> Option<Duration> {
        if self.storage.sweep_interval_minutes == 0 {
            None
        } else {
            Some(Duration::from_secs(
                u64::from(self.storage.sweep_interval_minutes) * 60,
            ))
        }
    }

    /// A copy safe to print: the broker password is masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.broker.password.is_some() {
            config.broker.password = Some(REDACTED.to_string());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_masks_password() {
        let mut config = Config::default();
        assert_eq!(config.redacted().broker.password, None);

        config.broker.username = Some("parent".to_string());
        config.broker.password = Some("hunter2".to_string());
        let shown = config.redacted();
        assert_eq!(shown.broker.username.as_deref(), Some("parent"));
        assert_eq!(shown.broker.password.as_deref(), Some("********"));
        assert_eq!(config.broker.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.broker.topic, "iot/notifications");
        assert_eq!(config.notification.title, "CHILD SAFETY ALERT");
        assert_eq!(config.storage.retention_hours, 24);
    }

    #[test]
    fn test_default_storage_config() {
        let storage = StorageConfig::default();

        assert!(storage.database_path.is_none());
        assert_eq!(storage.max_message_length, 200);
        assert_eq!(storage.overlong_messages, LengthPolicy::Truncate);
        assert_eq!(storage.sweep_interval_minutes, 0);
    }

    #[test]
    fn test_default_broker_config() {
        let broker = BrokerConfig::default();

        assert_eq!(broker.host, "broker.hivemq.com");
        assert_eq!(broker.port, 1883);
        assert_eq!(broker.endpoint(), "broker.hivemq.com:1883");
        assert!(broker.client_id.is_none());
        assert_eq!(broker.keep_alive(), Duration::from_secs(60));
        assert_eq!(broker.reconnect_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_default_notification_config() {
        let notification = NotificationConfig::default();
        assert_eq!(notification.channel_id, "child_safety_channel");
        assert!(!notification.channel_name.is_empty());
    }

    #[test]
    fn test_resolved_client_id() {
        let mut broker = BrokerConfig::default();
        assert!(broker.resolved_client_id().starts_with("childwatch-"));

        broker.client_id = Some("kitchen-tablet".to_string());
        assert_eq!(broker.resolved_client_id(), "kitchen-tablet");
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_empty_topic() {
        let mut config = Config::default();
        config.broker.topic = "  ".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("broker.topic"));
    }

    #[test]
    fn test_validate_empty_host() {
        let mut config = Config::default();
        config.broker.host = String::new();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("broker.host"));
    }

    #[test]
    fn test_validate_zero_port() {
        let mut config = Config::default();
        config.broker.port = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("broker.port"));
    }

    #[test]
    fn test_validate_short_keep_alive() {
        let mut config = Config::default();
        config.broker.keep_alive_secs = 2;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("keep_alive_secs"));
    }

    #[test]
    fn test_validate_zero_queue_capacity() {
        let mut config = Config::default();
        config.broker.queue_capacity = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("queue_capacity"));
    }

    #[test]
    fn test_validate_zero_message_length() {
        let mut config = Config::default();
        config.storage.max_message_length = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_message_length"));
    }

    #[test]
    fn test_validate_zero_retention() {
        let mut config = Config::default();
        config.storage.retention_hours = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("retention_hours"));
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("alerts.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/alerts.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/alerts.sqlite")
        );
    }

    #[test]
    fn test_store_limits_from_config() {
        let mut config = Config::default();
        config.storage.retention_hours = 48;
        config.storage.overlong_messages = LengthPolicy::Reject;

        let limits = config.store_limits();
        assert_eq!(limits.retention, chrono::Duration::hours(48));
        assert_eq!(limits.length_policy, LengthPolicy::Reject);
        assert_eq!(limits.max_message_length, 200);
    }

    #[test]
    fn test_sweep_interval() {
        let mut config = Config::default();
        assert!(config.sweep_interval().is_none());

        config.storage.sweep_interval_minutes = 15;
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(900)));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("childwatch"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "childwatch_config_test_{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"
            [broker]
            host = "mqtt.local"
            topic = "home/alerts"

            [storage]
            overlong_messages = "reject"
            "#,
        )
        .unwrap();

        let config = Config::load_from(Some(path.clone())).unwrap();
        assert_eq!(config.broker.host, "mqtt.local");
        assert_eq!(config.broker.topic, "home/alerts");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.storage.overlong_messages, LengthPolicy::Reject);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let path = std::env::temp_dir().join(format!(
            "childwatch_config_invalid_{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[broker]\nport = 0\n").unwrap();

        let err = Config::load_from(Some(path.clone())).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_storage_config_deserialize() {
        let json = r#"{"retention_hours": 6, "overlong_messages": "reject"}"#;
        let storage: StorageConfig = serde_json::from_str(json).unwrap();
        assert_eq!(storage.retention_hours, 6);
        assert_eq!(storage.overlong_messages, LengthPolicy::Reject);
        assert_eq!(storage.max_message_length, 200);
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("\"topic\":\"iot/notifications\""));
        assert!(json.contains("\"overlong_messages\":\"truncate\""));
    }
}
