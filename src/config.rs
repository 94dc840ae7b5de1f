// src/config.rs - Daemon configuration structures

use crate::client::NodeRef;
use crate::error::{MonitorError, Result};
use crate::twilio::TwilioConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Top-level daemon configuration, loaded once at startup and passed by
/// reference into each component. There is no process-global config state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Sealed server credential file
    pub credentials: CredentialsConfig,

    /// Path to the recipient phone book (JSON)
    pub phone_book: PathBuf,

    /// Notification routing configuration
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Alarm subscription parameters
    #[serde(default)]
    pub subscription: SubscriptionConfig,

    /// Session lifecycle timing
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Optional write-probe watchdog, independent of the monitor sessions
    #[serde(default)]
    pub watchdog: Option<WatchdogConfig>,

    /// Twilio transport credentials; required when `routing.send_sms` is set
    #[serde(default)]
    pub twilio: Option<TwilioConfig>,
}

/// Location of the sealed credential file and the environment variable
/// holding its encryption key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub path: PathBuf,
    pub env_key: String,
}

/// Routing engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// When false, matched alarms are logged instead of sent
    #[serde(default)]
    pub send_sms: bool,

    /// Alarm condition type node to filter events on
    #[serde(default = "default_alarm_condition_type")]
    pub alarm_condition_type: NodeRef,

    /// Server object node the alarm subscription is registered against
    #[serde(default = "default_server_node")]
    pub server_node: NodeRef,

    /// English weekday name -> locale name used in routing rules.
    /// Days absent from the table keep their English name.
    #[serde(default)]
    pub day_translation: HashMap<String, String>,

    /// Prefix prepended to every outbound notification
    #[serde(default = "default_message_template")]
    pub message_template: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            send_sms: false,
            alarm_condition_type: default_alarm_condition_type(),
            server_node: default_server_node(),
            day_translation: HashMap::new(),
            message_template: default_message_template(),
        }
    }
}

/// Fixed alarm subscription parameters (spec'd by the servers we talk to;
/// overridable for unusual installations).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(default = "default_publishing_interval")]
    pub publishing_interval_ms: u64,
    #[serde(default = "default_lifetime_count")]
    pub lifetime_count: u32,
    #[serde(default = "default_keep_alive_count")]
    pub max_keep_alive_count: u32,
    /// 0 = no cap on notifications per publish
    #[serde(default)]
    pub max_notifications_per_publish: u32,
    #[serde(default)]
    pub priority: u8,
    #[serde(default = "default_true")]
    pub publishing_enabled: bool,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            publishing_interval_ms: default_publishing_interval(),
            lifetime_count: default_lifetime_count(),
            max_keep_alive_count: default_keep_alive_count(),
            max_notifications_per_publish: 0,
            priority: 0,
            publishing_enabled: true,
        }
    }
}

/// Session lifecycle timing. Backoff is a constant interval, not
/// exponential; a flapping server is retried at a steady rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Interval between liveness checks while a subscription is active
    #[serde(default = "default_liveness_interval")]
    pub liveness_interval_ms: u64,
    /// Fixed wait before reconnecting after a session failure
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,
    /// Client-level connect timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            liveness_interval_ms: default_liveness_interval(),
            backoff_ms: default_backoff(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Write-probe watchdog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Interval between probes
    #[serde(default = "default_watchdog_interval")]
    pub interval_secs: u64,
    /// Tag written on every probe
    pub tag: String,
    /// Value written; coerced to the tag's declared data type
    #[serde(default = "default_watchdog_value")]
    pub value: String,
}

fn default_alarm_condition_type() -> NodeRef {
    // AlarmConditionType
    NodeRef::numeric(0, 2915)
}

fn default_server_node() -> NodeRef {
    // Server object
    NodeRef::numeric(0, 2253)
}

fn default_message_template() -> String {
    "Alarm from OPC UA:".to_string()
}

fn default_publishing_interval() -> u64 {
    1000
}

fn default_lifetime_count() -> u32 {
    400
}

fn default_keep_alive_count() -> u32 {
    100
}

fn default_liveness_interval() -> u64 {
    1000
}

fn default_backoff() -> u64 {
    30_000
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_watchdog_interval() -> u64 {
    10
}

fn default_watchdog_value() -> String {
    "1".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load and validate configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.credentials.env_key.is_empty() {
            return Err(MonitorError::Config(
                "credentials.env_key must not be empty".into(),
            ));
        }
        if self.routing.send_sms && self.twilio.is_none() {
            return Err(MonitorError::Config(
                "routing.send_sms is set but no twilio section is configured".into(),
            ));
        }
        if let Some(wd) = &self.watchdog {
            if wd.tag.is_empty() {
                return Err(MonitorError::Config("watchdog.tag must not be empty".into()));
            }
        }
        Ok(())
    }
}
