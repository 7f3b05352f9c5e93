//! # Configuration Management
//!
//! Centralized configuration for the Dominion bridge.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides (`DOMINION_*`) via `from_env()`
//!
//! Durations are written as milliseconds.

use crate::error::{BridgeError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Danfoss secure grid rendezvous endpoints
pub const DANFOSS_GRID: [&str; 4] = [
    "77.66.11.90:443",
    "77.66.11.92:443",
    "5.179.92.180:443",
    "5.179.92.182:443",
];

/// Largest discovery payload accepted by default (1 MiB)
pub const MAX_DISCOVERY_PAYLOAD: usize = 1024 * 1024;

fn danfoss_grid() -> Vec<String> {
    DANFOSS_GRID.iter().map(|s| s.to_string()).collect()
}

/// Top-level bridge configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BridgeConfig {
    /// Identity of the house to talk to
    #[serde(default)]
    pub house: HouseConfig,

    /// Steady-state link settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Pairing and configuration transfer settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| BridgeError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| BridgeError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| BridgeError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` yields for the `DOMINION_*` keys
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(user) = lookup("DOMINION_USER_NAME") {
            config.house.user_name = user;
        }

        if let Some(peer) = lookup("DOMINION_HOUSE_PEER_ID") {
            config.house.house_peer_id = Some(peer);
        }

        if let Some(endpoints) = lookup("DOMINION_RENDEZVOUS") {
            let endpoints: Vec<String> = endpoints
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            config.connection.rendezvous = endpoints.clone();
            config.discovery.rendezvous = endpoints;
        }

        if let Some(delay) = lookup("DOMINION_RECONNECT_DELAY_MS") {
            config.connection.reconnect_delay = parse_millis("DOMINION_RECONNECT_DELAY_MS", &delay)?;
        }

        if let Some(interval) = lookup("DOMINION_WATCHDOG_INTERVAL_MS") {
            config.connection.watchdog_interval =
                parse_millis("DOMINION_WATCHDOG_INTERVAL_MS", &interval)?;
        }

        if let Some(level) = lookup("DOMINION_LOG_LEVEL") {
            config.logging.log_level = level
                .parse::<Level>()
                .map_err(|_| BridgeError::ConfigError(format!("Invalid log level: {level}")))?;
        }

        if let Some(json) = lookup("DOMINION_LOG_JSON") {
            config.logging.json_format = matches!(json.as_str(), "1" | "true" | "yes");
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BridgeError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| BridgeError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.house.validate());
        errors.extend(self.connection.validate());
        errors.extend(self.discovery.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| BridgeError::ConfigError(format!("{key}: {e}")))
}

/// The house this bridge belongs to, as recorded after discovery
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HouseConfig {
    /// Name presented to the controller during discovery
    pub user_name: String,

    /// Hex peer id of the house controller; unset until discovery succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub house_peer_id: Option<String>,
}

impl Default for HouseConfig {
    fn default() -> Self {
        Self {
            user_name: String::from("dominion-bridge"),
            house_peer_id: None,
        }
    }
}

impl HouseConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.user_name.trim().is_empty() {
            errors.push("User name cannot be empty".to_string());
        }

        if let Some(ref peer) = self.house_peer_id {
            if let Err(e) = peer.parse::<crate::transport::PeerId>() {
                errors.push(format!("house_peer_id is malformed: {e}"));
            }
        }

        errors
    }
}

/// Link lifecycle settings for the connection manager
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Rendezvous endpoints tried in order
    pub rendezvous: Vec<String>,

    /// Delay before reconnecting after the link goes offline
    #[serde(with = "duration_serde")]
    pub reconnect_delay: Duration,

    /// Period of the watchdog check
    #[serde(with = "duration_serde")]
    pub watchdog_interval: Duration,

    /// Silence after which the watchdog sends a keep-alive ping
    #[serde(with = "duration_serde")]
    pub ping_after: Duration,

    /// Silence after which the watchdog forces a reconnect
    #[serde(with = "duration_serde")]
    pub reconnect_after: Duration,

    /// Bound on a full connect attempt
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Bound on a single outbound frame
    #[serde(with = "duration_serde")]
    pub send_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            rendezvous: danfoss_grid(),
            reconnect_delay: Duration::from_secs(10),
            watchdog_interval: Duration::from_secs(10),
            ping_after: Duration::from_secs(15),
            reconnect_after: Duration::from_secs(30),
            connect_timeout: timeout::DEFAULT_TIMEOUT,
            send_timeout: timeout::SEND_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.rendezvous.is_empty() {
            errors.push("At least one rendezvous endpoint is required".to_string());
        }

        if self.watchdog_interval.is_zero() {
            errors.push("Watchdog interval must be greater than 0".to_string());
        }

        if self.ping_after >= self.reconnect_after {
            errors.push(format!(
                "Ping threshold ({}ms) must be shorter than reconnect threshold ({}ms)",
                self.ping_after.as_millis(),
                self.reconnect_after.as_millis()
            ));
        }

        if self.reconnect_delay.as_millis() < 10 {
            errors.push("Reconnect delay too short (minimum: 10ms)".to_string());
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        }

        if self.send_timeout.as_millis() < 10 {
            errors.push("Send timeout too short (minimum: 10ms)".to_string());
        }

        errors
    }
}

/// Pairing and configuration transfer settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Rendezvous endpoints tried in order
    pub rendezvous: Vec<String>,

    /// Bound on connect plus pairing
    #[serde(with = "duration_serde")]
    pub pairing_timeout: Duration,

    /// Bound on each read of the configuration payload
    #[serde(with = "duration_serde")]
    pub read_timeout: Duration,

    /// Largest configuration payload accepted
    pub max_payload_size: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            rendezvous: danfoss_grid(),
            pairing_timeout: timeout::DEFAULT_TIMEOUT,
            read_timeout: timeout::DEFAULT_TIMEOUT,
            max_payload_size: MAX_DISCOVERY_PAYLOAD,
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.rendezvous.is_empty() {
            errors.push("At least one discovery rendezvous endpoint is required".to_string());
        }

        if self.pairing_timeout.as_millis() < 100 {
            errors.push("Pairing timeout too short (minimum: 100ms)".to_string());
        }

        if self.read_timeout.as_millis() < 100 {
            errors.push("Read timeout too short (minimum: 100ms)".to_string());
        }

        if self.max_payload_size == 0 {
            errors.push("Max discovery payload size cannot be 0".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("dominion-bridge"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
