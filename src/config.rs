//! Configuration system for the daylight sync controller
//!
//! Configuration is read once at startup from a TOML file. Broker settings may be
//! overridden through `MDS_`-prefixed environment variables so credentials do not
//! have to live in the file. The resulting values are read-only for the lifetime
//! of the process.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Prefix for environment variable overrides (e.g. `MDS_PASSWORD`)
pub const ENV_PREFIX: &str = "MDS_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaylightConfig {
    pub mqtt: MqttSection,
    #[serde(default)]
    pub executor: ExecutorSection,
    #[serde(default)]
    pub monitors: Vec<MonitorSection>,
}

/// MQTT broker section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Whether the broker connection should be started at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Broker host name or IP address
    #[serde(default)]
    pub address: String,
    /// Broker TCP port
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Topic carrying brightness/color commands
    #[serde(default)]
    pub topic: String,
    /// Keepalive probe period and reconnect interval in seconds
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// MQTT client id; generated per connection when absent
    pub client_id: Option<String>,
    /// MQTT keep-alive negotiated with the broker
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_port() -> u16 {
    1883
}

fn default_reconnect_delay() -> u64 {
    10
}

fn default_keep_alive() -> u64 {
    30
}

/// External monitor-control utility settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorSection {
    /// Program launched for every command
    #[serde(default = "default_program")]
    pub program: String,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            program: default_program(),
        }
    }
}

fn default_program() -> String {
    "ControlMyMonitor".to_string()
}

/// One controlled monitor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorSection {
    /// Device name as understood by the control utility
    pub name: String,
    pub brightness: ValueRange,
    pub contrast: ValueRange,
}

/// VCP parameter code with its usable value range
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValueRange {
    pub code: u16,
    pub min: i32,
    pub max: i32,
}

/// Broker connection parameters, immutable once loaded
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerEndpoint {
    pub address: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic: String,
    pub reconnect_delay: Duration,
    pub keep_alive: Duration,
    pub client_id: Option<String>,
}

/// A monitor with the ranges its brightness and contrast map onto
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceTarget {
    pub name: String,
    pub brightness: ValueRange,
    pub contrast: ValueRange,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid value in environment variable {name}: {value}")]
    InvalidEnvValue { name: String, value: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DaylightConfig {
    /// Load configuration from TOML file, apply environment overrides and validate
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text, apply environment overrides and validate
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: DaylightConfig = toml::from_str(content)?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Replace broker settings with non-blank `MDS_*` values from `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(&format!("{ENV_PREFIX}{key}")).filter(|value| !value.trim().is_empty())
        };

        if let Some(address) = get("ADDRESS") {
            self.mqtt.address = address;
        }
        if let Some(port) = get("PORT") {
            self.mqtt.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue {
                    name: format!("{ENV_PREFIX}PORT"),
                    value: port.clone(),
                })?;
        }
        if let Some(username) = get("USERNAME") {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = get("PASSWORD") {
            self.mqtt.password = Some(password);
        }
        if let Some(topic) = get("TOPIC") {
            self.mqtt.topic = topic;
        }

        Ok(())
    }

    /// Check structural consistency of the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.enabled {
            if self.mqtt.address.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "mqtt.address is required (or set {ENV_PREFIX}ADDRESS)"
                )));
            }
            if self.mqtt.topic.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "mqtt.topic is required (or set {ENV_PREFIX}TOPIC)"
                )));
            }
        }

        if self.mqtt.reconnect_delay_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.reconnect_delay_secs must be greater than 0".to_string(),
            ));
        }

        if self.mqtt.keep_alive_secs < 5 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.keep_alive_secs must be at least 5".to_string(),
            ));
        }

        // the CONNECT keep-alive field is 16 bits wide
        if self.mqtt.keep_alive_secs > u64::from(u16::MAX) {
            return Err(ConfigError::InvalidConfig(format!(
                "mqtt.keep_alive_secs must be at most {}",
                u16::MAX
            )));
        }

        if self.executor.program.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "executor.program must not be empty".to_string(),
            ));
        }

        if self.monitors.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "at least one [[monitors]] entry is required".to_string(),
            ));
        }

        for monitor in &self.monitors {
            if monitor.name.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "monitor name must not be empty".to_string(),
                ));
            }
            validate_range(&monitor.name, "brightness", &monitor.brightness)?;
            validate_range(&monitor.name, "contrast", &monitor.contrast)?;
        }

        Ok(())
    }

    /// Broker parameters owned by the connection supervisor
    pub fn broker_endpoint(&self) -> BrokerEndpoint {
        BrokerEndpoint {
            address: self.mqtt.address.clone(),
            port: self.mqtt.port,
            username: self.mqtt.username.clone(),
            password: self.mqtt.password.clone(),
            topic: self.mqtt.topic.clone(),
            reconnect_delay: Duration::from_secs(self.mqtt.reconnect_delay_secs),
            keep_alive: Duration::from_secs(self.mqtt.keep_alive_secs),
            client_id: self.mqtt.client_id.clone(),
        }
    }

    /// Device list in configuration order, shared read-only by the executor
    pub fn device_targets(&self) -> Arc<[DeviceTarget]> {
        self.monitors
            .iter()
            .map(|monitor| DeviceTarget {
                name: monitor.name.clone(),
                brightness: monitor.brightness,
                contrast: monitor.contrast,
            })
            .collect()
    }

    /// Copy of the configuration safe to print
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.mqtt.password.is_some() {
            copy.mqtt.password = Some("***".to_string());
        }
        copy
    }
}

fn validate_range(monitor: &str, parameter: &str, range: &ValueRange) -> Result<(), ConfigError> {
    if range.min > range.max {
        return Err(ConfigError::InvalidConfig(format!(
            "monitor '{monitor}' {parameter} range is inverted: min {} > max {}",
            range.min, range.max
        )));
    }
    Ok(())
}

#[cfg(test)]
impl DaylightConfig {
    /// Create a test configuration for unit testing
    pub fn test_config() -> Self {
        let toml_content = r#"
[mqtt]
address = "localhost"
port = 1883
username = "sensor"
password = "secret"
topic = "home/daylight"
reconnect_delay_secs = 5

[[monitors]]
name = "MONITOR1"
brightness = { code = 10, min = 10, max = 90 }
contrast = { code = 12, min = 0, max = 100 }
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[mqtt]
enabled = true
address = "192.168.1.20"
port = 1884
username = "user"
password = "pass"
topic = "sensors/daylight"
reconnect_delay_secs = 15
client_id = "office-pc"
keep_alive_secs = 45

[executor]
program = "C:\\Tools\\ControlMyMonitor.exe"

[[monitors]]
name = "\\\\.\\DISPLAY1\\Monitor0"
brightness = { code = 10, min = 10, max = 90 }
contrast = { code = 12, min = 0, max = 100 }

[[monitors]]
name = "\\\\.\\DISPLAY2\\Monitor0"
brightness = { code = 10, min = 0, max = 100 }
contrast = { code = 12, min = 20, max = 80 }
"#;

        let config = DaylightConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.mqtt.address, "192.168.1.20");
        assert_eq!(config.mqtt.port, 1884);
        assert_eq!(config.mqtt.client_id.as_deref(), Some("office-pc"));
        assert_eq!(config.executor.program, "C:\\Tools\\ControlMyMonitor.exe");
        assert_eq!(config.monitors.len(), 2);
        assert_eq!(config.monitors[1].contrast.min, 20);

        let endpoint = config.broker_endpoint();
        assert_eq!(endpoint.reconnect_delay, Duration::from_secs(15));
        assert_eq!(endpoint.keep_alive, Duration::from_secs(45));
    }

    #[test]
    fn test_defaults() {
        let toml_content = r#"
[mqtt]
address = "broker"
topic = "t"

[[monitors]]
name = "M"
brightness = { code = 10, min = 0, max = 100 }
contrast = { code = 12, min = 0, max = 100 }
"#;

        let config: DaylightConfig = toml::from_str(toml_content).unwrap();
        assert!(config.mqtt.enabled);
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.reconnect_delay_secs, 10);
        assert_eq!(config.mqtt.keep_alive_secs, 30);
        assert_eq!(config.executor.program, "ControlMyMonitor");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_replace_values() {
        let mut config = DaylightConfig::test_config();
        let env: HashMap<String, String> = [
            ("MDS_ADDRESS", "10.0.0.5"),
            ("MDS_PORT", "8883"),
            ("MDS_PASSWORD", "from-env"),
            ("MDS_TOPIC", "   "),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        config
            .apply_env_overrides(|name| env.get(name).cloned())
            .unwrap();

        assert_eq!(config.mqtt.address, "10.0.0.5");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.password.as_deref(), Some("from-env"));
        // blank values are ignored
        assert_eq!(config.mqtt.topic, "home/daylight");
        assert_eq!(config.mqtt.username.as_deref(), Some("sensor"));
    }

    #[test]
    fn test_env_override_invalid_port() {
        let mut config = DaylightConfig::test_config();
        let result = config.apply_env_overrides(|name| {
            (name == "MDS_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidEnvValue { .. })));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut config = DaylightConfig::test_config();
        config.monitors[0].contrast = ValueRange {
            code: 12,
            min: 80,
            max: 20,
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("inverted"));
    }

    #[test]
    fn test_missing_topic_rejected_only_when_enabled() {
        let mut config = DaylightConfig::test_config();
        config.mqtt.topic.clear();
        assert!(config.validate().is_err());

        config.mqtt.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_reconnect_delay_rejected() {
        let mut config = DaylightConfig::test_config();
        config.mqtt.reconnect_delay_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_short_keep_alive_rejected() {
        let mut config = DaylightConfig::test_config();
        config.mqtt.keep_alive_secs = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_keep_alive_fits_connect_field() {
        let mut config = DaylightConfig::test_config();
        config.mqtt.keep_alive_secs = 65_535;
        assert!(config.validate().is_ok());

        config.mqtt.keep_alive_secs = 65_536;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at most 65535"));
    }

    #[test]
    fn test_no_monitors_rejected() {
        let mut config = DaylightConfig::test_config();
        config.monitors.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_device_targets_keep_order() {
        let mut config = DaylightConfig::test_config();
        let mut second = config.monitors[0].clone();
        second.name = "MONITOR2".to_string();
        config.monitors.push(second);

        let targets = config.device_targets();
        let names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["MONITOR1", "MONITOR2"]);
    }

    #[test]
    fn test_redacted_masks_password() {
        let config = DaylightConfig::test_config();
        let shown = config.redacted();
        assert_eq!(shown.mqtt.password.as_deref(), Some("***"));
        assert_eq!(config.mqtt.password.as_deref(), Some("secret"));
    }
}
