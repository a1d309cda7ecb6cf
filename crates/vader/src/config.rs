//! Daemon configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! command line flags. The binary is responsible for the last step; this
//! module only knows about defaults, YAML and validation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Placeholder token that means "not configured".
pub const TOKEN_SENTINEL: &str = "REQUIRED";

/// Location understood by the weather API as "wherever the request comes from".
pub const AUTOIP_LOCATION: &str = "autoip";

/// Environment variable consulted when no token was given on the CLI or in YAML.
pub const TOKEN_ENV_VAR: &str = "WUNDERGROUND_TOKEN";

const DEFAULT_MQTT_PORT: u16 = 1883;

const SECS_PER_HOUR: u64 = 60 * 60;

/// Root configuration of the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub weather: WeatherConfig,
    /// Hours between two fetch-and-publish cycles.
    pub refresh_hours: u64,
    pub mqtt: MqttConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            weather: WeatherConfig::default(),
            refresh_hours: 1,
            mqtt: MqttConfig::default(),
        }
    }
}

/// Weather API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub token: String,
    pub location: String,
    pub api_url: String,
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            location: AUTOIP_LOCATION.to_string(),
            api_url: "http://api.wunderground.com".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Broker connection and hemtjanst topic settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// `host`, `host:port` or `tcp://host:port`
    pub address: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
    pub announce_topic: String,
    pub discover_topic: String,
    pub leave_topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            address: format!("localhost:{}", DEFAULT_MQTT_PORT),
            client_id: "vader".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 30,
            connect_timeout_secs: 10,
            announce_topic: "announce".to_string(),
            discover_topic: "discover".to_string(),
            leave_topic: "leave".to_string(),
        }
    }
}

impl MqttConfig {
    /// Split the configured address into host and port.
    pub fn broker(&self) -> Result<(String, u16), ConfigError> {
        let address = self.address.trim();
        let address = address
            .strip_prefix("tcp://")
            .or_else(|| address.strip_prefix("mqtt://"))
            .unwrap_or(address);

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidAddress(self.address.clone()))?;
                (host, port)
            }
            None => (address, DEFAULT_MQTT_PORT),
        };

        if host.is_empty() {
            return Err(ConfigError::InvalidAddress(self.address.clone()));
        }
        Ok((host.to_string(), port))
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Fill the token from the environment if nothing else provided one.
    pub fn apply_env_token(&mut self, env_token: Option<String>) {
        if self.token_missing() {
            if let Some(token) = env_token.filter(|t| !t.trim().is_empty()) {
                self.weather.token = token;
            }
        }
    }

    /// Check the configuration before anything connects anywhere.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_missing() {
            return Err(ConfigError::MissingToken);
        }
        if self.refresh_hours == 0 || self.refresh_hours.checked_mul(SECS_PER_HOUR).is_none() {
            return Err(ConfigError::InvalidRefresh(self.refresh_hours));
        }
        self.mqtt.broker()?;
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_hours.saturating_mul(SECS_PER_HOUR))
    }

    fn token_missing(&self) -> bool {
        let token = self.weather.token.trim();
        token.is_empty() || token == TOKEN_SENTINEL
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("A token is required to be able to query the Wunderground API")]
    MissingToken,
    #[error("Refresh interval must be at least 1 hour and fit in seconds, got {0} hours")]
    InvalidRefresh(u64),
    #[error("Invalid MQTT broker address: {0}")]
    InvalidAddress(String),
}
