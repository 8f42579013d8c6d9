//! Configuration management module.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration load result.
#[derive(Debug)]
pub enum ConfigLoadResult {
    /// Config loaded successfully.
    Loaded(DeviceConfig),
    /// Config file missing (first run).
    Missing,
    /// Config file exists but invalid.
    Invalid(ConfigError),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Connection parameters for a single ZKTeco device, as loaded from a
/// `config.toml` or built programmatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device IP address or hostname.
    pub ip: String,
    /// Device's ZK port (typically 4370).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-command timeout, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Local UDP port to bind when falling back to the UDP transport.
    /// `0` lets the OS pick an ephemeral port.
    #[serde(default)]
    pub inport: u16,
}

fn default_port() -> u16 {
    4370
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            ip: "192.168.1.201".to_string(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            inport: 0,
        }
    }
}

impl DeviceConfig {
    /// Default config file path (alongside the running executable).
    pub fn default_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Attempt to load config with a detailed result.
    pub fn try_load(path: &Path) -> ConfigLoadResult {
        if !path.exists() {
            return ConfigLoadResult::Missing;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<DeviceConfig>(&content) {
                Ok(config) => match config.validate() {
                    Ok(()) => ConfigLoadResult::Loaded(config),
                    Err(e) => ConfigLoadResult::Invalid(e),
                },
                Err(e) => ConfigLoadResult::Invalid(ConfigError::Parse(e)),
            },
            Err(e) => ConfigLoadResult::Invalid(ConfigError::Read(e)),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ip.trim().is_empty() {
            return Err(ConfigError::Validation("device ip cannot be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Validation("port must be greater than 0".to_string()));
        }
        if self.timeout_ms < 100 {
            return Err(ConfigError::Validation(
                "timeout_ms must be at least 100ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = DeviceConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rejects_empty_ip() {
        let mut config = DeviceConfig::default();
        config.ip = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_zero_port() {
        let mut config = DeviceConfig::default();
        config.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_too_small_timeout() {
        let mut config = DeviceConfig::default();
        config.timeout_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip_preserves_fields() {
        let config = DeviceConfig {
            ip: "10.0.0.5".to_string(),
            port: 4370,
            timeout_ms: 5000,
            inport: 5200,
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: DeviceConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.ip, config.ip);
        assert_eq!(parsed.port, config.port);
        assert_eq!(parsed.timeout_ms, config.timeout_ms);
        assert_eq!(parsed.inport, config.inport);
    }

    #[test]
    fn missing_file_reports_missing() {
        let result = DeviceConfig::try_load(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, ConfigLoadResult::Missing));
    }
}
