//! Configuration for the ARCOS link client
//!
//! Loads configuration from a TOML file. Every field has a default, so an
//! empty file (or no file at all) gives a working client that discovers
//! ports and tries the usual baud rates.

use crate::error::{Error, Result};
use crate::protocol::constants::{MAX_SONARS, WATCHDOG_WINDOW_MS};
use crate::transport::PortSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level client configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub serial: SerialConfig,
    pub link: LinkConfig,
    pub logging: LoggingConfig,
}

/// Serial port selection and timeouts
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Ports to try, in order. Empty means discover local serial devices.
    pub ports: Vec<String>,
    /// Baud rates to try on each port, most preferred first
    pub baud_rates: Vec<u32>,
    /// Bound on a single byte read, also the handshake reply timeout
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            ports: Vec::new(),
            baud_rates: vec![115200, 57600, 38400, 19200, 9600],
            read_timeout_ms: 1000,
            write_timeout_ms: 1000,
        }
    }
}

/// Handshake, receiver and heartbeat tuning
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Failed sync exchanges tolerated per port/baud before moving on
    pub sync_retries: u32,
    /// Consecutive receive timeouts tolerated before the link is declared lost
    pub allowed_timeouts: u32,
    /// Consecutive invalid packets tolerated before the input buffer is flushed
    pub allowed_invalid_packets: u32,
    /// PULSE period; must stay below the server's 2 s watchdog window
    pub heartbeat_interval_ms: u64,
    /// How long `connect()` waits for the first standard SIP after OPEN
    pub startup_timeout_ms: u64,
    /// Turn the sonar array on during `connect()` if the server has it off
    pub enable_sonars: bool,
    pub sonar_enable_attempts: u32,
    /// Sonars reported by `latest_sonars()`
    pub sonar_count: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            sync_retries: 6,
            allowed_timeouts: 2,
            allowed_invalid_packets: 10,
            heartbeat_interval_ms: 1000,
            startup_timeout_ms: 5000,
            enable_sonars: true,
            sonar_enable_attempts: 5,
            sonar_count: 8,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use arcos_link::config::ClientConfig;
    ///
    /// let config = ClientConfig::from_file("arcos.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.serial.baud_rates.is_empty() {
            return Err(Error::Config("serial.baud_rates must not be empty".into()));
        }
        if self.serial.read_timeout_ms == 0 || self.serial.write_timeout_ms == 0 {
            return Err(Error::Config("serial timeouts must be non-zero".into()));
        }
        if self.link.heartbeat_interval_ms == 0
            || self.link.heartbeat_interval_ms >= WATCHDOG_WINDOW_MS
        {
            return Err(Error::Config(format!(
                "link.heartbeat_interval_ms must be between 1 and {} ms",
                WATCHDOG_WINDOW_MS - 1
            )));
        }
        if self.link.startup_timeout_ms == 0 {
            return Err(Error::Config("link.startup_timeout_ms must be non-zero".into()));
        }
        if self.link.sonar_count > MAX_SONARS {
            return Err(Error::Config(format!(
                "link.sonar_count {} exceeds {}",
                self.link.sonar_count, MAX_SONARS
            )));
        }
        Ok(())
    }

    pub fn port_settings(&self) -> PortSettings {
        PortSettings {
            read_timeout: Duration::from_millis(self.serial.read_timeout_ms),
            write_timeout: Duration::from_millis(self.serial.write_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(config.serial.ports.is_empty());
        assert_eq!(config.serial.baud_rates, vec![115200, 57600, 38400, 19200, 9600]);
        assert_eq!(config.link.sync_retries, 6);
        assert_eq!(config.link.allowed_timeouts, 2);
        assert_eq!(config.link.allowed_invalid_packets, 10);
        assert_eq!(config.link.heartbeat_interval_ms, 1000);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let config = ClientConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[serial]"));
        assert!(toml_string.contains("[link]"));
        assert!(toml_string.contains("[logging]"));
        assert!(toml_string.contains("sync_retries = 6"));
        assert!(toml_string.contains("level = \"info\""));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_content = r#"
[serial]
ports = ["/dev/ttyUSB0"]
baud_rates = [9600]

[link]
allowed_timeouts = 4
"#;

        let config: ClientConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.serial.ports, vec!["/dev/ttyUSB0"]);
        assert_eq!(config.serial.baud_rates, vec![9600]);
        assert_eq!(config.serial.read_timeout_ms, 1000);
        assert_eq!(config.link.allowed_timeouts, 4);
        assert_eq!(config.link.sync_retries, 6);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ClientConfig::default();
        config.serial.baud_rates.clear();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = ClientConfig::default();
        config.link.heartbeat_interval_ms = 2000;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = ClientConfig::default();
        config.serial.read_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = ClientConfig::default();
        config.link.sonar_count = 33;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("arcos-link-{}.toml", std::process::id()));
        let mut config = ClientConfig::default();
        config.serial.ports = vec!["/dev/ttyS0".to_string()];
        config.link.sonar_count = 16;
        config.to_file(&path).unwrap();

        let loaded = ClientConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_port_settings() {
        let mut config = ClientConfig::default();
        config.serial.read_timeout_ms = 50;
        let settings = config.port_settings();
        assert_eq!(settings.read_timeout, Duration::from_millis(50));
        assert_eq!(settings.write_timeout, Duration::from_secs(1));
    }
}
