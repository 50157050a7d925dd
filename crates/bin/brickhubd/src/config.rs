//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `brickhub.toml` in the working directory. Every field has a
//! default so the file is optional. Environment variables take precedence
//! over file values.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use brickhub_adapter_ble::{BackendKind, BleConfig};
use brickhub_app::connection::{ConnectConfig, DEFAULT_TRIES};
use brickhub_domain::hub::HubKind;

/// Top-level configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which transport drives the hubs.
    pub transport: TransportConfig,
    /// Discovery settings.
    pub connect: ConnectSection,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Simulated hubs, used by the `virtual` backend.
    #[serde(rename = "virtual")]
    pub simulation: VirtualConfig,
    /// Hubs to drive, in connection order.
    pub hubs: Vec<HubConfig>,
}

/// Transport backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// btleplug, every call awaited in place.
    #[default]
    Inline,
    /// btleplug behind a single driver task.
    Queued,
    /// In-memory hubs, no radio needed.
    Virtual,
}

/// Transport selection and BLE tuning.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub backend: Backend,
    /// Host adapter index when several are present.
    pub adapter_index: usize,
    /// Use acknowledged writes.
    pub write_with_response: bool,
}

/// How long to look for each hub.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ConnectSection {
    /// Discovery attempts per hub.
    pub tries: u32,
    /// Pause between attempts, in milliseconds.
    pub backoff_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Behaviour of simulated hubs.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VirtualConfig {
    /// Delay between a hub subscribing and its simulated button press.
    pub button_press_after_ms: u64,
}

/// One hub to drive.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub name: String,
    pub kind: HubKind,
    /// Advertised name to look for; the kind's default when absent.
    pub ble_name: Option<String>,
    /// Only connect to the hub with this address.
    pub address: Option<String>,
    /// Port of an external motor to run while the hub is driven.
    pub motor_port: Option<u8>,
    /// How long the control routine runs, in seconds.
    pub run_secs: u64,
}

impl Config {
    /// Load configuration from `brickhub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// result does not validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("brickhub.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("BRICKHUB_BACKEND")
            && let Ok(backend) = val.parse()
        {
            self.transport.backend = backend;
        }
        if let Ok(val) = std::env::var("BRICKHUB_CONNECT_TRIES")
            && let Ok(tries) = val.parse()
        {
            self.connect.tries = tries;
        }
        if let Ok(val) = std::env::var("BRICKHUB_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.connect.tries == 0 {
            return Err(ConfigError::Validation("connect.tries must be non-zero".to_string()));
        }
        if self.hubs.is_empty() {
            return Err(ConfigError::Validation("at least one hub is required".to_string()));
        }
        let mut names = HashSet::with_capacity(self.hubs.len());
        for hub in &self.hubs {
            if hub.name.is_empty() {
                return Err(ConfigError::Validation("hub name must not be empty".to_string()));
            }
            if !names.insert(hub.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "hub name {} is used twice",
                    hub.name
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn connect_config(&self) -> ConnectConfig {
        ConnectConfig {
            tries: self.connect.tries,
            backoff: Duration::from_millis(self.connect.backoff_ms),
        }
    }

    /// BLE settings, or `None` for the virtual backend.
    #[must_use]
    pub fn ble_config(&self) -> Option<BleConfig> {
        let backend = match self.transport.backend {
            Backend::Inline => BackendKind::Inline,
            Backend::Queued => BackendKind::Queued,
            Backend::Virtual => return None,
        };
        Some(BleConfig {
            backend,
            adapter_index: self.transport.adapter_index,
            write_with_response: self.transport.write_with_response,
        })
    }

    #[must_use]
    pub fn button_press_after(&self) -> Duration {
        Duration::from_millis(self.simulation.button_press_after_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            connect: ConnectSection::default(),
            logging: LoggingConfig::default(),
            simulation: VirtualConfig::default(),
            hubs: vec![HubConfig::default()],
        }
    }
}

impl Default for ConnectSection {
    fn default() -> Self {
        Self {
            tries: DEFAULT_TRIES,
            backoff_ms: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "brickhubd=info,brickhub_app=info,brickhub_adapter_ble=info".to_string(),
        }
    }
}

impl Default for VirtualConfig {
    fn default() -> Self {
        Self {
            button_press_after_ms: 1000,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            name: "hub".to_string(),
            kind: HubKind::CPlus,
            ble_name: None,
            address: None,
            motor_port: None,
            run_secs: 10,
        }
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inline" => Ok(Self::Inline),
            "queued" => Ok(Self::Queued),
            "virtual" => Ok(Self::Virtual),
            other => Err(ConfigError::Validation(format!("unknown backend {other}"))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inline => "inline",
            Self::Queued => "queued",
            Self::Virtual => "virtual",
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.transport.backend, Backend::Inline);
        assert_eq!(config.connect.tries, 60);
        assert_eq!(config.connect.backoff_ms, 1000);
        assert_eq!(config.hubs.len(), 1);
        assert_eq!(config.hubs[0].kind, HubKind::CPlus);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.connect.tries, 60);
        assert_eq!(config.hubs[0].name, "hub");
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [transport]
            backend = 'queued'
            adapter_index = 1
            write_with_response = true

            [connect]
            tries = 5
            backoff_ms = 250

            [logging]
            filter = 'debug'

            [virtual]
            button_press_after_ms = 300

            [[hubs]]
            name = 'train'
            kind = 'powered_up'
            motor_port = 0
            run_secs = 30

            [[hubs]]
            name = 'truck'
            kind = 'c_plus'
            ble_name = 'Truck'
            address = '90:84:2B:00:00:02'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.transport.backend, Backend::Queued);
        assert_eq!(config.transport.adapter_index, 1);
        assert!(config.transport.write_with_response);
        assert_eq!(config.connect.tries, 5);
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.simulation.button_press_after_ms, 300);
        assert_eq!(config.hubs.len(), 2);
        assert_eq!(config.hubs[0].kind, HubKind::PoweredUp);
        assert_eq!(config.hubs[0].motor_port, Some(0));
        assert_eq!(config.hubs[0].run_secs, 30);
        assert_eq!(config.hubs[1].ble_name.as_deref(), Some("Truck"));
        assert_eq!(config.hubs[1].address.as_deref(), Some("90:84:2B:00:00:02"));
        assert_eq!(config.hubs[1].run_secs, 10);
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.connect.tries, 60);
    }

    #[test]
    fn should_reject_zero_tries() {
        let mut config = Config::default();
        config.connect.tries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_duplicate_hub_names() {
        let mut config = Config::default();
        config.hubs.push(HubConfig::default());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("hub name hub is used twice"));
    }

    #[test]
    fn should_reject_empty_hub_name() {
        let mut config = Config::default();
        config.hubs[0].name = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_empty_hub_list() {
        let config: Config = toml::from_str("hubs = []").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_parse_backend_names() {
        assert_eq!("virtual".parse::<Backend>().unwrap(), Backend::Virtual);
        assert_eq!("inline".parse::<Backend>().unwrap(), Backend::Inline);
        assert!("bluez".parse::<Backend>().is_err());
        assert_eq!(Backend::Queued.to_string(), "queued");
    }

    #[test]
    fn should_map_backend_to_ble_config() {
        let mut config = Config::default();
        config.transport.backend = Backend::Queued;
        config.transport.adapter_index = 2;
        let ble = config.ble_config().unwrap();
        assert_eq!(ble.backend, BackendKind::Queued);
        assert_eq!(ble.adapter_index, 2);

        config.transport.backend = Backend::Virtual;
        assert!(config.ble_config().is_none());
    }

    #[test]
    fn should_convert_connect_section() {
        let config = Config::default();
        assert_eq!(
            config.connect_config(),
            ConnectConfig {
                tries: 60,
                backoff: Duration::from_secs(1),
            }
        );
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }
}
