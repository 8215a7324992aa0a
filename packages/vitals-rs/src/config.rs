use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_CAPTURE_WINDOW_MS: u64 = 10_000;

#[cfg(windows)]
pub const DEFAULT_SERIAL_PORT: &str = "COM3";
#[cfg(not(windows))]
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyACM0";

/// Serial connection target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name (e.g., /dev/ttyUSB0, /dev/tty.usbmodem1101, COM3)
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Per-read timeout handed to the serial driver
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

impl SerialConfig {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Default::default()
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default timeout for a single-flight acquisition
    pub acquire_timeout_ms: u64,

    /// Length of a capture session window
    pub capture_window_ms: u64,

    /// Hardware connection used when none is given explicitly
    pub serial: SerialConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            capture_window_ms: DEFAULT_CAPTURE_WINDOW_MS,
            serial: SerialConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `VITALS_SERIAL_PORT` | platform default (`COM3` / `/dev/ttyACM0`) |
    /// | `VITALS_BAUD_RATE` | 9600 |
    /// | `VITALS_READ_TIMEOUT_MS` | 1000 |
    /// | `VITALS_ACQUIRE_TIMEOUT_MS` | 5000 |
    /// | `VITALS_CAPTURE_WINDOW_MS` | 10000 |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            acquire_timeout_ms: parse_var(&lookup, "VITALS_ACQUIRE_TIMEOUT_MS")?
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_MS),
            capture_window_ms: parse_var(&lookup, "VITALS_CAPTURE_WINDOW_MS")?
                .unwrap_or(DEFAULT_CAPTURE_WINDOW_MS),
            serial: SerialConfig {
                port: lookup("VITALS_SERIAL_PORT")
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_SERIAL_PORT.to_string()),
                baud_rate: parse_var(&lookup, "VITALS_BAUD_RATE")?.unwrap_or(DEFAULT_BAUD_RATE),
                read_timeout_ms: parse_var(&lookup, "VITALS_READ_TIMEOUT_MS")?
                    .unwrap_or(DEFAULT_READ_TIMEOUT_MS),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.acquire_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "acquire timeout must be greater than zero".to_string(),
            ));
        }
        if self.capture_window_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "capture window must be greater than zero".to_string(),
            ));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::InvalidValue(
                "baud rate must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn capture_window(&self) -> Duration {
        Duration::from_millis(self.capture_window_ms)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber {
                key: key.to_string(),
                value: raw,
            }),
        None => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' is not a number")]
    InvalidNumber { key: String, value: String },
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<ConfigError> for crate::error::VitalsError {
    fn from(err: ConfigError) -> Self {
        crate::error::VitalsError::InvalidConfig(err.to_string())
    }
}
