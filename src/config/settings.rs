use clap::ArgMatches;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::utils::error::ModbusError;

pub const DEFAULT_TIMEOUT_SECS: f64 = 5.0;
pub const DEFAULT_DELAY_SECS: f64 = 0.5;

/// Connection parameters for one Modbus-TCP device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModbusConfig {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    /// Seconds allowed for a whole operation, from connect to close.
    pub timeout: f64,
    /// Advisory inter-request delay in seconds. Not enforced by the client.
    pub delay: f64,
}

/// Loosely typed view of a config table; every key is optional so that a
/// missing key is reported as a configuration error rather than a parse error.
#[derive(Debug, Default, Deserialize)]
struct RawModbusConfig {
    host: Option<String>,
    port: Option<i64>,
    unit_id: Option<i64>,
    timeout: Option<f64>,
    delay: Option<f64>,
}

impl TryFrom<RawModbusConfig> for ModbusConfig {
    type Error = ModbusError;

    fn try_from(raw: RawModbusConfig) -> Result<Self, Self::Error> {
        let host = raw.host.ok_or_else(|| missing("host"))?;
        let port = raw.port.ok_or_else(|| missing("port"))?;
        let unit_id = raw.unit_id.ok_or_else(|| missing("unit_id"))?;

        let port = u16::try_from(port).map_err(|_| {
            ModbusError::ConfigurationError(format!("port {} is outside 1-65535", port))
        })?;
        let unit_id = u8::try_from(unit_id).map_err(|_| {
            ModbusError::ConfigurationError(format!("unit_id {} is outside 0-255", unit_id))
        })?;

        let config = ModbusConfig {
            host,
            port,
            unit_id,
            timeout: raw.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
            delay: raw.delay.unwrap_or(DEFAULT_DELAY_SECS),
        };
        config.validate()?;
        Ok(config)
    }
}

fn missing(key: &str) -> ModbusError {
    ModbusError::ConfigurationError(format!("missing required parameter '{}'", key))
}

impl ModbusConfig {
    pub fn new(host: impl Into<String>, port: u16, unit_id: u8) -> Self {
        Self {
            host: host.into(),
            port,
            unit_id,
            timeout: DEFAULT_TIMEOUT_SECS,
            delay: DEFAULT_DELAY_SECS,
        }
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn with_delay(mut self, seconds: f64) -> Self {
        self.delay = seconds;
        self
    }

    /// Build from a key-value table such as the `[modbus]` section of a
    /// config file. Missing `host`, `port` or `unit_id` is a configuration error.
    pub fn from_table(table: toml::Table) -> Result<Self, ModbusError> {
        let raw: RawModbusConfig = toml::Value::Table(table).try_into()?;
        Self::try_from(raw)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ModbusError> {
        let mut table: toml::Table = content.parse()?;
        match table.remove("modbus") {
            Some(toml::Value::Table(section)) => Self::from_table(section),
            Some(_) => Err(ModbusError::ConfigurationError(
                "'modbus' must be a table".to_string(),
            )),
            None => Self::from_table(table),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModbusError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ModbusError::ConfigurationError(format!("cannot read {}: {}", path.display(), e))
        })?;
        debug!("📄 Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Config file (if `--config` is given) overridden by explicit flags.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ModbusError> {
        let mut raw = match matches.get_one::<String>("config") {
            Some(path) => {
                let config = Self::from_file(path)?;
                RawModbusConfig {
                    host: Some(config.host),
                    port: Some(config.port.into()),
                    unit_id: Some(config.unit_id.into()),
                    timeout: Some(config.timeout),
                    delay: Some(config.delay),
                }
            }
            None => RawModbusConfig::default(),
        };

        if let Some(host) = matches.get_one::<String>("host") {
            raw.host = Some(host.clone());
        }
        if let Some(port) = matches.get_one::<String>("port") {
            raw.port = Some(parse_arg("port", port)?);
        }
        if let Some(unit) = matches.get_one::<String>("unit") {
            raw.unit_id = Some(parse_arg("unit", unit)?);
        }
        if let Some(timeout) = matches.get_one::<String>("timeout") {
            raw.timeout = Some(parse_arg("timeout", timeout)?);
        }

        Self::try_from(raw)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut root = toml::Table::new();
        root.insert("modbus".to_string(), toml::Value::try_from(self)?);
        std::fs::write(path, toml::to_string(&root)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ModbusError> {
        if self.host.trim().is_empty() {
            return Err(missing("host"));
        }
        if self.port == 0 {
            return Err(ModbusError::ConfigurationError(
                "port 0 is outside 1-65535".to_string(),
            ));
        }
        self.timeout_duration()?;
        self.delay_duration()?;
        Ok(())
    }

    pub fn timeout_duration(&self) -> Result<Duration, ModbusError> {
        let timeout = seconds("timeout", self.timeout)?;
        if timeout.is_zero() {
            return Err(ModbusError::ConfigurationError(format!(
                "timeout must be a positive number of seconds, got {}",
                self.timeout
            )));
        }
        Ok(timeout)
    }

    pub fn delay_duration(&self) -> Result<Duration, ModbusError> {
        seconds("delay", self.delay)
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            unit_id: self.unit_id,
        }
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration, ModbusError> {
    Duration::try_from_secs_f64(value).map_err(|e| {
        ModbusError::ConfigurationError(format!(
            "{} must be a non-negative number of seconds, got {}: {}",
            name, value, e
        ))
    })
}

fn parse_arg<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ModbusError>
where
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e| {
        ModbusError::ConfigurationError(format!("invalid --{} '{}': {}", name, value, e))
    })
}

/// Where a transport should connect to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} (unit {})", self.host, self.port, self.unit_id)
    }
}
