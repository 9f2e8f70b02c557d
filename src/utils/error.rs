use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl ModbusError {
    /// Short machine-friendly name of the error kind, used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ModbusError::ConfigurationError(_) => "configuration",
            ModbusError::TransportUnavailable(_) => "transport_unavailable",
            ModbusError::ProtocolError(_) => "protocol",
            ModbusError::InvalidData(_) => "invalid_data",
        }
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        ModbusError::TransportUnavailable(format!("IO error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for ModbusError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ModbusError::TransportUnavailable("Timeout occurred".to_string())
    }
}

impl From<tokio_modbus::Error> for ModbusError {
    fn from(err: tokio_modbus::Error) -> Self {
        match err {
            tokio_modbus::Error::Transport(e) => e.into(),
            other => ModbusError::ProtocolError(format!("Invalid response: {}", other)),
        }
    }
}

impl From<tokio_modbus::ExceptionCode> for ModbusError {
    fn from(code: tokio_modbus::ExceptionCode) -> Self {
        ModbusError::ProtocolError(format!("Exception response: {}", code))
    }
}

impl From<toml::de::Error> for ModbusError {
    fn from(err: toml::de::Error) -> Self {
        ModbusError::ConfigurationError(format!("TOML error: {}", err))
    }
}
