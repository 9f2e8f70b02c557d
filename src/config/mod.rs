pub mod settings;

pub use settings::{Endpoint, ModbusConfig, DEFAULT_DELAY_SECS, DEFAULT_TIMEOUT_SECS};
