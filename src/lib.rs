//! Modbus-TCP Device Client Library
//!
//! A best-effort client for climate units, switches and binary sensors that
//! speak Modbus-TCP. Each operation opens a connection, performs a single
//! register or coil transaction and closes the connection again. Failures are
//! logged and reported as `None`/`false` so polling callers never crash.

pub mod cli;
pub mod config;
pub mod modbus;
pub mod output;
pub mod utils;
pub mod values;

// Re-export commonly used types
pub use config::{Endpoint, ModbusConfig};
pub use modbus::{
    ClientStats, ModbusDeviceClient, ModbusRequest, ModbusResponse, ModbusSession,
    ModbusTransport, TcpTransport,
};
pub use utils::error::ModbusError;
pub use values::{ModeTable, ScaledRegister};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
