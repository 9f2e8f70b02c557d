pub mod client;
pub mod protocol;
pub mod stats;
pub mod transport;

pub use client::ModbusDeviceClient;
pub use protocol::{ModbusRequest, ModbusResponse};
pub use stats::{ClientStats, FailureRecord};
pub use transport::{ModbusSession, ModbusTransport, TcpTransport};
