use serde::Serialize;
use std::fmt;

/// A single Modbus transaction against one register or coil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum ModbusRequest {
    ReadHoldingRegister { address: u16 },
    WriteRegister { address: u16, value: u16 },
    ReadCoil { address: u16 },
    WriteCoil { address: u16, value: bool },
}

impl ModbusRequest {
    pub fn address(&self) -> u16 {
        match *self {
            ModbusRequest::ReadHoldingRegister { address }
            | ModbusRequest::WriteRegister { address, .. }
            | ModbusRequest::ReadCoil { address }
            | ModbusRequest::WriteCoil { address, .. } => address,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ModbusRequest::ReadHoldingRegister { .. } => "read_holding_register",
            ModbusRequest::WriteRegister { .. } => "write_register",
            ModbusRequest::ReadCoil { .. } => "read_coil",
            ModbusRequest::WriteCoil { .. } => "write_coil",
        }
    }

    pub fn function_code(&self) -> u8 {
        match self {
            ModbusRequest::ReadCoil { .. } => 0x01,
            ModbusRequest::ReadHoldingRegister { .. } => 0x03,
            ModbusRequest::WriteCoil { .. } => 0x05,
            ModbusRequest::WriteRegister { .. } => 0x06,
        }
    }
}

impl fmt::Display for ModbusRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModbusRequest::WriteRegister { address, value } => {
                write!(f, "{} @{} <- {}", self.kind(), address, value)
            }
            ModbusRequest::WriteCoil { address, value } => {
                write!(f, "{} @{} <- {}", self.kind(), address, value)
            }
            _ => write!(f, "{} @{}", self.kind(), self.address()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ModbusResponse {
    Register(u16),
    Coil(bool),
    Written,
}

impl fmt::Display for ModbusResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModbusResponse::Register(value) => write!(f, "{}", value),
            ModbusResponse::Coil(true) => write!(f, "on"),
            ModbusResponse::Coil(false) => write!(f, "off"),
            ModbusResponse::Written => write!(f, "ok"),
        }
    }
}
