use serde::{Deserialize, Serialize};

use crate::utils::error::ModbusError;

/// A holding register carrying a fixed-point value, e.g. a temperature stored
/// in tenths of a degree (`scale = 0.1`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaledRegister {
    pub address: u16,
    pub scale: f64,
    /// Decimal places kept when converting to engineering units.
    pub precision: u32,
}

impl ScaledRegister {
    pub fn new(address: u16, scale: f64, precision: u32) -> Result<Self, ModbusError> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ModbusError::ConfigurationError(format!(
                "scale for register {} must be positive, got {}",
                address, scale
            )));
        }
        Ok(Self {
            address,
            scale,
            precision,
        })
    }

    /// Unscaled register, one decimal place.
    pub fn unscaled(address: u16) -> Self {
        Self {
            address,
            scale: 1.0,
            precision: 1,
        }
    }

    pub fn decode(&self, raw: u16) -> f64 {
        round_to(raw as f64 * self.scale, self.precision)
    }

    pub fn encode(&self, value: f64) -> Result<u16, ModbusError> {
        let raw = (round_to(value, self.precision) / self.scale).round();
        if !raw.is_finite() || raw < 0.0 || raw > u16::MAX as f64 {
            return Err(ModbusError::InvalidData(format!(
                "{} does not fit register {} (scale {})",
                value, self.address, self.scale
            )));
        }
        Ok(raw as u16)
    }
}

fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}
