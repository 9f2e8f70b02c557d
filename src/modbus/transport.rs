use async_trait::async_trait;
use log::debug;
use std::net::SocketAddr;
use tokio_modbus::client::{tcp, Context};
use tokio_modbus::prelude::*;

use crate::config::Endpoint;
use crate::utils::error::ModbusError;

/// Opens sessions to a Modbus server. Implementations must not apply their
/// own retry; timeouts are enforced by the caller.
#[async_trait]
pub trait ModbusTransport: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn ModbusSession>, ModbusError>;
}

/// One open connection. Lives for exactly one client operation.
#[async_trait]
pub trait ModbusSession: Send {
    async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError>;

    async fn read_coils(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<bool>, ModbusError>;

    async fn write_single_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), ModbusError>;

    async fn write_single_coil(
        &mut self,
        unit_id: u8,
        address: u16,
        value: bool,
    ) -> Result<(), ModbusError>;

    async fn close(&mut self) -> Result<(), ModbusError>;
}

/// Modbus-TCP transport backed by tokio-modbus.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

async fn resolve(endpoint: &Endpoint) -> Result<Vec<SocketAddr>, ModbusError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|e| {
            ModbusError::TransportUnavailable(format!("cannot resolve {}: {}", endpoint.host, e))
        })?
        .collect();

    if addrs.is_empty() {
        return Err(ModbusError::TransportUnavailable(format!(
            "no address found for {}",
            endpoint.host
        )));
    }
    Ok(addrs)
}

#[async_trait]
impl ModbusTransport for TcpTransport {
    /// Tries every resolved address in order, so `localhost` still reaches a
    /// server bound only to 127.0.0.1 when `::1` resolves first.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn ModbusSession>, ModbusError> {
        let mut last_error = None;

        for addr in resolve(endpoint).await? {
            debug!("🔌 Connecting to Modbus TCP server at {}", addr);
            match tcp::connect_slave(addr, Slave(endpoint.unit_id)).await {
                Ok(ctx) => return Ok(Box::new(TcpSession { ctx })),
                Err(e) => {
                    debug!("Connection to {} failed: {}", addr, e);
                    last_error = Some(format!("failed to connect to {}: {}", addr, e));
                }
            }
        }

        Err(ModbusError::TransportUnavailable(last_error.unwrap_or_else(|| {
            format!("no address found for {}", endpoint.host)
        })))
    }
}

struct TcpSession {
    ctx: Context,
}

#[async_trait]
impl ModbusSession for TcpSession {
    async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        self.ctx.set_slave(Slave(unit_id));
        // Outer Result = IO error, inner Result = Modbus exception
        Ok(self.ctx.read_holding_registers(address, count).await??)
    }

    async fn read_coils(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<bool>, ModbusError> {
        self.ctx.set_slave(Slave(unit_id));
        Ok(self.ctx.read_coils(address, count).await??)
    }

    async fn write_single_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), ModbusError> {
        self.ctx.set_slave(Slave(unit_id));
        Ok(self.ctx.write_single_register(address, value).await??)
    }

    async fn write_single_coil(
        &mut self,
        unit_id: u8,
        address: u16,
        value: bool,
    ) -> Result<(), ModbusError> {
        self.ctx.set_slave(Slave(unit_id));
        Ok(self.ctx.write_single_coil(address, value).await??)
    }

    async fn close(&mut self) -> Result<(), ModbusError> {
        self.ctx.disconnect().await?;
        Ok(())
    }
}
