use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{timeout_at, Instant};

use super::protocol::{ModbusRequest, ModbusResponse};
use super::stats::{ClientStats, StatsRecorder};
use super::transport::{ModbusSession, ModbusTransport, TcpTransport};
use crate::config::{Endpoint, ModbusConfig};
use crate::utils::error::ModbusError;
use crate::values::ScaledRegister;

/// Deadline used when the configured timeout overflows the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Best-effort client for one Modbus-TCP device.
///
/// Every operation runs a full connect, transact, close cycle while holding
/// the client's I/O lock, so a single instance can be shared between any
/// number of callers. The plain operations never fail: reads return `None`
/// when the value is not available and writes return `false`. The `try_*`
/// variants expose the underlying [`ModbusError`].
pub struct ModbusDeviceClient {
    config: ModbusConfig,
    endpoint: Endpoint,
    timeout: Duration,
    delay: Duration,
    transport: Arc<dyn ModbusTransport>,
    io_lock: Mutex<()>,
    stats: StatsRecorder,
}

impl ModbusDeviceClient {
    pub fn new(config: ModbusConfig) -> Result<Self, ModbusError> {
        Self::with_transport(config, Arc::new(TcpTransport::new()))
    }

    pub fn with_transport(
        config: ModbusConfig,
        transport: Arc<dyn ModbusTransport>,
    ) -> Result<Self, ModbusError> {
        config.validate()?;
        let timeout = config.timeout_duration()?;
        let delay = config.delay_duration()?;
        let endpoint = config.endpoint();

        info!("🔌 Modbus TCP client configured for {}", endpoint);
        info!(
            "⚙️  Configuration: timeout {:.1}s, delay {:.1}s",
            config.timeout, config.delay
        );

        Ok(Self {
            config,
            endpoint,
            timeout,
            delay,
            transport,
            io_lock: Mutex::new(()),
            stats: StatsRecorder::default(),
        })
    }

    pub fn config(&self) -> &ModbusConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Configured inter-request delay. Reported only; the client never sleeps on it.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn stats(&self) -> ClientStats {
        self.stats.snapshot()
    }

    /// Run one request through a complete connect, transact, close cycle.
    pub async fn execute(&self, request: ModbusRequest) -> Result<ModbusResponse, ModbusError> {
        let _guard = self.io_lock.lock().await;

        let result = self.run_cycle(request).await;
        match &result {
            Ok(response) => {
                self.stats.record_success();
                debug!("✅ {} on {} -> {}", request, self.endpoint, response);
            }
            Err(e) => {
                self.stats.record_failure(&request, e);
                warn!(
                    "❌ Modbus {} (0x{:02X}) at address {} on {} failed ({}): {}",
                    request.kind(),
                    request.function_code(),
                    request.address(),
                    self.endpoint,
                    e.kind(),
                    e
                );
            }
        }
        result
    }

    async fn run_cycle(&self, request: ModbusRequest) -> Result<ModbusResponse, ModbusError> {
        let limit = self.timeout;
        let now = Instant::now();
        let deadline = now.checked_add(limit).unwrap_or_else(|| now + FAR_FUTURE);

        let mut session = timeout_at(deadline, self.transport.connect(&self.endpoint))
            .await
            .map_err(|_| {
                ModbusError::TransportUnavailable(format!(
                    "connect to {} timed out after {:?}",
                    self.endpoint, limit
                ))
            })??;

        let outcome = match timeout_at(
            deadline,
            transact(session.as_mut(), self.endpoint.unit_id, request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ModbusError::TransportUnavailable(format!(
                "{} timed out after {:?}",
                request.kind(),
                limit
            ))),
        };

        // Close only gets what is left of the deadline; the session is
        // dropped (and the socket closed) either way.
        match timeout_at(deadline, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Closing connection to {} failed: {}", self.endpoint, e),
            Err(_) => debug!("Closing connection to {} timed out", self.endpoint),
        }

        outcome
    }

    pub async fn try_read_holding_register(&self, address: u16) -> Result<u16, ModbusError> {
        match self.execute(ModbusRequest::ReadHoldingRegister { address }).await? {
            ModbusResponse::Register(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    /// Read one holding register. `None` means the value is not available.
    pub async fn read_holding_register(&self, address: u16) -> Option<u16> {
        self.try_read_holding_register(address).await.ok()
    }

    pub async fn try_write_register(&self, address: u16, value: u16) -> Result<(), ModbusError> {
        match self.execute(ModbusRequest::WriteRegister { address, value }).await? {
            ModbusResponse::Written => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Write one holding register, returning whether the device acknowledged it.
    pub async fn write_register(&self, address: u16, value: u16) -> bool {
        self.try_write_register(address, value).await.is_ok()
    }

    pub async fn try_read_coil(&self, address: u16) -> Result<bool, ModbusError> {
        match self.execute(ModbusRequest::ReadCoil { address }).await? {
            ModbusResponse::Coil(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    /// Read one coil. `None` means the value is not available.
    pub async fn read_coil(&self, address: u16) -> Option<bool> {
        self.try_read_coil(address).await.ok()
    }

    pub async fn try_write_coil(&self, address: u16, value: bool) -> Result<(), ModbusError> {
        match self.execute(ModbusRequest::WriteCoil { address, value }).await? {
            ModbusResponse::Written => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Write one coil, returning whether the device acknowledged it.
    pub async fn write_coil(&self, address: u16, value: bool) -> bool {
        self.try_write_coil(address, value).await.is_ok()
    }

    /// Read a register and convert it to engineering units.
    pub async fn read_scaled(&self, register: &ScaledRegister) -> Option<f64> {
        self.read_holding_register(register.address)
            .await
            .map(|raw| register.decode(raw))
    }

    /// Convert a value to its raw register form and write it.
    pub async fn write_scaled(&self, register: &ScaledRegister, value: f64) -> bool {
        match register.encode(value) {
            Ok(raw) => self.write_register(register.address, raw).await,
            Err(e) => {
                warn!(
                    "❌ Cannot write {} to register {} on {}: {}",
                    value, register.address, self.endpoint, e
                );
                false
            }
        }
    }
}

async fn transact(
    session: &mut dyn ModbusSession,
    unit_id: u8,
    request: ModbusRequest,
) -> Result<ModbusResponse, ModbusError> {
    match request {
        ModbusRequest::ReadHoldingRegister { address } => {
            let registers = session.read_holding_registers(unit_id, address, 1).await?;
            match registers.as_slice() {
                [value] => Ok(ModbusResponse::Register(*value)),
                other => Err(ModbusError::ProtocolError(format!(
                    "expected 1 register at address {}, got {}",
                    address,
                    other.len()
                ))),
            }
        }
        ModbusRequest::ReadCoil { address } => {
            let coils = session.read_coils(unit_id, address, 1).await?;
            match coils.as_slice() {
                [value] => Ok(ModbusResponse::Coil(*value)),
                other => Err(ModbusError::ProtocolError(format!(
                    "expected 1 coil at address {}, got {}",
                    address,
                    other.len()
                ))),
            }
        }
        ModbusRequest::WriteRegister { address, value } => {
            session.write_single_register(unit_id, address, value).await?;
            Ok(ModbusResponse::Written)
        }
        ModbusRequest::WriteCoil { address, value } => {
            session.write_single_coil(unit_id, address, value).await?;
            Ok(ModbusResponse::Written)
        }
    }
}

fn unexpected(response: ModbusResponse) -> ModbusError {
    ModbusError::ProtocolError(format!("unexpected response: {:?}", response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Phase {
        Connect,
        Transact,
        Close,
    }

    /// In-memory device that records every phase and flags overlapping cycles.
    #[derive(Default)]
    struct FakeDevice {
        registers: StdMutex<HashMap<u16, u16>>,
        coils: StdMutex<HashMap<u16, bool>>,
        rejected: HashSet<u16>,
        refuse_connections: bool,
        hang_on_connect: bool,
        hang_on_transact: bool,
        hang_on_close: bool,
        connect_delay: Option<Duration>,
        empty_payload: bool,
        in_flight: AtomicBool,
        overlaps: AtomicUsize,
        connects: AtomicUsize,
        phases: StdMutex<Vec<Phase>>,
        units: StdMutex<Vec<u8>>,
    }

    impl FakeDevice {
        fn record(&self, phase: Phase) {
            self.phases.lock().unwrap().push(phase);
        }

        fn check(&self, address: u16) -> Result<(), ModbusError> {
            if self.rejected.contains(&address) {
                return Err(tokio_modbus::ExceptionCode::IllegalDataAddress.into());
            }
            Ok(())
        }
    }

    struct FakeTransport(Arc<FakeDevice>);

    #[async_trait]
    impl ModbusTransport for FakeTransport {
        async fn connect(
            &self,
            _endpoint: &Endpoint,
        ) -> Result<Box<dyn ModbusSession>, ModbusError> {
            let device = self.0.clone();
            device.connects.fetch_add(1, Ordering::SeqCst);
            if device.in_flight.swap(true, Ordering::SeqCst) {
                device.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            device.record(Phase::Connect);
            // Let other tasks run so that a missing lock would show up as overlap.
            tokio::task::yield_now().await;

            if let Some(delay) = device.connect_delay {
                tokio::time::sleep(delay).await;
            }
            if device.hang_on_connect {
                std::future::pending::<()>().await;
            }
            if device.refuse_connections {
                device.in_flight.store(false, Ordering::SeqCst);
                return Err(ModbusError::TransportUnavailable("connection refused".to_string()));
            }
            Ok(Box::new(FakeSession { device }))
        }
    }

    struct FakeSession {
        device: Arc<FakeDevice>,
    }

    impl FakeSession {
        async fn begin(&self, unit_id: u8) {
            self.device.record(Phase::Transact);
            self.device.units.lock().unwrap().push(unit_id);
            tokio::task::yield_now().await;
            if self.device.hang_on_transact {
                std::future::pending::<()>().await;
            }
        }
    }

    impl Drop for FakeSession {
        fn drop(&mut self) {
            self.device.in_flight.store(false, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ModbusSession for FakeSession {
        async fn read_holding_registers(
            &mut self,
            unit_id: u8,
            address: u16,
            count: u16,
        ) -> Result<Vec<u16>, ModbusError> {
            self.begin(unit_id).await;
            self.device.check(address)?;
            if self.device.empty_payload {
                return Ok(Vec::new());
            }
            let registers = self.device.registers.lock().unwrap();
            Ok((address..address + count)
                .map(|a| registers.get(&a).copied().unwrap_or(0))
                .collect())
        }

        async fn read_coils(
            &mut self,
            unit_id: u8,
            address: u16,
            count: u16,
        ) -> Result<Vec<bool>, ModbusError> {
            self.begin(unit_id).await;
            self.device.check(address)?;
            if self.device.empty_payload {
                return Ok(Vec::new());
            }
            let coils = self.device.coils.lock().unwrap();
            Ok((address..address + count)
                .map(|a| coils.get(&a).copied().unwrap_or(false))
                .collect())
        }

        async fn write_single_register(
            &mut self,
            unit_id: u8,
            address: u16,
            value: u16,
        ) -> Result<(), ModbusError> {
            self.begin(unit_id).await;
            self.device.check(address)?;
            self.device.registers.lock().unwrap().insert(address, value);
            Ok(())
        }

        async fn write_single_coil(
            &mut self,
            unit_id: u8,
            address: u16,
            value: bool,
        ) -> Result<(), ModbusError> {
            self.begin(unit_id).await;
            self.device.check(address)?;
            self.device.coils.lock().unwrap().insert(address, value);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ModbusError> {
            self.device.record(Phase::Close);
            if self.device.hang_on_close {
                std::future::pending::<()>().await;
            }
            self.device.in_flight.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    fn client_for(device: FakeDevice) -> (ModbusDeviceClient, Arc<FakeDevice>) {
        client_with_config(device, ModbusConfig::new("127.0.0.1", 502, 1))
    }

    fn client_with_config(
        device: FakeDevice,
        config: ModbusConfig,
    ) -> (ModbusDeviceClient, Arc<FakeDevice>) {
        let device = Arc::new(device);
        let client =
            ModbusDeviceClient::with_transport(config, Arc::new(FakeTransport(device.clone())))
                .expect("valid config");
        (client, device)
    }

    #[tokio::test]
    async fn test_register_and_coil_round_trip() {
        let (client, device) = client_for(FakeDevice::default());

        assert!(client.write_register(100, 220).await);
        assert_eq!(client.read_holding_register(100).await, Some(220));
        assert!(client.write_coil(5, true).await);
        assert_eq!(client.read_coil(5).await, Some(true));

        assert_eq!(device.units.lock().unwrap().as_slice(), &[1, 1, 1, 1]);
        let stats = client.stats();
        assert_eq!(stats.successful_operations, 4);
        assert_eq!(stats.failed_operations, 0);
    }

    #[tokio::test]
    async fn test_every_operation_is_a_full_cycle() {
        let (client, device) = client_for(FakeDevice::default());

        client.read_holding_register(1).await;
        client.write_coil(2, false).await;

        assert_eq!(
            device.phases.lock().unwrap().as_slice(),
            &[
                Phase::Connect,
                Phase::Transact,
                Phase::Close,
                Phase::Connect,
                Phase::Transact,
                Phase::Close,
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_address_is_not_available() {
        let device = FakeDevice {
            rejected: HashSet::from([42]),
            ..Default::default()
        };
        let (client, device) = client_for(device);

        assert_eq!(client.read_holding_register(42).await, None);
        assert_eq!(client.read_coil(42).await, None);
        assert!(!client.write_register(42, 1).await);
        assert!(!client.write_coil(42, true).await);
        assert!(matches!(
            client.try_read_holding_register(42).await,
            Err(ModbusError::ProtocolError(_))
        ));

        // Session still closed after each failure.
        let phases = device.phases.lock().unwrap();
        assert_eq!(phases.iter().filter(|p| **p == Phase::Close).count(), 5);
    }

    #[tokio::test]
    async fn test_missing_payload_is_protocol_error() {
        let device = FakeDevice {
            empty_payload: true,
            ..Default::default()
        };
        let (client, _) = client_for(device);

        assert!(matches!(
            client.try_read_holding_register(3).await,
            Err(ModbusError::ProtocolError(_))
        ));
        assert_eq!(client.read_coil(3).await, None);
    }

    #[tokio::test]
    async fn test_refused_connection_reports_failure() {
        let device = FakeDevice {
            refuse_connections: true,
            ..Default::default()
        };
        let (client, _) = client_for(device);

        assert!(!client.write_register(1, 1).await);
        assert!(!client.write_coil(1, true).await);
        assert_eq!(client.read_holding_register(1).await, None);

        let stats = client.stats();
        assert_eq!(stats.failed_operations, 3);
        let failure = stats.last_failure.expect("failure recorded");
        assert_eq!(failure.operation, "read_holding_register");
        assert_eq!(failure.error_kind, "transport_unavailable");
    }

    #[tokio::test]
    async fn test_failure_does_not_affect_next_operation() {
        let device = FakeDevice {
            rejected: HashSet::from([13]),
            ..Default::default()
        };
        let (client, _) = client_for(device);

        assert!(client.write_register(10, 7).await);
        assert!(!client.write_register(13, 7).await);
        assert_eq!(client.read_holding_register(10).await, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_connect_times_out() {
        let device = FakeDevice {
            hang_on_connect: true,
            ..Default::default()
        };
        let config = ModbusConfig::new("10.255.255.1", 502, 1).with_timeout(1.0);
        let (client, _) = client_with_config(device, config);

        let started = Instant::now();
        assert!(!client.write_register(100, 220).await);
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_millis(1100));
        assert!(matches!(
            client.try_read_holding_register(100).await,
            Err(ModbusError::TransportUnavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out_and_closes() {
        let device = FakeDevice {
            hang_on_transact: true,
            ..Default::default()
        };
        let config = ModbusConfig::new("127.0.0.1", 502, 1).with_timeout(1.0);
        let (client, device) = client_with_config(device, config);

        let started = Instant::now();
        assert_eq!(client.read_holding_register(100).await, None);
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(device.phases.lock().unwrap().last(), Some(&Phase::Close));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds_the_whole_operation() {
        let device = FakeDevice {
            connect_delay: Some(Duration::from_millis(900)),
            hang_on_transact: true,
            hang_on_close: true,
            ..Default::default()
        };
        let config = ModbusConfig::new("127.0.0.1", 502, 1).with_timeout(1.0);
        let (client, device) = client_with_config(device, config);

        let started = Instant::now();
        assert_eq!(client.read_holding_register(100).await, None);
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_secs(1), "returned too early: {:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(1100), "returned too late: {:?}", elapsed);
        assert_eq!(
            device.phases.lock().unwrap().as_slice(),
            &[Phase::Connect, Phase::Transact, Phase::Close]
        );

        let started = Instant::now();
        assert!(!client.write_coil(5, true).await);
        assert!(started.elapsed() <= Duration::from_millis(1100));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_operations_do_not_overlap() {
        let (client, device) = client_for(FakeDevice::default());
        let client = Arc::new(client);

        let mut handles = Vec::new();
        for i in 0..32u16 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    client.write_register(i, i * 10).await
                } else {
                    client.read_coil(i).await.is_some()
                }
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        assert_eq!(device.overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(device.connects.load(Ordering::SeqCst), 32);

        let phases = device.phases.lock().unwrap();
        assert_eq!(phases.len(), 96);
        for cycle in phases.chunks(3) {
            assert_eq!(cycle, &[Phase::Connect, Phase::Transact, Phase::Close]);
        }
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_connecting() {
        let device = Arc::new(FakeDevice::default());
        let result = ModbusDeviceClient::with_transport(
            ModbusConfig::new("", 502, 1),
            Arc::new(FakeTransport(device.clone())),
        );

        assert!(matches!(result, Err(ModbusError::ConfigurationError(_))));

        for config in [
            ModbusConfig::new("127.0.0.1", 502, 1).with_timeout(1e20),
            ModbusConfig::new("127.0.0.1", 502, 1).with_delay(1e20),
        ] {
            let result =
                ModbusDeviceClient::with_transport(config, Arc::new(FakeTransport(device.clone())));
            assert!(matches!(result, Err(ModbusError::ConfigurationError(_))));
        }
        assert_eq!(device.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_very_long_timeout_does_not_overflow() {
        let config = ModbusConfig::new("127.0.0.1", 502, 1).with_timeout(1e15);
        let (client, _) = client_with_config(FakeDevice::default(), config);

        assert!(client.write_register(1, 2).await);
        assert_eq!(client.read_holding_register(1).await, Some(2));
    }

    #[tokio::test]
    async fn test_scaled_register_helpers() {
        let (client, device) = client_for(FakeDevice::default());
        let register = ScaledRegister::new(200, 0.5, 1).unwrap();

        assert!(client.write_scaled(&register, 22.5).await);
        assert_eq!(device.registers.lock().unwrap().get(&200), Some(&45));
        assert_eq!(client.read_scaled(&register).await, Some(22.5));

        // Out of range values never reach the device.
        let connects = device.connects.load(Ordering::SeqCst);
        assert!(!client.write_scaled(&register, -3.0).await);
        assert_eq!(device.connects.load(Ordering::SeqCst), connects);
    }

    #[test]
    fn test_delay_is_reported() {
        let (client, _) = client_with_config(
            FakeDevice::default(),
            ModbusConfig::new("127.0.0.1", 502, 1).with_delay(0.25),
        );
        assert_eq!(client.delay(), Duration::from_millis(250));
    }
}
