use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::protocol::ModbusRequest;
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub operation: &'static str,
    pub address: u16,
    pub error_kind: &'static str,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view of a client's operation history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientStats {
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<FailureRecord>,
}

impl ClientStats {
    pub fn total_operations(&self) -> u64 {
        self.successful_operations + self.failed_operations
    }

    /// Percentage of operations that succeeded, `None` before the first one.
    pub fn success_rate(&self) -> Option<f64> {
        match self.total_operations() {
            0 => None,
            total => Some(self.successful_operations as f64 / total as f64 * 100.0),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    successes: AtomicU64,
    failures: AtomicU64,
    last_success: Mutex<Option<DateTime<Utc>>>,
    last_failure: Mutex<Option<FailureRecord>>,
}

impl StatsRecorder {
    pub(crate) fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_success.lock() {
            *last = Some(Utc::now());
        }
    }

    pub(crate) fn record_failure(&self, request: &ModbusRequest, error: &ModbusError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_failure.lock() {
            *last = Some(FailureRecord {
                operation: request.kind(),
                address: request.address(),
                error_kind: error.kind(),
                error: error.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    pub(crate) fn snapshot(&self) -> ClientStats {
        ClientStats {
            successful_operations: self.successes.load(Ordering::Relaxed),
            failed_operations: self.failures.load(Ordering::Relaxed),
            last_success: self.last_success.lock().ok().and_then(|guard| *guard),
            last_failure: self.last_failure.lock().ok().and_then(|guard| guard.clone()),
        }
    }
}
