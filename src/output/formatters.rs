use chrono::Utc;

use crate::config::Endpoint;
use crate::modbus::{ClientStats, ModbusRequest, ModbusResponse};
use crate::utils::error::ModbusError;

pub trait DataFormatter: Send + Sync {
    fn format_result(
        &self,
        endpoint: &Endpoint,
        request: &ModbusRequest,
        result: &Result<ModbusResponse, ModbusError>,
    ) -> String;
    fn format_stats(&self, stats: &ClientStats) -> String;
    fn format_header(&self) -> String;
}

pub fn formatter_for(name: &str) -> Option<Box<dyn DataFormatter>> {
    match name {
        "console" => Some(Box::new(ConsoleFormatter)),
        "json" => Some(Box::new(JsonFormatter)),
        "csv" => Some(Box::new(CsvFormatter)),
        _ => None,
    }
}

pub struct ConsoleFormatter;

impl DataFormatter for ConsoleFormatter {
    fn format_result(
        &self,
        endpoint: &Endpoint,
        request: &ModbusRequest,
        result: &Result<ModbusResponse, ModbusError>,
    ) -> String {
        match result {
            Ok(ModbusResponse::Written) => format!("✅ {} on {}: ok", request, endpoint),
            Ok(response) => format!(
                "📊 {} @{} on {}: {}",
                request.kind(),
                request.address(),
                endpoint,
                response
            ),
            Err(e) => format!("❌ {} on {}: not available ({})", request, endpoint, e),
        }
    }

    fn format_stats(&self, stats: &ClientStats) -> String {
        let mut output = String::from("📊 Final Statistics:\n");
        output.push_str(&format!("   ✅ Successful operations: {}\n", stats.successful_operations));
        output.push_str(&format!("   ❌ Failed operations: {}\n", stats.failed_operations));
        if let Some(rate) = stats.success_rate() {
            output.push_str(&format!("   📈 Success rate: {:.1}%\n", rate));
        }
        if let Some(failure) = &stats.last_failure {
            output.push_str(&format!(
                "   💥 Last failure: {} @{} at {}: {}\n",
                failure.operation,
                failure.address,
                failure.timestamp.format("%Y-%m-%d %H:%M:%S"),
                failure.error
            ));
        }
        output
    }

    fn format_header(&self) -> String {
        format!("🚀 Modbus Device Client - {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

pub struct JsonFormatter;

impl DataFormatter for JsonFormatter {
    fn format_result(
        &self,
        endpoint: &Endpoint,
        request: &ModbusRequest,
        result: &Result<ModbusResponse, ModbusError>,
    ) -> String {
        let mut json = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "host": endpoint.host,
            "port": endpoint.port,
            "unit_id": endpoint.unit_id,
            "function_code": request.function_code(),
            "request": request,
        });

        match result {
            Ok(response) => {
                json["success"] = serde_json::json!(true);
                json["response"] = serde_json::json!(response);
            }
            Err(e) => {
                json["success"] = serde_json::json!(false);
                json["error_kind"] = serde_json::json!(e.kind());
                json["error"] = serde_json::json!(e.to_string());
            }
        }

        serde_json::to_string(&json).unwrap_or_default()
    }

    fn format_stats(&self, stats: &ClientStats) -> String {
        serde_json::to_string_pretty(stats).unwrap_or_default()
    }

    fn format_header(&self) -> String {
        String::new() // JSON doesn't need headers
    }
}

pub struct CsvFormatter;

impl DataFormatter for CsvFormatter {
    fn format_result(
        &self,
        endpoint: &Endpoint,
        request: &ModbusRequest,
        result: &Result<ModbusResponse, ModbusError>,
    ) -> String {
        let (status, value) = match result {
            Ok(response) => ("ok".to_string(), response.to_string()),
            Err(e) => (e.kind().to_string(), String::new()),
        };
        format!(
            "{},{},{},{},{},{},{}",
            Utc::now().to_rfc3339(),
            endpoint.host,
            endpoint.unit_id,
            request.kind(),
            request.address(),
            value,
            status
        )
    }

    fn format_stats(&self, stats: &ClientStats) -> String {
        format!(
            "successful,failed\n{},{}",
            stats.successful_operations, stats.failed_operations
        )
    }

    fn format_header(&self) -> String {
        "timestamp,host,unit_id,operation,address,value,status\n".to_string()
    }
}
