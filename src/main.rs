use anyhow::{anyhow, Result};
use log::error;

use modbus_device_client::cli::commands::{build_cli, handle_subcommands};
use modbus_device_client::output::formatter_for;
use modbus_device_client::{ModbusConfig, ModbusDeviceClient};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let matches = build_cli().get_matches();

    let format = matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("console");
    let formatter = formatter_for(format).ok_or_else(|| anyhow!("unknown output format '{}'", format))?;

    let config = ModbusConfig::from_matches(&matches).map_err(|e| {
        error!("❌ {}", e);
        e
    })?;
    let client = ModbusDeviceClient::new(config)?;

    if !handle_subcommands(&matches, &client, formatter.as_ref()).await? {
        std::process::exit(1);
    }

    Ok(())
}
