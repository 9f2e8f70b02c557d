use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;
use std::time::Duration;

use crate::modbus::{ModbusDeviceClient, ModbusRequest};
use crate::output::DataFormatter;

pub fn build_cli() -> Command {
    Command::new("modbus-device-client")
        .version(crate::VERSION)
        .about("Read and write registers and coils on a Modbus-TCP device")
        .arg(Arg::new("config").short('c').long("config").help("TOML configuration file"))
        .arg(Arg::new("host").long("host").help("Device host name or IP address"))
        .arg(Arg::new("port").short('p').long("port").help("Modbus TCP port"))
        .arg(Arg::new("unit").short('u').long("unit").help("Modbus unit identifier"))
        .arg(Arg::new("timeout").short('t').long("timeout").help("Timeout in seconds"))
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .default_value("console")
                .help("Output format: console, json or csv"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("read-register")
                .about("Read one holding register")
                .arg(Arg::new("address").required(true)),
        )
        .subcommand(
            Command::new("write-register")
                .about("Write one holding register")
                .arg(Arg::new("address").required(true))
                .arg(Arg::new("value").required(true)),
        )
        .subcommand(
            Command::new("read-coil")
                .about("Read one coil")
                .arg(Arg::new("address").required(true)),
        )
        .subcommand(
            Command::new("write-coil")
                .about("Write one coil")
                .arg(Arg::new("address").required(true))
                .arg(Arg::new("value").required(true).help("on/off, true/false or 1/0")),
        )
        .subcommand(
            Command::new("monitor")
                .about("Poll a register or coil until Ctrl+C")
                .arg(Arg::new("address").required(true))
                .arg(
                    Arg::new("coil")
                        .long("coil")
                        .action(ArgAction::SetTrue)
                        .help("Poll a coil instead of a holding register"),
                )
                .arg(
                    Arg::new("interval")
                        .short('i')
                        .long("interval")
                        .default_value("5")
                        .help("Seconds between reads"),
                )
                .arg(Arg::new("count").short('n').long("count").help("Stop after this many reads")),
        )
}

/// Translate a one-shot subcommand into the request it performs.
pub fn request_from_matches(name: &str, matches: &ArgMatches) -> Result<Option<ModbusRequest>> {
    let request = match name {
        "read-register" => ModbusRequest::ReadHoldingRegister {
            address: parse_u16(matches, "address")?,
        },
        "write-register" => ModbusRequest::WriteRegister {
            address: parse_u16(matches, "address")?,
            value: parse_u16(matches, "value")?,
        },
        "read-coil" => ModbusRequest::ReadCoil {
            address: parse_u16(matches, "address")?,
        },
        "write-coil" => ModbusRequest::WriteCoil {
            address: parse_u16(matches, "address")?,
            value: parse_bool(required(matches, "value")?)?,
        },
        _ => return Ok(None),
    };
    Ok(Some(request))
}

/// Run the selected subcommand. Returns whether every operation succeeded.
pub async fn handle_subcommands(
    matches: &ArgMatches,
    client: &ModbusDeviceClient,
    formatter: &dyn DataFormatter,
) -> Result<bool> {
    let (name, sub_matches) = matches
        .subcommand()
        .ok_or_else(|| anyhow!("no subcommand given"))?;

    if name == "monitor" {
        return monitor(sub_matches, client, formatter).await;
    }

    let request = request_from_matches(name, sub_matches)?
        .ok_or_else(|| anyhow!("unknown subcommand '{}'", name))?;

    info!("🔍 Executing {}...", request);
    let result = client.execute(request).await;
    print!("{}", formatter.format_header());
    println!("{}", formatter.format_result(client.endpoint(), &request, &result));
    Ok(result.is_ok())
}

async fn monitor(
    matches: &ArgMatches,
    client: &ModbusDeviceClient,
    formatter: &dyn DataFormatter,
) -> Result<bool> {
    let address = parse_u16(matches, "address")?;
    let request = if matches.get_flag("coil") {
        ModbusRequest::ReadCoil { address }
    } else {
        ModbusRequest::ReadHoldingRegister { address }
    };
    let seconds: f64 = required(matches, "interval")?
        .parse()
        .context("invalid --interval")?;
    if !(seconds.is_finite() && seconds > 0.0) {
        return Err(anyhow!("--interval must be positive"));
    }
    let count = matches
        .get_one::<String>("count")
        .map(|s| s.parse::<u64>())
        .transpose()
        .context("invalid --count")?;

    info!(
        "🔄 Monitoring {} every {:.1}s (Ctrl+C to stop)",
        request, seconds
    );
    print!("{}", formatter.format_header());

    let mut timer = tokio::time::interval(Duration::from_secs_f64(seconds));
    let mut reads = 0u64;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Stopping monitor...");
                break;
            }
            _ = timer.tick() => {
                let result = client.execute(request).await;
                println!("{}", formatter.format_result(client.endpoint(), &request, &result));
                reads += 1;
                if count.is_some_and(|limit| reads >= limit) {
                    break;
                }
            }
        }
    }

    let stats = client.stats();
    println!("{}", formatter.format_stats(&stats));
    Ok(stats.failed_operations == 0)
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing <{}>", name))
}

fn parse_u16(matches: &ArgMatches, name: &str) -> Result<u16> {
    let value = required(matches, name)?;
    value
        .trim()
        .parse()
        .with_context(|| format!("<{}> must be 0-65535, got '{}'", name, value))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(anyhow!("expected on/off, got '{}'", other)),
    }
}
