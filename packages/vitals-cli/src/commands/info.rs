use crate::cli::InfoArgs;
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use vitals_rs::config::DEFAULT_SERIAL_PORT;
use vitals_rs::source::SerialSource;
use vitals_rs::{Channel, EngineConfig, REQUIRED_CHANNELS};

#[derive(Serialize)]
struct ChannelInfo {
    key: &'static str,
    label: &'static str,
    unit: &'static str,
    precision: usize,
    required: bool,
}

#[derive(Serialize)]
struct InfoOutput {
    cli_version: String,
    platform: String,
    arch: String,
    serial_supported: bool,
    default_port: &'static str,
    config: Option<EngineConfig>,
    config_error: Option<String>,
    channels: Vec<ChannelInfo>,
}

pub fn execute(args: InfoArgs) -> i32 {
    let (config, config_error) = match EngineConfig::from_env() {
        Ok(config) => (Some(config), None),
        Err(e) => (None, Some(e.to_string())),
    };

    let info = InfoOutput {
        cli_version: env!("CARGO_PKG_VERSION").to_string(),
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        serial_supported: SerialSource::is_supported(),
        default_port: DEFAULT_SERIAL_PORT,
        config,
        config_error,
        channels: Channel::ALL
            .iter()
            .map(|c| ChannelInfo {
                key: c.key(),
                label: c.label(),
                unit: c.unit(),
                precision: c.precision(),
                required: REQUIRED_CHANNELS.contains(c),
            })
            .collect(),
    };

    if args.json {
        match output::to_json(&info, false) {
            Ok(json) => {
                if let Err(e) = output::write_output(&json, None) {
                    eprintln!("Error: {}", e);
                    return exit_codes::EXECUTION_ERROR;
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    } else {
        println!("vitals CLI v{}", info.cli_version);
        println!("Platform: {} ({})", info.platform, info.arch);
        println!();
        println!(
            "Serial support: {}",
            if info.serial_supported { "available" } else { "unavailable" }
        );
        match (&info.config, &info.config_error) {
            (Some(config), _) => {
                println!(
                    "Serial port: {} @ {} baud",
                    config.serial.port, config.serial.baud_rate
                );
                println!("Acquire timeout: {} ms", config.acquire_timeout_ms);
                println!("Capture window: {} ms", config.capture_window_ms);
            }
            (None, Some(e)) => println!("Configuration error: {}", e),
            (None, None) => {}
        }
        println!();
        println!("{:<18} {:<18} {:<6} Required", "Channel", "Label", "Unit");
        for channel in &info.channels {
            println!(
                "{:<18} {:<18} {:<6} {}",
                channel.key,
                channel.label,
                channel.unit,
                if channel.required { "yes" } else { "" }
            );
        }
    }

    exit_codes::SUCCESS
}
