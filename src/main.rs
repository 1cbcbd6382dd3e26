use std::path::PathBuf;
use std::process::exit;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use captivate_bridge::logging;
use captivate_bridge::{Bridge, BridgeConfig, ResponseMode, SimulatedController};

#[derive(Parser, Debug)]
#[command(
    name = "captivate-bridge",
    about = "Serve CA64 frames on a serial port from a simulated CapTIvate controller"
)]
struct Args {
    /// Serial port the host viewer is attached to (e.g., /dev/ttyUSB0, COM3)
    port: String,
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Serial baud rate (overrides the config file)
    #[arg(long)]
    baud: Option<u32>,
    /// Controller I2C address, decimal or 0x-prefixed hex
    #[arg(long, value_parser = parse_address)]
    address: Option<u8>,
    /// Sensor identifier sent with each cycle request
    #[arg(long)]
    sensor_id: Option<u8>,
    /// Release the bus between command and read instead of a repeated start
    #[arg(long)]
    no_repeated_start: bool,
    /// How the simulated controller answers: full, single or silent
    #[arg(long, default_value = "full")]
    mode: ResponseMode,
}

fn parse_address(s: &str) -> std::result::Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid address '{s}': {e}"))
}

fn main() {
    logging::init_rust_logging();
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if let Some(address) = args.address {
        config.i2c_address = address;
    }
    if let Some(sensor_id) = args.sensor_id {
        config.sensor_id = sensor_id;
    }
    if args.no_repeated_start {
        config.repeated_start = false;
    }
    config.validate()?;

    let port = serialport::new(&args.port, config.baud_rate)
        .timeout(config.idle_poll().max(std::time::Duration::from_millis(50)))
        .open()
        .with_context(|| format!("Failed to open serial port at {}", args.port))?;
    info!(
        "opened {} at {} baud, simulated controller mode={}",
        args.port, config.baud_rate, args.mode
    );

    let controller = SimulatedController::new(config.i2c_address, config.sensor_id).with_mode(args.mode);
    let mut bridge = Bridge::from_config(controller, port, &config);
    bridge.run()?;
    Ok(())
}
