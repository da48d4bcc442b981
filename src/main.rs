use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::net::Ipv4Addr;
use tracing::info;

use daylog_lib::device::DeviceSelector;
use daylog_lib::ljm::{LjmOpener, connection_type_name, device_type_name};

/// List the LabJack devices the LJM driver can see.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Device type filter (T4, T7, T8 or ANY).
    #[arg(short = 't', long, default_value = "ANY")]
    device_type: String,
    /// Connection type filter (USB, ETHERNET, WIFI or ANY).
    #[arg(short, long, default_value = "ANY")]
    connection: String,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbose.tracing_level_filter())
        .with_target(false)
        .init();

    let selector = DeviceSelector {
        device_type: cli.device_type,
        connection_type: cli.connection,
        ..DeviceSelector::any()
    };
    info!("Listing LabJack devices matching {}...", selector);

    let devices = LjmOpener::new()
        .list(&selector)
        .context("Failed to list devices through the LJM driver")?;

    for (i, device) in devices.iter().enumerate() {
        info!(
            "Device #{}: {} over {}, serial {}",
            i + 1,
            device_type_name(device.device_type),
            connection_type_name(device.connection_type),
            device.serial_number
        );
        if device.ip_address != 0 {
            info!("  IP: {}", Ipv4Addr::from(device.ip_address as u32));
        }
    }
    if devices.is_empty() {
        info!("No LabJack devices found.");
    }
    Ok(())
}
