//! usb-sentry monitor
//!
//! Polls the USB bus and logs every device connect and disconnect to an
//! append-only event log.

use anyhow::{Context, Result};
use clap::Parser;
use common::logging::default_level;
use common::{SnapshotReader, setup_logging};
use monitor::config::{self, MonitorConfig};
use monitor::{EventLog, LogFormat, PollLoop, UsbSnapshotReader, stop_signal};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "usb-monitor")]
#[command(author, version, about = "USB Monitor - Log USB device connections")]
#[command(long_about = "
Watches the USB bus and records every device that is plugged in or removed.
The bus is polled at a fixed interval and each capture is compared with the
previous one; changes are appended to the event log.

EXAMPLES:
    # Poll every 5 seconds, log to ./usb_monitor.log
    usb-monitor

    # Poll twice a second, log to a custom file
    usb-monitor -i 0.5 -l /var/log/usb-events.log

    # Write diagnostics to the event log and debug output to stderr
    usb-monitor --debug

    # List attached USB devices and exit
    usb-monitor --list-devices

CONFIGURATION:
    The monitor looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-sentry/monitor.toml
    3. /etc/usb-sentry/monitor.toml
    4. Built-in defaults

    Command-line flags override values from the configuration file.
")]
struct Args {
    /// Seconds between polls (fractional values allowed)
    #[arg(short, long, value_name = "SECONDS", value_parser = config::parse_interval)]
    interval: Option<f64>,

    /// Path of the event log
    #[arg(short, long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Enable debug output and diagnostic log entries
    #[arg(short, long)]
    debug: bool,

    /// Write the event log as JSON lines
    #[arg(long)]
    json: bool,

    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = MonitorConfig::default();
        let path = MonitorConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        MonitorConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        MonitorConfig::load_or_default().context("Failed to load configuration")?
    };
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    setup_logging(default_level(config.monitor.debug)).context("Failed to setup logging")?;

    info!("usb-sentry monitor v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Poll interval {}s, event log {}",
        config.monitor.interval_secs,
        config.monitor.log_file.display()
    );

    let filters = config.filters()?;
    if !filters.is_empty() {
        info!("USB device filters: {} configured", filters.len());
    }
    let reader = UsbSnapshotReader::new(filters, config.usb.include_root_hubs);

    if args.list_devices {
        return list_devices_mode(reader);
    }

    let log_path = config.log_path();
    let event_log = EventLog::open(
        &log_path,
        config.monitor.log_format,
        config.monitor.debug,
    )
    .with_context(|| format!("Failed to open event log: {}", log_path.display()))?;
    info!("Logging USB events to: {}", log_path.display());

    let mut poll = PollLoop::new(reader, event_log, config.interval()?)
        .context("Failed to create poll loop")?;

    let (stop_tx, stop_rx) = stop_signal();
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    info!("Press Ctrl+C to stop");

    let stats = poll
        .run(stop_rx)
        .await
        .context("Event log write failed")?;

    info!(
        "Monitor shutdown complete ({} connected, {} disconnected)",
        stats.connected, stats.disconnected
    );
    Ok(())
}

/// Fold command-line flags over the loaded configuration
fn apply_overrides(config: &mut MonitorConfig, args: &Args) {
    if let Some(interval) = args.interval {
        config.monitor.interval_secs = interval;
    }
    if let Some(ref log_file) = args.log_file {
        config.monitor.log_file = log_file.clone();
    }
    if args.debug {
        config.monitor.debug = true;
    }
    if args.json {
        config.monitor.log_format = LogFormat::Json;
    }
}

/// List USB devices and exit
fn list_devices_mode(mut reader: UsbSnapshotReader) -> Result<()> {
    info!("Listing USB devices...");

    let snapshot = reader.capture().context("Failed to enumerate USB devices")?;

    if snapshot.is_empty() {
        println!("No USB devices found.");
        return Ok(());
    }

    println!("Found {} USB device(s):\n", snapshot.len());
    for (identity, device) in snapshot.entries() {
        println!(
            "  [{}] {:04x}:{:04x} - {} {}",
            identity,
            device.vendor_id(),
            device.product_id(),
            device.manufacturer().unwrap_or("Unknown Manufacturer"),
            device.product().unwrap_or("Unknown Product")
        );
        if let (Some(bus), Some(address)) = (device.bus_number(), device.device_address()) {
            println!("      Bus {:03} Device {:03}", bus, address);
        }
        if let Some(serial) = device.serial_number() {
            println!("      Serial: {}", serial);
        }
        println!();
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Error waiting for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down gracefully...");
        }
    }
}
