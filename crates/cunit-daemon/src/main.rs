//! cunit daemon - main entry point
//!
//! Validates the device registry against the bus, then serves the instrument
//! command protocol to TCP clients.

mod config;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use cunit_bus::{spawn_bus, BusHandle, SimulatedBus, StreamBus};
use cunit_discovery::{DeviceRegistry, RegistryEvent, TomlDeviceStore};
use cunit_executor::{Executor, ExecutorConfig};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::{BusKind, Config};

#[derive(Parser, Debug)]
#[command(name = "cunitd")]
#[command(about = "Control unit server for RS-485 laboratory instruments")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "cunit.toml")]
    config: PathBuf,

    /// Bind address for client connections
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Validate the stored devices, print them and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("cunitd v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    info!(
        bind = %config.server.bind,
        bus = ?config.bus.kind,
        devices = %config.devices.path,
        "Configuration loaded"
    );

    let bus = open_bus(&config).await?;
    let mut registry = DeviceRegistry::new(TomlDeviceStore::new(&config.devices.path));

    if args.list_devices {
        let report = registry.initialize(&bus).await;
        println!(
            "{} devices verified, {} rejected",
            report.verified.len(),
            report.rejected.len()
        );
        for device in registry.devices() {
            println!(
                "  - {} at address {} (udid {})",
                device.device_type, device.address, device.udid
            );
            if !device.description.is_empty() {
                println!("    Description: {}", device.description);
            }
            if !device.firmware_version.is_empty() {
                println!("    Firmware: {}", device.firmware_version);
            }
        }
        for device in registry.unverified() {
            println!(
                "  ! {} at address {} did not verify (kept in {})",
                device.device_type, device.address, config.devices.path
            );
        }
        return Ok(());
    }

    log_registry_events(&registry);

    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let executor = Executor::new(
        registry,
        bus,
        reply_tx,
        ExecutorConfig {
            tick_interval: config.server.tick_interval(),
        },
    );

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    server::serve(listener, executor, reply_rx, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
    })
    .await
}

/// Start the bus task for the configured transport
async fn open_bus(config: &Config) -> Result<BusHandle> {
    let bus = &config.bus;
    let handle = match bus.kind {
        BusKind::Tcp => {
            let io = StreamBus::connect_tcp(&bus.host, bus.port, bus.timeout_ms)
                .await
                .with_context(|| format!("Failed to connect to bus gateway {}:{}", bus.host, bus.port))?;
            info!(bus = %io.label(), "Using TCP bus gateway");
            spawn_bus(io)
        }
        BusKind::Serial => open_serial(config)?,
        BusKind::Simulated => {
            info!(
                devices = config.simulated_devices.len(),
                "Using simulated bus"
            );
            spawn_bus(SimulatedBus::new(config.simulated_devices.clone()))
        }
    };
    Ok(handle)
}

#[cfg(feature = "serial")]
fn open_serial(config: &Config) -> Result<BusHandle> {
    let bus = &config.bus;
    let io = StreamBus::open_serial(&bus.serial_port, bus.baud_rate, bus.timeout_ms)
        .with_context(|| format!("Failed to open serial port {}", bus.serial_port))?;
    info!(bus = %io.label(), baud_rate = bus.baud_rate, "Using serial bus");
    Ok(spawn_bus(io))
}

#[cfg(not(feature = "serial"))]
fn open_serial(_config: &Config) -> Result<BusHandle> {
    anyhow::bail!("Serial bus support requires building with the `serial` feature")
}

/// Log registry changes made on behalf of clients
fn log_registry_events(registry: &DeviceRegistry) {
    let mut events = registry.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RegistryEvent::DeviceAdded(device)) => {
                    info!(address = device.address, udid = %device.udid, "Device enrolled");
                }
                Ok(RegistryEvent::DeviceRemoved(device)) => {
                    info!(address = device.address, "Device removed");
                }
                Ok(RegistryEvent::DeviceRejected(device)) => {
                    warn!(address = device.address, udid = %device.udid, "Stored device failed verification");
                }
                Ok(RegistryEvent::DeviceVerified(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Registry event log lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
