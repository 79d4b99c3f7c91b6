//! # vgpio Core Binary
//!
//! Exposes virtual GPIO chips registered by remote bridges.
//!
//! # Usage
//!
//! ```bash
//! # UDP transport, configuration from file
//! vgpio_core --config config/vgpio.toml
//!
//! # In-process simulated bridge with 16 lines
//! vgpio_core --simulate --sim-lines 16
//!
//! # Verbose JSON logs
//! vgpio_core -s -v --json
//! ```

#![deny(warnings)]

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;
use vgpio_common::config::{ConfigError, ConfigLoader, CoreConfig, LogLevel};
use vgpio_common::consts::DEFAULT_CONFIG_PATH;
use vgpio_core::framework::LineTable;
use vgpio_core::service::BridgeService;
use vgpio_core::sim::SimBridge;
use vgpio_core::transport::{LoopbackBus, Transport, UdpTransport};

/// vgpio core - virtual GPIO chips backed by a remote bridge
#[derive(Parser, Debug)]
#[command(name = "vgpio_core")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Virtual GPIO chips backed by a remote bridge")]
#[command(long_about = None)]
struct Args {
    /// Path to the configuration file. Defaults apply if the default path
    /// does not exist.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run against an in-process simulated bridge instead of UDP
    #[arg(short = 's', long)]
    simulate: bool,

    /// Number of lines of the simulated chip
    #[arg(long, default_value_t = 16)]
    sim_lines: u32,

    /// Uid of the simulated chip
    #[arg(long, default_value_t = 1)]
    sim_uid: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("vgpio core failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref());
    let level = config
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, level);
    let config = config?;

    info!("vgpio core v{} starting...", env!("CARGO_PKG_VERSION"));

    let table = Arc::new(LineTable::new());

    if args.simulate {
        info!(
            "Simulation mode: chip uid {} with {} lines",
            args.sim_uid, args.sim_lines
        );
        let bus = LoopbackBus::new();
        let mut service = BridgeService::new(&config, Arc::new(bus.attach()), table.clone());
        install_signal_handler(&service)?;

        let mut sim = SimBridge::new(args.sim_uid, args.sim_lines, Arc::new(bus.attach()));
        sim.start()?;

        let service_thread = thread::Builder::new()
            .name("vgpio-service".to_string())
            .spawn(move || -> Result<(), String> {
                let result = service.run().map_err(|e| e.to_string());
                service.shutdown().map_err(|e| e.to_string())?;
                result
            })?;

        match sim.init(config.engine.reply_timeout()) {
            Ok(0) => info!("Simulated chip registered: {:?}", table.chips()),
            Ok(status) => warn!("Simulated chip refused (errno {})", status),
            Err(e) => warn!("Simulated bridge got no Init-Ack: {}", e),
        }

        match service_thread.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Service error: {}", e),
            Err(_) => error!("Service thread panicked"),
        }
        if let Some(message) = sim.exit_message() {
            info!("Simulated bridge saw exit: {}", message);
        }
        sim.stop();
    } else {
        let listen = config.transport.listen_addr()?;
        let peers = config.transport.peer_addrs()?;
        let transport: Arc<dyn Transport> = Arc::new(UdpTransport::bind(listen, peers)?);
        info!("Listening on {}", listen);

        let mut service = BridgeService::new(&config, transport, table);
        install_signal_handler(&service)?;

        if let Err(e) = service.run() {
            error!("Receive loop error: {}", e);
        }
        service.shutdown()?;
    }

    info!("vgpio core shutdown complete");
    Ok(())
}

/// Load the configuration file, falling back to defaults when no path was
/// given and the default path does not exist.
fn load_config(path: Option<&Path>) -> Result<CoreConfig, ConfigError> {
    let config = match path {
        Some(path) => CoreConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            CoreConfig::load(Path::new(DEFAULT_CONFIG_PATH))?
        }
        None => CoreConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn install_signal_handler(service: &BridgeService) -> Result<(), ctrlc::Error> {
    let running = service.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })
}

/// Setup tracing subscriber based on CLI arguments and configuration.
fn setup_tracing(args: &Args, level: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
