//! # camctl binary
//!
//! # Usage
//!
//! ```bash
//! # Simulated camera, defaults everywhere
//! camctl
//!
//! # Config file, photos downloaded to ./photos, verbose logging
//! camctl --config config/camctl.toml --download-dir photos -v
//!
//! # Interactive commands on stdin
//! camctl --console
//! ```

use camctl::console::run_console;
use camctl::{Controller, ControllerConfig, DeviceRegistry};
use camctl_common::config::ConfigLoader;
use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::thread;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// camctl - tethered camera controller
#[derive(Parser, Debug)]
#[command(name = "camctl")]
#[command(version)]
#[command(about = "Tethered camera controller with remote control and intervalometer")]
#[command(long_about = None)]
struct Args {
    /// Path to configuration file (camctl.toml). Defaults are used when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory where downloaded photos are stored
    #[arg(short, long, value_name = "DIR")]
    download_dir: Option<PathBuf>,

    /// TCP port of the remote control server
    #[arg(short, long)]
    port: Option<u16>,

    /// Device driver to use
    #[arg(long)]
    driver: Option<String>,

    /// List available device drivers and exit
    #[arg(long)]
    list_drivers: bool,

    /// Read commands from stdin
    #[arg(long)]
    console: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("camctl failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args)?;

    setup_tracing(&args, config.shared.log_level.into());
    info!("camctl v{} starting...", env!("CARGO_PKG_VERSION"));

    let registry = DeviceRegistry::with_builtin();
    if args.list_drivers {
        for name in registry.list() {
            println!("{name}");
        }
        return Ok(());
    }

    let mut controller = Controller::new(&config, &registry)?;

    let running = controller.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    controller.start()?;

    if args.console {
        let broker = controller.broker();
        let running = controller.running_flag();
        // Not joined: a blocked stdin read cannot be interrupted.
        thread::Builder::new().name("console".into()).spawn(move || {
            if let Err(e) = run_console(io::stdin().lock(), &broker, &running) {
                warn!("console closed: {e}");
            }
        })?;
    }

    controller.run();
    controller.shutdown();

    info!("camctl shutdown complete");
    Ok(())
}

/// Config file (or defaults) with command line overrides applied.
fn load_config(args: &Args) -> Result<ControllerConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ControllerConfig::load(path)?,
        None => ControllerConfig::default(),
    };
    if let Some(dir) = &args.download_dir {
        config.device.download_dir = dir.clone();
    }
    if let Some(port) = args.port {
        config.transport.port = port;
    }
    if let Some(driver) = &args.driver {
        config.device.driver = driver.clone();
    }
    Ok(config)
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args, configured: Level) {
    let level = if args.verbose { Level::DEBUG } else { configured };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
