use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use adalight_serial::{AdalightDevice, Config, Rgb};

#[derive(Parser)]
#[command(name = "adalight-serial")]
#[command(about = "Drive Adalight LED strips over serial ports", long_about = None)]
struct Cli {
    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Enable detailed debug (hex dumps every frame)
    #[arg(long, global = true)]
    ddebug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every serial port for an Adalight device
    Scan,
    /// Fill every configured strip with one color
    Fill {
        /// Path to configuration file (JSON)
        config: String,
        /// Color as #rrggbb or a name (red, green, blue, white, black)
        color: Rgb,
        /// Keep the strips lit until Ctrl-C, then disconnect (blanking unless
        /// `reset_on_disconnect` is false)
        #[arg(long)]
        hold: bool,
    },
    /// Blank every configured strip
    Off {
        /// Path to configuration file (JSON)
        config: String,
    },
    /// Set global brightness
    Brightness {
        /// Path to configuration file (JSON)
        config: String,
        /// Brightness 0-255
        #[arg(allow_hyphen_values = true)]
        value: i32,
    },
    /// Query LED count and brightness reported by each device
    State {
        /// Path to configuration file (JSON)
        config: String,
        /// Reply timeout in milliseconds (default: per-device config)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ddebug implies debug
    let level = if cli.ddebug {
        "trace"
    } else if cli.debug {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Scan => {
            let found = adalight_serial::scan();
            if found.is_empty() {
                println!("No Adalight devices found");
            }
            for port in found.keys() {
                println!("{}", port);
            }
            Ok(())
        }
        Commands::Fill {
            config,
            color,
            hold,
        } => {
            let devices = open_devices(&config)?;
            for_each_device(&devices, |device| {
                device.fill(color);
                device.update()?;
                Ok(())
            });

            // Without --hold the devices are disposed on drop, leaving the strips lit
            if hold {
                wait_for_ctrl_c();
                for_each_device(&devices, |device| {
                    device.disconnect(device.config().reset_on_disconnect)
                });
            }
            Ok(())
        }
        Commands::Off { config } => {
            let devices = open_devices(&config)?;
            for_each_device(&devices, |device| device.disconnect(true));
            Ok(())
        }
        Commands::Brightness { config, value } => {
            let devices = open_devices(&config)?;
            for_each_device(&devices, |device| {
                if !device.set_brightness(value)? {
                    warn!("Brightness {} out of range, ignored", value);
                }
                Ok(())
            });
            Ok(())
        }
        Commands::State { config, timeout_ms } => {
            let devices = open_devices(&config)?;
            let timeout = timeout_ms.map(Duration::from_millis);
            for device in &devices {
                let state = device.query_state(timeout);
                println!("{}: N={} B={}", device.port(), state.led_count, state.brightness);
            }
            Ok(())
        }
    }
}

/// Load the config and connect every device that opens.
fn open_devices(path: &str) -> Result<Vec<AdalightDevice>> {
    let config = Config::load(path).context(format!("Failed to load {}", path))?;

    let mut devices = Vec::new();
    for device_config in config.devices {
        let port = device_config.port.clone();
        let device = AdalightDevice::new(device_config)?;
        match device.connect() {
            Ok(()) => devices.push(device),
            Err(e) => error!("Failed to open {}: {}", port, e),
        }
    }

    if devices.is_empty() {
        anyhow::bail!("No devices could be opened");
    }
    Ok(devices)
}

/// Run `f` on every device in parallel, logging failures.
fn for_each_device<F>(devices: &[AdalightDevice], f: F)
where
    F: Fn(&AdalightDevice) -> adalight_serial::Result<()> + Sync,
{
    thread::scope(|scope| {
        for device in devices {
            let f = &f;
            scope.spawn(move || {
                if let Err(e) = f(device) {
                    error!("{}: {}", device.port(), e);
                }
            });
        }
    });
}

fn wait_for_ctrl_c() {
    let running = Arc::new(AtomicBool::new(true));
    let handler_running = Arc::clone(&running);
    let result = ctrlc::set_handler(move || {
        handler_running.store(false, Ordering::Relaxed);
    });

    if let Err(e) = result {
        warn!("Could not set Ctrl-C handler: {}", e);
        return;
    }

    println!("Holding, press Ctrl-C to stop");
    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }
}
