use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use water_valve_bridge::accessory::AccessoryHost;
use water_valve_bridge::config::{
    CONFIG_PATH_ENV, default_config_path, load_accessory_entries, load_dotenv,
};
use water_valve_bridge::control::{self, ControlCommand};
use water_valve_bridge::device::register_accessories;

#[derive(Parser)]
#[command(name = "water-valve-bridge")]
#[command(about = "Bridge MQTT water valves to a HomeKit accessory host")]
struct Cli {
    /// Path to the host config file (defaults to ~/.homebridge/config.json)
    #[arg(long, short, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Read controller commands (`on <name>`, `off <name>`, `get <characteristic> <name>`) from stdin
    #[arg(long)]
    stdin_control: bool,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    // Load .env before the runtime starts any threads
    load_dotenv();
    init_logger();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start tokio runtime: {}", e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cli));
}

async fn run(cli: Cli) {
    info!("Starting Water Valve Bridge");

    let path = cli.config.unwrap_or_else(default_config_path);
    let entries = match load_accessory_entries(&path) {
        Ok(entries) => entries,
        Err(e) => {
            error!("Failed to load {}: {}", path.display(), e);
            std::process::exit(1);
        }
    };
    info!("Configuration loaded from {}", path.display());

    let mut host = AccessoryHost::new();
    register_accessories(&mut host);

    for entry in &entries {
        if let Err(e) = host.instantiate(entry) {
            error!("[HomeKit] Failed to add accessory: {}", e);
        }
    }
    if host.accessory_names().is_empty() {
        error!("No WaterValue accessories configured");
        std::process::exit(1);
    }
    let host = Arc::new(host);

    let mut events = host.subscribe();
    let event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(
                    "[HomeKit] {} {}.{} = {}",
                    event.accessory,
                    event.service,
                    event.characteristic,
                    control::describe(&event.value)
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("[HomeKit] Event log lagged, {} updates skipped", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let control_task = cli.stdin_control.then(|| {
        let host = host.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                let Some(command) = ControlCommand::parse(&line) else {
                    warn!("Unrecognized command: {}", line.trim());
                    continue;
                };
                match control::execute(&host, command).await {
                    Ok(output) => info!("{}", output),
                    Err(e) => warn!("{}", e),
                }
            }
        })
    });

    info!("Water Valve Bridge is running");
    for name in host.accessory_names() {
        info!("  - {}", name);
    }
    info!("  - Press Ctrl+C to exit");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    host.shutdown();
    event_task.abort();
    if let Some(task) = control_task {
        task.abort();
    }

    info!("Water Valve Bridge stopped");
}
