//! Probe binary for a valve's MQTT topics.
//!
//! Usage:
//!   cargo run --bin mqtt-probe -- --accessory "Garden Valve"
//!   cargo run --bin mqtt-probe -- --send on
//!
//! Connects with the accessory's broker settings, subscribes to its status
//! topic and logs how each status message is classified. Optionally sends
//! the on/off command once connected.

use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use water_valve_bridge::config::{
    CONFIG_PATH_ENV, DeviceConfig, default_config_path, load_accessory_entries, load_dotenv,
};
use water_valve_bridge::input::mqtt::{
    MqttClient, MqttEvent, PubSub, ReportedStatus, classify, parse_device_status,
};

#[derive(Clone, Copy, ValueEnum)]
enum SendCommand {
    On,
    Off,
}

#[derive(Parser)]
#[command(name = "mqtt-probe")]
#[command(about = "Watch and poke a valve's MQTT topics")]
struct Cli {
    /// Path to the host config file
    #[arg(long, short, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Accessory name (defaults to the first WaterValue entry)
    #[arg(long)]
    accessory: Option<String>,

    /// Command to publish after connecting
    #[arg(long, value_enum)]
    send: Option<SendCommand>,
}

fn select_config(cli: &Cli) -> Result<DeviceConfig, String> {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let entries = load_accessory_entries(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let entry = match &cli.accessory {
        Some(name) => entries
            .iter()
            .find(|e| e.get("name").and_then(|n| n.as_str()) == Some(name.as_str())),
        None => entries.first(),
    }
    .ok_or_else(|| "no matching WaterValue accessory".to_string())?;
    DeviceConfig::from_value(entry).map_err(|e| e.to_string())
}

fn main() {
    load_dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match select_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load accessory: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start tokio runtime: {}", e);
            std::process::exit(1);
        }
    };
    runtime.block_on(probe(config, cli.send));
}

async fn probe(config: DeviceConfig, send: Option<SendCommand>) {
    info!("Probing {} via {}", config.name, config.mqtt_url);

    let mqtt = match MqttClient::new(&config) {
        Ok(mqtt) => mqtt,
        Err(e) => {
            error!("Failed to create MQTT client: {}", e);
            return;
        }
    };
    let client = mqtt.client();
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel(64);
    let event_loop = tokio::spawn(mqtt.run(tx, cancel.clone()));
    let mut pending = send;

    loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
        };
        let Some(event) = event else {
            warn!("MQTT event loop ended");
            break;
        };

        match event {
            MqttEvent::Connected => {
                if let Err(e) = PubSub::subscribe(&client, &config.topic_status).await {
                    warn!("Failed to subscribe to {}: {}", config.topic_status, e);
                }
                if let Some(send) = pending.take() {
                    let command = config.command_for(matches!(send, SendCommand::On));
                    match PubSub::publish(&client, &config.topic_command, command).await {
                        Ok(()) => info!(">>> Sent `{}` to {}", command, config.topic_command),
                        Err(e) => warn!("Failed to send command: {}", e),
                    }
                }
            }
            MqttEvent::Message(msg) if msg.topic == config.topic_status => {
                match parse_device_status(&msg.payload) {
                    Ok(status) => match classify(&status, &config.on_value, &config.off_value) {
                        ReportedStatus::On => info!(">>> {} is ON ({})", config.name, status),
                        ReportedStatus::Off => info!(">>> {} is OFF ({})", config.name, status),
                        ReportedStatus::Unrecognized => {
                            warn!(">>> {} reported unknown status {}", config.name, status)
                        }
                    },
                    Err(reason) => warn!("Malformed status `{}`: {}", msg.payload, reason),
                }
            }
            MqttEvent::Message(msg) => info!("Message on {}: {}", msg.topic, msg.payload),
            MqttEvent::SubscribeRejected(pkid) => warn!("Subscription rejected (pkid {})", pkid),
            MqttEvent::Disconnected(reason) => warn!("Disconnected: {}", reason),
        }
    }

    cancel.cancel();
    let _ = event_loop.await;
    info!("Probe complete.");
}
