//! Water valve accessory bridged to MQTT.
//!
//! Host writes become literal command strings on the command topic. Status
//! messages on the status topic are classified against the configured
//! sentinels and, when they change the cached state, pushed to the host.
//!
//! Commands are fire-and-forget: there is no acknowledgment tracking, so a
//! publish the device never acts on leaves the host showing the commanded
//! state until the next status message corrects it.

use super::state::DeviceState;
use crate::accessory::{
    AccessoryPlugin, Characteristic, CharacteristicUpdater, CharacteristicValue, Service,
    ServiceType,
};
use crate::config::{DeviceConfig, ServiceKind};
use crate::error::{BridgeError, Result};
use crate::input::mqtt::{MqttClient, MqttEvent, PubSub, classify, parse_device_status};
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Broker connection as last reported by the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

/// What a status message did to the cached state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    /// Message was for another topic.
    IgnoredTopic,
    /// `DeviceStatus` matched neither sentinel.
    Unrecognized,
    /// Status agreed with the cached state; nothing pushed.
    Unchanged(bool),
    /// Cached state flipped and the new value was pushed.
    Changed(bool),
}

pub struct ValveBridge {
    config: DeviceConfig,
    pubsub: Arc<dyn PubSub>,
    updater: Arc<dyn CharacteristicUpdater>,
    state: DeviceState,
    connection: RwLock<ConnectionState>,
    information_service: Service,
    device_service: Service,
    cancel: CancellationToken,
}

impl ValveBridge {
    /// Build the accessory around an existing publish/subscribe capability.
    ///
    /// No network activity happens here; see [`ValveBridge::connect`].
    pub fn new(
        config: DeviceConfig,
        pubsub: Arc<dyn PubSub>,
        updater: Arc<dyn CharacteristicUpdater>,
    ) -> Self {
        let information_service = Service::new(ServiceType::AccessoryInformation, &config.name)
            .with_characteristic(
                Characteristic::Manufacturer,
                config.manufacturer.as_str().into(),
            )
            .with_characteristic(Characteristic::Model, config.model.as_str().into())
            .with_characteristic(
                Characteristic::SerialNumber,
                config.serial_number.as_str().into(),
            );

        let device_service = match config.service {
            ServiceKind::Valve => Service::new(ServiceType::Valve, &config.name)
                .with_characteristic(Characteristic::Active, CharacteristicValue::UInt8(0))
                .with_characteristic(Characteristic::InUse, CharacteristicValue::UInt8(0))
                .with_characteristic(
                    Characteristic::ValveType,
                    CharacteristicValue::UInt8(config.device_type.into()),
                ),
            ServiceKind::Switch => Service::new(ServiceType::Switch, &config.name)
                .with_characteristic(Characteristic::On, CharacteristicValue::Bool(false)),
        };

        Self {
            config,
            pubsub,
            updater,
            state: DeviceState::default(),
            connection: RwLock::new(ConnectionState::default()),
            information_service,
            device_service,
            cancel: CancellationToken::new(),
        }
    }

    /// Build the accessory and open its MQTT connection.
    ///
    /// Spawns the MQTT event loop and a dispatch task that feeds connection
    /// events and status messages into the bridge. Must be called from
    /// within a tokio runtime.
    pub fn connect(
        config: DeviceConfig,
        updater: Arc<dyn CharacteristicUpdater>,
    ) -> Result<Arc<Self>> {
        let mqtt = MqttClient::new(&config)?;
        let bridge = Arc::new(Self::new(config, Arc::new(mqtt.client()), updater));

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(mqtt.run(tx, bridge.cancel.clone()));
        tokio::spawn(bridge.clone().dispatch(rx));

        info!("{} plugin loaded.", bridge.config.name);
        Ok(bridge)
    }

    async fn dispatch(self: Arc<Self>, mut events: mpsc::Receiver<MqttEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        debug!("[MQTT] {}: dispatch stopped", self.config.name);
    }

    /// React to one event from the MQTT event loop.
    pub async fn handle_event(&self, event: MqttEvent) {
        match event {
            MqttEvent::Connected => self.on_connected().await,
            MqttEvent::Message(msg) => self.on_status_message(&msg.topic, &msg.payload),
            MqttEvent::SubscribeRejected(pkid) => {
                warn!(
                    "[MQTT] {}: broker rejected subscription to {} (pkid {})",
                    self.config.name, self.config.topic_status, pkid
                );
            }
            MqttEvent::Disconnected(reason) => {
                *self.connection.write() = ConnectionState::Disconnected;
                info!(
                    "[MQTT] {}: connection closed ({})",
                    self.config.name, reason
                );
            }
        }
    }

    // Runs after every (re)connect: the session is clean, so subscriptions are gone.
    async fn on_connected(&self) {
        *self.connection.write() = ConnectionState::Connected;

        if let Err(e) = self.pubsub.subscribe(&self.config.topic_status).await {
            warn!(
                "[MQTT] {}: failed to subscribe to {}: {}",
                self.config.name, self.config.topic_status, e
            );
            return;
        }

        if let Some(command) = &self.config.status_command {
            match self.pubsub.publish(&self.config.topic_command, command).await {
                Ok(()) => debug!("[MQTT] {}: requested current status", self.config.name),
                Err(e) => warn!(
                    "[MQTT] {}: failed to request status: {}",
                    self.config.name, e
                ),
            }
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.read()
    }

    /// Characteristic carrying the on/off state for this service kind.
    pub fn state_characteristic(&self) -> Characteristic {
        match self.config.service {
            ServiceKind::Valve => Characteristic::Active,
            ServiceKind::Switch => Characteristic::On,
        }
    }

    /// Cached Active (or On) state. Never touches the network.
    pub fn get_active(&self) -> bool {
        self.state.get()
    }

    /// Cached InUse state; the valve reports one boolean for both.
    pub fn get_in_use(&self) -> bool {
        self.state.get()
    }

    /// Publish the command for `value` and store it as the cached state.
    ///
    /// Returns once the publish is queued. The cache is only updated when
    /// the publish was accepted by the client.
    pub async fn set_active(&self, value: bool) -> Result<()> {
        let command = self.config.command_for(value);
        self.pubsub
            .publish(&self.config.topic_command, command)
            .await?;
        info!(
            "[HomeKit] {}: set {} -> `{}` on {}",
            self.config.name,
            if value { "on" } else { "off" },
            command,
            self.config.topic_command
        );

        // Active/On already holds the written value on the host side
        if self.state.set(value) {
            self.push_state(value, false);
        }
        Ok(())
    }

    /// Handle a message from the broker, logging and dropping malformed payloads.
    pub fn on_status_message(&self, topic: &str, payload: &str) {
        match self.handle_status(topic, payload) {
            Ok(outcome) => debug!(
                "[MQTT] {}: {:?} (transitions: {})",
                self.config.name,
                outcome,
                self.state.version()
            ),
            Err(e) => warn!("[MQTT] {}: {}; message dropped", self.config.name, e),
        }
    }

    /// Apply a status message to the cached state.
    pub fn handle_status(&self, topic: &str, payload: &str) -> Result<StatusOutcome> {
        if topic != self.config.topic_status {
            return Ok(StatusOutcome::IgnoredTopic);
        }

        let status =
            parse_device_status(payload).map_err(|reason| BridgeError::MalformedStatus {
                topic: topic.to_string(),
                reason,
            })?;

        let Some(on) = classify(&status, &self.config.on_value, &self.config.off_value).as_bool()
        else {
            debug!(
                "[MQTT] {}: status {} matches neither {} nor {}",
                self.config.name, status, self.config.on_value, self.config.off_value
            );
            return Ok(StatusOutcome::Unrecognized);
        };

        if !self.state.set(on) {
            return Ok(StatusOutcome::Unchanged(on));
        }

        info!(
            "[MQTT] {}: device reported {}",
            self.config.name,
            if on { "on" } else { "off" }
        );
        self.push_state(on, true);
        Ok(StatusOutcome::Changed(on))
    }

    fn push_state(&self, on: bool, include_target: bool) {
        let service = self.device_service.service_type();
        match self.config.service {
            ServiceKind::Valve => {
                if include_target {
                    self.updater.update(
                        service,
                        Characteristic::Active,
                        Characteristic::Active.bool_value(on),
                    );
                }
                self.updater.update(
                    service,
                    Characteristic::InUse,
                    Characteristic::InUse.bool_value(on),
                );
            }
            ServiceKind::Switch => {
                if include_target {
                    self.updater
                        .update(service, Characteristic::On, Characteristic::On.bool_value(on));
                }
            }
        }
    }

    /// Information service followed by the valve/switch service, with current values.
    pub fn exposed_services(&self) -> Vec<Service> {
        let on = self.state.get();
        let mut device = self.device_service.clone();
        for characteristic in [
            Characteristic::Active,
            Characteristic::InUse,
            Characteristic::On,
        ] {
            if device.has(characteristic) {
                device = device.with_characteristic(characteristic, characteristic.bool_value(on));
            }
        }
        vec![self.information_service.clone(), device]
    }
}

#[async_trait]
impl AccessoryPlugin for ValveBridge {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn services(&self) -> Vec<Service> {
        self.exposed_services()
    }

    fn read(&self, characteristic: Characteristic) -> Option<CharacteristicValue> {
        match (self.config.service, characteristic) {
            (ServiceKind::Valve, Characteristic::Active) | (ServiceKind::Switch, Characteristic::On) => {
                Some(characteristic.bool_value(self.get_active()))
            }
            (ServiceKind::Valve, Characteristic::InUse) => {
                Some(characteristic.bool_value(self.get_in_use()))
            }
            _ => None,
        }
    }

    async fn write(
        &self,
        characteristic: Characteristic,
        value: CharacteristicValue,
    ) -> Result<()> {
        if characteristic != self.state_characteristic() {
            return Err(BridgeError::CharacteristicNotFound {
                accessory: self.config.name.clone(),
                characteristic: characteristic.to_string(),
            });
        }
        let on = value
            .as_bool()
            .ok_or_else(|| BridgeError::InvalidCharacteristicValue {
                characteristic: characteristic.to_string(),
                value: value.to_string(),
            })?;
        self.set_active(on).await
    }

    fn identify(&self) {
        debug!("[HomeKit] {}: identify requested", self.config.name);
    }

    fn shutdown(&self) {
        info!("[MQTT] {}: disconnecting", self.config.name);
        self.cancel.cancel();
    }
}
