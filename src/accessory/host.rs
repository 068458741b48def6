//! In-process accessory host.
//!
//! Keeps a registry of accessory types, instantiates accessories from config
//! entries, stores the last known value of every characteristic, and
//! broadcasts value changes to subscribers.

use super::{
    AccessoryFactory, AccessoryPlugin, Characteristic, CharacteristicUpdater,
    CharacteristicValue, ServiceType,
};
use crate::error::{BridgeError, Result};
use log::{debug, info};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// A characteristic value change, pushed by an accessory or written by a controller.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacteristicEvent {
    pub accessory: String,
    pub service: ServiceType,
    pub characteristic: Characteristic,
    pub value: CharacteristicValue,
}

type ValueKey = (String, ServiceType, Characteristic);

struct HostState {
    values: RwLock<HashMap<ValueKey, CharacteristicValue>>,
    events: broadcast::Sender<CharacteristicEvent>,
}

impl HostState {
    fn store(&self, event: CharacteristicEvent) {
        self.values.write().insert(
            (event.accessory.clone(), event.service, event.characteristic),
            event.value.clone(),
        );
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Updater handed to one accessory; tags pushes with the accessory's name.
struct HostUpdater {
    accessory: String,
    state: Arc<HostState>,
}

impl CharacteristicUpdater for HostUpdater {
    fn update(
        &self,
        service: ServiceType,
        characteristic: Characteristic,
        value: CharacteristicValue,
    ) {
        debug!(
            "[HomeKit] {} {}.{} <- {}",
            self.accessory, service, characteristic, value
        );
        self.state.store(CharacteristicEvent {
            accessory: self.accessory.clone(),
            service,
            characteristic,
            value,
        });
    }
}

pub struct AccessoryHost {
    factories: HashMap<String, AccessoryFactory>,
    accessories: RwLock<Vec<Arc<dyn AccessoryPlugin>>>,
    state: Arc<HostState>,
}

impl AccessoryHost {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            factories: HashMap::new(),
            accessories: RwLock::new(Vec::new()),
            state: Arc::new(HostState {
                values: RwLock::new(HashMap::new()),
                events,
            }),
        }
    }

    /// Register an accessory type under a fixed name.
    pub fn register_accessory(&mut self, type_name: impl Into<String>, factory: AccessoryFactory) {
        let type_name = type_name.into();
        info!("[HomeKit] Registered accessory type {}", type_name);
        self.factories.insert(type_name, factory);
    }

    /// Create an accessory from a config entry (`accessory` selects the type).
    pub fn instantiate(&self, entry: &Value) -> Result<Arc<dyn AccessoryPlugin>> {
        let type_name = entry
            .get("accessory")
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::InvalidConfig("entry has no `accessory` type".into()))?;
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| BridgeError::UnknownAccessoryType(type_name.to_string()))?;
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::InvalidConfig("entry has no `name`".into()))?;
        if self.find(name).is_some() {
            return Err(BridgeError::InvalidConfig(format!(
                "duplicate accessory name `{}`",
                name
            )));
        }

        let updater: Arc<dyn CharacteristicUpdater> = Arc::new(HostUpdater {
            accessory: name.to_string(),
            state: self.state.clone(),
        });
        let accessory = factory(entry, updater)?;

        {
            let mut values = self.state.values.write();
            for service in accessory.services() {
                for (characteristic, value) in service.characteristics() {
                    values
                        .entry((name.to_string(), service.service_type(), *characteristic))
                        .or_insert_with(|| value.clone());
                }
            }
        }

        info!("[HomeKit] Added accessory {} ({})", name, type_name);
        self.accessories.write().push(accessory.clone());
        Ok(accessory)
    }

    fn find(&self, name: &str) -> Option<Arc<dyn AccessoryPlugin>> {
        self.accessories
            .read()
            .iter()
            .find(|a| a.name() == name)
            .cloned()
    }

    pub fn accessory(&self, name: &str) -> Result<Arc<dyn AccessoryPlugin>> {
        self.find(name)
            .ok_or_else(|| BridgeError::AccessoryNotFound(name.to_string()))
    }

    pub fn accessory_names(&self) -> Vec<String> {
        self.accessories
            .read()
            .iter()
            .map(|a| a.name().to_string())
            .collect()
    }

    /// Service holding `characteristic`; device services win over the information service.
    fn locate(
        accessory: &dyn AccessoryPlugin,
        characteristic: Characteristic,
    ) -> Result<ServiceType> {
        let services = accessory.services();
        services
            .iter()
            .filter(|s| s.service_type() != ServiceType::AccessoryInformation)
            .chain(
                services
                    .iter()
                    .filter(|s| s.service_type() == ServiceType::AccessoryInformation),
            )
            .find(|s| s.has(characteristic))
            .map(|s| s.service_type())
            .ok_or_else(|| BridgeError::CharacteristicNotFound {
                accessory: accessory.name().to_string(),
                characteristic: characteristic.to_string(),
            })
    }

    /// Controller read: the accessory's GET handler, else the stored value.
    pub fn read(&self, name: &str, characteristic: Characteristic) -> Result<CharacteristicValue> {
        let accessory = self.accessory(name)?;
        let service = Self::locate(accessory.as_ref(), characteristic)?;
        if let Some(value) = accessory.read(characteristic) {
            return Ok(value);
        }
        self.value(name, service, characteristic)
            .ok_or_else(|| BridgeError::CharacteristicNotFound {
                accessory: name.to_string(),
                characteristic: characteristic.to_string(),
            })
    }

    /// Controller write: runs the SET handler and stores the value on success.
    pub async fn write(
        &self,
        name: &str,
        characteristic: Characteristic,
        value: CharacteristicValue,
    ) -> Result<()> {
        if !characteristic.is_writable() {
            return Err(BridgeError::ReadOnlyCharacteristic(characteristic.to_string()));
        }
        let accessory = self.accessory(name)?;
        let service = Self::locate(accessory.as_ref(), characteristic)?;
        accessory.write(characteristic, value.clone()).await?;
        self.state.store(CharacteristicEvent {
            accessory: name.to_string(),
            service,
            characteristic,
            value,
        });
        Ok(())
    }

    pub fn identify(&self, name: &str) -> Result<()> {
        self.accessory(name)?.identify();
        Ok(())
    }

    /// Last value stored for a characteristic.
    pub fn value(
        &self,
        name: &str,
        service: ServiceType,
        characteristic: Characteristic,
    ) -> Option<CharacteristicValue> {
        self.state
            .values
            .read()
            .get(&(name.to_string(), service, characteristic))
            .cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CharacteristicEvent> {
        self.state.events.subscribe()
    }

    pub fn shutdown(&self) {
        for accessory in self.accessories.read().iter() {
            accessory.shutdown();
        }
    }
}

impl Default for AccessoryHost {
    fn default() -> Self {
        Self::new()
    }
}
