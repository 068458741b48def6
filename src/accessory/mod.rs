//! Accessory-host boundary.
//!
//! The HomeKit side of the bridge is expressed as two traits so the valve
//! logic never depends on a concrete host:
//! - [`AccessoryPlugin`]: what the host calls (GET/SET handlers, identify, services)
//! - [`CharacteristicUpdater`]: how a plugin pushes values back to the host
//!
//! [`AccessoryHost`] is the in-process host used by the bridge binary.

mod host;
mod service;

pub use host::{AccessoryHost, CharacteristicEvent};
pub use service::{Characteristic, CharacteristicValue, Service, ServiceType};

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Contract between an accessory and the host that exposes it.
#[async_trait]
pub trait AccessoryPlugin: Send + Sync {
    /// Display name, unique per host.
    fn name(&self) -> &str;

    /// All services owned by this accessory, information service first.
    fn services(&self) -> Vec<Service>;

    /// GET handler. `None` lets the host answer from its stored value.
    fn read(&self, characteristic: Characteristic) -> Option<CharacteristicValue>;

    /// SET handler for writable characteristics.
    async fn write(&self, characteristic: Characteristic, value: CharacteristicValue)
    -> Result<()>;

    /// Called when a controller asks the accessory to identify itself.
    fn identify(&self) {}

    /// Release connections and background tasks.
    fn shutdown(&self) {}
}

/// Capability to push characteristic values to the host.
pub trait CharacteristicUpdater: Send + Sync {
    fn update(
        &self,
        service: ServiceType,
        characteristic: Characteristic,
        value: CharacteristicValue,
    );
}

/// Builds an accessory from its config entry and the host's updater.
pub type AccessoryFactory = Arc<
    dyn Fn(&Value, Arc<dyn CharacteristicUpdater>) -> Result<Arc<dyn AccessoryPlugin>>
        + Send
        + Sync,
>;
