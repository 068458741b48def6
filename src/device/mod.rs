//! Devices exposed through the accessory host.

pub mod state;
pub mod valve_bridge;

pub use state::DeviceState;
pub use valve_bridge::{ConnectionState, StatusOutcome, ValveBridge};

use crate::accessory::{AccessoryHost, AccessoryPlugin, CharacteristicUpdater};
use crate::config::{DeviceConfig, PLUGIN_ACCESSORY_NAME};
use crate::error::Result;
use serde_json::Value;
use std::sync::Arc;

/// Register the `WaterValue` accessory type with the host.
///
/// Each instantiated entry gets its own [`ValveBridge`] and MQTT connection.
pub fn register_accessories(host: &mut AccessoryHost) {
    host.register_accessory(
        PLUGIN_ACCESSORY_NAME,
        Arc::new(
            |entry: &Value,
             updater: Arc<dyn CharacteristicUpdater>|
             -> Result<Arc<dyn AccessoryPlugin>> {
                let config = DeviceConfig::from_value(entry)?;
                let bridge: Arc<dyn AccessoryPlugin> = ValveBridge::connect(config, updater)?;
                Ok(bridge)
            },
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessory::{Characteristic, CharacteristicValue};
    use crate::error::BridgeError;
    use serde_json::json;

    #[tokio::test]
    async fn test_registered_factory_builds_valve() {
        let mut host = AccessoryHost::new();
        register_accessories(&mut host);

        let accessory = host
            .instantiate(&json!({
                "accessory": "WaterValue",
                "name": "Garden Valve",
                "mqttUrl": "mqtt://127.0.0.1:1",
                "topicStatus": "dev/status",
                "topicCommand": "dev/cmd",
                "onCommand": "ON",
                "offCommand": "OFF",
                "onValue": "1",
                "offValue": "0"
            }))
            .unwrap();

        assert_eq!(accessory.name(), "Garden Valve");
        assert_eq!(
            host.read("Garden Valve", Characteristic::Active).unwrap(),
            CharacteristicValue::UInt8(0)
        );
        host.shutdown();
    }

    #[tokio::test]
    async fn test_registered_factory_rejects_bad_config() {
        let mut host = AccessoryHost::new();
        register_accessories(&mut host);

        let result = host.instantiate(&json!({
            "accessory": "WaterValue",
            "name": "Garden Valve",
            "mqttUrl": "mqtt://127.0.0.1"
        }));
        assert!(matches!(result, Err(BridgeError::SerdeJsonError(_))));
        assert!(host.accessory_names().is_empty());
    }
}
