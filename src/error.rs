use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum BridgeError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported MQTT URL: {0}")]
    InvalidMqttUrl(String),

    #[error("MQTT client error: {0}")]
    MqttClient(#[from] rumqttc::ClientError),

    #[error("Malformed status payload on {topic}: {reason}")]
    MalformedStatus { topic: String, reason: String },

    #[error("Unknown accessory type: {0}")]
    UnknownAccessoryType(String),

    #[error("Accessory not found: {0}")]
    AccessoryNotFound(String),

    #[error("Characteristic {characteristic} not available on {accessory}")]
    CharacteristicNotFound {
        accessory: String,
        characteristic: String,
    },

    #[error("Characteristic {0} is read-only")]
    ReadOnlyCharacteristic(String),

    #[error("Invalid value for {characteristic}: {value}")]
    InvalidCharacteristicValue {
        characteristic: String,
        value: String,
    },

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
