//! MQTT side of the valve bridge.
//!
//! This module owns the broker connection (options, TLS, reconnect loop) and
//! the parsing of the device's JSON status payloads.

mod client;
mod status;
mod tls;

pub use client::{
    CONNECT_TIMEOUT_SECS, KEEP_ALIVE, MqttClient, MqttEndpoint, MqttEvent, MqttMessage, PubSub,
    RECONNECT_PERIOD, WILL_TOPIC, client_id_for,
};
pub use status::{
    DEVICE_STATUS_FIELD, ReportedStatus, SentinelValue, classify, parse_device_status,
};
