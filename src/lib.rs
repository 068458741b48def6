//! Water Valve Bridge library.
//!
//! This library bridges MQTT-controlled water valves to a HomeKit-style
//! accessory host: characteristic reads come from a cached state, writes
//! publish command strings, and device status messages update the host.

pub mod accessory;
pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod input;
