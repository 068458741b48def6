//! Input sources for the bridge.
//!
//! Current input sources:
//! - `mqtt`: the valve device's status and command topics

pub mod mqtt;
