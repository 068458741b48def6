//! Service and characteristic descriptors exposed to the HomeKit host.
//!
//! Names follow HAP-NodeJS `ServiceDefinitions` / `CharacteristicDefinitions`.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ServiceType {
    AccessoryInformation,
    Valve,
    Switch,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Characteristic {
    Name,
    Manufacturer,
    Model,
    SerialNumber,
    Active,
    InUse,
    ValveType,
    On,
}

impl Characteristic {
    /// Whether a controller may write this characteristic.
    pub fn is_writable(self) -> bool {
        matches!(self, Characteristic::Active | Characteristic::On)
    }

    /// Encode a boolean in this characteristic's format.
    ///
    /// `On` is a HAP bool, `Active`/`InUse` are uint8 enums (0 or 1).
    pub fn bool_value(self, value: bool) -> CharacteristicValue {
        match self {
            Characteristic::On => CharacteristicValue::Bool(value),
            _ => CharacteristicValue::UInt8(u8::from(value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CharacteristicValue {
    Bool(bool),
    UInt8(u8),
    String(String),
}

impl CharacteristicValue {
    /// Interpret the value as on/off. Only `true`/`false`, `0` and `1` qualify.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CharacteristicValue::Bool(b) => Some(*b),
            CharacteristicValue::UInt8(0) => Some(false),
            CharacteristicValue::UInt8(1) => Some(true),
            _ => None,
        }
    }
}

impl fmt::Display for CharacteristicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharacteristicValue::Bool(b) => write!(f, "{}", b),
            CharacteristicValue::UInt8(n) => write!(f, "{}", n),
            CharacteristicValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CharacteristicValue {
    fn from(value: &str) -> Self {
        CharacteristicValue::String(value.to_string())
    }
}

/// A HomeKit service: a typed group of characteristics with initial values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    service_type: ServiceType,
    display_name: String,
    characteristics: Vec<(Characteristic, CharacteristicValue)>,
}

impl Service {
    pub fn new(service_type: ServiceType, display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        Self {
            service_type,
            characteristics: vec![(
                Characteristic::Name,
                CharacteristicValue::String(display_name.clone()),
            )],
            display_name,
        }
    }

    /// Set a characteristic's value, adding it if the service lacks it.
    pub fn with_characteristic(
        mut self,
        characteristic: Characteristic,
        value: CharacteristicValue,
    ) -> Self {
        match self
            .characteristics
            .iter_mut()
            .find(|(c, _)| *c == characteristic)
        {
            Some((_, existing)) => *existing = value,
            None => self.characteristics.push((characteristic, value)),
        }
        self
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn characteristic(&self, characteristic: Characteristic) -> Option<&CharacteristicValue> {
        self.characteristics
            .iter()
            .find(|(c, _)| *c == characteristic)
            .map(|(_, v)| v)
    }

    pub fn has(&self, characteristic: Characteristic) -> bool {
        self.characteristic(characteristic).is_some()
    }

    pub fn characteristics(&self) -> impl Iterator<Item = &(Characteristic, CharacteristicValue)> {
        self.characteristics.iter()
    }
}
