//! Status payload parsing for the valve's MQTT status topic.
//!
//! The device reports `{"DeviceStatus": <value>}`. The value is classified
//! against the configured on/off sentinels using loose equality, so a
//! reported `1` matches a configured `"1"` and vice versa.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// JSON field carrying the device's reported status.
pub const DEVICE_STATUS_FIELD: &str = "DeviceStatus";

/// A configured literal used to recognise an "on" or "off" status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SentinelValue(pub Value);

impl SentinelValue {
    /// Check whether a reported status equals this sentinel.
    pub fn matches(&self, reported: &Value) -> bool {
        loose_eq(&self.0, reported)
    }
}

impl From<&str> for SentinelValue {
    fn from(value: &str) -> Self {
        Self(Value::String(value.to_string()))
    }
}

impl From<i64> for SentinelValue {
    fn from(value: i64) -> Self {
        Self(Value::from(value))
    }
}

impl fmt::Display for SentinelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

/// Classification of a reported status against the configured sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedStatus {
    On,
    Off,
    /// Matches neither sentinel; leaves the cached state untouched.
    Unrecognized,
}

impl ReportedStatus {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            ReportedStatus::On => Some(true),
            ReportedStatus::Off => Some(false),
            ReportedStatus::Unrecognized => None,
        }
    }
}

/// Extract the `DeviceStatus` value from a status payload.
///
/// Returns a human readable reason when the payload is not JSON, not an
/// object, or has no `DeviceStatus` field.
pub fn parse_device_status(payload: &str) -> Result<Value, String> {
    let json: Value = serde_json::from_str(payload).map_err(|e| format!("invalid JSON: {}", e))?;
    match json {
        Value::Object(mut map) => map
            .remove(DEVICE_STATUS_FIELD)
            .ok_or_else(|| format!("missing `{}` field", DEVICE_STATUS_FIELD)),
        other => Err(format!("expected a JSON object, got `{}`", other)),
    }
}

/// Classify a reported status. The on-sentinel is checked first.
pub fn classify(status: &Value, on: &SentinelValue, off: &SentinelValue) -> ReportedStatus {
    if on.matches(status) {
        ReportedStatus::On
    } else if off.matches(status) {
        ReportedStatus::Off
    } else {
        ReportedStatus::Unrecognized
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Some(0.0);
            }
            // Only plain decimal notation counts as numeric ("nan"/"inf" do not)
            if trimmed
                .chars()
                .any(|c| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
            {
                return None;
            }
            trimmed.parse().ok()
        }
        _ => None,
    }
}
