use crate::error::{BridgeError, Result};
use crate::input::mqtt::{MqttEndpoint, SentinelValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use strum::{Display, EnumString};

/// Accessory type name the plugin registers with the host.
pub const PLUGIN_ACCESSORY_NAME: &str = "WaterValue";

/// Environment variable pointing at the host config file.
pub const CONFIG_PATH_ENV: &str = "VALVE_BRIDGE_CONFIG";

/// Parse `KEY=value` lines from a `.env` file body.
///
/// Blank lines and `#` comments are skipped, one layer of matching single
/// or double quotes is stripped, unquoted values may contain spaces.
pub fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .filter_map(|(key, value)| {
            let key = key.trim().trim_start_matches("export ").trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim();
            let unquoted = ['"', '\'']
                .iter()
                .find_map(|q| value.strip_prefix(*q)?.strip_suffix(*q))
                .unwrap_or(value);
            Some((key.to_string(), unquoted.to_string()))
        })
        .collect()
}

/// Load environment variables from `.env` in the working directory.
/// Variables already present in the process environment win.
pub fn load_dotenv() {
    let Ok(content) = fs::read_to_string(".env") else {
        return;
    };

    for (key, value) in parse_dotenv(&content) {
        if std::env::var_os(&key).is_none() {
            // SAFETY: called from `main` before the tokio runtime or any other thread starts
            unsafe { std::env::set_var(key, value) };
        }
    }
}

/// Default location of the host config file: `~/.homebridge/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".homebridge")
        .join("config.json")
}

/// HomeKit valve type, set once on the valve service.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(try_from = "Value", into = "u8")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ValveType {
    #[default]
    GenericValve,
    Irrigation,
    ShowerHead,
    WaterFaucet,
}

impl From<ValveType> for u8 {
    fn from(value: ValveType) -> Self {
        match value {
            ValveType::GenericValve => 0,
            ValveType::Irrigation => 1,
            ValveType::ShowerHead => 2,
            ValveType::WaterFaucet => 3,
        }
    }
}

impl TryFrom<u64> for ValveType {
    type Error = String;

    fn try_from(value: u64) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(ValveType::GenericValve),
            1 => Ok(ValveType::Irrigation),
            2 => Ok(ValveType::ShowerHead),
            3 => Ok(ValveType::WaterFaucet),
            other => Err(format!("valve type {} out of range 0..=3", other)),
        }
    }
}

impl TryFrom<Value> for ValveType {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match &value {
            Value::Null => Ok(ValveType::default()),
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| format!("invalid valve type {}", n))
                .and_then(ValveType::try_from),
            Value::String(s) => match s.trim().parse::<u64>() {
                Ok(n) => ValveType::try_from(n),
                Err(_) => ValveType::from_str(s.trim())
                    .map_err(|_| format!("unknown valve type `{}`", s)),
            },
            other => Err(format!("invalid valve type {}", other)),
        }
    }
}

/// Which HomeKit service the device is exposed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ServiceKind {
    /// Active + InUse + ValveType.
    #[default]
    Valve,
    /// Single On characteristic.
    Switch,
}

/// Configuration of one valve accessory, as found in the host's config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    pub name: String,
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_serial_number")]
    pub serial_number: String,
    #[serde(default)]
    pub device_type: ValveType,
    #[serde(default)]
    pub service: ServiceKind,
    pub mqtt_url: String,
    #[serde(default)]
    pub mqtt_user: Option<String>,
    #[serde(default)]
    pub mqtt_pass: Option<String>,
    pub topic_status: String,
    pub topic_command: String,
    pub on_command: String,
    pub off_command: String,
    pub on_value: SentinelValue,
    pub off_value: SentinelValue,
    /// Published to the command topic after each subscribe to request the
    /// device's current status.
    #[serde(default)]
    pub status_command: Option<String>,
    /// Accept any TLS server certificate on `mqtts://` connections.
    #[serde(default)]
    pub allow_insecure_tls: bool,
}

fn default_manufacturer() -> String {
    "Default-Manufacturer".to_string()
}

fn default_model() -> String {
    "Default-Model".to_string()
}

fn default_serial_number() -> String {
    "Default-Serial".to_string()
}

impl DeviceConfig {
    /// Deserialize and validate one accessory entry.
    pub fn from_value(entry: &Value) -> Result<Self> {
        let config: Self = serde_json::from_value(entry.clone())?;
        config.validate()?;
        Ok(config)
    }

    /// Check the fields the bridge cannot work without.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("name", &self.name),
            ("topicStatus", &self.topic_status),
            ("topicCommand", &self.topic_command),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(BridgeError::InvalidConfig(format!(
                    "{}: `{}` must not be empty",
                    self.name, field
                )));
            }
        }

        if self.topic_command.contains(['+', '#']) {
            return Err(BridgeError::InvalidConfig(format!(
                "{}: `topicCommand` must not contain wildcards",
                self.name
            )));
        }
        // Status messages are matched by exact topic, a filter would never match
        if self.topic_status.contains(['+', '#']) {
            return Err(BridgeError::InvalidConfig(format!(
                "{}: `topicStatus` must be a concrete topic",
                self.name
            )));
        }

        MqttEndpoint::parse(&self.mqtt_url)?;
        Ok(())
    }

    /// Username/password pair, if a non-empty username is configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let user = self.mqtt_user.as_deref().filter(|u| !u.is_empty())?;
        Some((user, self.mqtt_pass.as_deref().unwrap_or_default()))
    }

    /// Command string for the requested state.
    pub fn command_for(&self, on: bool) -> &str {
        if on { &self.on_command } else { &self.off_command }
    }
}

/// Read the accessory entries handled by this plugin from a config file.
///
/// Accepts a host config (`{"accessories": [...]}`, entries filtered by
/// `"accessory": "WaterValue"`), a bare array of entries, or a single entry.
pub fn load_accessory_entries(path: &Path) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path)?;
    let root: Value = serde_json::from_str(&content)?;
    accessory_entries(root)
}

/// Select this plugin's accessory entries from a parsed config document.
pub fn accessory_entries(root: Value) -> Result<Vec<Value>> {
    let entries = match root {
        Value::Object(mut map) if map.contains_key("accessories") => {
            match map.remove("accessories") {
                Some(Value::Array(entries)) => entries,
                _ => {
                    return Err(BridgeError::InvalidConfig(
                        "`accessories` must be an array".to_string(),
                    ));
                }
            }
        }
        Value::Array(entries) => entries,
        entry @ Value::Object(_) => vec![entry],
        _ => {
            return Err(BridgeError::InvalidConfig(
                "expected a JSON object or array".to_string(),
            ));
        }
    };

    Ok(entries
        .into_iter()
        .filter(|entry| {
            entry
                .get("accessory")
                .and_then(Value::as_str)
                .is_none_or(|kind| kind == PLUGIN_ACCESSORY_NAME)
        })
        .map(|mut entry| {
            if let Value::Object(map) = &mut entry {
                map.entry("accessory")
                    .or_insert_with(|| Value::String(PLUGIN_ACCESSORY_NAME.to_string()));
            }
            entry
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry() -> Value {
        json!({
            "accessory": "WaterValue",
            "name": "Garden Valve",
            "mqttUrl": "mqtt://10.0.0.2",
            "topicStatus": "dev/status",
            "topicCommand": "dev/cmd",
            "onCommand": "ON",
            "offCommand": "OFF",
            "onValue": "1",
            "offValue": 0
        })
    }

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::from_value(&entry()).unwrap();
        assert_eq!(config.manufacturer, "Default-Manufacturer");
        assert_eq!(config.device_type, ValveType::GenericValve);
        assert_eq!(config.service, ServiceKind::Valve);
        assert_eq!(config.status_command, None);
        assert!(!config.allow_insecure_tls);
        assert_eq!(config.credentials(), None);
        assert_eq!(config.off_value, SentinelValue::from(0i64));
    }

    #[test]
    fn test_command_for() {
        let config = DeviceConfig::from_value(&entry()).unwrap();
        assert_eq!(config.command_for(true), "ON");
        assert_eq!(config.command_for(false), "OFF");
    }

    #[test]
    fn test_credentials_ignore_empty_user() {
        let mut value = entry();
        value["mqttUser"] = json!("");
        value["mqttPass"] = json!("secret");
        assert_eq!(DeviceConfig::from_value(&value).unwrap().credentials(), None);

        value["mqttUser"] = json!("valve");
        let config = DeviceConfig::from_value(&value).unwrap();
        assert_eq!(config.credentials(), Some(("valve", "secret")));
    }

    #[test]
    fn test_valve_type_forms() {
        for (raw, expected) in [
            (json!(1), ValveType::Irrigation),
            (json!("2"), ValveType::ShowerHead),
            (json!("water_faucet"), ValveType::WaterFaucet),
            (json!("Irrigation"), ValveType::Irrigation),
        ] {
            let mut value = entry();
            value["deviceType"] = raw;
            assert_eq!(DeviceConfig::from_value(&value).unwrap().device_type, expected);
        }

        let mut value = entry();
        value["deviceType"] = json!(7);
        assert!(DeviceConfig::from_value(&value).is_err());
        assert_eq!(u8::from(ValveType::WaterFaucet), 3);
    }

    #[test]
    fn test_switch_service() {
        let mut value = entry();
        value["service"] = json!("switch");
        let config = DeviceConfig::from_value(&value).unwrap();
        assert_eq!(config.service, ServiceKind::Switch);
        assert_eq!(config.service.to_string(), "switch");
    }

    #[test]
    fn test_validation_errors() {
        let mut value = entry();
        value["topicStatus"] = json!("dev/+/status");
        assert!(matches!(
            DeviceConfig::from_value(&value),
            Err(BridgeError::InvalidConfig(_))
        ));

        let mut value = entry();
        value["topicCommand"] = json!(" ");
        assert!(DeviceConfig::from_value(&value).is_err());

        let mut value = entry();
        value["mqttUrl"] = json!("http://broker");
        assert!(matches!(
            DeviceConfig::from_value(&value),
            Err(BridgeError::InvalidMqttUrl(_))
        ));

        let mut value = entry();
        value.as_object_mut().unwrap().remove("onCommand");
        assert!(matches!(
            DeviceConfig::from_value(&value),
            Err(BridgeError::SerdeJsonError(_))
        ));
    }

    #[test]
    fn test_accessory_entries_from_host_config() {
        let root = json!({
            "bridge": {"name": "Homebridge"},
            "accessories": [
                entry(),
                {"accessory": "Thermostat", "name": "Hall"},
                {"name": "Untyped Valve"}
            ]
        });
        let entries = accessory_entries(root).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1]["accessory"], json!("WaterValue"));
    }

    #[test]
    fn test_accessory_entries_single_object() {
        assert_eq!(accessory_entries(entry()).unwrap().len(), 1);
        assert!(accessory_entries(json!({"accessories": {}})).is_err());
        assert!(accessory_entries(json!("valve")).is_err());
    }

    #[test]
    fn test_parse_dotenv() {
        let vars = parse_dotenv(
            "# comment\n\nRUST_LOG=debug\nexport VALVE_BRIDGE_CONFIG=\"/etc/hb/config.json\"\nNAME=Garden Valve\n=skipped\nnoequals\n",
        );
        assert_eq!(
            vars,
            vec![
                ("RUST_LOG".to_string(), "debug".to_string()),
                (
                    "VALVE_BRIDGE_CONFIG".to_string(),
                    "/etc/hb/config.json".to_string()
                ),
                ("NAME".to_string(), "Garden Valve".to_string()),
            ]
        );
    }

    #[test]
    fn test_default_config_path() {
        assert!(default_config_path().ends_with(".homebridge/config.json"));
    }
}
