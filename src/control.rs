//! Line-based control of the accessory host.
//!
//! Stands in for a HomeKit controller during development:
//!
//! ```text
//! on Garden Valve
//! off Garden Valve
//! get InUse Garden Valve
//! identify Garden Valve
//! list
//! ```

use crate::accessory::{AccessoryHost, Characteristic, CharacteristicValue};
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Set { accessory: String, on: bool },
    Get {
        accessory: String,
        characteristic: Characteristic,
    },
    Identify { accessory: String },
    List,
}

impl ControlCommand {
    /// Parse one control line. Accessory names may contain spaces.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match verb.to_ascii_lowercase().as_str() {
            "list" => Some(ControlCommand::List),
            "on" | "off" if !rest.is_empty() => Some(ControlCommand::Set {
                accessory: rest.to_string(),
                on: verb.eq_ignore_ascii_case("on"),
            }),
            "get" => {
                let (characteristic, accessory) = rest.split_once(char::is_whitespace)?;
                Some(ControlCommand::Get {
                    accessory: accessory.trim().to_string(),
                    characteristic: characteristic.parse().ok()?,
                })
            }
            "identify" if !rest.is_empty() => Some(ControlCommand::Identify {
                accessory: rest.to_string(),
            }),
            _ => None,
        }
    }
}

/// Run a command against the host and describe the result.
pub async fn execute(host: &AccessoryHost, command: ControlCommand) -> Result<String> {
    match command {
        ControlCommand::Set { accessory, on } => {
            let characteristic = power_characteristic(host, &accessory)?;
            host.write(&accessory, characteristic, characteristic.bool_value(on))
                .await?;
            Ok(format!("{} {} -> {}", accessory, characteristic, on))
        }
        ControlCommand::Get {
            accessory,
            characteristic,
        } => {
            let value = host.read(&accessory, characteristic)?;
            Ok(format!("{} {} = {}", accessory, characteristic, value))
        }
        ControlCommand::Identify { accessory } => {
            host.identify(&accessory)?;
            Ok(format!("{} identified", accessory))
        }
        ControlCommand::List => Ok(host.accessory_names().join("\n")),
    }
}

/// The writable on/off characteristic the accessory exposes.
fn power_characteristic(host: &AccessoryHost, accessory: &str) -> Result<Characteristic> {
    let services = host.accessory(accessory)?.services();
    [Characteristic::Active, Characteristic::On]
        .into_iter()
        .find(|c| services.iter().any(|s| s.has(*c)))
        .ok_or_else(|| BridgeError::CharacteristicNotFound {
            accessory: accessory.to_string(),
            characteristic: "Active/On".to_string(),
        })
}

/// Render a value the way a controller would show it.
pub fn describe(value: &CharacteristicValue) -> String {
    match value.as_bool() {
        Some(true) => format!("{} (on)", value),
        Some(false) => format!("{} (off)", value),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            ControlCommand::parse("on Garden Valve"),
            Some(ControlCommand::Set {
                accessory: "Garden Valve".to_string(),
                on: true
            })
        );
        assert_eq!(
            ControlCommand::parse("  OFF  Hose "),
            Some(ControlCommand::Set {
                accessory: "Hose".to_string(),
                on: false
            })
        );
        assert_eq!(
            ControlCommand::parse("get inuse Garden Valve"),
            Some(ControlCommand::Get {
                accessory: "Garden Valve".to_string(),
                characteristic: Characteristic::InUse
            })
        );
        assert_eq!(
            ControlCommand::parse("identify Hose"),
            Some(ControlCommand::Identify {
                accessory: "Hose".to_string()
            })
        );
        assert_eq!(ControlCommand::parse("list"), Some(ControlCommand::List));
    }

    #[test]
    fn test_parse_rejects_incomplete_lines() {
        assert_eq!(ControlCommand::parse(""), None);
        assert_eq!(ControlCommand::parse("on"), None);
        assert_eq!(ControlCommand::parse("get Active"), None);
        assert_eq!(ControlCommand::parse("get Pressure Hose"), None);
        assert_eq!(ControlCommand::parse("toggle Hose"), None);
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&CharacteristicValue::UInt8(1)), "1 (on)");
        assert_eq!(describe(&CharacteristicValue::Bool(false)), "false (off)");
        assert_eq!(describe(&CharacteristicValue::from("Acme")), "Acme");
    }

    #[tokio::test]
    async fn test_execute_against_empty_host() {
        let host = AccessoryHost::new();
        assert_eq!(execute(&host, ControlCommand::List).await.unwrap(), "");
        assert!(matches!(
            execute(
                &host,
                ControlCommand::Set {
                    accessory: "Hose".to_string(),
                    on: true
                }
            )
            .await,
            Err(BridgeError::AccessoryNotFound(_))
        ));
    }
}
