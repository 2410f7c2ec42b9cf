use core::fmt;

use serde_json::{Value, json};

use crate::BridgeError;

/// A single state change sent to a light or group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    On,
    Off,
    Brightness(u8),
    Hue(u16),
    Saturation(u8),
    ColorTemp(u16),
    Alert(String),
    Effect(String),
    /// Recall a scene; only meaningful for groups.
    Scene(String),
}

impl Command {
    /// Parses `"<name> [value]"`, e.g. `"on"`, `"bri 127"`, `"scene abc123"`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidCommand`] for unknown names, missing
    /// values and values out of range.
    pub fn parse(input: &str) -> Result<Self, BridgeError> {
        let invalid = || BridgeError::InvalidCommand(input.trim().to_owned());
        let mut parts = input.split_whitespace();
        let name = parts.next().ok_or_else(invalid)?;
        let value = parts.next();
        if parts.next().is_some() {
            return Err(invalid());
        }

        let command = match (name.to_ascii_lowercase().as_str(), value) {
            ("on", None) => Self::On,
            ("off", None) => Self::Off,
            ("bri", Some(v)) => Self::Brightness(v.parse().map_err(|_| invalid())?),
            ("hue", Some(v)) => Self::Hue(v.parse().map_err(|_| invalid())?),
            ("sat", Some(v)) => Self::Saturation(v.parse().map_err(|_| invalid())?),
            ("ct", Some(v)) => {
                let ct: u16 = v.parse().map_err(|_| invalid())?;
                if !(153..=500).contains(&ct) {
                    return Err(invalid());
                }
                Self::ColorTemp(ct)
            }
            ("alert", Some(v @ ("none" | "select" | "lselect"))) => Self::Alert(v.to_owned()),
            ("effect", Some(v @ ("none" | "colorloop"))) => Self::Effect(v.to_owned()),
            ("scene", Some(v)) => Self::Scene(v.to_owned()),
            _ => return Err(invalid()),
        };
        Ok(command)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Brightness(_) => "bri",
            Self::Hue(_) => "hue",
            Self::Saturation(_) => "sat",
            Self::ColorTemp(_) => "ct",
            Self::Alert(_) => "alert",
            Self::Effect(_) => "effect",
            Self::Scene(_) => "scene",
        }
    }

    /// JSON body for a light `state` or group `action` update.
    #[must_use]
    pub fn to_body(&self) -> Value {
        match self {
            Self::On => json!({ "on": true }),
            Self::Off => json!({ "on": false }),
            // Colour and brightness changes are ignored by lights that are off.
            Self::Brightness(v) => json!({ "on": true, "bri": v }),
            Self::Hue(v) => json!({ "on": true, "hue": v }),
            Self::Saturation(v) => json!({ "on": true, "sat": v }),
            Self::ColorTemp(v) => json!({ "on": true, "ct": v }),
            Self::Alert(v) => json!({ "alert": v }),
            Self::Effect(v) => json!({ "on": true, "effect": v }),
            Self::Scene(v) => json!({ "scene": v }),
        }
    }

    /// Human-readable confirmation, e.g. `"Light 1 turned on"`.
    #[must_use]
    pub fn describe(&self, target: &str) -> String {
        match self {
            Self::On => format!("{target} turned on"),
            Self::Off => format!("{target} turned off"),
            Self::Scene(id) => format!("{target} set to scene {id}"),
            Self::Brightness(_)
            | Self::Hue(_)
            | Self::Saturation(_)
            | Self::ColorTemp(_)
            | Self::Alert(_)
            | Self::Effect(_) => format!("{target} {} set to {self}", self.name()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On | Self::Off => f.write_str(self.name()),
            Self::Brightness(v) | Self::Saturation(v) => write!(f, "{v}"),
            Self::Hue(v) | Self::ColorTemp(v) => write!(f, "{v}"),
            Self::Alert(v) | Self::Effect(v) | Self::Scene(v) => f.write_str(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_switches_and_values() {
        assert_eq!(Command::parse("on").unwrap(), Command::On);
        assert_eq!(Command::parse(" OFF ").unwrap(), Command::Off);
        assert_eq!(Command::parse("bri 127").unwrap(), Command::Brightness(127));
        assert_eq!(Command::parse("ct 370").unwrap(), Command::ColorTemp(370));
        assert_eq!(
            Command::parse("effect colorloop").unwrap(),
            Command::Effect("colorloop".to_owned())
        );
    }

    #[test]
    fn rejects_malformed_commands() {
        for input in ["", "dim", "on 1", "bri", "bri 300", "ct 100", "alert loud", "bri 1 2"] {
            assert!(
                matches!(Command::parse(input), Err(BridgeError::InvalidCommand(_))),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn bodies_match_bridge_fields() {
        assert_eq!(Command::Off.to_body(), json!({ "on": false }));
        assert_eq!(
            Command::Brightness(64).to_body(),
            json!({ "on": true, "bri": 64 })
        );
        assert_eq!(
            Command::Scene("abc".to_owned()).to_body(),
            json!({ "scene": "abc" })
        );
    }

    #[test]
    fn confirmation_text() {
        assert_eq!(Command::On.describe("Light 1"), "Light 1 turned on");
        assert_eq!(
            Command::Brightness(127).describe("Group 2"),
            "Group 2 bri set to 127"
        );
    }
}
