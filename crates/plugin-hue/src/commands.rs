use anyhow::{Context as _, Result};
use hue_client::Command;
use serde::{Deserialize, Serialize};

use crate::session::ResourceKind;

/// One selectable command and the values offered for it. Commands without
/// values (`on`, `off`) are applied as soon as they are picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl CommandSpec {
    fn new(name: &str, values: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            values: values.iter().map(|v| (*v).to_owned()).collect(),
        }
    }

    /// The offered value matching `value`, ignoring case.
    #[must_use]
    pub fn value(&self, value: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.eq_ignore_ascii_case(value.trim()))
            .map(String::as_str)
    }

    /// The command line sent to the bridge for `value`.
    #[must_use]
    pub fn line(&self, value: Option<&str>) -> String {
        value.map_or_else(|| self.name.clone(), |v| format!("{} {v}", self.name))
    }
}

/// Read-only table of commands per resource kind, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTable {
    #[serde(default = "default_commands")]
    pub light: Vec<CommandSpec>,
    #[serde(default = "default_commands")]
    pub group: Vec<CommandSpec>,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self {
            light: default_commands(),
            group: default_commands(),
        }
    }
}

fn default_commands() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("on", &[]),
        CommandSpec::new("off", &[]),
        CommandSpec::new("bri", &["1", "64", "127", "191", "254"]),
        CommandSpec::new("hue", &["0", "10000", "25500", "46920", "56100"]),
        CommandSpec::new("sat", &["0", "127", "254"]),
        CommandSpec::new("ct", &["153", "250", "370", "500"]),
        CommandSpec::new("alert", &["select", "lselect", "none"]),
        CommandSpec::new("effect", &["colorloop", "none"]),
    ]
}

impl CommandTable {
    /// Builds the table from the `commands:` section of the plugin config.
    /// A missing section yields the defaults; a missing kind inside it
    /// yields that kind's defaults.
    ///
    /// # Errors
    ///
    /// Fails when the section does not parse or names a command/value the
    /// bridge client cannot send.
    pub fn from_config(section: Option<&serde_yaml::Value>) -> Result<Self> {
        let table = match section {
            Some(value) if !value.is_null() => serde_yaml::from_value::<Self>(value.clone())
                .context("parsing hue commands table")?,
            _ => Self::default(),
        };
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<()> {
        for kind in [ResourceKind::Light, ResourceKind::Group] {
            for spec in self.commands(kind) {
                if spec.values.is_empty() {
                    Command::parse(&spec.name)
                        .with_context(|| format!("{kind} command `{}`", spec.name))?;
                }
                for value in &spec.values {
                    Command::parse(&spec.line(Some(value)))
                        .with_context(|| format!("{kind} command `{}`", spec.name))?;
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn commands(&self, kind: ResourceKind) -> &[CommandSpec] {
        match kind {
            ResourceKind::Light => &self.light,
            ResourceKind::Group => &self.group,
        }
    }

    #[must_use]
    pub fn lookup(&self, kind: ResourceKind, command: &str) -> Option<&CommandSpec> {
        self.commands(kind)
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(command.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_ordered() {
        let table = CommandTable::from_config(None).unwrap();
        let names: Vec<_> = table
            .commands(ResourceKind::Light)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names[..3], ["on", "off", "bri"]);
        let bri = table.lookup(ResourceKind::Group, "BRI").unwrap();
        assert_eq!(bri.value("127"), Some("127"));
        assert_eq!(bri.value("128"), None);
        assert_eq!(
            table.lookup(ResourceKind::Light, "effect").unwrap().value("ColorLoop"),
            Some("colorloop")
        );
        assert!(table.lookup(ResourceKind::Light, "dance").is_none());
    }

    #[test]
    fn partial_config_keeps_other_kind_defaults() {
        let yaml: serde_yaml::Value = serde_yaml::from_str(
            "light:\n  - name: \"on\"\n  - name: bri\n    values: [\"10\", \"20\"]\n",
        )
        .unwrap();
        let table = CommandTable::from_config(Some(&yaml)).unwrap();

        assert_eq!(table.light.len(), 2);
        assert_eq!(table.lookup(ResourceKind::Light, "bri").unwrap().values, ["10", "20"]);
        assert_eq!(table.group, default_commands());
    }

    #[test]
    fn unsendable_values_are_rejected() {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str("group:\n  - name: bri\n    values: [\"999\"]\n").unwrap();
        assert!(CommandTable::from_config(Some(&yaml)).is_err());
    }

    #[test]
    fn command_line_joins_value() {
        let spec = CommandSpec::new("bri", &["127"]);
        assert_eq!(spec.line(Some("127")), "bri 127");
        assert_eq!(CommandSpec::new("on", &[]).line(None), "on");
    }
}
