pub mod factory;

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use matrix_sdk::{
    room::Room,
    ruma::{OwnedEventId, OwnedUserId, events::room::message::OriginalSyncRoomMessageEvent},
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Everything a plugin needs to answer the message that triggered it.
#[derive(Clone)]
pub struct PluginContext {
    pub room: Room,
    /// Author of the triggering message.
    pub sender: OwnedUserId,
    /// The triggering message; replies point back at it.
    pub event_id: OwnedEventId,
}

impl core::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PluginContext")
            .field("room", &self.room.room_id())
            .field("sender", &self.sender)
            .field("event_id", &self.event_id)
            .finish_non_exhaustive()
    }
}

/// Per-message facts shared with passive plugins.
#[derive(Debug)]
pub struct RoomMessageMeta<'a> {
    pub body: Option<&'a str>,
    /// Plugins already run for this message through a command trigger.
    pub triggered_plugins: &'a HashSet<String>,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn help(&self) -> &'static str;
    fn handles_room_messages(&self) -> bool {
        false
    }
    async fn run(&self, ctx: &PluginContext, args: &str, spec: &PluginSpec) -> Result<()>;

    async fn on_room_message(
        &self,
        _ctx: &PluginContext,
        _event: &OriginalSyncRoomMessageEvent,
        _spec: &PluginSpec,
        _meta: &RoomMessageMeta<'_>,
    ) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PluginTriggers {
    #[serde(default)]
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginSpec {
    pub id: String,
    #[serde(default = "enabled_true")]
    pub enabled: bool,
    #[serde(default)]
    pub triggers: PluginTriggers,
    #[serde(default)]
    pub config: serde_yaml::Value,
}

const fn enabled_true() -> bool {
    true
}

#[derive(Clone)]
pub struct PluginEntry {
    pub spec: PluginSpec,
    pub plugin: Arc<dyn Plugin>,
}

impl core::fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PluginEntry")
            .field("spec", &self.spec)
            .field("plugin", &self.plugin.id())
            .finish()
    }
}

#[derive(Default, Debug)]
struct RegistryInner {
    by_id: HashMap<String, PluginEntry>,
    by_command: HashMap<String, String>,
}

#[derive(Clone, Default, Debug)]
pub struct PluginRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, spec: PluginSpec, plugin: Arc<dyn Plugin>) -> Option<PluginEntry> {
        let mut inner = self.inner.write().await;
        let id = spec.id.clone();
        let previous = inner.by_id.insert(
            id.clone(),
            PluginEntry {
                spec: spec.clone(),
                plugin,
            },
        );
        inner.by_command.retain(|_, existing| *existing != id);
        for cmd in &spec.triggers.commands {
            inner.by_command.insert(normalize_cmd(cmd), id.clone());
        }
        previous
    }

    pub async fn entry(&self, id: &str) -> Option<PluginEntry> {
        let inner = self.inner.read().await;
        inner.by_id.get(id).cloned()
    }

    /// Looks up a plugin by a `!command` token; matching ignores case.
    pub async fn entry_by_command(&self, token: &str) -> Option<PluginEntry> {
        let inner = self.inner.read().await;
        inner
            .by_command
            .get(&normalize_cmd(token))
            .and_then(|id| inner.by_id.get(id))
            .cloned()
    }

    pub async fn entries(&self) -> Vec<(String, PluginEntry)> {
        let inner = self.inner.read().await;
        inner
            .by_id
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }

    pub async fn commands(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut commands: Vec<String> = inner.by_command.keys().cloned().collect();
        commands.sort();
        commands
    }

    pub async fn is_enabled(&self, id: &str) -> bool {
        let inner = self.inner.read().await;
        inner.by_id.get(id).is_some_and(|entry| entry.spec.enabled)
    }
}

fn normalize_cmd(s: &str) -> String {
    let lower = s.to_lowercase();
    if lower.starts_with('!') {
        lower
    } else {
        format!("!{lower}")
    }
}

#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Noop;

    #[async_trait]
    impl Plugin for Noop {
        fn id(&self) -> &'static str {
            "noop"
        }
        fn help(&self) -> &'static str {
            ""
        }
        async fn run(&self, _ctx: &PluginContext, _args: &str, _spec: &PluginSpec) -> Result<()> {
            Ok(())
        }
    }

    fn spec(id: &str, commands: &[&str], enabled: bool) -> PluginSpec {
        PluginSpec {
            id: id.to_owned(),
            enabled,
            triggers: PluginTriggers {
                commands: commands.iter().map(|c| (*c).to_owned()).collect(),
            },
            config: serde_yaml::Value::default(),
        }
    }

    #[tokio::test]
    async fn commands_resolve_with_or_without_bang() {
        let registry = PluginRegistry::new();
        registry.register(spec("hue", &["hue"], true), Arc::new(Noop)).await;

        assert!(registry.entry_by_command("!hue").await.is_some());
        assert!(registry.entry_by_command("!HUE").await.is_some());
        assert!(registry.entry_by_command("!lights").await.is_none());
        assert_eq!(registry.commands().await, vec!["!hue".to_owned()]);
    }

    #[tokio::test]
    async fn re_register_replaces_triggers() {
        let registry = PluginRegistry::new();
        registry.register(spec("hue", &["!hue"], true), Arc::new(Noop)).await;
        let previous = registry
            .register(spec("hue", &["!lights"], false), Arc::new(Noop))
            .await;

        assert!(previous.is_some());
        assert!(registry.entry_by_command("!hue").await.is_none());
        assert!(registry.entry_by_command("!lights").await.is_some());
        assert!(!registry.is_enabled("hue").await);
        assert!(!registry.is_enabled("missing").await);
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("lümière", 3), "lüm");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
