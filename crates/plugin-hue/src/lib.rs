pub mod commands;
pub mod controller;
pub mod keyboard;
pub mod sender;
pub mod session;

use core::time::Duration;
use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow};
use async_trait::async_trait;
use hue_client::{DEFAULT_TIMEOUT, HueBridge};
use matrix_sdk::ruma::events::room::message::OriginalSyncRoomMessageEvent;
use plugin_core::factory::PluginFactory;
use plugin_core::{Plugin, PluginContext, PluginSpec, PluginTriggers, RoomMessageMeta};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

pub use commands::{CommandSpec, CommandTable};
pub use controller::{Controller, Conversation};
pub use sender::{MatrixSender, MessageSender, Reply, ReplyBody};
pub use session::{FlowState, ResourceKind, Session, SessionStore};

const PLUGIN_ID: &str = "hue";

#[derive(Debug)]
pub struct HuePlugin;

impl PluginFactory for HuePlugin {
    fn register_defaults(&self, specs: &mut Vec<PluginSpec>) {
        if !specs.iter().any(|s| s.id == PLUGIN_ID) {
            specs.push(PluginSpec {
                id: PLUGIN_ID.to_owned(),
                enabled: true,
                triggers: PluginTriggers {
                    commands: vec!["!hue".to_owned()],
                },
                config: serde_yaml::Value::default(),
            });
        }
    }

    fn build(&self) -> Arc<dyn Plugin + Send + Sync> {
        Arc::new(Hue::default())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HueConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub commands: Option<serde_yaml::Value>,
}

impl HueConfig {
    /// # Errors
    ///
    /// Fails if the plugin config section is not a valid hue config.
    pub fn from_spec(spec: &PluginSpec) -> Result<Self> {
        if spec.config.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(spec.config.clone()).context("parsing hue plugin config")
    }

    fn bridge_setting(value: Option<&str>, env_key: &str) -> Option<String> {
        value
            .map(str::to_owned)
            .or_else(|| std::env::var(env_key).ok())
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    }

    fn host(&self) -> Option<String> {
        Self::bridge_setting(self.bridge.host.as_deref(), "HUE_BRIDGE_HOST")
    }

    fn user(&self) -> Option<String> {
        Self::bridge_setting(self.bridge.user.as_deref(), "HUE_BRIDGE_USER")
    }

    fn timeout(&self) -> Duration {
        self.bridge
            .timeout_secs
            .map_or(DEFAULT_TIMEOUT, Duration::from_secs)
    }
}

/// Guided light/group/scene control, started with `!hue`.
#[derive(Default, Debug)]
pub struct Hue {
    controller: RwLock<Option<Arc<Controller>>>,
}

impl Hue {
    async fn ensure_controller(&self, spec: &PluginSpec) -> Result<Arc<Controller>> {
        if let Some(controller) = self.controller.read().await.clone() {
            return Ok(controller);
        }
        let mut guard = self.controller.write().await;
        if let Some(controller) = guard.clone() {
            return Ok(controller);
        }

        let config = HueConfig::from_spec(spec)?;
        let host = config.host().ok_or_else(|| {
            anyhow!("hue bridge host not configured (bridge.host or HUE_BRIDGE_HOST)")
        })?;
        let user = config.user().ok_or_else(|| {
            anyhow!("hue bridge user not configured (bridge.user or HUE_BRIDGE_USER)")
        })?;
        let commands = CommandTable::from_config(config.commands.as_ref())?;
        let bridge = HueBridge::new(&host, &user, config.timeout()).context("building hue client")?;
        info!(host = %host, "Hue bridge configured");

        let controller = Arc::new(Controller::new(Arc::new(bridge), Arc::new(commands)));
        *guard = Some(Arc::clone(&controller));
        drop(guard);
        Ok(controller)
    }

    async fn current_controller(&self) -> Option<Arc<Controller>> {
        self.controller.read().await.clone()
    }
}

#[async_trait]
impl Plugin for Hue {
    fn id(&self) -> &'static str {
        PLUGIN_ID
    }

    fn help(&self) -> &'static str {
        "Control lights, groups and scenes: `!hue [lights|groups|scenes]`. \
         Reply `cancel` to stop."
    }

    fn handles_room_messages(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &PluginContext, args: &str, spec: &PluginSpec) -> Result<()> {
        let sender = MatrixSender::new(ctx.room.clone(), ctx.event_id.clone(), ctx.sender.clone());
        if args.trim().eq_ignore_ascii_case("help") {
            return sender.send(Reply::text(self.help())).await;
        }
        let controller = self.ensure_controller(spec).await?;
        controller
            .conversation(ctx.sender.as_str(), &sender)
            .start(args)
            .await;
        Ok(())
    }

    async fn on_room_message(
        &self,
        ctx: &PluginContext,
        _event: &OriginalSyncRoomMessageEvent,
        _spec: &PluginSpec,
        meta: &RoomMessageMeta<'_>,
    ) -> Result<()> {
        if meta.triggered_plugins.contains(self.id()) {
            return Ok(());
        }
        let Some(body) = meta.body else {
            return Ok(());
        };
        // No controller yet means nobody has started a flow.
        let Some(controller) = self.current_controller().await else {
            return Ok(());
        };
        if !controller.has_session(ctx.sender.as_str()) {
            return Ok(());
        }

        let sender = MatrixSender::new(ctx.room.clone(), ctx.event_id.clone(), ctx.sender.clone());
        controller
            .conversation(ctx.sender.as_str(), &sender)
            .handle_input(body)
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_with(config: &str) -> PluginSpec {
        PluginSpec {
            id: PLUGIN_ID.to_owned(),
            enabled: true,
            triggers: PluginTriggers::default(),
            config: serde_yaml::from_str(config).unwrap(),
        }
    }

    #[test]
    fn defaults_register_once() {
        let mut specs = Vec::new();
        HuePlugin.register_defaults(&mut specs);
        HuePlugin.register_defaults(&mut specs);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].triggers.commands, vec!["!hue".to_owned()]);
    }

    #[test]
    fn config_reads_bridge_section() {
        let spec = spec_with(
            "bridge:\n  host: 10.0.0.2\n  user: secret\n  timeout_secs: 3\n\
             commands:\n  light:\n    - name: \"off\"\n",
        );
        let config = HueConfig::from_spec(&spec).unwrap();
        assert_eq!(config.host().as_deref(), Some("10.0.0.2"));
        assert_eq!(config.user().as_deref(), Some("secret"));
        assert_eq!(config.timeout(), Duration::from_secs(3));

        let table = CommandTable::from_config(config.commands.as_ref()).unwrap();
        assert_eq!(table.light.len(), 1);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = HueConfig::from_spec(&spec_with("~")).unwrap();
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        assert!(config.commands.is_none());
    }

    #[tokio::test]
    async fn configured_bridge_builds_controller_once() {
        let hue = Hue::default();
        let spec = spec_with("bridge:\n  host: 10.0.0.2\n  user: secret\n");
        assert!(hue.current_controller().await.is_none());

        let first = hue.ensure_controller(&spec).await.unwrap();
        let second = hue.ensure_controller(&spec).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
