use std::{collections::HashMap, path::Path, sync::Arc};

use plugin_core::{Plugin, PluginRegistry, factory::PluginFactory};
use tracing::{info, warn};

use crate::BotConfig;

fn factories() -> Vec<Box<dyn PluginFactory>> {
    vec![Box::new(plugin_hue::HuePlugin)]
}

pub async fn build_registry(config: &BotConfig, plugins_dir: &Path) -> Arc<PluginRegistry> {
    let mut specs = config.plugins.clone().unwrap_or_default();
    let mut plugins: HashMap<&'static str, Arc<dyn Plugin + Send + Sync>> = HashMap::new();
    for factory in factories() {
        factory.register_defaults(&mut specs);
        let plugin = factory.build();
        plugins.insert(plugin.id(), plugin);
    }

    let registry = Arc::new(PluginRegistry::new());
    for mut spec in specs {
        let Some(plugin) = plugins.get(spec.id.as_str()) else {
            warn!("Unknown plugin ID: {}", spec.id);
            continue;
        };
        if let Some(file_cfg) = load_plugin_config(plugins_dir, &spec.id) {
            spec.config = merge_yaml(file_cfg, spec.config);
        }
        info!(
            plugin = %spec.id,
            enabled = spec.enabled,
            commands = ?spec.triggers.commands,
            "Registering plugin"
        );
        let plugin: Arc<dyn Plugin + Send + Sync> = Arc::clone(plugin);
        registry.register(spec, plugin).await;
    }

    registry
}

/// Deep-merges two YAML values; mappings merge key by key and `file_cfg`
/// wins on scalar conflicts.
fn merge_yaml(file_cfg: serde_yaml::Value, spec_cfg: serde_yaml::Value) -> serde_yaml::Value {
    use serde_yaml::Value::{Mapping, Null};
    match (file_cfg, spec_cfg) {
        (Mapping(mut a), Mapping(b)) => {
            for (k, v_b) in b {
                match a.get_mut(&k) {
                    Some(v_a) => {
                        *v_a = merge_yaml(core::mem::take(v_a), v_b);
                    }
                    None => {
                        a.insert(k, v_b);
                    }
                }
            }
            Mapping(a)
        }
        (Null, b) => b,
        (a, _b) => a,
    }
}

fn load_plugin_config(root: &Path, id: &str) -> Option<serde_yaml::Value> {
    let path = root.join(id).join("config.yaml");
    match std::fs::read_to_string(&path) {
        Ok(s) => match serde_yaml::from_str::<serde_yaml::Value>(&s) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(
                    plugin = %id,
                    file = %path.display(),
                    error = %e,
                    "Failed to parse plugin config YAML"
                );
                None
            }
        },
        Err(e) => {
            if path.exists() {
                warn!(
                    plugin = %id,
                    file = %path.display(),
                    error = %e,
                    "Failed to read plugin config file"
                );
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn yaml(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn merge_prefers_file_scalars_and_keeps_spec_keys() {
        let merged = merge_yaml(
            yaml("bridge:\n  host: 10.0.0.9\n"),
            yaml("bridge:\n  host: 10.0.0.2\n  user: abc\n"),
        );
        assert_eq!(
            merged,
            yaml("bridge:\n  host: 10.0.0.9\n  user: abc\n")
        );
        assert_eq!(merge_yaml(serde_yaml::Value::Null, yaml("a: 1")), yaml("a: 1"));
    }

    #[test]
    fn plugin_config_is_read_from_plugin_dir() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("hue")).unwrap();
        fs::write(tmp.path().join("hue/config.yaml"), "bridge:\n  user: abc\n").unwrap();

        assert_eq!(
            load_plugin_config(tmp.path(), "hue"),
            Some(yaml("bridge:\n  user: abc\n"))
        );
        assert_eq!(load_plugin_config(tmp.path(), "missing"), None);
    }

    #[tokio::test]
    async fn hue_is_registered_by_default() {
        let tmp = TempDir::new().unwrap();
        let config: BotConfig = serde_yaml::from_str("plugins: []").unwrap();
        let registry = build_registry(&config, tmp.path()).await;

        let entry = registry.entry_by_command("!hue").await.unwrap();
        assert_eq!(entry.spec.id, "hue");
        assert!(registry.is_enabled("hue").await);
    }

    #[tokio::test]
    async fn configured_spec_overrides_defaults() {
        let tmp = TempDir::new().unwrap();
        let config: BotConfig = serde_yaml::from_str(
            "plugins:\n  - id: hue\n    triggers:\n      commands: [\"!lights\"]\n  - id: nope\n",
        )
        .unwrap();
        let registry = build_registry(&config, tmp.path()).await;

        assert!(registry.entry_by_command("!lights").await.is_some());
        assert!(registry.entry_by_command("!hue").await.is_none());
        assert!(registry.entry("nope").await.is_none());
    }
}
