use std::sync::Arc;

use crate::{Plugin, PluginSpec};

/// Builds a plugin and describes how it is registered when the config does
/// not mention it.
pub trait PluginFactory {
    /// Appends the plugin's default spec (id, triggers) unless `specs`
    /// already carries one with the same id.
    fn register_defaults(&self, specs: &mut Vec<PluginSpec>);

    /// Builds the plugin instance. Configuration is read later from the
    /// registered spec.
    #[must_use]
    fn build(&self) -> Arc<dyn Plugin + Send + Sync>;
}
