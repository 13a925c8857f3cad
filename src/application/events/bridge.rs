//! Adapter routing router callbacks into plugin instances by name

use async_trait::async_trait;
use std::sync::Arc;

use crate::application::errors::PluginError;
use crate::application::guard::guarded;
use crate::domain::entities::{Event, Propagation};
use crate::infrastructure::plugins::PluginRegistry;
use super::router::EventHandler;

/// Event handler bound to a plugin *name*, not an instance
///
/// The instance is looked up on each dispatch, so a hot-reloaded plugin
/// receives events on its new instance without re-subscribing.
pub struct PluginEventHandler {
    plugin: String,
    handler: String,
    registry: Arc<PluginRegistry>,
}

impl PluginEventHandler {
    pub fn new(plugin: impl Into<String>, handler: impl Into<String>, registry: Arc<PluginRegistry>) -> Self {
        Self {
            plugin: plugin.into(),
            handler: handler.into(),
            registry,
        }
    }
}

#[async_trait]
impl EventHandler for PluginEventHandler {
    async fn handle(&self, event: &Event) -> Result<Propagation, PluginError> {
        let enabled = self.registry.state(&self.plugin).is_some_and(|s| s.is_enabled());
        let Some(instance) = self.registry.get(&self.plugin).filter(|_| enabled) else {
            return Ok(Propagation::Continue);
        };
        let result = guarded(&self.plugin, "event handler", None, instance.handle_event(&self.handler, event)).await;
        self.registry.record_event(&self.plugin, result.is_ok());
        result
    }
}
