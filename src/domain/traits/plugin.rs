//! Plugin trait definitions

use async_trait::async_trait;
use std::any::Any;
use std::sync::{Arc, Weak};

use crate::application::commands::CommandRegistry;
use crate::application::errors::PluginError;
use crate::domain::entities::{
    CommandSummary, Event, FragmentKind, InvocationContext, PluginManifest, PluginState,
    Propagation, SubscriptionSpec, Suggestion,
};
use crate::infrastructure::plugins::PluginRegistry;

pub type PluginResult<T> = Result<T, PluginError>;

/// Core plugin trait that all feature modules implement
///
/// Every hook has a no-op default. Hooks and handlers are isolated by the
/// runtime: an `Err` or a panic fails only this plugin.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Name, version, description and dependencies
    fn manifest(&self) -> &PluginManifest;

    /// Used by `PluginHandle::with` for typed access from dependents
    fn as_any(&self) -> &dyn Any;

    async fn on_load(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    async fn on_enable(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    async fn on_disable(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    async fn on_unload(&self, _ctx: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    /// Event subscriptions registered when the plugin is enabled
    fn subscriptions(&self) -> Vec<SubscriptionSpec> {
        Vec::new()
    }

    /// Called for each subscription declared in `subscriptions`
    async fn handle_event(&self, _handler: &str, _event: &Event) -> PluginResult<Propagation> {
        Ok(Propagation::Continue)
    }

    /// Command fragments registered when the plugin is enabled
    fn command_fragments(&self) -> Vec<FragmentKind> {
        Vec::new()
    }

    async fn handle_command(
        &self,
        _ctx: &InvocationContext,
        command: &str,
        _subcommand_path: &[String],
    ) -> PluginResult<String> {
        Err(PluginError::Unsupported(format!("command '{}'", command)))
    }

    async fn handle_autocomplete(
        &self,
        _ctx: &InvocationContext,
        _command: &str,
        _partial: &str,
    ) -> PluginResult<Vec<Suggestion>> {
        Ok(Vec::new())
    }
}

/// Runtime services handed to a plugin's hooks
#[derive(Clone)]
pub struct PluginContext {
    name: String,
    settings: serde_json::Value,
    registry: Weak<PluginRegistry>,
    commands: Weak<CommandRegistry>,
}

impl PluginContext {
    pub fn new(
        name: impl Into<String>,
        settings: serde_json::Value,
        registry: Weak<PluginRegistry>,
        commands: Weak<CommandRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            settings,
            registry,
            commands,
        }
    }

    /// Context with no runtime behind it
    pub fn detached(name: impl Into<String>) -> Self {
        Self::new(name, serde_json::Value::Null, Weak::new(), Weak::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plugin-specific settings from the `plugins.settings` config section
    pub fn settings(&self) -> &serde_json::Value {
        &self.settings
    }

    /// Handle to another plugin, resolved by name on every access
    pub fn dependency(&self, name: &str) -> Option<PluginHandle> {
        let registry = self.registry.upgrade()?;
        if !registry.contains(name) {
            return None;
        }
        Some(PluginHandle {
            name: name.to_string(),
            registry: self.registry.clone(),
        })
    }

    /// The merged command surface
    pub fn command_summaries(&self) -> Vec<CommandSummary> {
        self.commands
            .upgrade()
            .map(|c| c.summaries())
            .unwrap_or_default()
    }
}

/// Name-based reference to a plugin; never holds the instance itself
#[derive(Clone)]
pub struct PluginHandle {
    name: String,
    registry: Weak<PluginRegistry>,
}

impl PluginHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> Option<PluginState> {
        self.registry.upgrade()?.state(&self.name)
    }

    pub fn is_enabled(&self) -> bool {
        self.state().is_some_and(|s| s.is_enabled())
    }

    /// Current instance, only while the plugin is enabled
    pub fn instance(&self) -> Option<Arc<dyn Plugin>> {
        if !self.is_enabled() {
            return None;
        }
        self.registry.upgrade()?.get(&self.name)
    }

    /// Run `f` against the current instance downcast to `T`
    pub fn with<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let instance = self.instance()?;
        instance.as_any().downcast_ref::<T>().map(f)
    }
}
