//! Plugin runtime - wires the components together and exposes the admin surface

use serde::Serialize;
use std::sync::Arc;

use crate::application::commands::{CommandAccess, CommandRegistry, Decision, PermissionGate};
use crate::application::errors::{LifecycleError, RuntimeError};
use crate::application::events::{DispatchReport, EventRouter};
use crate::application::lifecycle::{EnableOutcome, LifecycleManager};
use crate::application::reloader::{HotReloader, ReloadReport};
use crate::domain::entities::{
    Event, InvocationContext, InvocationResult, PluginInfo, PluginState, Suggestion, User,
};
use crate::domain::traits::Store;
use crate::infrastructure::config::Config;
use crate::infrastructure::plugins::{LoadReport, PluginLoader, PluginRegistry};
use crate::infrastructure::storage::enabled_key;

/// Outcome of `start`
#[derive(Debug, Clone, Default)]
pub struct StartupReport {
    pub load: LoadReport,
    pub enabled: Vec<String>,
    /// Left disabled by configuration or a persisted flag
    pub held_back: Vec<String>,
    pub failed: Vec<String>,
}

/// Aggregated counters returned by `get_plugin_stats`
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeStats {
    pub total: usize,
    pub enabled: usize,
    pub failed: usize,
    pub reloading: usize,
    pub subscriptions: usize,
    pub commands: usize,
    pub events_handled: u64,
    pub event_failures: u64,
    pub commands_invoked: u64,
    pub command_failures: u64,
    pub reloads: u64,
    pub plugins: Vec<PluginInfo>,
}

/// The plugin runtime
pub struct PluginRuntime {
    config: Config,
    registry: Arc<PluginRegistry>,
    loader: Arc<PluginLoader>,
    router: Arc<EventRouter>,
    commands: Arc<CommandRegistry>,
    lifecycle: Arc<LifecycleManager>,
    reloader: HotReloader,
    store: Arc<dyn Store>,
}

impl PluginRuntime {
    pub fn new(config: Config, loader: PluginLoader, store: Arc<dyn Store>) -> Self {
        let registry = Arc::new(PluginRegistry::new());
        let gate = PermissionGate::from_config(&config.permissions);

        let mut router = EventRouter::new();
        let mut commands = CommandRegistry::new(registry.clone(), gate);
        if let Some(timeout) = config.runtime.handler_timeout() {
            router = router.with_timeout(timeout);
            commands = commands.with_timeout(timeout);
        }
        let router = Arc::new(router);
        let commands = Arc::new(commands);

        let mut lifecycle = LifecycleManager::new(registry.clone(), router.clone(), commands.clone())
            .with_settings(config.plugins.settings.clone());
        if let Some(timeout) = config.runtime.hook_timeout() {
            lifecycle = lifecycle.with_hook_timeout(timeout);
        }
        let lifecycle = Arc::new(lifecycle);
        let loader = Arc::new(loader);
        let reloader = HotReloader::new(registry.clone(), loader.clone(), lifecycle.clone());

        Self {
            config,
            registry,
            loader,
            router,
            commands,
            lifecycle,
            reloader,
            store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    /// Discover, instantiate, load and enable every plugin, restoring the
    /// persisted enabled flags
    pub async fn start(&self) -> StartupReport {
        let load = self.loader.load_all(&self.registry, self.loader.discover());
        let mut report = StartupReport::default();

        for name in &load.instantiated {
            if let Err(e) = self.lifecycle.load(name).await {
                tracing::error!(plugin = %name, "Load failed: {}", e);
                report.failed.push(name.clone());
            }
        }

        for name in &load.instantiated {
            if self.registry.state(name) != Some(PluginState::Loaded) {
                continue;
            }
            if !self.wants_enabled(name).await {
                tracing::info!(plugin = %name, "Leaving plugin disabled");
                report.held_back.push(name.clone());
                continue;
            }
            match self.lifecycle.enable(name).await {
                Ok(outcome) => {
                    for rejected in &outcome.rejected_fragments {
                        tracing::warn!(plugin = %name, "{}", rejected);
                    }
                    report.enabled.push(name.clone());
                }
                Err(e) => {
                    tracing::warn!(plugin = %name, "Enable failed: {}", e);
                    report.failed.push(name.clone());
                }
            }
        }

        tracing::info!(
            "{} started: {} enabled, {} held back, {} failed",
            self.config.runtime.name,
            report.enabled.len(),
            report.held_back.len(),
            report.failed.len() + load.errors.len()
        );
        report.load = load;
        report
    }

    /// Persisted flag, falling back to the configured disabled list
    async fn wants_enabled(&self, name: &str) -> bool {
        match self.store.get(&enabled_key(name)).await {
            Ok(Some(flag)) => flag != "false",
            Ok(None) => !self.config.plugins.disabled.iter().any(|d| d == name),
            Err(e) => {
                tracing::warn!(plugin = %name, "Could not read persisted flag: {}", e);
                !self.config.plugins.disabled.iter().any(|d| d == name)
            }
        }
    }

    async fn persist_enabled(&self, name: &str, enabled: bool) -> Result<(), RuntimeError> {
        self.store
            .set(&enabled_key(name), if enabled { "true" } else { "false" })
            .await?;
        Ok(())
    }

    pub fn list_plugins(&self) -> Vec<PluginInfo> {
        self.registry.list()
    }

    /// Enable one plugin (loading it first if needed) and persist the flag.
    /// Dependents are not re-enabled.
    pub async fn enable_plugin(&self, name: &str) -> Result<EnableOutcome, RuntimeError> {
        if self.registry.state(name) == Some(PluginState::Unloaded) {
            self.lifecycle.load(name).await?;
        }
        let outcome = self.lifecycle.enable(name).await?;
        self.persist_enabled(name, true).await?;
        Ok(outcome)
    }

    /// Disable a plugin and its enabled dependents; only the target's flag
    /// is persisted. Returns the dependents that were cascaded.
    pub async fn disable_plugin(&self, name: &str) -> Result<Vec<String>, RuntimeError> {
        let cascaded = self.lifecycle.disable(name).await?;
        self.persist_enabled(name, false).await?;
        Ok(cascaded)
    }

    pub async fn reload_plugin(&self, name: &str) -> Result<ReloadReport, RuntimeError> {
        Ok(self.reloader.reload(name).await?)
    }

    pub fn get_plugin_stats(&self) -> RuntimeStats {
        let plugins = self.registry.list();
        let count = |f: fn(&PluginInfo) -> bool| plugins.iter().filter(|p| f(p)).count();
        let sum = |f: fn(&PluginInfo) -> u64| plugins.iter().map(f).sum::<u64>();
        RuntimeStats {
            total: plugins.len(),
            enabled: count(|p| p.state.is_enabled()),
            failed: count(|p| p.state == PluginState::Failed),
            reloading: count(|p| p.reloading),
            subscriptions: self.router.total_subscriptions(),
            commands: self.commands.len(),
            events_handled: sum(|p| p.stats.events_handled),
            event_failures: sum(|p| p.stats.event_failures),
            commands_invoked: sum(|p| p.stats.commands_invoked),
            command_failures: sum(|p| p.stats.command_failures),
            reloads: sum(|p| p.stats.reloads),
            plugins: plugins.clone(),
        }
    }

    /// Remove a plugin from the runtime and from the discovery source
    pub async fn uninstall_plugin(&self, name: &str) -> Result<Vec<String>, RuntimeError> {
        let state = self
            .registry
            .state(name)
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))?;
        let cascaded = if state.is_enabled() {
            self.lifecycle.disable(name).await?
        } else {
            Vec::new()
        };
        if self.registry.state(name).is_some_and(|s| s.can_unload()) {
            if let Err(e) = self.lifecycle.unload(name).await {
                tracing::warn!(plugin = %name, "Unload during uninstall failed: {}", e);
            }
        }
        self.commands.forget_owner(name);
        self.registry.remove(name)?;
        self.loader.unregister(name);
        self.store.delete(&enabled_key(name)).await?;
        tracing::info!(plugin = %name, "Plugin uninstalled");
        Ok(cascaded)
    }

    /// Disable everything last-first, unload, and clear the registry
    pub async fn shutdown(&self) {
        let order = self.registry.topological_order();
        for name in order.iter().rev() {
            if self.registry.state(name).is_some_and(|s| s.is_enabled()) {
                if let Err(e) = self.lifecycle.disable_one(name).await {
                    tracing::warn!(plugin = %name, "Disable during shutdown failed: {}", e);
                }
            }
        }
        for name in order.iter().rev() {
            if self.registry.state(name).is_some_and(|s| s.can_unload()) {
                if let Err(e) = self.lifecycle.unload_inner(name).await {
                    tracing::warn!(plugin = %name, "Unload during shutdown failed: {}", e);
                }
            }
            self.commands.forget_owner(name);
        }
        let cleared = self.registry.clear();
        tracing::info!("Runtime shut down ({} plugins released)", cleared);
    }

    pub async fn dispatch(&self, event: &Event) -> DispatchReport {
        self.router.dispatch(event).await
    }

    /// Invocation context for a user, with the role from the permission config
    pub fn context_for(&self, user: User) -> InvocationContext {
        let role = self.commands.gate().role_for(&user.id);
        InvocationContext::new(user, role)
    }

    pub async fn invoke(&self, command: &str, subcommand_path: &[String], ctx: &InvocationContext) -> InvocationResult {
        self.commands.invoke(command, subcommand_path, ctx).await
    }

    pub async fn autocomplete(&self, command: &str, ctx: &InvocationContext, partial: &str) -> Vec<Suggestion> {
        self.commands.autocomplete(command, ctx, partial).await
    }

    /// Admin operations are destructive and default to `admin`
    pub fn authorize_admin(&self, ctx: &InvocationContext, action: &str) -> Decision {
        self.commands
            .gate()
            .check(ctx, &CommandAccess::destructive(format!("plugins {}", action)))
    }
}
