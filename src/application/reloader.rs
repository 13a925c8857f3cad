//! Hot reloader - rebuilds one plugin from its factory and restores its dependents

use std::sync::Arc;

use crate::application::errors::{ReloadFailure, ReloadStep};
use crate::application::lifecycle::LifecycleManager;
use crate::domain::entities::PluginState;
use crate::domain::traits::Plugin;
use crate::infrastructure::plugins::{PluginLoader, PluginRegistry};

/// Outcome of a successful reload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadReport {
    pub plugin: String,
    pub generation: u64,
    pub version: String,
    /// Dependents disabled for the swap and enabled again
    pub restored: Vec<String>,
    /// Dependents that could not be enabled again
    pub failed_dependents: Vec<String>,
}

/// Swaps a plugin instance while its name stays registered
///
/// Other components only hold the plugin's name, so once the registry has
/// the new instance every later event and command reaches it.
pub struct HotReloader {
    registry: Arc<PluginRegistry>,
    loader: Arc<PluginLoader>,
    lifecycle: Arc<LifecycleManager>,
}

impl HotReloader {
    pub fn new(registry: Arc<PluginRegistry>, loader: Arc<PluginLoader>, lifecycle: Arc<LifecycleManager>) -> Self {
        Self {
            registry,
            loader,
            lifecycle,
        }
    }

    pub async fn reload(&self, name: &str) -> Result<ReloadReport, ReloadFailure> {
        let before = self
            .registry
            .state(name)
            .ok_or_else(|| ReloadFailure::NotFound(name.to_string()))?;
        if !self.loader.contains(name) {
            return Err(ReloadFailure::NotFound(name.to_string()));
        }
        if !self.registry.set_reloading(name, true) {
            return Err(ReloadFailure::AlreadyReloading(name.to_string()));
        }
        let marked: Vec<String> = self
            .registry
            .dependents_of(name)
            .into_iter()
            .filter(|dependent| self.registry.set_reloading(dependent, true))
            .collect();

        tracing::info!(plugin = %name, state = %before, "Reloading plugin");
        let result = self.swap(name, before).await;

        for dependent in &marked {
            self.registry.set_reloading(dependent, false);
        }
        self.registry.set_reloading(name, false);

        match &result {
            Ok(report) => tracing::info!(
                plugin = %name,
                generation = report.generation,
                restored = report.restored.len(),
                "Reload complete"
            ),
            Err(e) => tracing::error!(plugin = %name, "{}", e),
        }
        result
    }

    async fn swap(&self, name: &str, before: PluginState) -> Result<ReloadReport, ReloadFailure> {
        let was_enabled = before.is_enabled();

        // Tear down: dependents last-first, then the plugin itself
        let cascaded = self.lifecycle.disable_dependents(name).await;
        if was_enabled {
            if let Err(e) = self.lifecycle.disable_one(name).await {
                tracing::warn!(plugin = %name, "Disable during reload failed: {}", e);
            }
        }
        let previous = self.registry.get(name);
        self.discard(name).await;

        // Rebuild from the factory
        let fresh = match self.loader.instantiate(name) {
            Ok(plugin) => plugin,
            Err(e) => {
                return self
                    .rollback(name, previous, was_enabled, &cascaded, ReloadStep::Instantiate, e.kind.to_string())
                    .await
            }
        };
        let generation = self
            .registry
            .install(name, fresh)
            .map_err(|_| ReloadFailure::NotFound(name.to_string()))?;

        if let Err(e) = self.lifecycle.load_inner(name).await {
            return self
                .rollback(name, previous, was_enabled, &cascaded, ReloadStep::Load, e.to_string())
                .await;
        }
        if was_enabled {
            if let Err(e) = self.lifecycle.enable_inner(name).await {
                return self
                    .rollback(name, previous, was_enabled, &cascaded, ReloadStep::Enable, e.to_string())
                    .await;
            }
        }

        let restore = self.lifecycle.restore(&cascaded).await;
        self.registry.record_reload(name);
        let version = self
            .registry
            .descriptor(name)
            .map(|d| d.version().to_string())
            .unwrap_or_default();

        Ok(ReloadReport {
            plugin: name.to_string(),
            generation,
            version,
            restored: restore.restored,
            failed_dependents: restore.failed,
        })
    }

    /// Unload whatever instance is installed and leave the plugin `Unloaded`
    async fn discard(&self, name: &str) {
        let state = self.registry.state(name).unwrap_or(PluginState::Unloaded);
        if state.can_unload() {
            if let Err(e) = self.lifecycle.unload_inner(name).await {
                tracing::warn!(plugin = %name, "Unload during reload failed: {}", e);
            }
        }
        let _ = self.registry.set_instance(name, None);
        let _ = self.registry.set_state(name, PluginState::Unloaded);
    }

    /// Put the previous instance back in service after a failed step
    async fn rollback(
        &self,
        name: &str,
        previous: Option<Arc<dyn Plugin>>,
        was_enabled: bool,
        cascaded: &[String],
        step: ReloadStep,
        reason: String,
    ) -> Result<ReloadReport, ReloadFailure> {
        tracing::warn!(plugin = %name, step = %step, "Reload step failed, rolling back: {}", reason);
        self.discard(name).await;

        let Some(previous) = previous else {
            // Nothing was running before; the plugin stays failed
            self.registry.fail(name, reason.clone());
            return Err(ReloadFailure::StepFailed {
                plugin: name.to_string(),
                step,
                reason,
                restored: Vec::new(),
            });
        };

        let _ = self.registry.set_instance(name, Some(previous));
        let mut restored = self.lifecycle.load_inner(name).await;
        if restored.is_ok() && was_enabled {
            restored = self.lifecycle.enable_inner(name).await.map(|_| ());
        }

        if let Err(e) = restored {
            // Fail safe: park the plugin Disabled alongside its stranded dependents
            let reason = format!("{}; rollback: {}", reason, e);
            let _ = self.registry.set_state(name, PluginState::Disabled);
            self.registry.note_error(name, reason.clone());
            tracing::error!(plugin = %name, stranded = ?cascaded, "Rollback failed, manual intervention required");
            return Err(ReloadFailure::RollbackFailed {
                plugin: name.to_string(),
                reason,
                stranded: cascaded.to_vec(),
            });
        }

        let outcome = self.lifecycle.restore(cascaded).await;
        self.registry.note_error(name, format!("reload failed at {}: {}", step, reason));
        Err(ReloadFailure::StepFailed {
            plugin: name.to_string(),
            step,
            reason,
            restored: outcome.restored,
        })
    }
}
