//! Plugin registry - In-memory table of plugin descriptors and instances

use chrono::Utc;
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::application::errors::RegistryError;
use crate::domain::entities::{PluginDescriptor, PluginInfo, PluginManifest, PluginState, PluginStats};
use crate::domain::traits::Plugin;

struct PluginEntry {
    descriptor: PluginDescriptor,
    instance: Option<Arc<dyn Plugin>>,
    reloading: bool,
    stats: PluginStats,
}

/// Registry for plugin descriptors and the instances it exclusively owns
///
/// Other components refer to plugins by name and look the instance up on
/// every call, so swapping an instance here is observed everywhere.
pub struct PluginRegistry {
    plugins: RwLock<IndexMap<String, PluginEntry>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: RwLock::new(IndexMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, PluginEntry>> {
        self.plugins.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, PluginEntry>> {
        self.plugins.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a discovered plugin; names are unique
    pub fn insert(&self, descriptor: PluginDescriptor) -> Result<(), RegistryError> {
        let mut plugins = self.write();
        let name = descriptor.name().to_string();
        if plugins.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        plugins.insert(
            name,
            PluginEntry {
                descriptor,
                instance: None,
                reloading: false,
                stats: PluginStats::default(),
            },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Get the current instance of a plugin
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.read().get(name)?.instance.clone()
    }

    pub fn descriptor(&self, name: &str) -> Option<PluginDescriptor> {
        self.read().get(name).map(|e| e.descriptor.clone())
    }

    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.read().values().map(|e| e.descriptor.clone()).collect()
    }

    pub fn state(&self, name: &str) -> Option<PluginState> {
        self.read().get(name).map(|e| e.descriptor.state)
    }

    pub fn set_state(&self, name: &str, state: PluginState) -> Result<(), RegistryError> {
        let mut plugins = self.write();
        let entry = plugins
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        tracing::debug!(plugin = %name, from = %entry.descriptor.state, to = %state, "State transition");
        entry.descriptor.state = state;
        if state == PluginState::Loaded {
            entry.descriptor.loaded_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Mark a plugin failed and remember why
    pub fn fail(&self, name: &str, reason: impl Into<String>) {
        if let Some(entry) = self.write().get_mut(name) {
            entry.descriptor.state = PluginState::Failed;
            entry.descriptor.last_error = Some(reason.into());
        }
    }

    /// Remember an error without changing state
    pub fn note_error(&self, name: &str, reason: impl Into<String>) {
        if let Some(entry) = self.write().get_mut(name) {
            entry.descriptor.last_error = Some(reason.into());
        }
    }

    /// Replace the instance without touching the generation; returns the previous one
    pub fn set_instance(
        &self,
        name: &str,
        instance: Option<Arc<dyn Plugin>>,
    ) -> Result<Option<Arc<dyn Plugin>>, RegistryError> {
        let mut plugins = self.write();
        let entry = plugins
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        if let Some(ref plugin) = instance {
            entry.descriptor.manifest.version = plugin.manifest().version.clone();
        }
        Ok(std::mem::replace(&mut entry.instance, instance))
    }

    /// Install a freshly constructed instance, bumping the generation and
    /// refreshing metadata from its manifest
    pub fn install(&self, name: &str, instance: Arc<dyn Plugin>) -> Result<u64, RegistryError> {
        let mut plugins = self.write();
        let entry = plugins
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let manifest: &PluginManifest = instance.manifest();
        entry.descriptor.manifest.version = manifest.version.clone();
        entry.descriptor.manifest.description = manifest.description.clone();
        entry.descriptor.generation += 1;
        entry.descriptor.last_error = None;
        entry.instance = Some(instance);
        Ok(entry.descriptor.generation)
    }

    /// Set or clear the reloading flag; returns false if it was already in that state
    pub fn set_reloading(&self, name: &str, reloading: bool) -> bool {
        match self.write().get_mut(name) {
            Some(entry) if entry.reloading != reloading => {
                entry.reloading = reloading;
                true
            }
            _ => false,
        }
    }

    pub fn is_reloading(&self, name: &str) -> bool {
        self.read().get(name).is_some_and(|e| e.reloading)
    }

    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn remove(&self, name: &str) -> Result<PluginDescriptor, RegistryError> {
        self.write()
            .shift_remove(name)
            .map(|e| {
                tracing::info!("Removed plugin: {}", name);
                e.descriptor
            })
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Drop every descriptor and instance
    pub fn clear(&self) -> usize {
        let mut plugins = self.write();
        let count = plugins.len();
        plugins.clear();
        count
    }

    /// Get the number of registered plugins
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Plugins that hard-depend on `name`, transitively, in forward
    /// dependency order (a plugin appears after everything it depends on)
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        let plugins = self.read();
        let mut found: HashSet<String> = HashSet::new();
        let mut queue = VecDeque::from([name.to_string()]);
        while let Some(current) = queue.pop_front() {
            for (candidate, entry) in plugins.iter() {
                if entry.descriptor.dependencies().iter().any(|d| *d == current)
                    && candidate != name
                    && found.insert(candidate.clone())
                {
                    queue.push_back(candidate.clone());
                }
            }
        }
        drop(plugins);
        self.topological_order()
            .into_iter()
            .filter(|n| found.contains(n))
            .collect()
    }

    /// All registered plugins, dependencies before dependents; ties keep
    /// registration order. Members of cycles are appended last.
    pub fn topological_order(&self) -> Vec<String> {
        let plugins = self.read();
        let mut placed: Vec<String> = Vec::with_capacity(plugins.len());
        let mut placed_set: HashSet<&str> = HashSet::new();
        loop {
            let ready: Vec<&String> = plugins
                .iter()
                .filter(|(name, _)| !placed_set.contains(name.as_str()))
                .filter(|(_, entry)| {
                    entry
                        .descriptor
                        .dependencies()
                        .iter()
                        .all(|d| placed_set.contains(d.as_str()) || !plugins.contains_key(d))
                })
                .map(|(name, _)| name)
                .collect();
            if ready.is_empty() {
                break;
            }
            for name in ready {
                placed_set.insert(name.as_str());
                placed.push(name.clone());
            }
        }
        for name in plugins.keys() {
            if !placed_set.contains(name.as_str()) {
                placed.push(name.clone());
            }
        }
        placed
    }

    pub fn record_event(&self, name: &str, ok: bool) {
        if let Some(entry) = self.write().get_mut(name) {
            entry.stats.events_handled += 1;
            if !ok {
                entry.stats.event_failures += 1;
            }
        }
    }

    pub fn record_command(&self, name: &str, ok: bool) {
        if let Some(entry) = self.write().get_mut(name) {
            entry.stats.commands_invoked += 1;
            if !ok {
                entry.stats.command_failures += 1;
            }
        }
    }

    pub fn record_reload(&self, name: &str) {
        if let Some(entry) = self.write().get_mut(name) {
            entry.stats.reloads += 1;
        }
    }

    pub fn info(&self, name: &str) -> Option<PluginInfo> {
        self.read().get(name).map(Self::to_info)
    }

    /// Listing of all plugins in registration order
    pub fn list(&self) -> Vec<PluginInfo> {
        self.read().values().map(Self::to_info).collect()
    }

    fn to_info(entry: &PluginEntry) -> PluginInfo {
        let d = &entry.descriptor;
        PluginInfo {
            name: d.manifest.name.clone(),
            version: d.manifest.version.clone(),
            description: d.manifest.description.clone(),
            state: d.state,
            generation: d.generation,
            dependencies: d.manifest.dependencies.clone(),
            optional_dependencies: d.manifest.optional_dependencies.clone(),
            reloading: entry.reloading,
            loaded_at: d.loaded_at,
            last_error: d.last_error.clone(),
            stats: entry.stats.clone(),
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, deps: &[&str]) -> PluginDescriptor {
        let mut manifest = PluginManifest::new(name, "1.0.0");
        for dep in deps {
            manifest = manifest.depends_on(*dep);
        }
        PluginDescriptor::new(manifest)
    }

    #[test]
    fn names_are_unique() {
        let registry = PluginRegistry::new();
        registry.insert(descriptor("a", &[])).unwrap();
        assert_eq!(
            registry.insert(descriptor("a", &[])),
            Err(RegistryError::Duplicate("a".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn dependents_are_transitive_and_ordered() {
        let registry = PluginRegistry::new();
        registry.insert(descriptor("c", &["b"])).unwrap();
        registry.insert(descriptor("a", &[])).unwrap();
        registry.insert(descriptor("b", &["a"])).unwrap();
        registry.insert(descriptor("x", &[])).unwrap();

        assert_eq!(registry.dependents_of("a"), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(registry.dependents_of("c"), Vec::<String>::new());
        assert_eq!(
            registry.topological_order(),
            vec!["a".to_string(), "x".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn reloading_flag_toggles_once() {
        let registry = PluginRegistry::new();
        registry.insert(descriptor("a", &[])).unwrap();
        assert!(registry.set_reloading("a", true));
        assert!(!registry.set_reloading("a", true));
        assert!(registry.is_reloading("a"));
        assert!(registry.set_reloading("a", false));
        assert!(!registry.set_reloading("missing", true));
    }

    #[test]
    fn fail_records_reason() {
        let registry = PluginRegistry::new();
        registry.insert(descriptor("a", &[])).unwrap();
        registry.fail("a", "boom");
        let info = registry.info("a").unwrap();
        assert_eq!(info.state, PluginState::Failed);
        assert_eq!(info.last_error.as_deref(), Some("boom"));
    }
}
