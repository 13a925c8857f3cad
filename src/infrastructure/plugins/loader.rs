//! Plugin loader - Discovers plugins from a factory table and computes a safe load order
//!
//! Plugins are compiled in; "loading" a plugin means invoking its registered
//! constructor. Reloading invokes the same constructor again.

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use crate::application::errors::{LoadErrorKind, PluginError, PluginLoadError, RegistryError};
use crate::application::guard::panic_message;
use crate::domain::entities::{PluginDescriptor, PluginManifest};
use crate::domain::traits::{Plugin, PluginResult};
use super::registry::PluginRegistry;

/// Constructor registered for a plugin
pub type PluginFactory = Arc<dyn Fn() -> PluginResult<Arc<dyn Plugin>> + Send + Sync>;

#[derive(Clone)]
struct FactoryEntry {
    manifest: PluginManifest,
    factory: PluginFactory,
}

/// Load order computed from a set of descriptors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadPlan {
    /// Dependencies before dependents
    pub order: Vec<String>,
    pub excluded: Vec<PluginLoadError>,
}

/// Result of `load_all`
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Order in which instantiation was attempted
    pub order: Vec<String>,
    pub instantiated: Vec<String>,
    pub errors: Vec<PluginLoadError>,
}

impl LoadReport {
    pub fn failed(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.plugin.as_str()).collect()
    }
}

/// Plugin loader
pub struct PluginLoader {
    factories: RwLock<IndexMap<String, FactoryEntry>>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(IndexMap::new()),
        }
    }

    /// Add a plugin constructor to the discovery source
    pub fn register<F>(&self, manifest: PluginManifest, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> PluginResult<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        if factories.contains_key(&manifest.name) {
            return Err(RegistryError::Duplicate(manifest.name));
        }
        tracing::debug!("Registered plugin factory: {} v{}", manifest.name, manifest.version);
        factories.insert(
            manifest.name.clone(),
            FactoryEntry {
                manifest,
                factory: Arc::new(factory),
            },
        );
        Ok(())
    }

    /// Builder-style `register` for assembling a catalog
    pub fn with<F>(self, manifest: PluginManifest, factory: F) -> Self
    where
        F: Fn() -> PluginResult<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        if let Err(e) = self.register(manifest, factory) {
            tracing::warn!("Ignoring plugin factory: {}", e);
        }
        self
    }

    /// Remove a plugin from the discovery source
    pub fn unregister(&self, name: &str) -> bool {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(name)
            .is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Enumerate available plugins, in registration order
    pub fn discover(&self) -> Vec<PluginDescriptor> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|e| PluginDescriptor::new(e.manifest.clone()))
            .collect()
    }

    /// Compute a load order; cyclic plugins, plugins with missing
    /// dependencies and anything depending on them are excluded.
    pub fn plan(&self, descriptors: &[PluginDescriptor]) -> LoadPlan {
        let mut excluded = Vec::new();
        let mut available: IndexMap<&str, &PluginDescriptor> =
            descriptors.iter().map(|d| (d.name(), d)).collect();

        // Missing dependencies, propagated until nothing changes
        loop {
            let missing: Vec<(String, String)> = available
                .values()
                .filter_map(|d| {
                    d.dependencies()
                        .iter()
                        .find(|dep| !available.contains_key(dep.as_str()))
                        .map(|dep| (d.name().to_string(), dep.clone()))
                })
                .collect();
            if missing.is_empty() {
                break;
            }
            for (plugin, dependency) in missing {
                tracing::warn!(plugin = %plugin, dependency = %dependency, "Excluding plugin with missing dependency");
                available.shift_remove(plugin.as_str());
                excluded.push(PluginLoadError::new(
                    plugin,
                    LoadErrorKind::MissingDependency { dependency },
                ));
            }
        }

        // Kahn's algorithm; the queue is seeded in discovery order
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for (&name, d) in available.iter() {
            let deps: HashSet<&str> = d.dependencies().iter().map(|s| s.as_str()).collect();
            in_degree.insert(name, deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(name);
            }
        }
        let mut queue: VecDeque<&str> = available
            .keys()
            .copied()
            .filter(|n| in_degree.get(n) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(available.len());
        while let Some(name) = queue.pop_front() {
            order.push(name.to_string());
            for dependent in dependents.get(name).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }

        let placed: HashSet<&str> = order.iter().map(|s| s.as_str()).collect();
        let stuck: Vec<&str> = available
            .keys()
            .copied()
            .filter(|n| !placed.contains(n))
            .collect();
        for name in &stuck {
            let kind = match find_cycle(name, &available, &placed) {
                Some(cycle) => LoadErrorKind::CyclicDependency { cycle },
                None => {
                    let dependency = available
                        .get(*name)
                        .and_then(|d| {
                            d.dependencies()
                                .iter()
                                .find(|dep| !placed.contains(dep.as_str()))
                                .cloned()
                        })
                        .unwrap_or_default();
                    LoadErrorKind::MissingDependency { dependency }
                }
            };
            tracing::warn!(plugin = %name, "Excluding plugin: {}", kind);
            excluded.push(PluginLoadError::new(*name, kind));
        }

        LoadPlan { order, excluded }
    }

    /// Run a plugin's constructor, isolating errors and panics
    pub fn instantiate(&self, name: &str) -> Result<Arc<dyn Plugin>, PluginLoadError> {
        let entry = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| {
                PluginLoadError::new(
                    name,
                    LoadErrorKind::InstantiationFailure {
                        reason: "no factory registered".to_string(),
                    },
                )
            })?;

        let built = match catch_unwind(AssertUnwindSafe(|| (entry.factory)())) {
            Ok(result) => result,
            Err(panic) => Err(PluginError::Panicked(panic_message(panic.as_ref()))),
        };
        let fail = |reason: String| {
            PluginLoadError::new(name, LoadErrorKind::InstantiationFailure { reason })
        };
        let plugin = built.map_err(|e| fail(e.to_string()))?;
        if plugin.manifest().name != name {
            return Err(fail(format!(
                "constructor produced plugin '{}'",
                plugin.manifest().name
            )));
        }
        Ok(plugin)
    }

    /// Register descriptors and instantiate them in dependency order.
    /// A failed instantiation marks only that plugin `Failed`.
    pub fn load_all(&self, registry: &PluginRegistry, descriptors: Vec<PluginDescriptor>) -> LoadReport {
        let plan = self.plan(&descriptors);
        let mut report = LoadReport {
            order: plan.order.clone(),
            errors: plan.excluded,
            ..LoadReport::default()
        };

        for descriptor in descriptors {
            let name = descriptor.name().to_string();
            if let Err(e) = registry.insert(descriptor) {
                tracing::warn!("Skipping plugin: {}", e);
            }
            if let Some(err) = report.errors.iter().find(|e| e.plugin == name) {
                registry.fail(&name, err.kind.to_string());
            }
        }

        for name in &plan.order {
            match self.instantiate(name) {
                Ok(plugin) => {
                    tracing::info!("Instantiated plugin: {} v{}", name, plugin.manifest().version);
                    match registry.install(name, plugin) {
                        Ok(_) => report.instantiated.push(name.clone()),
                        Err(e) => tracing::warn!("Failed to install plugin: {}", e),
                    }
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    registry.fail(name, e.kind.to_string());
                    report.errors.push(e);
                }
            }
        }

        tracing::info!(
            "Instantiated {} of {} plugins",
            report.instantiated.len(),
            registry.len()
        );
        report
    }
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Find a dependency cycle through `start` among plugins not yet placed
fn find_cycle(
    start: &str,
    available: &IndexMap<&str, &PluginDescriptor>,
    placed: &HashSet<&str>,
) -> Option<Vec<String>> {
    fn walk(
        current: &str,
        start: &str,
        available: &IndexMap<&str, &PluginDescriptor>,
        placed: &HashSet<&str>,
        path: &mut Vec<String>,
        visited: &mut HashSet<String>,
    ) -> bool {
        let Some(d) = available.get(current) else {
            return false;
        };
        for dep in d.dependencies() {
            if placed.contains(dep.as_str()) {
                continue;
            }
            if dep == start {
                return true;
            }
            if visited.insert(dep.clone()) {
                path.push(dep.clone());
                if walk(dep, start, available, placed, path, visited) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    let mut path = vec![start.to_string()];
    let mut visited = HashSet::new();
    if walk(start, start, available, placed, &mut path, &mut visited) {
        path.push(start.to_string());
        Some(path)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::PluginState;
    use crate::testing::TestPlugin;

    fn manifest(name: &str, deps: &[&str]) -> PluginManifest {
        deps.iter()
            .fold(PluginManifest::new(name, "1.0.0"), |m, d| m.depends_on(*d))
    }

    fn loader(specs: &[(&str, &[&str])]) -> PluginLoader {
        let loader = PluginLoader::new();
        for (name, deps) in specs {
            let m = manifest(name, deps);
            let built = m.clone();
            loader
                .register(m, move || Ok(Arc::new(TestPlugin::new(built.clone())) as Arc<dyn Plugin>))
                .unwrap();
        }
        loader
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn dependencies_come_before_dependents() {
        let loader = loader(&[
            ("d", &["b", "c"]),
            ("c", &["a"]),
            ("b", &["a"]),
            ("a", &[]),
        ]);
        let plan = loader.plan(&loader.discover());
        assert!(plan.excluded.is_empty());
        assert_eq!(plan.order.len(), 4);
        assert!(position(&plan.order, "a") < position(&plan.order, "b"));
        assert!(position(&plan.order, "a") < position(&plan.order, "c"));
        assert!(position(&plan.order, "b") < position(&plan.order, "d"));
        assert!(position(&plan.order, "c") < position(&plan.order, "d"));
    }

    #[test]
    fn cycles_are_excluded_without_blocking_others() {
        let loader = loader(&[
            ("a", &["b"]),
            ("b", &["a"]),
            ("c", &["a"]),
            ("solo", &[]),
            ("after", &["solo"]),
        ]);
        let plan = loader.plan(&loader.discover());
        assert_eq!(plan.order, vec!["solo".to_string(), "after".to_string()]);

        let kind_of = |name: &str| {
            plan.excluded
                .iter()
                .find(|e| e.plugin == name)
                .map(|e| e.kind.clone())
                .unwrap()
        };
        assert!(matches!(kind_of("a"), LoadErrorKind::CyclicDependency { .. }));
        assert!(matches!(kind_of("b"), LoadErrorKind::CyclicDependency { .. }));
        assert_eq!(
            kind_of("c"),
            LoadErrorKind::MissingDependency { dependency: "a".to_string() }
        );
    }

    #[test]
    fn missing_dependency_excludes_transitively() {
        let loader = loader(&[("a", &["ghost"]), ("b", &["a"]), ("c", &[])]);
        let plan = loader.plan(&loader.discover());
        assert_eq!(plan.order, vec!["c".to_string()]);
        assert_eq!(
            plan.excluded[0],
            PluginLoadError::new("a", LoadErrorKind::MissingDependency { dependency: "ghost".into() })
        );
        assert_eq!(plan.excluded[1].plugin, "b");
    }

    #[test]
    fn optional_dependencies_do_not_affect_order() {
        let loader = PluginLoader::new();
        let m = PluginManifest::new("greeter", "1.0.0").optionally_depends_on("absent");
        let built = m.clone();
        loader
            .register(m, move || Ok(Arc::new(TestPlugin::new(built.clone())) as Arc<dyn Plugin>))
            .unwrap();
        let plan = loader.plan(&loader.discover());
        assert_eq!(plan.order, vec!["greeter".to_string()]);
        assert!(plan.excluded.is_empty());
    }

    #[test]
    fn failed_constructor_marks_only_that_plugin() {
        let loader = loader(&[("a", &[]), ("c", &[])]);
        loader
            .register(manifest("broken", &[]), || Err(PluginError::failed("no config")))
            .unwrap();
        loader
            .register(manifest("panicky", &[]), || panic!("constructor exploded"))
            .unwrap();

        let registry = PluginRegistry::new();
        let report = loader.load_all(&registry, loader.discover());

        assert_eq!(report.instantiated, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(report.failed(), vec!["broken", "panicky"]);
        assert_eq!(registry.state("broken"), Some(PluginState::Failed));
        assert_eq!(registry.state("panicky"), Some(PluginState::Failed));
        assert_eq!(registry.state("a"), Some(PluginState::Unloaded));
        assert!(registry.get("a").is_some());
        assert_eq!(registry.descriptor("a").unwrap().generation, 1);
    }

    #[test]
    fn duplicate_factories_are_rejected() {
        let loader = loader(&[("a", &[])]);
        let result = loader.register(manifest("a", &[]), || Err(PluginError::failed("dup")));
        assert_eq!(result, Err(RegistryError::Duplicate("a".into())));
        assert!(loader.unregister("a"));
        assert!(!loader.contains("a"));
    }
}
