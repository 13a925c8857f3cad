//! Lifecycle manager - drives plugins through the state machine
//!
//! Every hook runs under `guarded`, so a hook that errors, panics or hangs
//! moves only its own plugin to `Failed`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::application::commands::CommandRegistry;
use crate::application::errors::{CommandError, LifecycleError};
use crate::application::events::{EventRouter, PluginEventHandler};
use crate::application::guard::guarded;
use crate::domain::entities::{CommandFragment, PluginState};
use crate::domain::traits::{Plugin, PluginContext};
use crate::infrastructure::plugins::PluginRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
    Load,
    Enable,
    Disable,
    Unload,
}

impl Hook {
    fn label(self) -> &'static str {
        match self {
            Hook::Load => "on_load",
            Hook::Enable => "on_enable",
            Hook::Disable => "on_disable",
            Hook::Unload => "on_unload",
        }
    }
}

/// What enabling a plugin registered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnableOutcome {
    pub subscriptions: usize,
    pub fragments: usize,
    /// Fragments rejected by the command registry; the plugin stays enabled
    pub rejected_fragments: Vec<CommandError>,
}

/// Dependents re-enabled by `restore`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub restored: Vec<String>,
    pub failed: Vec<String>,
}

pub struct LifecycleManager {
    registry: Arc<PluginRegistry>,
    router: Arc<EventRouter>,
    commands: Arc<CommandRegistry>,
    hook_timeout: Option<Duration>,
    settings: HashMap<String, serde_json::Value>,
}

impl LifecycleManager {
    pub fn new(registry: Arc<PluginRegistry>, router: Arc<EventRouter>, commands: Arc<CommandRegistry>) -> Self {
        Self {
            registry,
            router,
            commands,
            hook_timeout: None,
            settings: HashMap::new(),
        }
    }

    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = Some(timeout);
        self
    }

    /// Per-plugin settings handed to hooks through `PluginContext`
    pub fn with_settings(mut self, settings: HashMap<String, serde_json::Value>) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn context(&self, name: &str) -> PluginContext {
        PluginContext::new(
            name,
            self.settings.get(name).cloned().unwrap_or(serde_json::Value::Null),
            Arc::downgrade(&self.registry),
            Arc::downgrade(&self.commands),
        )
    }

    fn current_state(&self, name: &str) -> Result<PluginState, LifecycleError> {
        self.registry
            .state(name)
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))
    }

    fn ensure_not_reloading(&self, name: &str) -> Result<(), LifecycleError> {
        if self.registry.is_reloading(name) {
            return Err(LifecycleError::Reloading(name.to_string()));
        }
        Ok(())
    }

    fn invalid(name: &str, from: PluginState, action: &'static str) -> LifecycleError {
        LifecycleError::InvalidTransition {
            plugin: name.to_string(),
            from,
            action,
        }
    }

    async fn run_hook(&self, name: &str, instance: &Arc<dyn Plugin>, hook: Hook) -> Result<(), LifecycleError> {
        let ctx = self.context(name);
        let call = async {
            match hook {
                Hook::Load => instance.on_load(&ctx).await,
                Hook::Enable => instance.on_enable(&ctx).await,
                Hook::Disable => instance.on_disable(&ctx).await,
                Hook::Unload => instance.on_unload(&ctx).await,
            }
        };
        guarded(name, hook.label(), self.hook_timeout, call)
            .await
            .map_err(|e| LifecycleError::HookThrew {
                plugin: name.to_string(),
                hook: hook.label(),
                reason: e.to_string(),
            })
    }

    fn mark_failed(&self, error: &LifecycleError) {
        if let LifecycleError::HookThrew { plugin, .. } = error {
            tracing::error!(plugin = %plugin, "{}", error);
            self.registry.fail(plugin, error.to_string());
        }
    }

    fn unmet_dependency(&self, name: &str) -> Option<String> {
        let descriptor = self.registry.descriptor(name)?;
        descriptor
            .dependencies()
            .iter()
            .find(|dep| !self.registry.state(dep).is_some_and(|s| s.is_enabled()))
            .cloned()
    }

    /// `Unloaded -> Loading -> Loaded`
    pub async fn load(&self, name: &str) -> Result<(), LifecycleError> {
        self.ensure_not_reloading(name)?;
        self.load_inner(name).await
    }

    pub(crate) async fn load_inner(&self, name: &str) -> Result<(), LifecycleError> {
        let state = self.current_state(name)?;
        if !state.can_load() {
            return Err(Self::invalid(name, state, "load"));
        }
        let instance = self
            .registry
            .get(name)
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))?;

        self.registry.set_state(name, PluginState::Loading)?;
        if let Err(e) = self.run_hook(name, &instance, Hook::Load).await {
            self.mark_failed(&e);
            return Err(e);
        }
        self.registry.set_state(name, PluginState::Loaded)?;
        tracing::info!(plugin = %name, "Plugin loaded");
        Ok(())
    }

    /// `Loaded | Disabled -> Enabled`; every hard dependency must be enabled
    pub async fn enable(&self, name: &str) -> Result<EnableOutcome, LifecycleError> {
        self.ensure_not_reloading(name)?;
        self.enable_inner(name).await
    }

    pub(crate) async fn enable_inner(&self, name: &str) -> Result<EnableOutcome, LifecycleError> {
        let state = self.current_state(name)?;
        if !state.can_enable() {
            return Err(Self::invalid(name, state, "enable"));
        }
        if let Some(dependency) = self.unmet_dependency(name) {
            return Err(LifecycleError::DependencyNotEnabled {
                plugin: name.to_string(),
                dependency,
            });
        }
        let instance = self
            .registry
            .get(name)
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))?;

        if let Err(e) = self.run_hook(name, &instance, Hook::Enable).await {
            self.mark_failed(&e);
            return Err(e);
        }

        // The hook may have suspended; a dependency can have left Enabled meanwhile
        if let Some(dependency) = self.unmet_dependency(name) {
            tracing::warn!(plugin = %name, dependency = %dependency, "Dependency disabled while enabling");
            if let Err(e) = self.run_hook(name, &instance, Hook::Disable).await {
                self.mark_failed(&e);
            } else {
                self.registry.set_state(name, PluginState::Disabled)?;
            }
            return Err(LifecycleError::DependencyNotEnabled {
                plugin: name.to_string(),
                dependency,
            });
        }

        self.registry.set_state(name, PluginState::Enabled)?;
        let outcome = self.register(name, instance.as_ref());
        tracing::info!(
            plugin = %name,
            subscriptions = outcome.subscriptions,
            fragments = outcome.fragments,
            "Plugin enabled"
        );
        Ok(outcome)
    }

    fn register(&self, name: &str, instance: &dyn Plugin) -> EnableOutcome {
        let mut outcome = EnableOutcome::default();
        self.commands.forget_owner(name);

        for spec in instance.subscriptions() {
            let handler = Arc::new(PluginEventHandler::new(name, spec.handler, self.registry.clone()));
            self.router.register(&spec.event_type, name, handler, spec.priority);
            outcome.subscriptions += 1;
        }
        for kind in instance.command_fragments() {
            match self.commands.register_fragment(CommandFragment::new(name, kind)) {
                Ok(()) => outcome.fragments += 1,
                Err(e) => outcome.rejected_fragments.push(e),
            }
        }
        outcome
    }

    fn unregister(&self, name: &str) {
        let subscriptions = self.router.unregister_owner(name);
        let fragments = self.commands.unregister_owner(name);
        if subscriptions + fragments > 0 {
            tracing::debug!(plugin = %name, subscriptions, fragments, "Withdrew registrations");
        }
    }

    /// Disable `name`, first cascading to enabled dependents in reverse
    /// dependency order. Returns the dependents that were disabled.
    pub async fn disable(&self, name: &str) -> Result<Vec<String>, LifecycleError> {
        self.ensure_not_reloading(name)?;
        let state = self.current_state(name)?;
        if !state.can_disable() {
            return Err(Self::invalid(name, state, "disable"));
        }
        let cascaded = self.disable_dependents(name).await;
        self.disable_one(name).await?;
        Ok(cascaded)
    }

    /// Disable every enabled transitive dependent of `name`, last first
    pub(crate) async fn disable_dependents(&self, name: &str) -> Vec<String> {
        let mut cascaded = Vec::new();
        for dependent in self.registry.dependents_of(name).into_iter().rev() {
            if !self.registry.state(&dependent).is_some_and(|s| s.is_enabled()) {
                continue;
            }
            tracing::info!(plugin = %dependent, dependency = %name, "Cascade disable");
            // A failing hook leaves the dependent Failed, which is still not Enabled
            let _ = self.disable_one(&dependent).await;
            cascaded.push(dependent);
        }
        cascaded.reverse();
        cascaded
    }

    /// `Enabled -> Disabled` for a single plugin, without cascading
    pub(crate) async fn disable_one(&self, name: &str) -> Result<(), LifecycleError> {
        let state = self.current_state(name)?;
        if !state.can_disable() {
            return Err(Self::invalid(name, state, "disable"));
        }
        // Stop new events and commands before the hook suspends
        self.unregister(name);
        self.registry.set_state(name, PluginState::Disabled)?;

        if let Some(instance) = self.registry.get(name) {
            if let Err(e) = self.run_hook(name, &instance, Hook::Disable).await {
                self.mark_failed(&e);
                return Err(e);
            }
        }
        tracing::info!(plugin = %name, "Plugin disabled");
        Ok(())
    }

    /// Re-enable `names` in the given (forward) order, skipping any that
    /// cannot be enabled any more
    pub(crate) async fn restore(&self, names: &[String]) -> RestoreOutcome {
        let mut outcome = RestoreOutcome::default();
        for name in names {
            match self.enable_inner(name).await {
                Ok(_) => outcome.restored.push(name.clone()),
                Err(e) => {
                    tracing::warn!(plugin = %name, "Could not restore plugin: {}", e);
                    outcome.failed.push(name.clone());
                }
            }
        }
        outcome
    }

    /// `Loaded | Disabled | Failed -> Unloading -> Unloaded`; drops the instance
    pub async fn unload(&self, name: &str) -> Result<(), LifecycleError> {
        self.ensure_not_reloading(name)?;
        self.unload_inner(name).await
    }

    pub(crate) async fn unload_inner(&self, name: &str) -> Result<(), LifecycleError> {
        let state = self.current_state(name)?;
        if !state.can_unload() {
            return Err(Self::invalid(name, state, "unload"));
        }
        self.unregister(name);
        let instance = self.registry.set_instance(name, None)?;
        self.registry.set_state(name, PluginState::Unloading)?;

        if let Some(instance) = instance {
            if let Err(e) = self.run_hook(name, &instance, Hook::Unload).await {
                self.mark_failed(&e);
                return Err(e);
            }
        }
        self.registry.set_state(name, PluginState::Unloaded)?;
        tracing::info!(plugin = %name, "Plugin unloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::commands::PermissionGate;
    use crate::domain::entities::{
        CommandDefinition, Event, FragmentKind, PluginDescriptor, PluginManifest, SubscriptionSpec,
    };
    use crate::testing::{entries, journal, Journal, TestPlugin};

    struct Harness {
        registry: Arc<PluginRegistry>,
        router: Arc<EventRouter>,
        commands: Arc<CommandRegistry>,
        lifecycle: LifecycleManager,
    }

    fn harness() -> Harness {
        let registry = Arc::new(PluginRegistry::new());
        let router = Arc::new(EventRouter::new());
        let commands = Arc::new(CommandRegistry::new(registry.clone(), PermissionGate::new()));
        let lifecycle = LifecycleManager::new(registry.clone(), router.clone(), commands.clone());
        Harness {
            registry,
            router,
            commands,
            lifecycle,
        }
    }

    impl Harness {
        fn add(&self, plugin: TestPlugin) {
            let manifest = plugin.manifest().clone();
            let name = manifest.name.clone();
            self.registry.insert(PluginDescriptor::new(manifest)).unwrap();
            self.registry.install(&name, Arc::new(plugin)).unwrap();
        }

        async fn start(&self, names: &[&str]) {
            for name in names {
                self.lifecycle.load(name).await.unwrap();
                self.lifecycle.enable(name).await.unwrap();
            }
        }

        fn state(&self, name: &str) -> PluginState {
            self.registry.state(name).unwrap()
        }
    }

    fn chain(journal: &Journal) -> Vec<TestPlugin> {
        vec![
            TestPlugin::new(PluginManifest::new("a", "1.0.0")).journaled(journal),
            TestPlugin::new(PluginManifest::new("b", "1.0.0").depends_on("a")).journaled(journal),
            TestPlugin::new(PluginManifest::new("c", "1.0.0").depends_on("b")).journaled(journal),
        ]
    }

    #[tokio::test]
    async fn cascade_disable_is_one_directional() {
        let h = harness();
        let log = journal();
        for plugin in chain(&log) {
            h.add(plugin);
        }
        h.start(&["a", "b", "c"]).await;

        let cascaded = h.lifecycle.disable("a").await.unwrap();
        assert_eq!(cascaded, vec!["b".to_string(), "c".to_string()]);
        for name in ["a", "b", "c"] {
            assert_eq!(h.state(name), PluginState::Disabled);
        }
        let disables: Vec<_> = entries(&log).into_iter().filter(|e| e.ends_with(":disable")).collect();
        assert_eq!(disables, vec!["c:disable", "b:disable", "a:disable"]);

        h.lifecycle.enable("a").await.unwrap();
        assert_eq!(h.state("a"), PluginState::Enabled);
        assert_eq!(h.state("b"), PluginState::Disabled);
        assert_eq!(h.state("c"), PluginState::Disabled);
    }

    #[tokio::test]
    async fn enable_requires_enabled_dependencies() {
        let h = harness();
        for plugin in chain(&journal()) {
            h.add(plugin);
        }
        h.lifecycle.load("a").await.unwrap();
        h.lifecycle.load("b").await.unwrap();
        let err = h.lifecycle.enable("b").await.unwrap_err();
        assert_eq!(
            err,
            LifecycleError::DependencyNotEnabled {
                plugin: "b".into(),
                dependency: "a".into()
            }
        );
        assert_eq!(h.state("b"), PluginState::Loaded);
    }

    #[tokio::test]
    async fn failing_hook_fails_only_that_plugin() {
        let h = harness();
        h.add(TestPlugin::new(PluginManifest::new("good", "1.0.0")));
        h.add(TestPlugin::new(PluginManifest::new("bad", "1.0.0")).failing_hook("enable"));
        h.start(&["good"]).await;
        h.lifecycle.load("bad").await.unwrap();

        let err = h.lifecycle.enable("bad").await.unwrap_err();
        assert!(matches!(err, LifecycleError::HookThrew { hook: "on_enable", .. }));
        assert_eq!(h.state("bad"), PluginState::Failed);
        assert_eq!(h.state("good"), PluginState::Enabled);
        assert!(h.registry.info("bad").unwrap().last_error.unwrap().contains("enable refused"));
    }

    #[tokio::test]
    async fn illegal_transitions_are_rejected() {
        let h = harness();
        h.add(TestPlugin::new(PluginManifest::new("a", "1.0.0")));
        assert!(matches!(
            h.lifecycle.enable("a").await,
            Err(LifecycleError::InvalidTransition { action: "enable", .. })
        ));
        h.start(&["a"]).await;
        assert!(matches!(
            h.lifecycle.unload("a").await,
            Err(LifecycleError::InvalidTransition { from: PluginState::Enabled, .. })
        ));
        assert_eq!(h.lifecycle.load("ghost").await, Err(LifecycleError::NotFound("ghost".into())));
    }

    #[tokio::test]
    async fn registrations_follow_enabled_state() {
        let h = harness();
        h.add(
            TestPlugin::new(PluginManifest::new("a", "1.0.0"))
                .subscribed(SubscriptionSpec::new("message", "echo"))
                .with_fragment(FragmentKind::TopLevel(vec![CommandDefinition::new("echo")])),
        );
        h.start(&["a"]).await;
        assert_eq!(h.router.subscriber_count("message"), 1);
        assert_eq!(h.commands.resolve("echo", &[]), Some("a".into()));

        h.lifecycle.disable("a").await.unwrap();
        assert_eq!(h.router.subscriber_count("message"), 0);
        assert_eq!(h.commands.resolve("echo", &[]), None);
        let report = h.router.dispatch(&Event::message(serde_json::json!({}))).await;
        assert!(report.invoked.is_empty());

        h.lifecycle.unload("a").await.unwrap();
        assert_eq!(h.state("a"), PluginState::Unloaded);
        assert!(h.registry.get("a").is_none());
    }

    #[tokio::test]
    async fn rejected_fragment_keeps_plugin_enabled() {
        let h = harness();
        let play = || FragmentKind::TopLevel(vec![CommandDefinition::new("play")]);
        h.add(TestPlugin::new(PluginManifest::new("first", "1.0.0")).with_fragment(play()));
        h.add(TestPlugin::new(PluginManifest::new("second", "1.0.0")).with_fragment(play()));
        h.start(&["first"]).await;
        h.lifecycle.load("second").await.unwrap();
        let outcome = h.lifecycle.enable("second").await.unwrap();
        assert_eq!(outcome.rejected_fragments.len(), 1);
        assert_eq!(h.commands.resolve("play", &[]), Some("first".into()));
    }

    #[tokio::test]
    async fn reloading_plugins_reject_admin_transitions() {
        let h = harness();
        h.add(TestPlugin::new(PluginManifest::new("a", "1.0.0")));
        h.start(&["a"]).await;
        h.registry.set_reloading("a", true);
        assert_eq!(h.lifecycle.disable("a").await, Err(LifecycleError::Reloading("a".into())));
    }
}
