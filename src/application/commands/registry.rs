//! Command registry - merges plugin command fragments into one namespace

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::application::errors::{CommandError, PluginError};
use crate::application::guard::guarded;
use crate::domain::entities::{
    CommandDefinition, CommandFragment, CommandSummary, FragmentKind, FragmentSlot,
    InvocationContext, InvocationResult, Suggestion,
};
use crate::infrastructure::plugins::PluginRegistry;
use super::permissions::{CommandAccess, Decision, PermissionGate};

struct TopLevelEntry {
    definition: CommandDefinition,
    declared_by: String,
}

struct SubcommandEntry {
    definition: CommandDefinition,
    owner: String,
}

#[derive(Default)]
struct CommandTable {
    commands: IndexMap<String, TopLevelEntry>,
    /// (parent, subcommand) -> entry contributed by a subcommand group fragment
    subcommands: IndexMap<(String, String), SubcommandEntry>,
    /// Handler-only claims: command -> executing plugin
    handlers: HashMap<String, String>,
    /// Installed fragments per owner
    fragments: HashMap<String, Vec<CommandFragment>>,
    /// Fragments withdrawn when their owner left `Enabled`
    retired: HashMap<String, Vec<CommandFragment>>,
}

impl CommandTable {
    fn check(&self, fragment: &CommandFragment) -> Result<(), CommandError> {
        let claimant = &fragment.owner;
        let collision = |command: String, owner: &str| CommandError::Collision {
            command,
            owner: owner.to_string(),
            claimant: claimant.clone(),
        };

        match &fragment.kind {
            FragmentKind::TopLevel(defs) => {
                for def in defs {
                    if let Some(entry) = self.commands.get(&def.name) {
                        if entry.declared_by != *claimant {
                            return Err(collision(def.name.clone(), &entry.declared_by));
                        }
                    }
                    // Groups merged under this name by other plugins keep their subcommands
                    for sub in &def.subcommands {
                        if let Some(entry) = self.subcommands.get(&(def.name.clone(), sub.name.clone())) {
                            if entry.owner != *claimant {
                                return Err(collision(format!("{} {}", def.name, sub.name), &entry.owner));
                            }
                        }
                    }
                }
            }
            FragmentKind::Subcommands { parent, group } => {
                let parent_entry =
                    self.commands
                        .get(parent)
                        .ok_or_else(|| CommandError::UnknownParent {
                            parent: parent.clone(),
                            claimant: claimant.clone(),
                        })?;
                for def in group {
                    let path = format!("{} {}", parent, def.name);
                    if let Some(entry) = self.subcommands.get(&(parent.clone(), def.name.clone())) {
                        if entry.owner != *claimant {
                            return Err(collision(path, &entry.owner));
                        }
                    }
                    if parent_entry.declared_by != *claimant
                        && parent_entry.definition.subcommand(&def.name).is_some()
                    {
                        return Err(collision(path, &parent_entry.declared_by));
                    }
                }
            }
            FragmentKind::HandlerOnly { handled } => {
                for name in handled {
                    if let Some(owner) = self.handlers.get(name) {
                        if owner != claimant {
                            return Err(collision(name.clone(), owner));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn install(&mut self, fragment: CommandFragment) {
        let owner = fragment.owner.clone();
        match &fragment.kind {
            FragmentKind::TopLevel(defs) => {
                for def in defs {
                    self.commands.insert(
                        def.name.clone(),
                        TopLevelEntry {
                            definition: def.clone(),
                            declared_by: owner.clone(),
                        },
                    );
                }
            }
            FragmentKind::Subcommands { parent, group } => {
                for def in group {
                    self.subcommands.insert(
                        (parent.clone(), def.name.clone()),
                        SubcommandEntry {
                            definition: def.clone(),
                            owner: owner.clone(),
                        },
                    );
                }
            }
            FragmentKind::HandlerOnly { handled } => {
                for name in handled {
                    self.handlers.insert(name.clone(), owner.clone());
                }
            }
        }
        self.fragments.entry(owner).or_default().push(fragment);
    }

    fn uninstall(&mut self, fragment: &CommandFragment) {
        let owner = &fragment.owner;
        match &fragment.kind {
            FragmentKind::TopLevel(defs) => {
                for def in defs {
                    if self.commands.get(&def.name).is_some_and(|e| e.declared_by == *owner) {
                        self.commands.shift_remove(&def.name);
                    }
                }
            }
            FragmentKind::Subcommands { parent, group } => {
                for def in group {
                    let key = (parent.clone(), def.name.clone());
                    if self.subcommands.get(&key).is_some_and(|e| e.owner == *owner) {
                        self.subcommands.shift_remove(&key);
                    }
                }
            }
            FragmentKind::HandlerOnly { handled } => {
                for name in handled {
                    if self.handlers.get(name) == Some(owner) {
                        self.handlers.remove(name);
                    }
                }
            }
        }
    }

    fn remove_slot(&mut self, owner: &str, slot: &FragmentSlot) {
        if let Some(retired) = self.retired.get_mut(owner) {
            retired.retain(|f| f.slot() != *slot);
        }
        let Some(installed) = self.fragments.get_mut(owner) else {
            return;
        };
        let (replaced, kept): (Vec<_>, Vec<_>) = installed.drain(..).partition(|f| f.slot() == *slot);
        *installed = kept;
        for fragment in &replaced {
            self.uninstall(fragment);
        }
    }

    /// Owner that will execute `command`/`path`, plus its access policy
    fn route(&self, command: &str, path: &[String]) -> Option<(String, CommandAccess)> {
        let top = self.commands.get(command)?;

        if let Some(first) = path.first() {
            let key = (command.to_string(), first.to_lowercase());
            if let Some(sub) = self.subcommands.get(&key) {
                let mut chain = vec![&top.definition];
                chain.extend(sub.definition.lineage(&path[1..]));
                return Some((sub.owner.clone(), access_along(&chain)));
            }
        }

        let owner = self
            .handlers
            .get(command)
            .unwrap_or(&top.declared_by)
            .clone();
        Some((owner, access_along(&top.definition.lineage(path))))
    }

    /// Forget retired fragments of other owners that declare a name `fragment` now holds
    fn drop_stale_retired(&mut self, fragment: &CommandFragment) {
        let claimed = claimed_names(fragment);
        for (owner, retired) in self.retired.iter_mut() {
            if *owner == fragment.owner {
                continue;
            }
            retired.retain(|f| {
                f.slot() != fragment.slot() || claimed_names(f).iter().all(|n| !claimed.contains(n))
            });
        }
        self.retired.retain(|_, retired| !retired.is_empty());
    }

    /// Retired fragment covering the invocation whose owner is mid-reload
    fn reloading_owner(&self, command: &str, path: &[String], plugins: &PluginRegistry) -> Option<String> {
        self.retired
            .iter()
            .filter(|(owner, _)| plugins.is_reloading(owner))
            .find(|(_, fragments)| fragments.iter().any(|f| f.covers(command, path)))
            .map(|(owner, _)| owner.clone())
    }
}

fn claimed_names(fragment: &CommandFragment) -> Vec<String> {
    match &fragment.kind {
        FragmentKind::TopLevel(defs) => defs.iter().map(|d| d.name.clone()).collect(),
        FragmentKind::Subcommands { group, .. } => group.iter().map(|d| d.name.clone()).collect(),
        FragmentKind::HandlerOnly { handled } => handled.clone(),
    }
}

/// Access policy along a definition chain. Sensitivity and destructiveness
/// are inherited; a role declared on the invoked command itself wins,
/// otherwise the nearest ancestor's role applies unless the path is
/// destructive.
fn access_along(chain: &[&CommandDefinition]) -> CommandAccess {
    let sensitive = chain.iter().any(|d| d.sensitive);
    let destructive = chain.iter().any(|d| d.destructive);
    let own_role = chain.last().and_then(|d| d.min_role);
    let min_role = match own_role {
        Some(role) => Some(role),
        None if destructive => None,
        None => chain.iter().rev().find_map(|d| d.min_role),
    };
    CommandAccess {
        path: chain
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        min_role,
        sensitive,
        destructive,
    }
}

/// Registry of command fragments and router for invocations
///
/// Owners are stored by name; every invocation looks the current instance
/// up in the plugin registry.
pub struct CommandRegistry {
    table: RwLock<CommandTable>,
    plugins: Arc<PluginRegistry>,
    gate: PermissionGate,
    handler_timeout: Option<Duration>,
}

impl CommandRegistry {
    pub fn new(plugins: Arc<PluginRegistry>, gate: PermissionGate) -> Self {
        Self {
            table: RwLock::new(CommandTable::default()),
            plugins,
            gate,
            handler_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, CommandTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CommandTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    /// Install a fragment. A name claimed by a different plugin rejects the
    /// whole fragment; the same owner re-registering replaces its earlier
    /// fragment in the same slot.
    pub fn register_fragment(&self, fragment: CommandFragment) -> Result<(), CommandError> {
        if fragment.is_empty() {
            return Err(CommandError::EmptyFragment(fragment.owner));
        }
        let mut table = self.write();
        if let Err(e) = table.check(&fragment) {
            tracing::warn!("Command registration rejected: {}", e);
            return Err(e);
        }
        table.remove_slot(&fragment.owner, &fragment.slot());
        table.drop_stale_retired(&fragment);
        tracing::debug!(plugin = %fragment.owner, slot = ?fragment.slot(), "Registered command fragment");
        table.install(fragment);
        Ok(())
    }

    /// Withdraw every fragment of `owner`; returns how many were removed
    pub fn unregister_owner(&self, owner: &str) -> usize {
        let mut table = self.write();
        let Some(fragments) = table.fragments.remove(owner) else {
            return 0;
        };
        for fragment in &fragments {
            table.uninstall(fragment);
        }
        let count = fragments.len();
        table.retired.insert(owner.to_string(), fragments);
        count
    }

    /// Drop all knowledge of `owner`, including retired fragments
    pub fn forget_owner(&self, owner: &str) {
        self.unregister_owner(owner);
        self.write().retired.remove(owner);
    }

    /// Plugin that executes `command` (optionally a subcommand path)
    pub fn resolve(&self, command: &str, subcommand_path: &[String]) -> Option<String> {
        self.read()
            .route(&command.to_lowercase(), subcommand_path)
            .map(|(owner, _)| owner)
    }

    pub fn fragments_of(&self, owner: &str) -> Vec<CommandFragment> {
        self.read().fragments.get(owner).cloned().unwrap_or_default()
    }

    /// Number of top-level commands
    pub fn len(&self) -> usize {
        self.read().commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The merged command surface, in registration order
    pub fn summaries(&self) -> Vec<CommandSummary> {
        let table = self.read();
        table
            .commands
            .iter()
            .map(|(name, entry)| {
                let mut subcommands: Vec<String> = entry
                    .definition
                    .subcommands
                    .iter()
                    .map(|s| s.name.clone())
                    .collect();
                subcommands.extend(
                    table
                        .subcommands
                        .keys()
                        .filter(|(parent, _)| parent == name)
                        .map(|(_, sub)| sub.clone()),
                );
                CommandSummary {
                    name: name.clone(),
                    description: entry.definition.description.clone(),
                    owner: table.handlers.get(name).unwrap_or(&entry.declared_by).clone(),
                    subcommands,
                }
            })
            .collect()
    }

    /// Route an invocation to its owner after the permission check.
    /// Handler failures never escape; they become `Failed`/`TimedOut`.
    pub async fn invoke(
        &self,
        command: &str,
        subcommand_path: &[String],
        ctx: &InvocationContext,
    ) -> InvocationResult {
        let command = command.to_lowercase();
        let routed = {
            let table = self.read();
            if let Some(owner) = table.reloading_owner(&command, subcommand_path, &self.plugins) {
                return InvocationResult::Reloading { owner };
            }
            table.route(&command, subcommand_path)
        };
        let Some((owner, access)) = routed else {
            return InvocationResult::NotFound { command };
        };

        if self.plugins.is_reloading(&owner) {
            return InvocationResult::Reloading { owner };
        }
        if !self.plugins.state(&owner).is_some_and(|s| s.is_enabled()) {
            return InvocationResult::Unavailable { owner };
        }
        if let Decision::Denied(reason) = self.gate.check(ctx, &access) {
            return InvocationResult::Unauthorized { reason };
        }
        let Some(instance) = self.plugins.get(&owner) else {
            return InvocationResult::Unavailable { owner };
        };

        let result = guarded(
            &owner,
            "command handler",
            self.handler_timeout,
            instance.handle_command(ctx, &command, subcommand_path),
        )
        .await;
        self.plugins.record_command(&owner, result.is_ok());

        match result {
            Ok(response) => InvocationResult::Success { owner, response },
            Err(PluginError::TimedOut(limit)) => {
                tracing::warn!(plugin = %owner, command = %access.path, "Command timed out after {:?}", limit);
                InvocationResult::TimedOut { owner }
            }
            Err(e) => {
                tracing::error!(plugin = %owner, command = %access.path, "Command failed: {}", e);
                InvocationResult::Failed { owner }
            }
        }
    }

    /// Ask the owner of `command` for suggestions; failures yield nothing
    pub async fn autocomplete(&self, command: &str, ctx: &InvocationContext, partial: &str) -> Vec<Suggestion> {
        let command = command.to_lowercase();
        let Some(owner) = self.resolve(&command, &[]) else {
            return Vec::new();
        };
        if !self.plugins.state(&owner).is_some_and(|s| s.is_enabled()) || self.plugins.is_reloading(&owner) {
            return Vec::new();
        }
        let Some(instance) = self.plugins.get(&owner) else {
            return Vec::new();
        };
        guarded(
            &owner,
            "autocomplete",
            self.handler_timeout,
            instance.handle_autocomplete(ctx, &command, partial),
        )
        .await
        .unwrap_or_else(|e| {
            tracing::debug!(plugin = %owner, "Autocomplete failed: {}", e);
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{PluginManifest, PluginState, Role, User};
    use crate::domain::traits::Plugin;
    use crate::testing::TestPlugin;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    fn enabled_plugins(names: &[&str]) -> Arc<PluginRegistry> {
        let registry = Arc::new(PluginRegistry::new());
        for name in names {
            let manifest = PluginManifest::new(*name, "1.0.0");
            registry
                .insert(crate::domain::entities::PluginDescriptor::new(manifest.clone()))
                .unwrap();
            let plugin: Arc<dyn Plugin> = Arc::new(TestPlugin::new(manifest));
            registry.install(name, plugin).unwrap();
            registry.set_state(name, PluginState::Enabled).unwrap();
        }
        registry
    }

    fn ctx(role: Role) -> InvocationContext {
        InvocationContext::new(User::new("tester"), role)
    }

    #[test]
    fn second_top_level_claim_is_rejected() {
        let commands = CommandRegistry::new(enabled_plugins(&["a", "b"]), PermissionGate::new());
        commands
            .register_fragment(CommandFragment::top_level("a", vec![CommandDefinition::new("play")]))
            .unwrap();
        let err = commands
            .register_fragment(CommandFragment::top_level(
                "b",
                vec![CommandDefinition::new("stats"), CommandDefinition::new("Play")],
            ))
            .unwrap_err();
        assert_eq!(
            err,
            CommandError::Collision {
                command: "play".into(),
                owner: "a".into(),
                claimant: "b".into()
            }
        );
        assert_eq!(commands.resolve("play", &[]), Some("a".to_string()));
        // The whole fragment was rejected
        assert_eq!(commands.resolve("stats", &[]), None);
    }

    #[test]
    fn same_owner_reregistration_replaces() {
        let commands = CommandRegistry::new(enabled_plugins(&["a"]), PermissionGate::new());
        commands
            .register_fragment(CommandFragment::top_level("a", vec![CommandDefinition::new("old")]))
            .unwrap();
        commands
            .register_fragment(CommandFragment::top_level("a", vec![CommandDefinition::new("new")]))
            .unwrap();
        assert_eq!(commands.resolve("old", &[]), None);
        assert_eq!(commands.resolve("new", &[]), Some("a".to_string()));
        assert_eq!(commands.fragments_of("a").len(), 1);
    }

    #[test]
    fn subcommand_groups_merge_under_parent() {
        let commands = CommandRegistry::new(enabled_plugins(&["core", "greeter", "rival"]), PermissionGate::new());
        commands
            .register_fragment(CommandFragment::top_level(
                "core",
                vec![CommandDefinition::new("config").with_subcommand(CommandDefinition::new("show"))],
            ))
            .unwrap();
        commands
            .register_fragment(CommandFragment::subcommands(
                "greeter",
                "config",
                vec![CommandDefinition::new("greeting")],
            ))
            .unwrap();

        assert_eq!(commands.resolve("config", &path(&["greeting"])), Some("greeter".into()));
        assert_eq!(commands.resolve("config", &path(&["show"])), Some("core".into()));

        let clash = commands.register_fragment(CommandFragment::subcommands(
            "rival",
            "config",
            vec![CommandDefinition::new("greeting")],
        ));
        assert!(matches!(clash, Err(CommandError::Collision { ref owner, .. }) if owner == "greeter"));

        let clash = commands.register_fragment(CommandFragment::subcommands(
            "rival",
            "config",
            vec![CommandDefinition::new("show")],
        ));
        assert!(matches!(clash, Err(CommandError::Collision { ref owner, .. }) if owner == "core"));

        let orphan = commands.register_fragment(CommandFragment::subcommands(
            "rival",
            "missing",
            vec![CommandDefinition::new("x")],
        ));
        assert!(matches!(orphan, Err(CommandError::UnknownParent { .. })));

        let summary = commands.summaries();
        assert_eq!(summary[0].subcommands, vec!["show".to_string(), "greeting".to_string()]);
    }

    #[test]
    fn top_level_redeclaration_cannot_take_merged_subcommands() {
        let commands = CommandRegistry::new(enabled_plugins(&["core", "greeter"]), PermissionGate::new());
        commands
            .register_fragment(CommandFragment::top_level("core", vec![CommandDefinition::new("config")]))
            .unwrap();
        commands
            .register_fragment(CommandFragment::subcommands(
                "greeter",
                "config",
                vec![CommandDefinition::new("greeting")],
            ))
            .unwrap();

        let clash = commands.register_fragment(CommandFragment::top_level(
            "core",
            vec![CommandDefinition::new("config").with_subcommand(CommandDefinition::new("greeting"))],
        ));
        assert_eq!(
            clash,
            Err(CommandError::Collision {
                command: "config greeting".into(),
                owner: "greeter".into(),
                claimant: "core".into()
            })
        );
        assert_eq!(commands.resolve("config", &path(&["greeting"])), Some("greeter".into()));
        assert_eq!(commands.fragments_of("core").len(), 1);
    }

    #[test]
    fn handler_only_claims_execution() {
        let commands = CommandRegistry::new(enabled_plugins(&["core", "trivia", "copycat"]), PermissionGate::new());
        commands
            .register_fragment(CommandFragment::top_level("core", vec![CommandDefinition::new("trivia")]))
            .unwrap();
        commands
            .register_fragment(CommandFragment::handler_only("trivia", vec!["trivia".into()]))
            .unwrap();
        assert_eq!(commands.resolve("trivia", &[]), Some("trivia".into()));
        assert_eq!(commands.summaries()[0].owner, "trivia");

        let clash = commands.register_fragment(CommandFragment::handler_only("copycat", vec!["trivia".into()]));
        assert!(clash.is_err());

        // Withdrawing the claim falls back to the declarer
        assert_eq!(commands.unregister_owner("trivia"), 1);
        assert_eq!(commands.resolve("trivia", &[]), Some("core".into()));
    }

    #[test]
    fn empty_fragments_are_rejected() {
        let commands = CommandRegistry::new(enabled_plugins(&["a"]), PermissionGate::new());
        assert_eq!(
            commands.register_fragment(CommandFragment::top_level("a", vec![])),
            Err(CommandError::EmptyFragment("a".into()))
        );
    }

    #[tokio::test]
    async fn invoke_checks_permissions_before_running() {
        let plugins = enabled_plugins(&["ops"]);
        let commands = CommandRegistry::new(plugins.clone(), PermissionGate::new());
        commands
            .register_fragment(CommandFragment::top_level(
                "ops",
                vec![CommandDefinition::new("restart").with_min_role(Role::Admin)],
            ))
            .unwrap();

        let denied = commands.invoke("restart", &[], &ctx(Role::Operator)).await;
        assert!(matches!(denied, InvocationResult::Unauthorized { .. }));
        assert_eq!(plugins.info("ops").unwrap().stats.commands_invoked, 0);

        let allowed = commands.invoke("restart", &[], &ctx(Role::Admin)).await;
        assert_eq!(
            allowed,
            InvocationResult::Success {
                owner: "ops".into(),
                response: "ops handled restart".into()
            }
        );
        assert_eq!(plugins.info("ops").unwrap().stats.commands_invoked, 1);
    }

    #[tokio::test]
    async fn subcommands_inherit_parent_role() {
        let commands = CommandRegistry::new(enabled_plugins(&["core", "greeter"]), PermissionGate::new());
        commands
            .register_fragment(CommandFragment::top_level(
                "core",
                vec![CommandDefinition::new("config").with_min_role(Role::Operator)],
            ))
            .unwrap();
        commands
            .register_fragment(CommandFragment::subcommands(
                "greeter",
                "config",
                vec![CommandDefinition::new("greeting")],
            ))
            .unwrap();
        let result = commands.invoke("config", &path(&["greeting"]), &ctx(Role::Viewer)).await;
        assert!(matches!(result, InvocationResult::Unauthorized { .. }));
        let result = commands.invoke("config", &path(&["greeting"]), &ctx(Role::Operator)).await;
        assert!(matches!(result, InvocationResult::Success { ref owner, .. } if owner == "greeter"));
    }

    #[tokio::test]
    async fn destructive_subcommand_needs_admin_under_operator_parent() {
        let commands = CommandRegistry::new(enabled_plugins(&["core"]), PermissionGate::new());
        commands
            .register_fragment(CommandFragment::top_level(
                "core",
                vec![CommandDefinition::new("config")
                    .with_min_role(Role::Operator)
                    .with_subcommand(CommandDefinition::new("reset").destructive())],
            ))
            .unwrap();
        let reset = path(&["reset"]);
        let result = commands.invoke("config", &reset, &ctx(Role::Operator)).await;
        assert!(matches!(result, InvocationResult::Unauthorized { .. }));
        let result = commands.invoke("config", &reset, &ctx(Role::Admin)).await;
        assert!(result.is_success());
        let result = commands.invoke("config", &[], &ctx(Role::Operator)).await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn failing_handler_yields_generic_failure() {
        let plugins = Arc::new(PluginRegistry::new());
        let manifest = PluginManifest::new("flaky", "1.0.0");
        plugins
            .insert(crate::domain::entities::PluginDescriptor::new(manifest.clone()))
            .unwrap();
        let plugin: Arc<dyn Plugin> = Arc::new(TestPlugin::new(manifest).failing_commands());
        plugins.install("flaky", plugin).unwrap();
        plugins.set_state("flaky", PluginState::Enabled).unwrap();

        let commands = CommandRegistry::new(plugins.clone(), PermissionGate::new());
        commands
            .register_fragment(CommandFragment::top_level("flaky", vec![CommandDefinition::new("roll")]))
            .unwrap();
        let result = commands.invoke("roll", &[], &ctx(Role::Viewer)).await;
        assert_eq!(result, InvocationResult::Failed { owner: "flaky".into() });
        assert_eq!(plugins.info("flaky").unwrap().stats.command_failures, 1);
    }

    #[tokio::test]
    async fn reloading_owner_gets_transient_reply() {
        let plugins = enabled_plugins(&["core", "trivia"]);
        let commands = CommandRegistry::new(plugins.clone(), PermissionGate::new());
        commands
            .register_fragment(CommandFragment::top_level("core", vec![CommandDefinition::new("trivia")]))
            .unwrap();
        commands
            .register_fragment(CommandFragment::handler_only("trivia", vec!["trivia".into()]))
            .unwrap();

        plugins.set_reloading("trivia", true);
        commands.unregister_owner("trivia");
        let result = commands.invoke("trivia", &[], &ctx(Role::Viewer)).await;
        assert_eq!(result, InvocationResult::Reloading { owner: "trivia".into() });
        assert!(result.user_message().contains("try again shortly"));

        plugins.set_reloading("trivia", false);
        let result = commands.invoke("trivia", &[], &ctx(Role::Viewer)).await;
        assert!(matches!(result, InvocationResult::Success { ref owner, .. } if owner == "core"));
    }

    #[tokio::test]
    async fn stale_retired_claims_do_not_shadow_a_new_owner() {
        let plugins = enabled_plugins(&["old", "new"]);
        let commands = CommandRegistry::new(plugins.clone(), PermissionGate::new());
        commands
            .register_fragment(CommandFragment::top_level("old", vec![CommandDefinition::new("stats")]))
            .unwrap();
        commands.unregister_owner("old");
        commands
            .register_fragment(CommandFragment::top_level("new", vec![CommandDefinition::new("stats")]))
            .unwrap();

        plugins.set_reloading("old", true);
        let result = commands.invoke("stats", &[], &ctx(Role::Viewer)).await;
        assert!(matches!(result, InvocationResult::Success { ref owner, .. } if owner == "new"));
    }

    #[tokio::test]
    async fn unknown_commands_are_not_found() {
        let commands = CommandRegistry::new(enabled_plugins(&[]), PermissionGate::new());
        let result = commands.invoke("nothing", &[], &ctx(Role::Admin)).await;
        assert_eq!(result, InvocationResult::NotFound { command: "nothing".into() });
    }
}
