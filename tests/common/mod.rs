//! Shared fixtures for the runtime integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use plugin_host::application::errors::PluginError;
use plugin_host::application::PluginRuntime;
use plugin_host::domain::entities::{
    CommandDefinition, Event, FragmentKind, InvocationContext, PluginManifest, Propagation,
    Role, SubscriptionSpec, User,
};
use plugin_host::domain::traits::{Plugin, PluginContext, PluginResult, Store};
use plugin_host::infrastructure::config::Config;
use plugin_host::infrastructure::plugins::PluginLoader;
use plugin_host::infrastructure::storage::MemoryStore;

static INIT: Once = Once::new();

pub fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// A plugin that serves one top-level command and answers `ping` events
pub struct Echo {
    manifest: PluginManifest,
    command: String,
    generation: usize,
    fail_load: bool,
    fail_disable: bool,
}

#[async_trait]
impl Plugin for Echo {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn on_load(&self, _ctx: &PluginContext) -> PluginResult<()> {
        if self.fail_load {
            return Err(PluginError::failed("bad build"));
        }
        Ok(())
    }

    async fn on_disable(&self, _ctx: &PluginContext) -> PluginResult<()> {
        if self.fail_disable {
            return Err(PluginError::failed("stuck connection"));
        }
        Ok(())
    }

    fn subscriptions(&self) -> Vec<SubscriptionSpec> {
        vec![SubscriptionSpec::new("ping", "echo")]
    }

    async fn handle_event(&self, _handler: &str, _event: &Event) -> PluginResult<Propagation> {
        Ok(Propagation::Continue)
    }

    fn command_fragments(&self) -> Vec<FragmentKind> {
        vec![FragmentKind::TopLevel(vec![
            CommandDefinition::new(self.command.clone()),
            CommandDefinition::new(format!("wipe-{}", self.command)).destructive(),
        ])]
    }

    async fn handle_command(
        &self,
        _ctx: &InvocationContext,
        command: &str,
        _subcommand_path: &[String],
    ) -> PluginResult<String> {
        Ok(format!("{}#{} ran {}", self.manifest.name, self.generation, command))
    }
}

/// Switches shared with the factories so a test can break the next build
#[derive(Clone, Default)]
pub struct Switches {
    pub builds: Arc<AtomicUsize>,
    pub fail_construct: Arc<AtomicBool>,
    pub fail_load: Arc<AtomicBool>,
    pub fail_disable: Arc<AtomicBool>,
}

fn manifest(name: &str, version: &str, deps: &[&str]) -> PluginManifest {
    deps.iter()
        .fold(PluginManifest::new(name, version), |m, d| m.depends_on(*d))
}

/// Loader for the chain `alpha <- beta <- gamma`; only `alpha` honours the switches
pub fn chain_loader(switches: &Switches) -> PluginLoader {
    let s = switches.clone();
    PluginLoader::new()
        .with(manifest("alpha", "1.0.0", &[]), move || {
            if s.fail_construct.load(Ordering::SeqCst) {
                return Err(PluginError::failed("constructor exploded"));
            }
            let generation = s.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Echo {
                manifest: manifest("alpha", &format!("1.0.{}", generation), &[]),
                command: "alpha".to_string(),
                generation,
                fail_load: s.fail_load.load(Ordering::SeqCst),
                fail_disable: s.fail_disable.load(Ordering::SeqCst),
            }) as Arc<dyn Plugin>)
        })
        .with(manifest("beta", "1.0.0", &["alpha"]), || {
            Ok(echo("beta", &["alpha"]))
        })
        .with(manifest("gamma", "1.0.0", &["beta"]), || {
            Ok(echo("gamma", &["beta"]))
        })
}

fn echo(name: &str, deps: &[&str]) -> Arc<dyn Plugin> {
    Arc::new(Echo {
        manifest: manifest(name, "1.0.0", deps),
        command: name.to_string(),
        generation: 0,
        fail_load: false,
        fail_disable: false,
    })
}

/// Config where `root` is admin and `ops` is operator; everyone else is a viewer
pub fn config() -> Config {
    let mut config = Config::default();
    config.permissions.users.insert("root".to_string(), Role::Admin);
    config.permissions.users.insert("ops".to_string(), Role::Operator);
    config
}

pub async fn started(loader: PluginLoader, store: Arc<dyn Store>) -> Arc<PluginRuntime> {
    ensure_init();
    let runtime = Arc::new(PluginRuntime::new(config(), loader, store));
    runtime.start().await;
    runtime
}

pub async fn chain_runtime(switches: &Switches) -> Arc<PluginRuntime> {
    started(chain_loader(switches), Arc::new(MemoryStore::new())).await
}

pub fn as_user(runtime: &PluginRuntime, id: &str) -> InvocationContext {
    runtime.context_for(User::new(id))
}
