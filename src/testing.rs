//! Configurable plugin used by unit tests

use async_trait::async_trait;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::application::errors::PluginError;
use crate::domain::entities::{
    Event, FragmentKind, InvocationContext, PluginManifest, Propagation, SubscriptionSpec,
    Suggestion,
};
use crate::domain::traits::{Plugin, PluginContext, PluginResult};

/// Shared log of `name:hook` entries, in call order
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

pub(crate) fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

pub(crate) struct TestPlugin {
    manifest: PluginManifest,
    tag: String,
    failing_hooks: HashSet<&'static str>,
    /// Hook that succeeds for the given number of calls, then fails
    flaky_hook: Option<(&'static str, usize)>,
    hook_calls: Mutex<HashMap<&'static str, usize>>,
    failing_commands: bool,
    subscriptions: Vec<SubscriptionSpec>,
    fragments: Vec<FragmentKind>,
    journal: Journal,
    pub events: AtomicUsize,
}

impl TestPlugin {
    pub fn new(manifest: PluginManifest) -> Self {
        let tag = manifest.name.clone();
        Self {
            manifest,
            tag,
            failing_hooks: HashSet::new(),
            flaky_hook: None,
            hook_calls: Mutex::new(HashMap::new()),
            failing_commands: false,
            subscriptions: Vec::new(),
            fragments: Vec::new(),
            journal: journal(),
            events: AtomicUsize::new(0),
        }
    }

    /// Responses read "<tag> handled <command>"
    pub fn tagged(mut self, tag: &str) -> Self {
        self.tag = tag.to_string();
        self
    }

    /// One of "load", "enable", "disable", "unload"
    pub fn failing_hook(mut self, hook: &'static str) -> Self {
        self.failing_hooks.insert(hook);
        self
    }

    /// `hook` succeeds `calls` times, then fails on every later call
    pub fn failing_hook_after(mut self, hook: &'static str, calls: usize) -> Self {
        self.flaky_hook = Some((hook, calls));
        self
    }

    pub fn failing_commands(mut self) -> Self {
        self.failing_commands = true;
        self
    }

    pub fn subscribed(mut self, spec: SubscriptionSpec) -> Self {
        self.subscriptions.push(spec);
        self
    }

    pub fn with_fragment(mut self, kind: FragmentKind) -> Self {
        self.fragments.push(kind);
        self
    }

    pub fn journaled(mut self, journal: &Journal) -> Self {
        self.journal = journal.clone();
        self
    }

    fn hook(&self, hook: &'static str) -> PluginResult<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.manifest.name, hook));
        let calls = {
            let mut counts = self.hook_calls.lock().unwrap();
            let count = counts.entry(hook).or_insert(0);
            *count += 1;
            *count
        };
        let flaky = self.flaky_hook.is_some_and(|(h, ok)| h == hook && calls > ok);
        if flaky || self.failing_hooks.contains(hook) {
            return Err(PluginError::failed(format!("{} refused", hook)));
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for TestPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn on_load(&self, _ctx: &PluginContext) -> PluginResult<()> {
        self.hook("load")
    }

    async fn on_enable(&self, _ctx: &PluginContext) -> PluginResult<()> {
        self.hook("enable")
    }

    async fn on_disable(&self, _ctx: &PluginContext) -> PluginResult<()> {
        self.hook("disable")
    }

    async fn on_unload(&self, _ctx: &PluginContext) -> PluginResult<()> {
        self.hook("unload")
    }

    fn subscriptions(&self) -> Vec<SubscriptionSpec> {
        self.subscriptions.clone()
    }

    async fn handle_event(&self, handler: &str, _event: &Event) -> PluginResult<Propagation> {
        self.events.fetch_add(1, Ordering::SeqCst);
        match handler {
            "stop" => Ok(Propagation::Stop),
            "fail" => Err(PluginError::failed("handler refused")),
            _ => Ok(Propagation::Continue),
        }
    }

    fn command_fragments(&self) -> Vec<FragmentKind> {
        self.fragments.clone()
    }

    async fn handle_command(
        &self,
        _ctx: &InvocationContext,
        command: &str,
        _subcommand_path: &[String],
    ) -> PluginResult<String> {
        if self.failing_commands {
            return Err(PluginError::failed("database unreachable"));
        }
        Ok(format!("{} handled {}", self.tag, command))
    }

    async fn handle_autocomplete(
        &self,
        _ctx: &InvocationContext,
        _command: &str,
        partial: &str,
    ) -> PluginResult<Vec<Suggestion>> {
        Ok(vec![Suggestion::new(partial, partial)])
    }
}
