//! Greeter plugin - welcomes users on their first message
//!
//! Merges `/config greeting` under the core plugin's `/config` command and
//! mentions trivia when that plugin happens to be enabled.

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError, RwLock};

use crate::domain::entities::{
    event, CommandDefinition, Event, FragmentKind, InvocationContext, PluginManifest, Propagation,
    SubscriptionSpec,
};
use crate::domain::traits::{Plugin, PluginContext, PluginResult};
use super::trivia::TriviaPlugin;

pub const NAME: &str = "greeter";

const DEFAULT_GREETING: &str = "Hello";

pub fn manifest() -> PluginManifest {
    PluginManifest::new(NAME, "0.1.0")
        .with_description("Greets users the first time they speak")
        .depends_on(super::core_plugin::NAME)
        .optionally_depends_on(super::trivia::NAME)
}

pub struct GreeterPlugin {
    manifest: PluginManifest,
    greeting: RwLock<String>,
    greeted: Mutex<HashSet<String>>,
    ctx: RwLock<Option<PluginContext>>,
}

impl GreeterPlugin {
    pub fn new() -> Self {
        Self {
            manifest: manifest(),
            greeting: RwLock::new(DEFAULT_GREETING.to_string()),
            greeted: Mutex::new(HashSet::new()),
            ctx: RwLock::new(None),
        }
    }

    pub fn greeting(&self) -> String {
        self.greeting.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Greeting for `user`, or `None` if they were already greeted
    pub fn greet(&self, user: &str) -> Option<String> {
        let first_time = self
            .greeted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.to_string());
        if !first_time {
            return None;
        }

        let mut text = format!("{}, {}!", self.greeting(), user);
        let ctx = self.ctx.read().unwrap_or_else(PoisonError::into_inner).clone();
        let trivia = ctx.and_then(|c| c.dependency(super::trivia::NAME));
        if let Some(asked) = trivia.and_then(|h| h.with(|t: &TriviaPlugin| t.questions_asked())) {
            text.push_str(&format!(" Try /trivia ({} questions asked so far).", asked));
        }
        Some(text)
    }
}

impl Default for GreeterPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for GreeterPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn on_enable(&self, ctx: &PluginContext) -> PluginResult<()> {
        if let Some(greeting) = ctx.settings().get("greeting").and_then(|v| v.as_str()) {
            *self.greeting.write().unwrap_or_else(PoisonError::into_inner) = greeting.to_string();
        }
        *self.ctx.write().unwrap_or_else(PoisonError::into_inner) = Some(ctx.clone());
        Ok(())
    }

    async fn on_disable(&self, _ctx: &PluginContext) -> PluginResult<()> {
        *self.ctx.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn subscriptions(&self) -> Vec<SubscriptionSpec> {
        vec![SubscriptionSpec::new(event::MESSAGE, "greet").with_priority(10)]
    }

    async fn handle_event(&self, _handler: &str, event: &Event) -> PluginResult<Propagation> {
        if let Some(greeting) = event.field("user_id").and_then(|user| self.greet(user)) {
            tracing::info!(plugin = NAME, chat = event.field("chat_id").unwrap_or(""), "{}", greeting);
        }
        Ok(Propagation::Continue)
    }

    fn command_fragments(&self) -> Vec<FragmentKind> {
        vec![FragmentKind::Subcommands {
            parent: "config".to_string(),
            group: vec![CommandDefinition::new("greeting")
                .with_description("Show the greeting")
                .with_subcommand(
                    CommandDefinition::new("set")
                        .with_description("Change the greeting")
                        .destructive(),
                )],
        }]
    }

    async fn handle_command(
        &self,
        _ctx: &InvocationContext,
        _command: &str,
        subcommand_path: &[String],
    ) -> PluginResult<String> {
        let is_set = subcommand_path
            .get(1)
            .is_some_and(|s| s.eq_ignore_ascii_case("set"));
        let words = subcommand_path.get(2..).unwrap_or_default();
        if !is_set {
            return Ok(format!("Greeting: {}", self.greeting()));
        }
        if words.is_empty() {
            return Ok("Usage: /config greeting set <text>".to_string());
        }
        let greeting = words.join(" ");
        *self.greeting.write().unwrap_or_else(PoisonError::into_inner) = greeting.clone();
        Ok(format!("Greeting set to: {}", greeting))
    }
}
