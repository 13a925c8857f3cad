//! Core plugin - help, ping and configuration commands
//!
//! Also pre-declares `/trivia`; the trivia plugin claims its execution.

use async_trait::async_trait;
use std::any::Any;
use std::sync::{PoisonError, RwLock};

use crate::domain::entities::{
    CommandDefinition, FragmentKind, InvocationContext, PluginManifest, Role, Suggestion,
};
use crate::domain::traits::{Plugin, PluginContext, PluginResult};

pub const NAME: &str = "core";

pub fn manifest() -> PluginManifest {
    PluginManifest::new(NAME, env!("CARGO_PKG_VERSION")).with_description("Help, ping and configuration commands")
}

pub struct CorePlugin {
    manifest: PluginManifest,
    ctx: RwLock<Option<PluginContext>>,
}

impl CorePlugin {
    pub fn new() -> Self {
        Self {
            manifest: manifest(),
            ctx: RwLock::new(None),
        }
    }

    fn context(&self) -> Option<PluginContext> {
        self.ctx.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn help(&self, topic: Option<&str>) -> String {
        let summaries = self.context().map(|c| c.command_summaries()).unwrap_or_default();
        if let Some(name) = topic {
            return match summaries.iter().find(|s| s.name == name) {
                Some(s) => {
                    let mut help = format!("/{} - {}", s.name, s.description.as_deref().unwrap_or("No description"));
                    if !s.subcommands.is_empty() {
                        help.push_str(&format!("\nSubcommands: {}", s.subcommands.join(", ")));
                    }
                    help
                }
                None => format!("Command /{} not found", name),
            };
        }

        let mut help = "Available commands:\n".to_string();
        for s in &summaries {
            help.push_str(&format!("  /{} - {}\n", s.name, s.description.as_deref().unwrap_or("")));
        }
        help
    }

    fn config(&self, path: &[String]) -> String {
        let Some(ctx) = self.context() else {
            return "Configuration is unavailable".to_string();
        };
        match path.first().map(String::as_str) {
            None | Some("show") => {
                let plugins: Vec<String> = ["trivia", "greeter"]
                    .iter()
                    .filter_map(|name| ctx.dependency(name))
                    .map(|h| format!("{}: {}", h.name(), h.state().map(|s| s.to_string()).unwrap_or_default()))
                    .collect();
                format!("Settings: {}\nFeature plugins: {}", ctx.settings(), plugins.join(", "))
            }
            Some(other) => format!("Unknown config section: {}", other),
        }
    }
}

impl Default for CorePlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for CorePlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn on_enable(&self, ctx: &PluginContext) -> PluginResult<()> {
        *self.ctx.write().unwrap_or_else(PoisonError::into_inner) = Some(ctx.clone());
        Ok(())
    }

    async fn on_disable(&self, _ctx: &PluginContext) -> PluginResult<()> {
        *self.ctx.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn command_fragments(&self) -> Vec<FragmentKind> {
        vec![FragmentKind::TopLevel(vec![
            CommandDefinition::new("help").with_description("Show available commands"),
            CommandDefinition::new("ping").with_description("Check that the bot is alive"),
            CommandDefinition::new("config")
                .with_description("Show or change configuration")
                .with_min_role(Role::Operator)
                .with_subcommand(CommandDefinition::new("show").with_description("Show current settings")),
            CommandDefinition::new("trivia").with_description("Play a round of trivia"),
        ])]
    }

    async fn handle_command(
        &self,
        _ctx: &InvocationContext,
        command: &str,
        subcommand_path: &[String],
    ) -> PluginResult<String> {
        match command {
            "help" => Ok(self.help(subcommand_path.first().map(String::as_str))),
            "ping" => Ok("pong".to_string()),
            "config" => Ok(self.config(subcommand_path)),
            "trivia" => Ok("Trivia is not available right now.".to_string()),
            other => Ok(format!("Command /{} not implemented", other)),
        }
    }

    async fn handle_autocomplete(
        &self,
        _ctx: &InvocationContext,
        command: &str,
        partial: &str,
    ) -> PluginResult<Vec<Suggestion>> {
        if command != "help" {
            return Ok(Vec::new());
        }
        let summaries = self.context().map(|c| c.command_summaries()).unwrap_or_default();
        Ok(summaries
            .into_iter()
            .filter(|s| s.name.starts_with(partial))
            .map(|s| Suggestion::new(format!("/{}", s.name), s.name))
            .collect())
    }
}
