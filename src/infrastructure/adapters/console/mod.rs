//! Console adapter for development/testing

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::application::commands::Decision;
use crate::application::errors::AdapterError;
use crate::application::messaging::{MessageParser, ParsedInput};
use crate::application::runtime::PluginRuntime;
use crate::domain::entities::{Event, InvocationContext, User};
use crate::domain::traits::{Bot, BotInfo};

const CHAT_ID: &str = "console";

/// Console bot adapter for local development
pub struct ConsoleAdapter {
    info: BotInfo,
    runtime: Arc<PluginRuntime>,
    parser: MessageParser,
    user: User,
}

impl ConsoleAdapter {
    pub fn new(runtime: Arc<PluginRuntime>) -> Self {
        let config = runtime.config();
        let info = BotInfo {
            id: "console".to_string(),
            name: config.runtime.name.clone(),
            username: "console".to_string(),
        };
        let parser = MessageParser::new(config.runtime.prefix.clone());
        let user = User::new(config.console.user_id.clone());
        Self {
            info,
            runtime,
            parser,
            user,
        }
    }

    /// Handle one line of input; returns the reply, if any
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        match self.parser.parse(line) {
            ParsedInput::Empty => None,
            ParsedInput::Text(text) => {
                let event = Event::message(serde_json::json!({
                    "chat_id": CHAT_ID,
                    "user_id": self.user.id,
                    "text": text,
                }));
                let report = self.runtime.dispatch(&event).await;
                for failure in &report.failures {
                    tracing::debug!(plugin = %failure.plugin, "{}", failure);
                }
                None
            }
            ParsedInput::Command { name, args } => {
                let ctx = self
                    .runtime
                    .context_for(self.user.clone())
                    .with_chat(CHAT_ID)
                    .with_args(args.clone());
                if name == "plugins" {
                    return Some(self.admin(&ctx, &args).await);
                }
                let result = self.runtime.invoke(&name, &args, &ctx).await;
                Some(result.user_message())
            }
        }
    }

    /// `/plugins list|stats|enable|disable|reload|uninstall <name>`
    async fn admin(&self, ctx: &InvocationContext, args: &[String]) -> String {
        let action = args.first().map(String::as_str).unwrap_or("list");
        if let Decision::Denied(reason) = self.runtime.authorize_admin(ctx, action) {
            tracing::info!(user = %ctx.user.id, "Admin command denied: {}", reason);
            return "You are not authorized to use this command.".to_string();
        }

        let target = args.get(1).map(String::as_str);
        match (action, target) {
            ("list", _) => self
                .runtime
                .list_plugins()
                .iter()
                .map(|p| {
                    let mut line = format!("{} v{} [{}] gen {}", p.name, p.version, p.state, p.generation);
                    if let Some(ref err) = p.last_error {
                        line.push_str(&format!(" ({})", err));
                    }
                    line
                })
                .collect::<Vec<_>>()
                .join("\n"),
            ("stats", _) => serde_json::to_string_pretty(&self.runtime.get_plugin_stats())
                .unwrap_or_else(|e| format!("Could not render stats: {}", e)),
            ("enable", Some(name)) => match self.runtime.enable_plugin(name).await {
                Ok(_) => format!("Enabled {}", name),
                Err(e) => format!("Could not enable {}: {}", name, e),
            },
            ("disable", Some(name)) => match self.runtime.disable_plugin(name).await {
                Ok(cascaded) if cascaded.is_empty() => format!("Disabled {}", name),
                Ok(cascaded) => format!("Disabled {} (and dependents: {})", name, cascaded.join(", ")),
                Err(e) => format!("Could not disable {}: {}", name, e),
            },
            ("reload", Some(name)) => match self.runtime.reload_plugin(name).await {
                Ok(report) => format!("Reloaded {} v{} (generation {})", name, report.version, report.generation),
                Err(e) => format!("Reload failed: {}", e),
            },
            ("uninstall", Some(name)) => match self.runtime.uninstall_plugin(name).await {
                Ok(_) => format!("Uninstalled {}", name),
                Err(e) => format!("Could not uninstall {}: {}", name, e),
            },
            _ => "Usage: /plugins list|stats|enable|disable|reload|uninstall <name>".to_string(),
        }
    }
}

#[async_trait]
impl Bot for ConsoleAdapter {
    async fn start(&self) -> Result<(), AdapterError> {
        tracing::info!("Starting console bot (dev mode)");
        println!("{} ready. Type /help, or /quit to exit.", self.info.name);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if matches!(line.trim(), "/quit" | "/exit") {
                break;
            }
            if let Some(reply) = self.handle_line(&line).await {
                self.send_message(CHAT_ID, &reply).await?;
            }
        }
        Ok(())
    }

    async fn send_message(&self, _chat_id: &str, text: &str) -> Result<String, AdapterError> {
        println!("[BOT] {}", text);
        Ok("console_msg".to_string())
    }

    fn bot_info(&self) -> BotInfo {
        self.info.clone()
    }
}
