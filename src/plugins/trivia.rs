//! Trivia plugin - owns execution of the centrally declared `/trivia` command

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::domain::entities::{FragmentKind, InvocationContext, PluginManifest, Suggestion};
use crate::domain::traits::{Plugin, PluginContext, PluginResult};

pub const NAME: &str = "trivia";

const QUESTIONS: &[(&str, &str)] = &[
    ("Which planet is known as the red planet?", "mars"),
    ("How many legs does a spider have?", "8"),
    ("What is the chemical symbol for gold?", "au"),
    ("Which ocean is the largest?", "pacific"),
];

pub fn manifest() -> PluginManifest {
    PluginManifest::new(NAME, "0.2.0")
        .with_description("Trivia rounds per chat")
        .depends_on(super::core_plugin::NAME)
}

pub struct TriviaPlugin {
    manifest: PluginManifest,
    /// chat id -> index of the open question
    rounds: Mutex<HashMap<String, usize>>,
    asked: AtomicUsize,
}

impl TriviaPlugin {
    pub fn new() -> Self {
        Self {
            manifest: manifest(),
            rounds: Mutex::new(HashMap::new()),
            asked: AtomicUsize::new(0),
        }
    }

    pub fn questions_asked(&self) -> usize {
        self.asked.load(Ordering::Relaxed)
    }

    fn ask(&self, chat_id: &str) -> String {
        let index = self.asked.fetch_add(1, Ordering::Relaxed) % QUESTIONS.len();
        self.rounds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chat_id.to_string(), index);
        format!("{}\nReply with /trivia answer <text>", QUESTIONS[index].0)
    }

    fn answer(&self, chat_id: &str, guess: &str) -> String {
        // Take the round out so two concurrent answers cannot both win
        let open = self
            .rounds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(chat_id);
        let Some(index) = open else {
            return "No trivia round is running. Start one with /trivia".to_string();
        };
        let (_, expected) = QUESTIONS[index];
        if guess.trim().eq_ignore_ascii_case(expected) {
            "Correct!".to_string()
        } else {
            format!("Wrong, the answer was: {}", expected)
        }
    }
}

impl Default for TriviaPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for TriviaPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn on_load(&self, _ctx: &PluginContext) -> PluginResult<()> {
        self.rounds.lock().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }

    async fn on_disable(&self, _ctx: &PluginContext) -> PluginResult<()> {
        let open = self.rounds.lock().unwrap_or_else(PoisonError::into_inner).len();
        if open > 0 {
            tracing::info!(plugin = NAME, "Abandoning {} open rounds", open);
        }
        Ok(())
    }

    fn command_fragments(&self) -> Vec<FragmentKind> {
        vec![FragmentKind::HandlerOnly {
            handled: vec![NAME.to_string()],
        }]
    }

    async fn handle_command(
        &self,
        ctx: &InvocationContext,
        _command: &str,
        subcommand_path: &[String],
    ) -> PluginResult<String> {
        match subcommand_path.first().map(String::as_str) {
            Some("answer") => Ok(self.answer(&ctx.chat_id, &subcommand_path[1..].join(" "))),
            Some("skip") => {
                self.rounds
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&ctx.chat_id);
                Ok("Round skipped".to_string())
            }
            _ => Ok(self.ask(&ctx.chat_id)),
        }
    }

    async fn handle_autocomplete(
        &self,
        _ctx: &InvocationContext,
        _command: &str,
        partial: &str,
    ) -> PluginResult<Vec<Suggestion>> {
        Ok(["answer", "skip"]
            .iter()
            .filter(|s| s.starts_with(partial))
            .map(|s| Suggestion::new(*s, *s))
            .collect())
    }
}
