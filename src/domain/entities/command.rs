use serde::Serialize;

use super::Role;

/// Declarative definition of a command (or subcommand) and its access policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandDefinition {
    pub name: String,
    pub description: Option<String>,
    /// Minimum role; `None` falls back to the gate's defaults
    pub min_role: Option<Role>,
    /// Denied unless a role mapping exists
    pub sensitive: bool,
    /// Enabling/disabling plugins, modifying configuration
    pub destructive: bool,
    pub subcommands: Vec<CommandDefinition>,
}

impl CommandDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            description: None,
            min_role: None,
            sensitive: false,
            destructive: false,
            subcommands: Vec::new(),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_min_role(mut self, role: Role) -> Self {
        self.min_role = Some(role);
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn destructive(mut self) -> Self {
        self.destructive = true;
        self
    }

    pub fn with_subcommand(mut self, sub: CommandDefinition) -> Self {
        self.subcommands.push(sub);
        self
    }

    pub fn subcommand(&self, name: &str) -> Option<&CommandDefinition> {
        self.subcommands
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// This definition followed by the nested subcommands matching `path`;
    /// stops at the first unknown segment.
    pub fn lineage<'a>(&'a self, path: &[String]) -> Vec<&'a CommandDefinition> {
        let mut chain = vec![self];
        let mut current = self;
        for segment in path {
            match current.subcommand(segment) {
                Some(next) => {
                    chain.push(next);
                    current = next;
                }
                None => break,
            }
        }
        chain
    }
}

/// What a fragment contributes to the command namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentKind {
    /// Defines one or more top-level commands
    TopLevel(Vec<CommandDefinition>),
    /// Merges a subcommand group under an existing command
    Subcommands {
        parent: String,
        group: Vec<CommandDefinition>,
    },
    /// Claims execution of commands declared by another fragment
    HandlerOnly { handled: Vec<String> },
}

/// Identifies the slot a fragment occupies for its owner, so a
/// re-registration replaces the earlier fragment in the same slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FragmentSlot {
    TopLevel,
    Subcommands(String),
    HandlerOnly,
}

/// A plugin's declaration of command names and/or its claim to execute them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFragment {
    pub owner: String,
    pub kind: FragmentKind,
}

impl CommandFragment {
    pub fn new(owner: impl Into<String>, kind: FragmentKind) -> Self {
        Self {
            owner: owner.into(),
            kind,
        }
    }

    pub fn top_level(owner: impl Into<String>, commands: Vec<CommandDefinition>) -> Self {
        Self::new(owner, FragmentKind::TopLevel(commands))
    }

    pub fn subcommands(
        owner: impl Into<String>,
        parent: impl Into<String>,
        group: Vec<CommandDefinition>,
    ) -> Self {
        Self::new(
            owner,
            FragmentKind::Subcommands {
                parent: parent.into().to_lowercase(),
                group,
            },
        )
    }

    pub fn handler_only(owner: impl Into<String>, handled: Vec<String>) -> Self {
        let handled = handled.into_iter().map(|n| n.to_lowercase()).collect();
        Self::new(owner, FragmentKind::HandlerOnly { handled })
    }

    /// `None` for fragments defining top-level commands
    pub fn parent_command(&self) -> Option<&str> {
        match &self.kind {
            FragmentKind::Subcommands { parent, .. } => Some(parent),
            _ => None,
        }
    }

    /// `None` marks a handler-only fragment
    pub fn command_group_definition(&self) -> Option<&[CommandDefinition]> {
        match &self.kind {
            FragmentKind::TopLevel(defs) => Some(defs),
            FragmentKind::Subcommands { group, .. } => Some(group),
            FragmentKind::HandlerOnly { .. } => None,
        }
    }

    pub fn handled_command_names(&self) -> &[String] {
        match &self.kind {
            FragmentKind::HandlerOnly { handled } => handled,
            _ => &[],
        }
    }

    pub fn slot(&self) -> FragmentSlot {
        match &self.kind {
            FragmentKind::TopLevel(_) => FragmentSlot::TopLevel,
            FragmentKind::Subcommands { parent, .. } => FragmentSlot::Subcommands(parent.clone()),
            FragmentKind::HandlerOnly { .. } => FragmentSlot::HandlerOnly,
        }
    }

    /// Whether this fragment would route `command`/`path` to its owner
    pub fn covers(&self, command: &str, path: &[String]) -> bool {
        match &self.kind {
            FragmentKind::TopLevel(defs) => defs.iter().any(|d| d.name == command),
            FragmentKind::Subcommands { parent, group } => {
                parent == command
                    && path
                        .first()
                        .is_some_and(|first| group.iter().any(|d| d.name.eq_ignore_ascii_case(first)))
            }
            FragmentKind::HandlerOnly { handled } => handled.iter().any(|h| h == command),
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.kind {
            FragmentKind::TopLevel(defs) => defs.is_empty(),
            FragmentKind::Subcommands { group, .. } => group.is_empty(),
            FragmentKind::HandlerOnly { handled } => handled.is_empty(),
        }
    }
}

/// Listing entry for the merged command surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSummary {
    pub name: String,
    pub description: Option<String>,
    pub owner: String,
    pub subcommands: Vec<String>,
}

/// Autocomplete suggestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub name: String,
    pub value: String,
}

impl Suggestion {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Outcome of routing a command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationResult {
    Success { owner: String, response: String },
    NotFound { command: String },
    Unauthorized { reason: String },
    /// The owner is mid-reload
    Reloading { owner: String },
    /// The owner is not enabled
    Unavailable { owner: String },
    TimedOut { owner: String },
    Failed { owner: String },
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success { .. })
    }

    /// Text shown to the invoking user; never includes internal error details
    pub fn user_message(&self) -> String {
        match self {
            InvocationResult::Success { response, .. } => response.clone(),
            InvocationResult::NotFound { command } => format!("Unknown command: /{}", command),
            InvocationResult::Unauthorized { .. } => {
                "You are not authorized to use this command.".to_string()
            }
            InvocationResult::Reloading { .. } => {
                "This feature is reloading, try again shortly.".to_string()
            }
            InvocationResult::Unavailable { .. } => {
                "This command is currently unavailable.".to_string()
            }
            InvocationResult::TimedOut { .. } => "The command took too long to respond.".to_string(),
            InvocationResult::Failed { .. } => {
                "An error occurred while running this command.".to_string()
            }
        }
    }
}
