//! Permission gate - role-based authorization for command invocations

use std::collections::HashMap;

use crate::domain::entities::{CommandDefinition, InvocationContext, Role};
use crate::infrastructure::config::PermissionsConfig;

/// Result of a permission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Access policy of a resolved command path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAccess {
    /// Space-separated path, e.g. `config greeting`
    pub path: String,
    pub min_role: Option<Role>,
    pub sensitive: bool,
    pub destructive: bool,
}

impl CommandAccess {
    pub fn from_definition(path: impl Into<String>, def: &CommandDefinition) -> Self {
        Self {
            path: path.into(),
            min_role: def.min_role,
            sensitive: def.sensitive,
            destructive: def.destructive,
        }
    }

    /// Access policy for an administrative operation on plugins or configuration
    pub fn destructive(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            min_role: None,
            sensitive: false,
            destructive: true,
        }
    }
}

/// Role-based authorization consulted before any command handler runs
#[derive(Debug, Clone, Default)]
pub struct PermissionGate {
    /// Command path -> minimum role, overriding declarations
    overrides: HashMap<String, Role>,
    users: HashMap<String, Role>,
    default_role: Role,
}

impl PermissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PermissionsConfig) -> Self {
        Self {
            overrides: config
                .commands
                .iter()
                .map(|(path, role)| (normalize(path), *role))
                .collect(),
            users: config.users.clone(),
            default_role: config.default_role,
        }
    }

    pub fn with_override(mut self, path: &str, role: Role) -> Self {
        self.overrides.insert(normalize(path), role);
        self
    }

    pub fn with_user_role(mut self, user_id: impl Into<String>, role: Role) -> Self {
        self.users.insert(user_id.into(), role);
        self
    }

    /// Role of a user; unknown users get the default role
    pub fn role_for(&self, user_id: &str) -> Role {
        self.users.get(user_id).copied().unwrap_or(self.default_role)
    }

    /// Minimum role for a command, or `None` when it must be denied outright
    pub fn required_role(&self, access: &CommandAccess) -> Option<Role> {
        if let Some(role) = self.overrides.get(&normalize(&access.path)) {
            return Some(*role);
        }
        if let Some(role) = access.min_role {
            return Some(role);
        }
        if access.destructive {
            return Some(Role::Admin);
        }
        if access.sensitive {
            return None;
        }
        Some(Role::Viewer)
    }

    pub fn check(&self, ctx: &InvocationContext, access: &CommandAccess) -> Decision {
        match self.required_role(access) {
            None => {
                tracing::warn!(user = %ctx.user.id, command = %access.path, "Denied sensitive command without role mapping");
                Decision::Denied(format!("'{}' has no role mapping", access.path))
            }
            Some(required) if ctx.role < required => {
                tracing::info!(user = %ctx.user.id, role = %ctx.role, command = %access.path, "Permission denied");
                Decision::Denied(format!("'{}' requires {}", access.path, required))
            }
            Some(_) => Decision::Allowed,
        }
    }
}

fn normalize(path: &str) -> String {
    path.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
