//! Application layer errors

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::domain::entities::PluginState;

/// Errors raised by plugin code (hooks, event handlers, command handlers)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    #[error("{0}")]
    Failed(String),

    #[error("plugin panicked: {0}")]
    Panicked(String),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("not supported: {0}")]
    Unsupported(String),
}

impl PluginError {
    pub fn failed(msg: impl Into<String>) -> Self {
        PluginError::Failed(msg.into())
    }
}

/// Why a plugin was excluded from the load order or failed to instantiate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadErrorKind {
    #[error("cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("missing dependency '{dependency}'")]
    MissingDependency { dependency: String },

    #[error("instantiation failed: {reason}")]
    InstantiationFailure { reason: String },
}

/// Load-time error scoped to a single plugin
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("plugin '{plugin}': {kind}")]
pub struct PluginLoadError {
    pub plugin: String,
    pub kind: LoadErrorKind,
}

impl PluginLoadError {
    pub fn new(plugin: impl Into<String>, kind: LoadErrorKind) -> Self {
        Self {
            plugin: plugin.into(),
            kind,
        }
    }
}

/// Lifecycle transition errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("plugin '{plugin}' {hook} hook failed: {reason}")]
    HookThrew {
        plugin: String,
        hook: &'static str,
        reason: String,
    },

    #[error("plugin '{plugin}' cannot {action} from state {from}")]
    InvalidTransition {
        plugin: String,
        from: PluginState,
        action: &'static str,
    },

    #[error("plugin '{plugin}' requires '{dependency}' to be enabled")]
    DependencyNotEnabled { plugin: String, dependency: String },

    #[error("plugin not found: {0}")]
    NotFound(String),

    #[error("plugin '{0}' is reloading")]
    Reloading(String),
}

impl From<RegistryError> for LifecycleError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Duplicate(name) | RegistryError::NotFound(name) => LifecycleError::NotFound(name),
        }
    }
}

/// Command fragment registration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The name is already claimed by a different plugin
    #[error("command '{command}' is already claimed by '{owner}' (rejected registration from '{claimant}')")]
    Collision {
        command: String,
        owner: String,
        claimant: String,
    },

    #[error("parent command '{parent}' does not exist (fragment from '{claimant}')")]
    UnknownParent { parent: String, claimant: String },

    #[error("fragment from '{0}' declares no commands")]
    EmptyFragment(String),
}

/// A failed event handler, recorded against its owning plugin
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("handler {subscription} of plugin '{plugin}' failed: {reason}")]
pub struct EventHandlerError {
    pub plugin: String,
    pub subscription: u64,
    pub reason: String,
}

/// Step of a hot reload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadStep {
    Instantiate,
    Load,
    Enable,
}

impl fmt::Display for ReloadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadStep::Instantiate => write!(f, "instantiate"),
            ReloadStep::Load => write!(f, "load"),
            ReloadStep::Enable => write!(f, "enable"),
        }
    }
}

/// Hot reload failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReloadFailure {
    /// A reload step failed; the previous instance was put back in service
    #[error("reload of '{plugin}' failed at {step}: {reason}")]
    StepFailed {
        plugin: String,
        step: ReloadStep,
        reason: String,
        restored: Vec<String>,
    },

    /// Restoring the previous instance failed as well
    #[error("reload of '{plugin}' failed and rollback failed: {reason}; manual intervention required for {stranded:?}")]
    RollbackFailed {
        plugin: String,
        reason: String,
        stranded: Vec<String>,
    },

    #[error("plugin not found: {0}")]
    NotFound(String),

    #[error("plugin '{0}' is already reloading")]
    AlreadyReloading(String),
}

/// Plugin registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("plugin '{0}' already registered")]
    Duplicate(String),

    #[error("plugin not found: {0}")]
    NotFound(String),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Chat-platform adapter errors
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Errors surfaced through the administrative surface
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Reload(#[from] ReloadFailure),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
