use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Plugin lifecycle state
///
/// ```text
/// Unloaded -> Loading -> Loaded -> Enabled <-> Disabled -> Unloading -> Unloaded
/// ```
///
/// `Failed` is reachable from any transition whose hook errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginState {
    Unloaded,
    Loading,
    Loaded,
    Enabled,
    Disabled,
    Unloading,
    Failed,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PluginState::Unloaded => "unloaded",
            PluginState::Loading => "loading",
            PluginState::Loaded => "loaded",
            PluginState::Enabled => "enabled",
            PluginState::Disabled => "disabled",
            PluginState::Unloading => "unloading",
            PluginState::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl PluginState {
    pub fn can_load(&self) -> bool {
        matches!(self, PluginState::Unloaded)
    }

    pub fn can_enable(&self) -> bool {
        matches!(self, PluginState::Loaded | PluginState::Disabled)
    }

    pub fn can_disable(&self) -> bool {
        matches!(self, PluginState::Enabled)
    }

    pub fn can_unload(&self) -> bool {
        matches!(
            self,
            PluginState::Loaded | PluginState::Disabled | PluginState::Failed
        )
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, PluginState::Enabled)
    }
}

/// Static plugin metadata, declared by each plugin module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PluginManifest {
    /// Plugin name (unique key)
    pub name: String,

    pub version: String,

    pub description: Option<String>,

    /// Hard dependencies, required for `Enabled`
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Used if present, never blocking
    #[serde(default)]
    pub optional_dependencies: Vec<String>,
}

impl PluginManifest {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            dependencies: Vec::new(),
            optional_dependencies: Vec::new(),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    pub fn optionally_depends_on(mut self, name: impl Into<String>) -> Self {
        self.optional_dependencies.push(name.into());
        self
    }
}

/// Registry record for one plugin
#[derive(Debug, Clone, Serialize)]
pub struct PluginDescriptor {
    pub manifest: PluginManifest,
    pub state: PluginState,
    /// Bumped each time a fresh instance is installed
    pub generation: u64,
    pub loaded_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PluginDescriptor {
    pub fn new(manifest: PluginManifest) -> Self {
        Self {
            manifest,
            state: PluginState::Unloaded,
            generation: 0,
            loaded_at: None,
            last_error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn version(&self) -> &str {
        &self.manifest.version
    }

    pub fn dependencies(&self) -> &[String] {
        &self.manifest.dependencies
    }
}

/// Per-plugin counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PluginStats {
    pub events_handled: u64,
    pub event_failures: u64,
    pub commands_invoked: u64,
    pub command_failures: u64,
    pub reloads: u64,
}

/// Plugin information for listing
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub state: PluginState,
    pub generation: u64,
    pub dependencies: Vec<String>,
    pub optional_dependencies: Vec<String>,
    pub reloading: bool,
    pub loaded_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub stats: PluginStats,
}
