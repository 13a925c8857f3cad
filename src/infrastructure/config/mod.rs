//! Configuration management

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::errors::ConfigError;
use crate::domain::entities::Role;

/// Host configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub plugins: PluginsConfig,
    pub permissions: PermissionsConfig,
    pub console: ConsoleConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RuntimeConfig {
    pub name: String,
    pub prefix: String,
    /// Event and command handlers; 0 disables the limit
    pub handler_timeout_ms: u64,
    /// Lifecycle hooks; 0 disables the limit
    pub hook_timeout_ms: u64,
    /// Persisted enabled flags
    pub state_path: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: "plugin-host".to_string(),
            prefix: "/".to_string(),
            handler_timeout_ms: 10_000,
            hook_timeout_ms: 5_000,
            state_path: PathBuf::from("plugin-state.json"),
        }
    }
}

impl RuntimeConfig {
    pub fn handler_timeout(&self) -> Option<Duration> {
        (self.handler_timeout_ms > 0).then(|| Duration::from_millis(self.handler_timeout_ms))
    }

    pub fn hook_timeout(&self) -> Option<Duration> {
        (self.hook_timeout_ms > 0).then(|| Duration::from_millis(self.hook_timeout_ms))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PluginsConfig {
    /// Not enabled on first start; a persisted flag takes precedence
    pub disabled: Vec<String>,
    /// Opaque per-plugin settings, handed over through `PluginContext`
    pub settings: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PermissionsConfig {
    pub default_role: Role,
    /// User id -> role
    pub users: HashMap<String, Role>,
    /// Command path (`"config greeting"`) -> minimum role
    pub commands: HashMap<String, Role>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConsoleConfig {
    pub user_id: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            user_id: "console".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// `PLUGIN_HOST_PREFIX` and `PLUGIN_HOST_STATE_PATH` override the file
    pub fn apply_env(&mut self) {
        if let Ok(prefix) = std::env::var("PLUGIN_HOST_PREFIX") {
            self.runtime.prefix = prefix;
        }
        if let Ok(path) = std::env::var("PLUGIN_HOST_STATE_PATH") {
            self.runtime.state_path = PathBuf::from(path);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.prefix.is_empty() {
            return Err(ConfigError::InvalidValue("runtime.prefix must not be empty".into()));
        }
        if self.console.user_id.is_empty() {
            return Err(ConfigError::InvalidValue("console.user-id must not be empty".into()));
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
