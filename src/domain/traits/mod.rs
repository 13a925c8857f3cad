//! Domain traits - Abstractions for plugins and infrastructure implementations

pub mod bot;
pub mod plugin;
pub mod store;

pub use bot::{Bot, BotInfo};
pub use plugin::{Plugin, PluginContext, PluginHandle, PluginResult};
pub use store::Store;
