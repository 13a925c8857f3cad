//! Plugin registry and loader
//!
//! Plugins are compiled in and registered with the loader as named
//! constructors; the registry owns every live instance.

pub mod loader;
pub mod registry;

pub use loader::{LoadPlan, LoadReport, PluginFactory, PluginLoader};
pub use registry::PluginRegistry;
