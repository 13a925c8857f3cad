//! Built-in feature plugins
//!
//! Each module exposes a `manifest()` and a plugin type; `builtin_loader`
//! registers their constructors with a loader.

pub mod core_plugin;
pub mod greeter;
pub mod trivia;

use std::sync::Arc;

use crate::domain::traits::Plugin;
use crate::infrastructure::plugins::PluginLoader;

pub use core_plugin::CorePlugin;
pub use greeter::GreeterPlugin;
pub use trivia::TriviaPlugin;

/// Loader with every built-in plugin registered
pub fn builtin_loader() -> PluginLoader {
    PluginLoader::new()
        .with(core_plugin::manifest(), || Ok(Arc::new(CorePlugin::new()) as Arc<dyn Plugin>))
        .with(trivia::manifest(), || Ok(Arc::new(TriviaPlugin::new()) as Arc<dyn Plugin>))
        .with(greeter::manifest(), || Ok(Arc::new(GreeterPlugin::new()) as Arc<dyn Plugin>))
}
