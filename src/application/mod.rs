//! Application layer - Runtime services
//! 
//! This layer contains:
//! - Lifecycle: Plugin state machine and cascade disable
//! - Reloader: Hot reload with rollback
//! - Events: Priority event routing
//! - Commands: Command namespace and permission gate
//! - Runtime: Wiring and the administrative surface
//! - Errors: Error taxonomy
//! - Messaging: Input parsing

pub mod commands;
pub mod errors;
pub mod events;
pub mod guard;
pub mod lifecycle;
pub mod messaging;
pub mod reloader;
pub mod runtime;

pub use lifecycle::{EnableOutcome, LifecycleManager};
pub use reloader::{HotReloader, ReloadReport};
pub use runtime::{PluginRuntime, RuntimeStats, StartupReport};
