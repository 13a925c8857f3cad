//! Domain entities - Core business objects with no external dependencies

pub mod user;
pub mod plugin;
pub mod command;
pub mod event;
pub mod invocation;

pub use user::{Role, User};
pub use plugin::{PluginDescriptor, PluginInfo, PluginManifest, PluginState, PluginStats};
pub use command::{
    CommandDefinition, CommandFragment, CommandSummary, FragmentKind, FragmentSlot,
    InvocationResult, Suggestion,
};
pub use event::{Event, Propagation, SubscriptionSpec};
pub use invocation::InvocationContext;
