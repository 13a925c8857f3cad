//! Event routing - Priority-ordered dispatch of application events to plugins

pub mod bridge;
pub mod router;

pub use bridge::PluginEventHandler;
pub use router::{handler_fn, DispatchReport, EventHandler, EventRouter, HandlerRecord, SubscriptionId};
