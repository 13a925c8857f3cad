//! Domain layer - Core plugin contracts and data
//! 
//! This layer contains:
//! - Entities: Core objects (PluginDescriptor, CommandFragment, Event, User)
//! - Traits: Contracts implemented by plugins and infrastructure (Plugin, Store, Bot)

pub mod entities;
pub mod traits;
