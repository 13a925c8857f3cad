//! Infrastructure layer - External concerns
//! 
//! This layer contains:
//! - Config: Configuration loading
//! - Storage: Persisted runtime state
//! - Plugins: Plugin registry and factory loader
//! - Adapters: Platform integrations (console)

pub mod adapters;
pub mod config;
pub mod plugins;
pub mod storage;
