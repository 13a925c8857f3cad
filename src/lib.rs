//! plugin-host - a plugin runtime with dependency-ordered loading, hot
//! reload, priority event routing and permission-gated commands

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod plugins;

#[cfg(test)]
pub(crate) mod testing;
