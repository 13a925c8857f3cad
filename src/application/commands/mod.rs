//! Command namespace - fragment registry and permission checks

pub mod permissions;
pub mod registry;

pub use permissions::{CommandAccess, Decision, PermissionGate};
pub use registry::CommandRegistry;
