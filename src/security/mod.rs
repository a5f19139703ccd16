// src/security/mod.rs — Access control

pub mod blocklist;
pub mod permissions;

pub use blocklist::Blocklist;
pub use permissions::{Role, RoleBook};
