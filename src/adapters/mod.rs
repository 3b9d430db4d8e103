//! Infrastructure adapters for external systems.

pub mod brain;
pub mod code_host;
pub mod sqlite;
