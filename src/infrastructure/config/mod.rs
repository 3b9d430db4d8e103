//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading from the project's `.hollon/` directory
//! - Environment variable overrides
//! - Validation of the merged result

pub mod loader;

pub use loader::{ConfigError, ConfigLoader, CONFIG_DIR};
