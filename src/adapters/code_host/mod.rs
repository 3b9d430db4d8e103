//! CodeHost adapters.

pub mod github_cli;
pub mod in_memory;

pub use github_cli::GithubCliCodeHost;
pub use in_memory::{CodeHostFault, InMemoryCodeHost};
