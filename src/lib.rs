//! Hollon - orchestration core for autonomous worker agents
//!
//! Hollons pull tasks from a shared pool, decompose complex work across
//! temporary sub-hollons, review each other's results, escalate failures
//! through a fixed chain and resolve contention over shared files and
//! resources.
//!
//! # Architecture
//!
//! The crate follows a hexagonal layout:
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Service Layer** (`services`): task pool, orchestrator, escalation,
//!   conflict resolution, quality gate and the dispatch loop
//! - **Adapters** (`adapters`): `SQLite` repositories, Brain and code host
//!   implementations
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use hollon::{HollonOrchestrator, OrchestratorPorts};
//!
//! let ports = OrchestratorPorts::sqlite(pool, brain, code_host);
//! let orchestrator = HollonOrchestrator::new(ports, &config, events);
//! let outcome = orchestrator.run_cycle(hollon_id).await?;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{Config, Hollon, HollonStatus, Task, TaskStatus, TaskType};
pub use domain::ports::{Brain, CodeHost, TaskRepository};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{CycleOutcome, HollonDispatcher, HollonOrchestrator, OrchestratorPorts, TaskPool};
