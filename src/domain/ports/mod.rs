//! Port trait definitions (Hexagonal Architecture)
//!
//! Repositories cover persistence; `Brain`, `CodeHost` and `Notifier` are the
//! external collaborators the orchestration core calls out to.

pub mod brain;
pub mod code_host;
pub mod conflict_repository;
pub mod hollon_repository;
pub mod notifier;
pub mod organization_repository;
pub mod task_repository;

pub use brain::Brain;
pub use code_host::CodeHost;
pub use conflict_repository::{ApprovalRepository, ConflictRepository, CostRepository};
pub use hollon_repository::HollonRepository;
pub use notifier::Notifier;
pub use organization_repository::{OrganizationRepository, RoleRepository};
pub use task_repository::{TaskFilter, TaskRepository};
