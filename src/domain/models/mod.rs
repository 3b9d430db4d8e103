//! Domain entities and value types.

pub mod brain;
pub mod config;
pub mod conflict;
pub mod cost;
pub mod escalation;
pub mod hollon;
pub mod message;
pub mod organization;
pub mod pull_request;
pub mod role;
pub mod task;

pub use brain::{BrainOptions, BrainRequest, BrainResponse, TokenUsage};
pub use config::{
    BrainConfig, CodeHostConfig, Config, ConflictConfig, DatabaseConfig, LoggingConfig, OrchestratorConfig,
    SpawnLimitsConfig,
};
pub use conflict::{Conflict, ConflictStatus, ConflictType, ResolutionStrategy};
pub use cost::CostRecord;
pub use escalation::{
    ApprovalRequest, ApprovalRequestType, ApprovalStatus, EscalationAction, EscalationLevel,
    EscalationResult, RiskLevel,
};
pub use hollon::{Hollon, HollonLifecycle, HollonStatus};
pub use message::{Message, MessageType, Participant};
pub use organization::{Organization, Team};
pub use pull_request::{PullRequest, PullRequestReview, PullRequestStatus, ReviewVerdict};
pub use role::Role;
pub use task::{EstimatedComplexity, Task, TaskPriority, TaskStatus, TaskType};
