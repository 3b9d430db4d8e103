//! Domain errors for the hollon orchestration core.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the orchestration core.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Hollon not found: {0}")]
    HollonNotFound(Uuid),

    #[error("Role not found: {0}")]
    RoleNotFound(Uuid),

    #[error("Team not found: {0}")]
    TeamNotFound(Uuid),

    #[error("Organization not found: {0}")]
    OrganizationNotFound(Uuid),

    #[error("Conflict not found: {0}")]
    ConflictNotFound(Uuid),

    #[error("Approval request not found: {0}")]
    ApprovalNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Brain call timed out after {seconds}s")]
    BrainTimeout { seconds: u64 },

    #[error("Brain call failed: {0}")]
    BrainFailed(String),

    #[error("Could not parse decision from brain output: {0}")]
    DecisionParse(String),

    #[error("Spawn limit reached: {limit} ({current}/{max})")]
    SpawnLimitReached { limit: String, current: u32, max: u32 },

    #[error("No roles available for spawning in organization {0}")]
    NoSpawnableRoles(Uuid),

    #[error("Code host error: {0}")]
    CodeHostError(String),

    #[error("Code host call {operation} timed out after {seconds}s")]
    CodeHostTimeout { operation: &'static str, seconds: u64 },

    #[error("Notification failed: {0}")]
    NotificationFailed(String),
}

impl DomainError {
    /// Errors produced by the reasoning engine itself (timeout or process failure).
    pub fn is_brain_failure(&self) -> bool {
        matches!(self, Self::BrainTimeout { .. } | Self::BrainFailed(_))
    }

    /// Errors produced by the code host (timeout or adapter failure).
    pub fn is_code_host_failure(&self) -> bool {
        matches!(self, Self::CodeHostTimeout { .. } | Self::CodeHostError(_))
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
