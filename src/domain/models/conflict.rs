//! Conflict records produced by the conflict detector.
//!
//! Conflicts are never deleted; they move to RESOLVED or ESCALATED and stay
//! as an audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Two active tasks touch the same file
    File,
    /// Two in-progress tasks share a tagged resource
    Resource,
    /// A hollon holds more than one P1/P2 task
    Priority,
    /// A hollon holds more than one task due within the deadline window
    Deadline,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Resource => "resource",
            Self::Priority => "priority",
            Self::Deadline => "deadline",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "file" => Some(Self::File),
            "resource" => Some(Self::Resource),
            "priority" => Some(Self::Priority),
            "deadline" => Some(Self::Deadline),
            _ => None,
        }
    }

    /// Resolution strategy applied right after detection.
    pub fn default_strategy(&self) -> ResolutionStrategy {
        match self {
            Self::File => ResolutionStrategy::SequentialExecution,
            Self::Resource => ResolutionStrategy::PriorityPreemption,
            Self::Priority | Self::Deadline => ResolutionStrategy::ManualIntervention,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Detected,
    Resolving,
    Resolved,
    Escalated,
}

impl ConflictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
            Self::Escalated => "escalated",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "detected" => Some(Self::Detected),
            "resolving" => Some(Self::Resolving),
            "resolved" => Some(Self::Resolved),
            "escalated" => Some(Self::Escalated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Oldest task keeps running, the rest wait behind it
    SequentialExecution,
    /// Highest-priority task keeps the resource
    PriorityPreemption,
    /// A human decides
    ManualIntervention,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SequentialExecution => "sequential_execution",
            Self::PriorityPreemption => "priority_preemption",
            Self::ManualIntervention => "manual_intervention",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sequential_execution" => Some(Self::SequentialExecution),
            "priority_preemption" => Some(Self::PriorityPreemption),
            "manual_intervention" => Some(Self::ManualIntervention),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub conflict_type: ConflictType,
    pub status: ConflictStatus,
    pub affected_task_ids: Vec<Uuid>,
    pub affected_hollon_ids: Vec<Uuid>,
    /// The shared files, tags or hollon the conflict is about
    pub description: String,
    pub resolution_strategy: Option<ResolutionStrategy>,
    pub resolved: bool,
    pub resolution_notes: Option<String>,
    pub approval_request_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Conflict {
    pub fn new(
        organization_id: Uuid,
        conflict_type: ConflictType,
        affected_task_ids: Vec<Uuid>,
        affected_hollon_ids: Vec<Uuid>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            conflict_type,
            status: ConflictStatus::Detected,
            affected_task_ids,
            affected_hollon_ids,
            description: description.into(),
            resolution_strategy: None,
            resolved: false,
            resolution_notes: None,
            approval_request_id: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, ConflictStatus::Detected | ConflictStatus::Resolving)
    }
}
