//! Escalation levels, escalation outcomes and human approval requests.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fixed remedy hierarchy, walked in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    SelfResolve = 1,
    TeamCollaboration = 2,
    TeamLeader = 3,
    UpperTeam = 4,
    Human = 5,
}

impl EscalationLevel {
    pub const ALL: [EscalationLevel; 5] = [
        Self::SelfResolve,
        Self::TeamCollaboration,
        Self::TeamLeader,
        Self::UpperTeam,
        Self::Human,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfResolve => "self_resolve",
            Self::TeamCollaboration => "team_collaboration",
            Self::TeamLeader => "team_leader",
            Self::UpperTeam => "upper_team",
            Self::Human => "human",
        }
    }

    pub fn number(&self) -> u8 {
        *self as u8
    }

    /// Levels from `self` up to and including HUMAN.
    pub fn and_above(self) -> impl Iterator<Item = EscalationLevel> {
        Self::ALL.into_iter().filter(move |l| *l >= self)
    }
}

impl std::fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the handling level did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EscalationAction {
    Retry,
    CollaborationRequested { helper_hollon_id: Uuid },
    LeaderNotified { leader_hollon_id: Uuid },
    UpperTeamNotified { team_id: Uuid, leader_hollon_id: Uuid },
    HumanApprovalRequested { approval_request_id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationResult {
    pub handled: bool,
    pub level: EscalationLevel,
    pub action: EscalationAction,
    pub pending_approval_id: Option<Uuid>,
    pub message: String,
}

impl EscalationResult {
    pub fn is_retry(&self) -> bool {
        matches!(self.action, EscalationAction::Retry)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalRequestType {
    Escalation,
    ConflictResolution,
}

impl ApprovalRequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Escalation => "escalation",
            Self::ConflictResolution => "conflict_resolution",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "escalation" => Some(Self::Escalation),
            "conflict_resolution" => Some(Self::ConflictResolution),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// A decision handed to a human; the system does not wait on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub request_type: ApprovalRequestType,
    pub status: ApprovalStatus,
    pub risk_level: RiskLevel,
    pub title: String,
    pub reasoning: String,
    pub requested_by_hollon_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub conflict_id: Option<Uuid>,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    pub fn new(
        organization_id: Uuid,
        request_type: ApprovalRequestType,
        title: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            request_type,
            status: ApprovalStatus::Pending,
            risk_level: RiskLevel::High,
            title: title.into(),
            reasoning: reasoning.into(),
            requested_by_hollon_id: None,
            task_id: None,
            conflict_id: None,
            resolution_notes: None,
            created_at: Utc::now(),
            expires_at: None,
            resolved_at: None,
        }
    }

    pub fn expiring_in(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(self.created_at + ttl);
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ApprovalStatus::Pending && self.expires_at.is_some_and(|e| e <= now)
    }
}
