//! Messages delivered through the Notify port.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A message endpoint: a hollon, or the human operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Participant {
    Hollon(Uuid),
    Human,
}

impl Participant {
    /// Storage form: the hollon id, or the literal `human`.
    pub fn to_storage(&self) -> String {
        match self {
            Self::Hollon(id) => id.to_string(),
            Self::Human => "human".to_string(),
        }
    }

    pub fn from_storage(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("human") {
            return Some(Self::Human);
        }
        Uuid::parse_str(s).ok().map(Self::Hollon)
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_storage())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    CollaborationRequest,
    DecisionRequest,
    Escalation,
    ConflictNotice,
    ApprovalRequest,
    ReviewRequest,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollaborationRequest => "collaboration_request",
            Self::DecisionRequest => "decision_request",
            Self::Escalation => "escalation",
            Self::ConflictNotice => "conflict_notice",
            Self::ApprovalRequest => "approval_request",
            Self::ReviewRequest => "review_request",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "collaboration_request" => Some(Self::CollaborationRequest),
            "decision_request" => Some(Self::DecisionRequest),
            "escalation" => Some(Self::Escalation),
            "conflict_notice" => Some(Self::ConflictNotice),
            "approval_request" => Some(Self::ApprovalRequest),
            "review_request" => Some(Self::ReviewRequest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    /// `None` for system-originated messages
    pub from: Option<Participant>,
    pub to: Participant,
    pub message_type: MessageType,
    pub content: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(to: Participant, message_type: MessageType, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: None,
            to,
            message_type,
            content: content.into(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn from_hollon(mut self, hollon_id: Uuid) -> Self {
        self.from = Some(Participant::Hollon(hollon_id));
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_storage() {
        let id = Uuid::new_v4();
        assert_eq!(Participant::from_storage(&id.to_string()), Some(Participant::Hollon(id)));
        assert_eq!(Participant::from_storage("HUMAN"), Some(Participant::Human));
        assert_eq!(Participant::from_storage("nobody"), None);
    }
}
