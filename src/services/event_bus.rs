//! EventBus service for orchestration telemetry.
//!
//! Broadcast-based: every published event gets a monotonically increasing
//! sequence number and is fanned out to all live subscribers. Publishing
//! never fails the caller; with no subscribers the event is dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::models::{ConflictType, EscalationLevel};

/// Monotonically increasing sequence number assigned by EventBus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Event category for filtering and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Task,
    Hollon,
    Decomposition,
    Review,
    Escalation,
    Conflict,
    Approval,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task => write!(f, "task"),
            Self::Hollon => write!(f, "hollon"),
            Self::Decomposition => write!(f, "decomposition"),
            Self::Review => write!(f, "review"),
            Self::Escalation => write!(f, "escalation"),
            Self::Conflict => write!(f, "conflict"),
            Self::Approval => write!(f, "approval"),
        }
    }
}

/// Event envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedEvent {
    /// Unique event id
    pub id: Uuid,
    /// Assigned by the bus on publish
    pub sequence: SequenceNumber,
    /// Publish time
    pub timestamp: DateTime<Utc>,
    /// Derived from the payload
    pub severity: EventSeverity,
    /// Derived from the payload
    pub category: EventCategory,
    /// Hollon that caused the event, when known
    pub hollon_id: Option<Uuid>,
    /// Task the payload refers to, when any
    pub task_id: Option<Uuid>,
    /// Event body
    pub payload: EventPayload,
}

/// Everything the orchestrator reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    // Task lifecycle
    TaskClaimed { task_id: Uuid, hollon_id: Uuid },
    TaskReady { task_id: Uuid },
    TaskCompleted { task_id: Uuid },
    TaskFailed { task_id: Uuid, reason: String },
    TaskBlocked { task_id: Uuid, reason: String },
    TaskRetrying { task_id: Uuid, retry_count: u32 },
    QualityGateFailed { task_id: Uuid, reason: String, can_retry: bool },

    // Hollon lifecycle
    HollonSpawned { hollon_id: Uuid, parent_hollon_id: Uuid, role_id: Uuid },
    HollonDestroyed { hollon_id: Uuid },

    // Decomposition
    TaskDecomposed { task_id: Uuid, subtask_count: usize },
    DecompositionParked { task_id: Uuid, reason: String },

    // Review cycle
    ReviewStarted { task_id: Uuid, reviewer_hollon_id: Uuid },
    ReviewDecided { task_id: Uuid, action: String },
    ReviewVerdictApplied { task_id: Uuid, verdict: String },

    // Escalation
    EscalationLevelEntered { task_id: Uuid, level: EscalationLevel },
    EscalationHandled { task_id: Uuid, level: EscalationLevel },

    // Conflicts and approvals
    ConflictDetected { conflict_id: Uuid, conflict_type: ConflictType, task_count: usize },
    ConflictResolved { conflict_id: Uuid },
    ConflictEscalated { conflict_id: Uuid, approval_request_id: Uuid },
    ApprovalRequested { approval_request_id: Uuid },
}

impl EventPayload {
    /// Category used for filtering.
    pub fn category(&self) -> EventCategory {
        match self {
            Self::TaskClaimed { .. }
            | Self::TaskReady { .. }
            | Self::TaskCompleted { .. }
            | Self::TaskFailed { .. }
            | Self::TaskBlocked { .. }
            | Self::TaskRetrying { .. }
            | Self::QualityGateFailed { .. } => EventCategory::Task,
            Self::HollonSpawned { .. } | Self::HollonDestroyed { .. } => EventCategory::Hollon,
            Self::TaskDecomposed { .. } | Self::DecompositionParked { .. } => EventCategory::Decomposition,
            Self::ReviewStarted { .. } | Self::ReviewDecided { .. } | Self::ReviewVerdictApplied { .. } => {
                EventCategory::Review
            }
            Self::EscalationLevelEntered { .. } | Self::EscalationHandled { .. } => EventCategory::Escalation,
            Self::ConflictDetected { .. } | Self::ConflictResolved { .. } | Self::ConflictEscalated { .. } => {
                EventCategory::Conflict
            }
            Self::ApprovalRequested { .. } => EventCategory::Approval,
        }
    }

    /// Default severity of this kind of event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            Self::TaskFailed { .. } => EventSeverity::Error,
            Self::QualityGateFailed { .. }
            | Self::TaskBlocked { .. }
            | Self::DecompositionParked { .. }
            | Self::ConflictDetected { .. }
            | Self::ConflictEscalated { .. }
            | Self::ApprovalRequested { .. } => EventSeverity::Warning,
            Self::EscalationLevelEntered { .. } => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }

    fn task_id(&self) -> Option<Uuid> {
        match self {
            Self::TaskClaimed { task_id, .. }
            | Self::TaskReady { task_id }
            | Self::TaskCompleted { task_id }
            | Self::TaskFailed { task_id, .. }
            | Self::TaskBlocked { task_id, .. }
            | Self::TaskRetrying { task_id, .. }
            | Self::QualityGateFailed { task_id, .. }
            | Self::TaskDecomposed { task_id, .. }
            | Self::DecompositionParked { task_id, .. }
            | Self::ReviewStarted { task_id, .. }
            | Self::ReviewDecided { task_id, .. }
            | Self::ReviewVerdictApplied { task_id, .. }
            | Self::EscalationLevelEntered { task_id, .. }
            | Self::EscalationHandled { task_id, .. } => Some(*task_id),
            _ => None,
        }
    }
}

impl UnifiedEvent {
    /// Envelope with category, severity and task id derived from `payload`.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: SequenceNumber(0),
            timestamp: Utc::now(),
            severity: payload.severity(),
            category: payload.category(),
            hollon_id: None,
            task_id: payload.task_id(),
            payload,
        }
    }

    /// Attribute the event to a hollon.
    pub fn for_hollon(mut self, hollon_id: Uuid) -> Self {
        self.hollon_id = Some(hollon_id);
        self
    }
}

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Broadcast channel capacity; slow subscribers lag past this
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { channel_capacity: 1024 }
    }
}

/// In-process broadcast of orchestration events with a global sequence.
pub struct EventBus {
    sender: broadcast::Sender<UnifiedEvent>,
    sequence: AtomicU64,
}

impl EventBus {
    /// Bus with no subscribers.
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity);
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    /// Stamp the next sequence number and broadcast. Never fails.
    pub fn publish(&self, mut event: UnifiedEvent) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        event.sequence = SequenceNumber(seq);

        tracing::trace!(
            sequence = seq,
            category = %event.category,
            task_id = ?event.task_id,
            "event published"
        );

        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    /// Shorthand for publishing a bare payload.
    pub fn emit(&self, payload: EventPayload) {
        self.publish(UnifiedEvent::new(payload));
    }

    /// Publish a payload attributed to `hollon_id`.
    pub fn emit_for(&self, hollon_id: Uuid, payload: EventPayload) {
        self.publish(UnifiedEvent::new(payload).for_hollon(hollon_id));
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<UnifiedEvent> {
        self.sender.subscribe()
    }

    /// Sequence number the next event will get.
    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    /// Number of live receivers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_sequence_assignment() {
        let bus = EventBus::default();
        assert_eq!(bus.current_sequence().0, 0);

        let mut rx = bus.subscribe();
        let task_id = Uuid::new_v4();

        bus.emit(EventPayload::TaskReady { task_id });
        let first = rx.recv().await.unwrap();
        assert_eq!(first.sequence.0, 0);
        assert_eq!(first.task_id, Some(task_id));

        bus.emit(EventPayload::TaskCompleted { task_id });
        let second = rx.recv().await.unwrap();
        assert_eq!(second.sequence.0, 1);
        assert_eq!(bus.current_sequence().0, 2);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.emit(EventPayload::ConflictResolved { conflict_id: Uuid::new_v4() });
        assert_eq!(bus.current_sequence().0, 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_payload_classification() {
        let event = UnifiedEvent::new(EventPayload::TaskFailed {
            task_id: Uuid::new_v4(),
            reason: "boom".to_string(),
        });
        assert_eq!(event.severity, EventSeverity::Error);
        assert_eq!(event.category, EventCategory::Task);

        let event = UnifiedEvent::new(EventPayload::EscalationLevelEntered {
            task_id: Uuid::new_v4(),
            level: EscalationLevel::TeamLeader,
        });
        assert_eq!(event.category, EventCategory::Escalation);
    }
}
