//! Escalation chain.
//!
//! Walks SELF_RESOLVE → TEAM_COLLABORATION → TEAM_LEADER → UPPER_TEAM → HUMAN
//! starting at the requested level and stops at the first level that handles
//! the failure. Nothing here waits on a response; levels 2-5 only send
//! notifications or create an approval request.

use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ApprovalRequest, ApprovalRequestType, EscalationAction, EscalationLevel, EscalationResult, Hollon,
    HollonStatus, Message, MessageType, Participant, Task, TaskStatus, Team,
};
use crate::domain::ports::{ApprovalRepository, HollonRepository, Notifier, OrganizationRepository, TaskRepository};
use crate::services::event_bus::{EventBus, EventPayload};

/// Picks which idle teammate receives a collaboration request.
pub trait HelperSelector: Send + Sync {
    fn select<'a>(&self, task: &Task, candidates: &'a [Hollon]) -> Option<&'a Hollon>;
}

/// Default policy: the first candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstCandidateSelector;

impl HelperSelector for FirstCandidateSelector {
    fn select<'a>(&self, _task: &Task, candidates: &'a [Hollon]) -> Option<&'a Hollon> {
        candidates.first()
    }
}

/// Walks a failed task up the escalation chain until some level handles it.
pub struct EscalationService {
    tasks: Arc<dyn TaskRepository>,
    hollons: Arc<dyn HollonRepository>,
    orgs: Arc<dyn OrganizationRepository>,
    approvals: Arc<dyn ApprovalRepository>,
    notifier: Arc<dyn Notifier>,
    events: Arc<EventBus>,
    selector: Arc<dyn HelperSelector>,
    max_self_retries: u32,
    approval_ttl: Option<Duration>,
}

impl EscalationService {
    /// Service with three self retries and the first-candidate helper selector.
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        hollons: Arc<dyn HollonRepository>,
        orgs: Arc<dyn OrganizationRepository>,
        approvals: Arc<dyn ApprovalRepository>,
        notifier: Arc<dyn Notifier>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            tasks,
            hollons,
            orgs,
            approvals,
            notifier,
            events,
            selector: Arc::new(FirstCandidateSelector),
            max_self_retries: 3,
            approval_ttl: None,
        }
    }

    /// Retries allowed at the SELF level before moving on.
    pub fn with_max_self_retries(mut self, max: u32) -> Self {
        self.max_self_retries = max;
        self
    }

    /// Replace the strategy that picks a TEAM_COLLABORATION helper.
    pub fn with_selector(mut self, selector: Arc<dyn HelperSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Human approval requests expire after `ttl` when set.
    pub fn with_approval_ttl(mut self, ttl: Duration) -> Self {
        self.approval_ttl = Some(ttl);
        self
    }

    /// Escalate a failure on `task_id`. The returned level is never below
    /// `start_level`.
    pub async fn escalate(
        &self,
        hollon_id: Uuid,
        task_id: Uuid,
        reason: &str,
        start_level: EscalationLevel,
    ) -> DomainResult<EscalationResult> {
        let hollon = self.hollons.get(hollon_id).await?.ok_or(DomainError::HollonNotFound(hollon_id))?;
        let task = self.tasks.get(task_id).await?.ok_or(DomainError::TaskNotFound(task_id))?;
        let team = match hollon.team_id {
            Some(team_id) => self.orgs.get_team(team_id).await?,
            None => None,
        };

        // The chain always ends at HUMAN, which handles whatever is left
        for level in start_level.and_above() {
            self.enter(task_id, hollon_id, level);
            let outcome = match level {
                EscalationLevel::SelfResolve => self.self_resolve(task.clone(), reason).await?,
                EscalationLevel::TeamCollaboration => self.team_collaboration(&hollon, &task, team.as_ref(), reason).await?,
                EscalationLevel::TeamLeader => self.team_leader(&hollon, &task, team.as_ref(), reason).await?,
                EscalationLevel::UpperTeam => self.upper_team(&hollon, &task, team.as_ref(), reason).await?,
                EscalationLevel::Human => break,
            };
            if let Some(result) = outcome {
                return Ok(self.handled(task_id, hollon_id, result));
            }
        }

        let result = self.human(&hollon, &task, reason).await?;
        Ok(self.handled(task_id, hollon_id, result))
    }

    fn enter(&self, task_id: Uuid, hollon_id: Uuid, level: EscalationLevel) {
        tracing::debug!(task_id = %task_id, hollon_id = %hollon_id, level = %level, "Escalation level entered");
        self.events.emit_for(hollon_id, EventPayload::EscalationLevelEntered { task_id, level });
    }

    fn handled(&self, task_id: Uuid, hollon_id: Uuid, result: EscalationResult) -> EscalationResult {
        tracing::info!(
            task_id = %task_id,
            hollon_id = %hollon_id,
            level = %result.level,
            message = %result.message,
            "Escalation handled"
        );
        self.events.emit_for(
            hollon_id,
            EventPayload::EscalationHandled {
                task_id,
                level: result.level,
            },
        );
        result
    }

    /// Retry in place: same task, same assignee, one more attempt on the counter.
    async fn self_resolve(&self, mut task: Task, reason: &str) -> DomainResult<Option<EscalationResult>> {
        if task.retry_count >= self.max_self_retries {
            return Ok(None);
        }

        task.retry_count += 1;
        task.status = TaskStatus::Ready;
        task.error_message = Some(reason.to_string());
        task.updated_at = Utc::now();
        self.tasks.update(&task).await?;

        self.events.emit(EventPayload::TaskRetrying {
            task_id: task.id,
            retry_count: task.retry_count,
        });
        Ok(Some(EscalationResult {
            handled: true,
            level: EscalationLevel::SelfResolve,
            action: EscalationAction::Retry,
            pending_approval_id: None,
            message: format!("Retry {}/{}", task.retry_count, self.max_self_retries),
        }))
    }

    async fn team_collaboration(
        &self,
        hollon: &Hollon,
        task: &Task,
        team: Option<&Team>,
        reason: &str,
    ) -> DomainResult<Option<EscalationResult>> {
        let Some(team) = team else {
            return Ok(None);
        };

        let candidates: Vec<Hollon> = self
            .hollons
            .list_by_team(team.id)
            .await?
            .into_iter()
            .filter(|h| h.id != hollon.id && h.status == HollonStatus::Idle && !h.is_temporary())
            .collect();
        let Some(helper) = self.selector.select(task, &candidates) else {
            return Ok(None);
        };

        let message = Message::new(
            Participant::Hollon(helper.id),
            MessageType::CollaborationRequest,
            format!("{} needs help with \"{}\": {}", hollon.name, task.title, reason),
        )
        .from_hollon(hollon.id)
        .with_metadata(json!({ "task_id": task.id, "reason": reason }));
        self.notify(&message).await;

        Ok(Some(EscalationResult {
            handled: true,
            level: EscalationLevel::TeamCollaboration,
            action: EscalationAction::CollaborationRequested {
                helper_hollon_id: helper.id,
            },
            pending_approval_id: None,
            message: format!("Collaboration requested from {}", helper.name),
        }))
    }

    async fn team_leader(
        &self,
        hollon: &Hollon,
        task: &Task,
        team: Option<&Team>,
        reason: &str,
    ) -> DomainResult<Option<EscalationResult>> {
        let Some(leader_id) = team.and_then(|t| t.leader_hollon_id).filter(|id| *id != hollon.id) else {
            return Ok(None);
        };

        let message = Message::new(
            Participant::Hollon(leader_id),
            MessageType::DecisionRequest,
            format!("Decision needed on \"{}\": {}", task.title, reason),
        )
        .from_hollon(hollon.id)
        .with_metadata(json!({ "task_id": task.id, "reason": reason, "level": EscalationLevel::TeamLeader }));
        self.notify(&message).await;

        Ok(Some(EscalationResult {
            handled: true,
            level: EscalationLevel::TeamLeader,
            action: EscalationAction::LeaderNotified {
                leader_hollon_id: leader_id,
            },
            pending_approval_id: None,
            message: "Team leader notified".to_string(),
        }))
    }

    async fn upper_team(
        &self,
        hollon: &Hollon,
        task: &Task,
        team: Option<&Team>,
        reason: &str,
    ) -> DomainResult<Option<EscalationResult>> {
        let Some(parent_team_id) = team.and_then(|t| t.parent_team_id) else {
            return Ok(None);
        };
        let Some(parent_team) = self.orgs.get_team(parent_team_id).await? else {
            return Ok(None);
        };
        let Some(leader_id) = parent_team.leader_hollon_id else {
            return Ok(None);
        };

        let message = Message::new(
            Participant::Hollon(leader_id),
            MessageType::Escalation,
            format!("Escalated from team {}: \"{}\": {}", team.map_or("", |t| t.name.as_str()), task.title, reason),
        )
        .from_hollon(hollon.id)
        .with_metadata(json!({ "task_id": task.id, "reason": reason, "level": EscalationLevel::UpperTeam }));
        self.notify(&message).await;

        Ok(Some(EscalationResult {
            handled: true,
            level: EscalationLevel::UpperTeam,
            action: EscalationAction::UpperTeamNotified {
                team_id: parent_team.id,
                leader_hollon_id: leader_id,
            },
            pending_approval_id: None,
            message: format!("Leader of {} notified", parent_team.name),
        }))
    }

    async fn human(&self, hollon: &Hollon, task: &Task, reason: &str) -> DomainResult<EscalationResult> {
        let mut request = ApprovalRequest::new(
            task.organization_id,
            ApprovalRequestType::Escalation,
            format!("Escalation: {}", task.title),
            reason,
        );
        request.requested_by_hollon_id = Some(hollon.id);
        request.task_id = Some(task.id);
        if let Some(ttl) = self.approval_ttl {
            request = request.expiring_in(ttl);
        }
        self.approvals.create(&request).await?;

        let message = Message::new(
            Participant::Human,
            MessageType::ApprovalRequest,
            format!("Human decision needed on \"{}\": {}", task.title, reason),
        )
        .from_hollon(hollon.id)
        .with_metadata(json!({ "task_id": task.id, "approval_request_id": request.id }));
        self.notify(&message).await;
        self.events.emit(EventPayload::ApprovalRequested {
            approval_request_id: request.id,
        });

        Ok(EscalationResult {
            handled: true,
            level: EscalationLevel::Human,
            action: EscalationAction::HumanApprovalRequested {
                approval_request_id: request.id,
            },
            pending_approval_id: Some(request.id),
            message: "Approval request created".to_string(),
        })
    }

    async fn notify(&self, message: &Message) {
        if let Err(e) = self.notifier.send(message).await {
            tracing::warn!(to = %message.to, error = %e, "Escalation notification failed");
        }
    }
}
