//! Conflict detection and resolution.
//!
//! FILE and RESOURCE contention is resolved on the spot by keeping one task
//! and blocking the rest behind it. PRIORITY and DEADLINE contention needs a
//! business call, so those are escalated to a human unconditionally.

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ApprovalRequest, ApprovalRequestType, Conflict, ConflictStatus, ConflictType, Message, MessageType,
    Participant, ResolutionStrategy, Task, TaskStatus,
};
use crate::domain::ports::{ApprovalRepository, ConflictRepository, Notifier, TaskRepository};
use crate::services::event_bus::{EventBus, EventPayload};

/// What to check. Empty sets skip the corresponding check.
#[derive(Debug, Clone, Default)]
pub struct ConflictContext {
    /// Organization whose active tasks are compared
    pub organization_id: Uuid,
    /// Files the claimed task touches
    pub files: Vec<String>,
    /// Tags naming shared resources
    pub tags: Vec<String>,
    /// Tasks inspected by the priority and deadline checks
    pub task_ids: Vec<Uuid>,
}

impl ConflictContext {
    /// Context with every check disabled.
    pub fn new(organization_id: Uuid) -> Self {
        Self {
            organization_id,
            ..Default::default()
        }
    }

    /// Enable the file-lock check for `files`.
    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    /// Enable the shared-resource check for `tags`.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Tasks to compare for priority and deadline collisions.
    pub fn with_task_ids(mut self, task_ids: Vec<Uuid>) -> Self {
        self.task_ids = task_ids;
        self
    }
}

/// Conflicts found by one detection pass.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictDetectionResult {
    /// True when `conflicts` is non-empty
    pub has_conflicts: bool,
    /// Persisted conflicts, with their resolution applied
    pub conflicts: Vec<Conflict>,
}

/// Detects and resolves resource conflicts between active tasks.
pub struct ConflictResolver {
    tasks: Arc<dyn TaskRepository>,
    conflicts: Arc<dyn ConflictRepository>,
    approvals: Arc<dyn ApprovalRepository>,
    notifier: Arc<dyn Notifier>,
    events: Arc<EventBus>,
    deadline_window: Duration,
}

impl ConflictResolver {
    /// Resolver with a 24 hour deadline window.
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        conflicts: Arc<dyn ConflictRepository>,
        approvals: Arc<dyn ApprovalRepository>,
        notifier: Arc<dyn Notifier>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            tasks,
            conflicts,
            approvals,
            notifier,
            events,
            deadline_window: Duration::hours(24),
        }
    }

    /// Tasks due within `window` of each other count as a deadline collision.
    pub fn with_deadline_window(mut self, window: Duration) -> Self {
        self.deadline_window = window;
        self
    }

    /// Run all four checks and resolve whatever they find.
    pub async fn detect_and_resolve(&self, ctx: &ConflictContext) -> DomainResult<ConflictDetectionResult> {
        let mut detected = Vec::new();

        if let Some(c) = self.check_files(ctx).await? {
            detected.push(c);
        }
        if let Some(c) = self.check_resources(ctx).await? {
            detected.push(c);
        }

        let scoped = self.load_scoped_tasks(ctx).await?;
        if let Some(c) = check_priority(ctx.organization_id, &scoped) {
            detected.push(c);
        }
        if let Some(c) = self.check_deadlines(ctx, &scoped) {
            detected.push(c);
        }

        let mut conflicts = Vec::new();
        for conflict in detected {
            if self.already_recorded(&conflict).await? {
                tracing::debug!(conflict_type = conflict.conflict_type.as_str(), "Conflict already recorded");
                continue;
            }
            conflicts.push(self.record_and_resolve(conflict).await?);
        }

        Ok(ConflictDetectionResult {
            has_conflicts: !conflicts.is_empty(),
            conflicts,
        })
    }

    async fn check_files(&self, ctx: &ConflictContext) -> DomainResult<Option<Conflict>> {
        if ctx.files.is_empty() {
            return Ok(None);
        }
        let matching = self.tasks.find_active_by_files(ctx.organization_id, &ctx.files).await?;
        let matching = self.without_containers(matching).await?;
        if matching.len() < 2 {
            return Ok(None);
        }

        let shared: BTreeSet<&str> = matching
            .iter()
            .flat_map(|t| t.affected_files.iter())
            .filter(|f| ctx.files.contains(f))
            .map(String::as_str)
            .collect();
        let description = format!("Shared files: {}", shared.into_iter().collect::<Vec<_>>().join(", "));
        Ok(Some(conflict_for(ctx.organization_id, ConflictType::File, &matching, description)))
    }

    async fn check_resources(&self, ctx: &ConflictContext) -> DomainResult<Option<Conflict>> {
        if ctx.tags.is_empty() {
            return Ok(None);
        }
        let matching = self.tasks.find_in_progress_by_tags(ctx.organization_id, &ctx.tags).await?;
        let matching = self.without_containers(matching).await?;
        if matching.len() < 2 {
            return Ok(None);
        }
        let description = format!("Shared resources: {}", ctx.tags.join(", "));
        Ok(Some(conflict_for(ctx.organization_id, ConflictType::Resource, &matching, description)))
    }

    /// Parents that were decomposed are containers for their subtasks, not
    /// competitors; blocking a child behind its own parent would deadlock.
    async fn without_containers(&self, tasks: Vec<Task>) -> DomainResult<Vec<Task>> {
        let mut kept = Vec::with_capacity(tasks.len());
        for task in tasks {
            let children = self.tasks.get_subtasks(task.id).await?;
            if children.iter().all(|c| c.status == TaskStatus::Cancelled) {
                kept.push(task);
            }
        }
        Ok(kept)
    }

    async fn load_scoped_tasks(&self, ctx: &ConflictContext) -> DomainResult<Vec<Task>> {
        let mut scoped = Vec::new();
        for id in &ctx.task_ids {
            if let Some(task) = self.tasks.get(*id).await? {
                if !task.is_terminal() {
                    scoped.push(task);
                }
            }
        }
        Ok(scoped)
    }

    fn check_deadlines(&self, ctx: &ConflictContext, scoped: &[Task]) -> Option<Conflict> {
        let now = Utc::now();
        let horizon = now + self.deadline_window;
        let due_soon = scoped
            .iter()
            .filter(|t| t.due_date.is_some_and(|due| due >= now && due <= horizon));
        let overloaded = group_by_assignee(due_soon);
        if overloaded.is_empty() {
            return None;
        }
        let tasks: Vec<&Task> = overloaded.values().flatten().copied().collect();
        let description = format!(
            "{} hollon(s) hold more than one task due within {}h",
            overloaded.len(),
            self.deadline_window.num_hours()
        );
        Some(conflict_for_refs(ctx.organization_id, ConflictType::Deadline, &tasks, description))
    }

    /// An unresolved or escalated conflict of the same type over the same
    /// task set is not recorded twice.
    async fn already_recorded(&self, conflict: &Conflict) -> DomainResult<bool> {
        let wanted: BTreeSet<Uuid> = conflict.affected_task_ids.iter().copied().collect();
        let existing = self.conflicts.list(conflict.organization_id, None).await?;
        Ok(existing.iter().any(|c| {
            c.conflict_type == conflict.conflict_type
                && c.status != ConflictStatus::Resolved
                && c.affected_task_ids.iter().copied().collect::<BTreeSet<_>>() == wanted
        }))
    }

    async fn record_and_resolve(&self, mut conflict: Conflict) -> DomainResult<Conflict> {
        self.conflicts.create(&conflict).await?;
        tracing::warn!(
            conflict_id = %conflict.id,
            conflict_type = conflict.conflict_type.as_str(),
            tasks = conflict.affected_task_ids.len(),
            "Conflict detected"
        );
        self.events.emit(EventPayload::ConflictDetected {
            conflict_id: conflict.id,
            conflict_type: conflict.conflict_type,
            task_count: conflict.affected_task_ids.len(),
        });

        conflict.status = ConflictStatus::Resolving;
        match conflict.conflict_type.default_strategy() {
            ResolutionStrategy::SequentialExecution | ResolutionStrategy::PriorityPreemption => {
                self.keep_one_block_rest(&mut conflict).await?;
            }
            ResolutionStrategy::ManualIntervention => {
                self.escalate_to_human(&mut conflict).await?;
            }
        }
        self.conflicts.update(&conflict).await?;
        Ok(conflict)
    }

    async fn keep_one_block_rest(&self, conflict: &mut Conflict) -> DomainResult<()> {
        let strategy = conflict.conflict_type.default_strategy();
        let mut tasks = Vec::new();
        for id in &conflict.affected_task_ids {
            if let Some(task) = self.tasks.get(*id).await? {
                tasks.push(task);
            }
        }

        match strategy {
            // Oldest keeps running
            ResolutionStrategy::SequentialExecution => tasks.sort_by_key(|t| t.created_at),
            // Highest priority, then oldest
            _ => tasks.sort_by_key(|t| (t.priority.rank(), t.created_at)),
        }
        let Some((winner, losers)) = tasks.split_first() else {
            return Ok(());
        };

        for loser in losers {
            let mut loser = loser.clone();
            let reason = format!(
                "Waiting for \"{}\" ({}): {}",
                winner.title, winner.id, conflict.description
            );
            loser.status = TaskStatus::Blocked;
            loser.blocked_reason = Some(reason.clone());
            if !winner.dependencies.contains(&loser.id) && !loser.dependencies.contains(&winner.id) {
                loser.dependencies.push(winner.id);
            }
            loser.updated_at = Utc::now();
            self.tasks.update(&loser).await?;

            self.events.emit(EventPayload::TaskBlocked {
                task_id: loser.id,
                reason: reason.clone(),
            });
            if let Some(hollon_id) = loser.assigned_hollon_id {
                let message = Message::new(Participant::Hollon(hollon_id), MessageType::ConflictNotice, reason)
                    .with_metadata(json!({
                        "conflict_id": conflict.id,
                        "task_id": loser.id,
                        "waiting_on": winner.id,
                    }));
                self.notify(&message).await;
            }
        }

        conflict.status = ConflictStatus::Resolved;
        conflict.resolved = true;
        conflict.resolution_strategy = Some(strategy);
        conflict.resolution_notes = Some(format!("\"{}\" keeps the resource; {} task(s) blocked", winner.title, losers.len()));
        conflict.resolved_at = Some(Utc::now());

        tracing::info!(conflict_id = %conflict.id, winner = %winner.id, blocked = losers.len(), "Conflict resolved");
        self.events.emit(EventPayload::ConflictResolved { conflict_id: conflict.id });
        Ok(())
    }

    async fn escalate_to_human(&self, conflict: &mut Conflict) -> DomainResult<()> {
        let mut request = ApprovalRequest::new(
            conflict.organization_id,
            ApprovalRequestType::ConflictResolution,
            format!("{} conflict", conflict.conflict_type.as_str()),
            conflict.description.clone(),
        );
        request.conflict_id = Some(conflict.id);
        self.approvals.create(&request).await?;

        conflict.status = ConflictStatus::Escalated;
        conflict.resolved = false;
        conflict.resolution_strategy = Some(ResolutionStrategy::ManualIntervention);
        conflict.approval_request_id = Some(request.id);

        let message = Message::new(
            Participant::Human,
            MessageType::ConflictNotice,
            format!("Conflict needs a decision: {}", conflict.description),
        )
        .with_metadata(json!({ "conflict_id": conflict.id, "approval_request_id": request.id }));
        self.notify(&message).await;
        self.events.emit(EventPayload::ConflictEscalated {
            conflict_id: conflict.id,
            approval_request_id: request.id,
        });
        Ok(())
    }

    /// Close any conflict by hand.
    pub async fn manually_resolve(&self, conflict_id: Uuid, notes: &str) -> DomainResult<Conflict> {
        let mut conflict = self
            .conflicts
            .get(conflict_id)
            .await?
            .ok_or(DomainError::ConflictNotFound(conflict_id))?;

        conflict.status = ConflictStatus::Resolved;
        conflict.resolved = true;
        conflict.resolution_notes = Some(notes.to_string());
        conflict.resolved_at = Some(Utc::now());
        self.conflicts.update(&conflict).await?;

        tracing::info!(conflict_id = %conflict_id, "Conflict resolved manually");
        self.events.emit(EventPayload::ConflictResolved { conflict_id });
        Ok(conflict)
    }

    /// Conflicts of one organization, newest first.
    pub async fn list(&self, organization_id: Uuid, status: Option<ConflictStatus>) -> DomainResult<Vec<Conflict>> {
        self.conflicts.list(organization_id, status).await
    }

    async fn notify(&self, message: &Message) {
        if let Err(e) = self.notifier.send(message).await {
            tracing::warn!(to = %message.to, error = %e, "Conflict notification failed");
        }
    }
}

fn check_priority(organization_id: Uuid, scoped: &[Task]) -> Option<Conflict> {
    let overloaded = group_by_assignee(scoped.iter().filter(|t| t.priority.is_high()));
    if overloaded.is_empty() {
        return None;
    }
    let tasks: Vec<&Task> = overloaded.values().flatten().copied().collect();
    let description = format!("{} hollon(s) hold more than one P1/P2 task", overloaded.len());
    Some(conflict_for_refs(organization_id, ConflictType::Priority, &tasks, description))
}

/// Assignees holding more than one of `tasks`.
fn group_by_assignee<'a>(tasks: impl Iterator<Item = &'a Task>) -> BTreeMap<Uuid, Vec<&'a Task>> {
    let mut groups: BTreeMap<Uuid, Vec<&Task>> = BTreeMap::new();
    for task in tasks {
        if let Some(hollon_id) = task.assigned_hollon_id {
            groups.entry(hollon_id).or_default().push(task);
        }
    }
    groups.retain(|_, group| group.len() > 1);
    groups
}

fn conflict_for(organization_id: Uuid, conflict_type: ConflictType, tasks: &[Task], description: String) -> Conflict {
    let refs: Vec<&Task> = tasks.iter().collect();
    conflict_for_refs(organization_id, conflict_type, &refs, description)
}

fn conflict_for_refs(organization_id: Uuid, conflict_type: ConflictType, tasks: &[&Task], description: String) -> Conflict {
    let task_ids = tasks.iter().map(|t| t.id).collect();
    let hollon_ids: BTreeSet<Uuid> = tasks.iter().filter_map(|t| t.assigned_hollon_id).collect();
    Conflict::new(organization_id, conflict_type, task_ids, hollon_ids.into_iter().collect(), description)
}
