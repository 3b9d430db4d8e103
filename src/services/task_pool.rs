//! Task pool: selection, atomic claiming and status bookkeeping.
//!
//! The conditional claim in `TaskRepository::try_claim` is the only
//! cross-hollon coordination point. Everything else here operates on a task
//! the caller already owns.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Hollon, Task, TaskStatus};
use crate::domain::ports::{HollonRepository, RoleRepository, TaskRepository};
use crate::services::event_bus::{EventBus, EventPayload};

/// Why `pull_next` returned what it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PullReason {
    /// An IN_REVIEW task where the puller is the reviewer; returned unclaimed
    InReview,
    /// Work already assigned to the puller
    Resumed,
    TeamBacklog,
    CapabilityMatch,
    NoTaskAvailable,
}

impl PullReason {
    /// Human-readable reason, used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InReview => "in review",
            Self::Resumed => "resumed in-flight work",
            Self::TeamBacklog => "team backlog",
            Self::CapabilityMatch => "capability match",
            Self::NoTaskAvailable => "no task available",
        }
    }
}

/// Outcome of [`TaskPool::pull_next`].
#[derive(Debug, Clone)]
pub struct PullResult {
    /// Claimed task, if any
    pub task: Option<Task>,
    /// Which source the task came from
    pub reason: PullReason,
}

impl PullResult {
    fn none() -> Self {
        Self {
            task: None,
            reason: PullReason::NoTaskAvailable,
        }
    }
}

/// Task claiming and status transitions shared by every hollon.
pub struct TaskPool {
    tasks: Arc<dyn TaskRepository>,
    hollons: Arc<dyn HollonRepository>,
    roles: Arc<dyn RoleRepository>,
    events: Arc<EventBus>,
}

impl TaskPool {
    /// Build the service over its repositories.
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        hollons: Arc<dyn HollonRepository>,
        roles: Arc<dyn RoleRepository>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            tasks,
            hollons,
            roles,
            events,
        }
    }

    /// Select and claim the next task for a hollon.
    ///
    /// A lost claim race is retried once; after that the result is
    /// "no task available", never an error.
    pub async fn pull_next(&self, hollon_id: Uuid) -> DomainResult<PullResult> {
        let hollon = self.hollons.get(hollon_id).await?.ok_or(DomainError::HollonNotFound(hollon_id))?;

        if let Some(task) = self.tasks.find_in_review_for_reviewer(hollon_id).await? {
            return Ok(PullResult {
                task: Some(task),
                reason: PullReason::InReview,
            });
        }

        for attempt in 0..2 {
            let Some((candidate, reason)) = self.select_candidate(&hollon).await? else {
                return Ok(PullResult::none());
            };

            if self.tasks.try_claim(candidate.id, hollon_id).await? {
                let task = self.tasks.get(candidate.id).await?.ok_or(DomainError::TaskNotFound(candidate.id))?;
                tracing::debug!(
                    hollon_id = %hollon_id,
                    task_id = %task.id,
                    reason = reason.as_str(),
                    "Claimed task"
                );
                self.events.emit_for(
                    hollon_id,
                    EventPayload::TaskClaimed {
                        task_id: task.id,
                        hollon_id,
                    },
                );
                return Ok(PullResult {
                    task: Some(task),
                    reason,
                });
            }

            tracing::debug!(hollon_id = %hollon_id, task_id = %candidate.id, attempt, "Lost claim race");
        }

        Ok(PullResult::none())
    }

    async fn select_candidate(&self, hollon: &Hollon) -> DomainResult<Option<(Task, PullReason)>> {
        if let Some(task) = self.tasks.find_assigned_in_flight(hollon.id).await? {
            return Ok(Some((task, PullReason::Resumed)));
        }

        // Temporary hollons exist for the task they were spawned for
        if hollon.is_temporary() {
            return Ok(None);
        }

        if let Some(team_id) = hollon.team_id {
            if let Some(task) = self.tasks.find_next_team_candidate(team_id).await? {
                return Ok(Some((task, PullReason::TeamBacklog)));
            }
        }

        let Some(role) = self.roles.get(hollon.role_id).await? else {
            return Ok(None);
        };
        Ok(self
            .tasks
            .find_next_capability_candidate(hollon.organization_id, &role.capabilities)
            .await?
            .map(|task| (task, PullReason::CapabilityMatch)))
    }

    /// Persist a new task. BACKLOG tasks stay in the backlog; anything else
    /// starts READY or, with an unfinished dependency, BLOCKED.
    pub async fn submit(&self, mut task: Task) -> DomainResult<Task> {
        task.validate().map_err(DomainError::ValidationFailed)?;

        if task.status != TaskStatus::Backlog {
            task.status = if self.has_unresolved_dependencies(&task).await? {
                TaskStatus::Blocked
            } else {
                TaskStatus::Ready
            };
        }

        self.tasks.create(&task).await?;
        tracing::info!(task_id = %task.id, status = %task.status, title = %task.title, "Task submitted");
        Ok(task)
    }

    /// Move a BACKLOG task into the pool.
    pub async fn release(&self, task_id: Uuid) -> DomainResult<Task> {
        let mut task = self.load(task_id).await?;
        if task.status != TaskStatus::Backlog {
            return Err(DomainError::InvalidStateTransition {
                from: task.status.to_string(),
                to: TaskStatus::Ready.to_string(),
                reason: "only backlog tasks can be released".to_string(),
            });
        }

        task.status = if self.has_unresolved_dependencies(&task).await? {
            TaskStatus::Blocked
        } else {
            TaskStatus::Ready
        };
        task.updated_at = Utc::now();
        self.tasks.update(&task).await?;
        Ok(task)
    }

    async fn has_unresolved_dependencies(&self, task: &Task) -> DomainResult<bool> {
        for dep_id in &task.dependencies {
            let dep = self.tasks.get(*dep_id).await?.ok_or_else(|| {
                DomainError::ValidationFailed(format!("dependency {dep_id} does not exist"))
            })?;
            if !dep.status.is_terminal_success() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Mark a task COMPLETED. Returns false if it already was; dependents are
    /// only released on the first call.
    pub async fn complete_task(&self, task_id: Uuid, result: Option<&str>) -> DomainResult<bool> {
        if !self.tasks.mark_completed(task_id, result).await? {
            tracing::debug!(task_id = %task_id, "Task already completed");
            return Ok(false);
        }

        tracing::info!(task_id = %task_id, "Task completed");
        self.events.emit(EventPayload::TaskCompleted { task_id });
        self.release_dependents(task_id).await?;
        Ok(true)
    }

    /// Move BLOCKED dependents of `task_id` to READY once nothing blocks them.
    pub async fn release_dependents(&self, task_id: Uuid) -> DomainResult<Vec<Uuid>> {
        let mut released = Vec::new();
        for mut dependent in self.tasks.get_dependents(task_id).await? {
            if dependent.status != TaskStatus::Blocked {
                continue;
            }
            if self.tasks.count_unresolved_dependencies(dependent.id).await? > 0 {
                continue;
            }
            dependent.status = TaskStatus::Ready;
            dependent.blocked_reason = None;
            dependent.updated_at = Utc::now();
            self.tasks.update(&dependent).await?;

            tracing::debug!(task_id = %dependent.id, unblocked_by = %task_id, "Dependent task ready");
            self.events.emit(EventPayload::TaskReady { task_id: dependent.id });
            released.push(dependent.id);
        }
        Ok(released)
    }

    /// Mark FAILED with `reason` as the error message.
    pub async fn fail_task(&self, task_id: Uuid, reason: &str) -> DomainResult<Task> {
        let mut task = self.load(task_id).await?;
        task.status = TaskStatus::Failed;
        task.error_message = Some(reason.to_string());
        task.updated_at = Utc::now();
        self.tasks.update(&task).await?;

        tracing::warn!(task_id = %task_id, reason, "Task failed");
        self.events.emit(EventPayload::TaskFailed {
            task_id,
            reason: reason.to_string(),
        });
        Ok(task)
    }

    /// When every live child of an IN_PROGRESS parent is COMPLETED, hand the
    /// parent to its assignee for review. Parents without an assignee are
    /// completed directly.
    pub async fn promote_parent_if_done(&self, parent_id: Uuid) -> DomainResult<bool> {
        let mut parent = self.load(parent_id).await?;
        if parent.status != TaskStatus::InProgress {
            return Ok(false);
        }
        if !self.children_all_completed(parent_id).await? {
            return Ok(false);
        }

        match parent.assigned_hollon_id {
            Some(manager) => {
                parent.status = TaskStatus::ReadyForReview;
                parent.reviewer_hollon_id = Some(manager);
                parent.updated_at = Utc::now();
                self.tasks.update(&parent).await?;
                tracing::info!(task_id = %parent_id, reviewer = %manager, "Parent ready for review");
                Ok(true)
            }
            None => self.complete_task(parent_id, None).await,
        }
    }

    /// True when the task has at least one non-cancelled child and all of
    /// them are COMPLETED.
    pub async fn children_all_completed(&self, parent_id: Uuid) -> DomainResult<bool> {
        let children = self.tasks.get_subtasks(parent_id).await?;
        let live: Vec<_> = children.iter().filter(|c| c.status != TaskStatus::Cancelled).collect();
        Ok(!live.is_empty() && live.iter().all(|c| c.status == TaskStatus::Completed))
    }

    /// Load a task or fail with `TaskNotFound`.
    pub async fn load(&self, task_id: Uuid) -> DomainResult<Task> {
        self.tasks.get(task_id).await?.ok_or(DomainError::TaskNotFound(task_id))
    }

    /// Persist `task`, bumping `updated_at`.
    pub async fn save(&self, task: &mut Task) -> DomainResult<()> {
        task.updated_at = Utc::now();
        self.tasks.update(task).await
    }

    /// Underlying task repository.
    pub fn repository(&self) -> &Arc<dyn TaskRepository> {
        &self.tasks
    }
}
