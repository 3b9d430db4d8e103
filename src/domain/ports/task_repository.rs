//! Task persistence port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskStatus};

/// Filters for querying tasks
#[derive(Default, Debug, Clone)]
pub struct TaskFilter {
    /// Restrict to one organization
    pub organization_id: Option<Uuid>,
    /// Restrict to one status
    pub status: Option<TaskStatus>,
    /// Restrict to one team
    pub team_id: Option<Uuid>,
    /// Restrict to one assignee
    pub assigned_hollon_id: Option<Uuid>,
    /// Restrict to children of one task
    pub parent_task_id: Option<Uuid>,
    /// Maximum rows returned
    pub limit: Option<i64>,
}

/// Repository port for task persistence and the task pool's selection queries.
///
/// Candidate queries only return tasks that are READY, unassigned and have no
/// blocking dependency outside COMPLETED. Ordering is priority, then due date
/// (nulls last), then creation time.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a task together with its dependency edges
    async fn create(&self, task: &Task) -> DomainResult<()>;

    /// Load a task with its dependency edges.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>>;

    /// Overwrite a task row and replace its dependency edges
    async fn update(&self, task: &Task) -> DomainResult<()>;

    /// Remove a task and its dependency edges.
    async fn delete(&self, id: Uuid) -> DomainResult<()>;

    /// Tasks matching `filter`, by priority then creation time.
    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<Task>>;

    /// Direct children of a task, oldest first
    async fn get_subtasks(&self, parent_id: Uuid) -> DomainResult<Vec<Task>>;

    /// Tasks that list `task_id` as a blocking dependency
    async fn get_dependents(&self, task_id: Uuid) -> DomainResult<Vec<Task>>;

    /// Add one blocking dependency edge.
    async fn add_dependency(&self, task_id: Uuid, depends_on: Uuid) -> DomainResult<()>;

    /// Number of blocking dependencies not yet COMPLETED
    async fn count_unresolved_dependencies(&self, task_id: Uuid) -> DomainResult<u32>;

    /// IN_REVIEW task whose reviewer is `hollon_id`
    async fn find_in_review_for_reviewer(&self, hollon_id: Uuid) -> DomainResult<Option<Task>>;

    /// Work already assigned to `hollon_id` that it should resume: READY,
    /// IN_PROGRESS or WAITING_FOR_WORKER, excluding parents that currently
    /// have live subtasks.
    async fn find_assigned_in_flight(&self, hollon_id: Uuid) -> DomainResult<Option<Task>>;

    /// Next candidate belonging to `team_id`.
    async fn find_next_team_candidate(&self, team_id: Uuid) -> DomainResult<Option<Task>>;

    /// Next candidate whose tags intersect `capabilities` (case-insensitive)
    async fn find_next_capability_candidate(
        &self,
        organization_id: Uuid,
        capabilities: &[String],
    ) -> DomainResult<Option<Task>>;

    /// Conditional claim. Returns false when another hollon already owns the task.
    async fn try_claim(&self, task_id: Uuid, hollon_id: Uuid) -> DomainResult<bool>;

    /// Conditional completion. Returns false when the task was already COMPLETED.
    async fn mark_completed(&self, task_id: Uuid, result: Option<&str>) -> DomainResult<bool>;

    /// READY_FOR_REVIEW tasks waiting on `reviewer_id`
    async fn find_ready_for_review(&self, reviewer_id: Uuid) -> DomainResult<Vec<Task>>;

    /// READY/IN_PROGRESS tasks in the organization touching any of `files`
    async fn find_active_by_files(&self, organization_id: Uuid, files: &[String]) -> DomainResult<Vec<Task>>;

    /// IN_PROGRESS tasks in the organization carrying any of `tags`
    async fn find_in_progress_by_tags(&self, organization_id: Uuid, tags: &[String]) -> DomainResult<Vec<Task>>;
}
