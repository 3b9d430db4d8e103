//! Task domain model.
//!
//! Tasks are units of work pulled by hollons from a shared backlog.
//! They form a tree through `parent_task_id` and a DAG through `dependencies`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task in the execution pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created but not yet released for work
    #[default]
    Backlog,
    /// Can be pulled (no unresolved dependencies)
    Ready,
    /// Waiting on dependencies or on a conflicting task
    Blocked,
    /// Claimed by a hollon
    InProgress,
    /// A reviewer is working on it
    InReview,
    /// Work done, waiting for a reviewer to pick it up
    ReadyForReview,
    Completed,
    Cancelled,
    Failed,
    /// Decomposition hit the spawn limit; parked until capacity frees
    WaitingForWorker,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Ready => "ready",
            Self::Blocked => "blocked",
            Self::InProgress => "in_progress",
            Self::InReview => "in_review",
            Self::ReadyForReview => "ready_for_review",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::WaitingForWorker => "waiting_for_worker",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "backlog" => Some(Self::Backlog),
            "ready" => Some(Self::Ready),
            "blocked" => Some(Self::Blocked),
            "in_progress" => Some(Self::InProgress),
            "in_review" => Some(Self::InReview),
            "ready_for_review" => Some(Self::ReadyForReview),
            "completed" | "complete" => Some(Self::Completed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            "waiting_for_worker" => Some(Self::WaitingForWorker),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Only COMPLETED satisfies a blocking dependency.
    pub fn is_terminal_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Statuses considered "active" by the conflict detector.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Ready | Self::InProgress)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority level for tasks. `P1Critical` sorts first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskPriority {
    #[serde(rename = "p1")]
    P1Critical = 1,
    #[serde(rename = "p2")]
    P2High = 2,
    #[serde(rename = "p3")]
    #[default]
    P3Medium = 3,
    #[serde(rename = "p4")]
    P4Low = 4,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P1Critical => "p1",
            Self::P2High => "p2",
            Self::P3Medium => "p3",
            Self::P4Low => "p4",
        }
    }

    /// Accepts both the storage form (`p2`) and the long form (`P2_HIGH`, `high`).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "p1" | "p1_critical" | "critical" => Some(Self::P1Critical),
            "p2" | "p2_high" | "high" => Some(Self::P2High),
            "p3" | "p3_medium" | "medium" | "normal" => Some(Self::P3Medium),
            "p4" | "p4_low" | "low" => Some(Self::P4Low),
            _ => None,
        }
    }

    /// Numeric rank used for storage and ordering (1 = most urgent).
    pub fn rank(&self) -> i64 {
        *self as i64
    }

    pub fn from_rank(rank: i64) -> Option<Self> {
        match rank {
            1 => Some(Self::P1Critical),
            2 => Some(Self::P2High),
            3 => Some(Self::P3Medium),
            4 => Some(Self::P4Low),
            _ => None,
        }
    }

    /// P1 and P2 count towards a hollon's high-priority load.
    pub fn is_high(&self) -> bool {
        matches!(self, Self::P1Critical | Self::P2High)
    }
}

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Top-level composite work item; never executed directly
    Epic,
    #[default]
    Implementation,
    Bugfix,
    Research,
    Review,
    Documentation,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Implementation => "implementation",
            Self::Bugfix => "bugfix",
            Self::Research => "research",
            Self::Review => "review",
            Self::Documentation => "documentation",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "epic" | "team_epic" | "composite" => Some(Self::Epic),
            "implementation" | "feature" | "task" => Some(Self::Implementation),
            "bugfix" | "bug" => Some(Self::Bugfix),
            "research" | "analysis" => Some(Self::Research),
            "review" => Some(Self::Review),
            "documentation" | "docs" => Some(Self::Documentation),
            _ => None,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Epic)
    }

    /// Task types whose output is a code artifact reviewed through the code host.
    pub fn produces_code(&self) -> bool {
        matches!(self, Self::Implementation | Self::Bugfix)
    }
}

/// Coarse complexity estimate attached at creation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatedComplexity {
    #[default]
    Low,
    High,
}

impl EstimatedComplexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// A unit of work pulled and executed by a hollon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub project_id: Option<Uuid>,
    /// Team whose backlog this task belongs to
    pub team_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assigned_hollon_id: Option<Uuid>,
    pub creator_hollon_id: Option<Uuid>,
    pub reviewer_hollon_id: Option<Uuid>,
    /// Tasks that must reach COMPLETED before this one is READY
    pub dependencies: Vec<Uuid>,
    /// Decomposition level, root = 0
    pub depth: u32,
    pub estimated_complexity: EstimatedComplexity,
    pub story_points: Option<u32>,
    pub required_skills: Vec<String>,
    pub affected_files: Vec<String>,
    pub tags: Vec<String>,
    pub retry_count: u32,
    pub due_date: Option<DateTime<Utc>>,
    /// Output of the last successful execution
    pub result: Option<String>,
    /// Failure reason or quality-gate feedback from the last attempt
    pub error_message: Option<String>,
    /// Why the task is BLOCKED when the block is not a plain dependency wait
    pub blocked_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// When the current review round was requested; earlier verdicts are stale
    pub review_requested_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(organization_id: Uuid, title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            project_id: None,
            team_id: None,
            parent_task_id: None,
            title: title.into(),
            description: description.into(),
            task_type: TaskType::default(),
            status: TaskStatus::default(),
            priority: TaskPriority::default(),
            assigned_hollon_id: None,
            creator_hollon_id: None,
            reviewer_hollon_id: None,
            dependencies: Vec::new(),
            depth: 0,
            estimated_complexity: EstimatedComplexity::default(),
            story_points: None,
            required_skills: Vec::new(),
            affected_files: Vec::new(),
            tags: Vec::new(),
            retry_count: 0,
            due_date: None,
            result: None,
            error_message: None,
            blocked_reason: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            review_requested_at: None,
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    pub fn with_team(mut self, team_id: Uuid) -> Self {
        self.team_id = Some(team_id);
        self
    }

    pub fn with_project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Set parent task; depth is derived from the parent by the caller.
    pub fn with_parent(mut self, parent_id: Uuid, depth: u32) -> Self {
        self.parent_task_id = Some(parent_id);
        self.depth = depth;
        self
    }

    pub fn with_dependency(mut self, task_id: Uuid) -> Self {
        if !self.dependencies.contains(&task_id) && task_id != self.id {
            self.dependencies.push(task_id);
        }
        self
    }

    pub fn with_assignee(mut self, hollon_id: Uuid) -> Self {
        self.assigned_hollon_id = Some(hollon_id);
        self
    }

    pub fn with_creator(mut self, hollon_id: Uuid) -> Self {
        self.creator_hollon_id = Some(hollon_id);
        self
    }

    pub fn with_complexity(mut self, complexity: EstimatedComplexity) -> Self {
        self.estimated_complexity = complexity;
        self
    }

    pub fn with_story_points(mut self, points: u32) -> Self {
        self.story_points = Some(points);
        self
    }

    pub fn with_required_skills(mut self, skills: Vec<String>) -> Self {
        self.required_skills = skills;
        self
    }

    pub fn with_affected_files(mut self, files: Vec<String>) -> Self {
        self.affected_files = files;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_due_date(mut self, due: DateTime<Utc>) -> Self {
        self.due_date = Some(due);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Complexity predicate: any one criterion makes the task complex.
    pub fn is_complex(&self) -> bool {
        self.task_type.is_composite()
            || self.estimated_complexity == EstimatedComplexity::High
            || self.dependencies.len() > 3
            || self.required_skills.len() > 2
            || self.story_points.is_some_and(|p| p > 8)
    }

    /// Append a paragraph to the description, separated by a blank line.
    pub fn append_description(&mut self, section: &str) {
        if self.description.trim().is_empty() {
            self.description = section.to_string();
        } else {
            self.description = format!("{}\n\n{}", self.description.trim_end(), section);
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Task title cannot be empty".to_string());
        }
        if self.dependencies.contains(&self.id) {
            return Err("Task cannot depend on itself".to_string());
        }
        if self.parent_task_id == Some(self.id) {
            return Err("Task cannot be its own parent".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new(Uuid::new_v4(), "Add login endpoint", "Implement POST /login")
    }

    #[test]
    fn test_task_defaults() {
        let t = task();
        assert_eq!(t.status, TaskStatus::Backlog);
        assert_eq!(t.priority, TaskPriority::P3Medium);
        assert_eq!(t.depth, 0);
        assert!(t.assigned_hollon_id.is_none());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::P1Critical < TaskPriority::P2High);
        assert!(TaskPriority::P3Medium < TaskPriority::P4Low);
        assert!(TaskPriority::P2High.is_high());
        assert!(!TaskPriority::P3Medium.is_high());
        assert_eq!(TaskPriority::from_str("P2_HIGH"), Some(TaskPriority::P2High));
    }

    #[test]
    fn test_status_round_trip_names() {
        for status in [
            TaskStatus::Backlog,
            TaskStatus::ReadyForReview,
            TaskStatus::WaitingForWorker,
            TaskStatus::InReview,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
        assert!(TaskStatus::Completed.is_terminal_success());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Failed.is_terminal_success());
    }

    #[test]
    fn test_complexity_predicate() {
        assert!(!task().is_complex());
        assert!(task().with_type(TaskType::Epic).is_complex());
        assert!(task().with_complexity(EstimatedComplexity::High).is_complex());
        assert!(task().with_story_points(13).is_complex());
        assert!(!task().with_story_points(8).is_complex());

        let skills = vec!["rust".into(), "sql".into(), "react".into()];
        assert!(task().with_required_skills(skills).is_complex());

        let mut t = task();
        for _ in 0..4 {
            t = t.with_dependency(Uuid::new_v4());
        }
        assert!(t.is_complex());
    }

    #[test]
    fn test_dependency_dedup_and_self() {
        let dep = Uuid::new_v4();
        let t = task().with_dependency(dep).with_dependency(dep);
        assert_eq!(t.dependencies.len(), 1);
        let id = t.id;
        let t = t.with_dependency(id);
        assert_eq!(t.dependencies.len(), 1);
    }

    #[test]
    fn test_append_description() {
        let mut t = task();
        t.append_description("## Review feedback\nUse bcrypt");
        assert!(t.description.starts_with("Implement POST /login\n\n## Review feedback"));
    }

    #[test]
    fn test_validation() {
        let t = Task::new(Uuid::new_v4(), "  ", "x");
        assert!(t.validate().is_err());
        assert!(task().validate().is_ok());
    }
}
