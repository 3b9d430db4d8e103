//! SQLite implementation of the TaskRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_json_or_default, parse_optional_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{EstimatedComplexity, Task, TaskPriority, TaskStatus, TaskType};
use crate::domain::ports::{TaskFilter, TaskRepository};

/// Excludes tasks with a blocking dependency that has not reached COMPLETED.
const NO_UNRESOLVED_DEPS: &str = "NOT EXISTS (
    SELECT 1 FROM task_dependencies d
    INNER JOIN tasks dt ON dt.id = d.depends_on_id
    WHERE d.task_id = t.id AND dt.status <> 'completed'
)";

/// Priority first, then due date with nulls last, then age.
const CANDIDATE_ORDER: &str =
    "ORDER BY t.priority ASC, CASE WHEN t.due_date IS NULL THEN 1 ELSE 0 END, t.due_date ASC, t.created_at ASC";

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"INSERT INTO tasks (id, organization_id, project_id, team_id, parent_task_id, title, description,
               task_type, status, priority, assigned_hollon_id, creator_hollon_id, reviewer_hollon_id, depth,
               estimated_complexity, story_points, required_skills, affected_files, tags, retry_count, due_date,
               result, error_message, blocked_reason, created_at, updated_at, started_at, completed_at, review_requested_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.id.to_string())
        .bind(task.organization_id.to_string())
        .bind(task.project_id.map(|id| id.to_string()))
        .bind(task.team_id.map(|id| id.to_string()))
        .bind(task.parent_task_id.map(|id| id.to_string()))
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.task_type.as_str())
        .bind(task.status.as_str())
        .bind(task.priority.rank())
        .bind(task.assigned_hollon_id.map(|id| id.to_string()))
        .bind(task.creator_hollon_id.map(|id| id.to_string()))
        .bind(task.reviewer_hollon_id.map(|id| id.to_string()))
        .bind(i64::from(task.depth))
        .bind(task.estimated_complexity.as_str())
        .bind(task.story_points.map(i64::from))
        .bind(serde_json::to_string(&task.required_skills)?)
        .bind(serde_json::to_string(&task.affected_files)?)
        .bind(serde_json::to_string(&task.tags)?)
        .bind(i64::from(task.retry_count))
        .bind(task.due_date.map(format_datetime))
        .bind(&task.result)
        .bind(&task.error_message)
        .bind(&task.blocked_reason)
        .bind(format_datetime(task.created_at))
        .bind(format_datetime(task.updated_at))
        .bind(task.started_at.map(format_datetime))
        .bind(task.completed_at.map(format_datetime))
        .bind(task.review_requested_at.map(format_datetime))
        .execute(&mut *tx)
        .await?;

        for dep_id in &task.dependencies {
            sqlx::query("INSERT OR IGNORE INTO task_dependencies (task_id, depends_on_id) VALUES (?, ?)")
                .bind(task.id.to_string())
                .bind(dep_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(self.hydrate(r).await?)),
            None => Ok(None),
        }
    }

    async fn update(&self, task: &Task) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r"UPDATE tasks SET project_id = ?, team_id = ?, parent_task_id = ?, title = ?, description = ?,
               task_type = ?, status = ?, priority = ?, assigned_hollon_id = ?, creator_hollon_id = ?,
               reviewer_hollon_id = ?, depth = ?, estimated_complexity = ?, story_points = ?, required_skills = ?,
               affected_files = ?, tags = ?, retry_count = ?, due_date = ?, result = ?, error_message = ?,
               blocked_reason = ?, updated_at = ?, started_at = ?, completed_at = ?, review_requested_at = ?
               WHERE id = ?",
        )
        .bind(task.project_id.map(|id| id.to_string()))
        .bind(task.team_id.map(|id| id.to_string()))
        .bind(task.parent_task_id.map(|id| id.to_string()))
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.task_type.as_str())
        .bind(task.status.as_str())
        .bind(task.priority.rank())
        .bind(task.assigned_hollon_id.map(|id| id.to_string()))
        .bind(task.creator_hollon_id.map(|id| id.to_string()))
        .bind(task.reviewer_hollon_id.map(|id| id.to_string()))
        .bind(i64::from(task.depth))
        .bind(task.estimated_complexity.as_str())
        .bind(task.story_points.map(i64::from))
        .bind(serde_json::to_string(&task.required_skills)?)
        .bind(serde_json::to_string(&task.affected_files)?)
        .bind(serde_json::to_string(&task.tags)?)
        .bind(i64::from(task.retry_count))
        .bind(task.due_date.map(format_datetime))
        .bind(&task.result)
        .bind(&task.error_message)
        .bind(&task.blocked_reason)
        .bind(format_datetime(Utc::now()))
        .bind(task.started_at.map(format_datetime))
        .bind(task.completed_at.map(format_datetime))
        .bind(task.review_requested_at.map(format_datetime))
        .bind(task.id.to_string())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task.id));
        }

        sqlx::query("DELETE FROM task_dependencies WHERE task_id = ?")
            .bind(task.id.to_string())
            .execute(&mut *tx)
            .await?;
        for dep_id in &task.dependencies {
            sqlx::query("INSERT OR IGNORE INTO task_dependencies (task_id, depends_on_id) VALUES (?, ?)")
                .bind(task.id.to_string())
                .bind(dep_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(id));
        }
        Ok(())
    }

    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        let mut query = String::from("SELECT * FROM tasks WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(org) = filter.organization_id {
            query.push_str(" AND organization_id = ?");
            bindings.push(org.to_string());
        }
        if let Some(status) = filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(team) = filter.team_id {
            query.push_str(" AND team_id = ?");
            bindings.push(team.to_string());
        }
        if let Some(hollon) = filter.assigned_hollon_id {
            query.push_str(" AND assigned_hollon_id = ?");
            bindings.push(hollon.to_string());
        }
        if let Some(parent) = filter.parent_task_id {
            query.push_str(" AND parent_task_id = ?");
            bindings.push(parent.to_string());
        }

        query.push_str(" ORDER BY created_at ASC");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {}", limit.max(0)));
        }

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows = q.fetch_all(&self.pool).await?;
        self.hydrate_all(rows).await
    }

    async fn get_subtasks(&self, parent_id: Uuid) -> DomainResult<Vec<Task>> {
        self.list(TaskFilter {
            parent_task_id: Some(parent_id),
            ..Default::default()
        })
        .await
    }

    async fn get_dependents(&self, task_id: Uuid) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            r"SELECT t.* FROM tasks t
               INNER JOIN task_dependencies d ON t.id = d.task_id
               WHERE d.depends_on_id = ?
               ORDER BY t.created_at ASC",
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_all(rows).await
    }

    async fn add_dependency(&self, task_id: Uuid, depends_on: Uuid) -> DomainResult<()> {
        if task_id == depends_on {
            return Err(DomainError::ValidationFailed("Task cannot depend on itself".to_string()));
        }
        sqlx::query("INSERT OR IGNORE INTO task_dependencies (task_id, depends_on_id) VALUES (?, ?)")
            .bind(task_id.to_string())
            .bind(depends_on.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_unresolved_dependencies(&self, task_id: Uuid) -> DomainResult<u32> {
        let (count,): (i64,) = sqlx::query_as(
            r"SELECT COUNT(*) FROM task_dependencies d
               INNER JOIN tasks dt ON dt.id = d.depends_on_id
               WHERE d.task_id = ? AND dt.status <> 'completed'",
        )
        .bind(task_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }

    async fn find_in_review_for_reviewer(&self, hollon_id: Uuid) -> DomainResult<Option<Task>> {
        let query = format!(
            "SELECT t.* FROM tasks t WHERE t.reviewer_hollon_id = ? AND t.status = 'in_review' {CANDIDATE_ORDER} LIMIT 1"
        );
        let row: Option<TaskRow> = sqlx::query_as(&query)
            .bind(hollon_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate_optional(row).await
    }

    async fn find_assigned_in_flight(&self, hollon_id: Uuid) -> DomainResult<Option<Task>> {
        let query = format!(
            r"SELECT t.* FROM tasks t
               WHERE t.assigned_hollon_id = ?
                 AND t.status IN ('ready', 'in_progress', 'waiting_for_worker')
                 AND {NO_UNRESOLVED_DEPS}
                 AND NOT EXISTS (
                     SELECT 1 FROM tasks c WHERE c.parent_task_id = t.id AND c.status <> 'cancelled'
                 )
               {CANDIDATE_ORDER} LIMIT 1"
        );
        let row: Option<TaskRow> = sqlx::query_as(&query)
            .bind(hollon_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate_optional(row).await
    }

    async fn find_next_team_candidate(&self, team_id: Uuid) -> DomainResult<Option<Task>> {
        let query = format!(
            r"SELECT t.* FROM tasks t
               WHERE t.team_id = ? AND t.status = 'ready' AND t.assigned_hollon_id IS NULL
                 AND {NO_UNRESOLVED_DEPS}
               {CANDIDATE_ORDER} LIMIT 1"
        );
        let row: Option<TaskRow> = sqlx::query_as(&query)
            .bind(team_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate_optional(row).await
    }

    async fn find_next_capability_candidate(
        &self,
        organization_id: Uuid,
        capabilities: &[String],
    ) -> DomainResult<Option<Task>> {
        if capabilities.is_empty() {
            return Ok(None);
        }
        let query = format!(
            r"SELECT t.* FROM tasks t
               WHERE t.organization_id = ? AND t.status = 'ready' AND t.assigned_hollon_id IS NULL
                 AND EXISTS (
                     SELECT 1 FROM json_each(t.tags) tg
                     WHERE lower(tg.value) IN (SELECT lower(c.value) FROM json_each(?) c)
                 )
                 AND {NO_UNRESOLVED_DEPS}
               {CANDIDATE_ORDER} LIMIT 1"
        );
        let row: Option<TaskRow> = sqlx::query_as(&query)
            .bind(organization_id.to_string())
            .bind(serde_json::to_string(capabilities)?)
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate_optional(row).await
    }

    async fn try_claim(&self, task_id: Uuid, hollon_id: Uuid) -> DomainResult<bool> {
        let now = format_datetime(Utc::now());
        let result = sqlx::query(
            r"UPDATE tasks SET assigned_hollon_id = ?, status = 'in_progress', started_at = ?, updated_at = ?
               WHERE id = ?
                 AND (assigned_hollon_id IS NULL OR assigned_hollon_id = ?)
                 AND status IN ('ready', 'in_progress', 'waiting_for_worker')",
        )
        .bind(hollon_id.to_string())
        .bind(&now)
        .bind(&now)
        .bind(task_id.to_string())
        .bind(hollon_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_completed(&self, task_id: Uuid, result: Option<&str>) -> DomainResult<bool> {
        let now = format_datetime(Utc::now());
        let updated = sqlx::query(
            r"UPDATE tasks SET status = 'completed', completed_at = ?, updated_at = ?,
               result = COALESCE(?, result), error_message = NULL, blocked_reason = NULL
               WHERE id = ? AND status <> 'completed'",
        )
        .bind(&now)
        .bind(&now)
        .bind(result)
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 1 {
            return Ok(true);
        }
        if self.get(task_id).await?.is_none() {
            return Err(DomainError::TaskNotFound(task_id));
        }
        Ok(false)
    }

    async fn find_ready_for_review(&self, reviewer_id: Uuid) -> DomainResult<Vec<Task>> {
        let query = format!(
            "SELECT t.* FROM tasks t WHERE t.reviewer_hollon_id = ? AND t.status = 'ready_for_review' {CANDIDATE_ORDER}"
        );
        let rows: Vec<TaskRow> = sqlx::query_as(&query)
            .bind(reviewer_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        self.hydrate_all(rows).await
    }

    async fn find_active_by_files(&self, organization_id: Uuid, files: &[String]) -> DomainResult<Vec<Task>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<TaskRow> = sqlx::query_as(
            r"SELECT t.* FROM tasks t
               WHERE t.organization_id = ? AND t.status IN ('ready', 'in_progress')
                 AND EXISTS (
                     SELECT 1 FROM json_each(t.affected_files) f
                     WHERE f.value IN (SELECT value FROM json_each(?))
                 )
               ORDER BY t.created_at ASC",
        )
        .bind(organization_id.to_string())
        .bind(serde_json::to_string(files)?)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate_all(rows).await
    }

    async fn find_in_progress_by_tags(&self, organization_id: Uuid, tags: &[String]) -> DomainResult<Vec<Task>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<TaskRow> = sqlx::query_as(
            r"SELECT t.* FROM tasks t
               WHERE t.organization_id = ? AND t.status = 'in_progress'
                 AND EXISTS (
                     SELECT 1 FROM json_each(t.tags) tg
                     WHERE lower(tg.value) IN (SELECT lower(value) FROM json_each(?))
                 )
               ORDER BY t.created_at ASC",
        )
        .bind(organization_id.to_string())
        .bind(serde_json::to_string(tags)?)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate_all(rows).await
    }
}

impl SqliteTaskRepository {
    async fn load_dependencies(&self, task: &mut Task) -> DomainResult<()> {
        let deps: Vec<(String,)> =
            sqlx::query_as("SELECT depends_on_id FROM task_dependencies WHERE task_id = ? ORDER BY rowid")
                .bind(task.id.to_string())
                .fetch_all(&self.pool)
                .await?;

        task.dependencies = deps.iter().map(|(id,)| parse_uuid(id)).collect::<DomainResult<_>>()?;
        Ok(())
    }

    async fn hydrate(&self, row: TaskRow) -> DomainResult<Task> {
        let mut task: Task = row.try_into()?;
        self.load_dependencies(&mut task).await?;
        Ok(task)
    }

    async fn hydrate_optional(&self, row: Option<TaskRow>) -> DomainResult<Option<Task>> {
        match row {
            Some(r) => Ok(Some(self.hydrate(r).await?)),
            None => Ok(None),
        }
    }

    async fn hydrate_all(&self, rows: Vec<TaskRow>) -> DomainResult<Vec<Task>> {
        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            tasks.push(self.hydrate(row).await?);
        }
        Ok(tasks)
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    organization_id: String,
    project_id: Option<String>,
    team_id: Option<String>,
    parent_task_id: Option<String>,
    title: String,
    description: String,
    task_type: String,
    status: String,
    priority: i64,
    assigned_hollon_id: Option<String>,
    creator_hollon_id: Option<String>,
    reviewer_hollon_id: Option<String>,
    depth: i64,
    estimated_complexity: String,
    story_points: Option<i64>,
    required_skills: Option<String>,
    affected_files: Option<String>,
    tags: Option<String>,
    retry_count: i64,
    due_date: Option<String>,
    result: Option<String>,
    error_message: Option<String>,
    blocked_reason: Option<String>,
    created_at: String,
    updated_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    review_requested_at: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;
        let priority = TaskPriority::from_rank(row.priority)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid priority: {}", row.priority)))?;
        let task_type = TaskType::from_str(&row.task_type)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid task type: {}", row.task_type)))?;
        let estimated_complexity = EstimatedComplexity::from_str(&row.estimated_complexity).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid complexity: {}", row.estimated_complexity))
        })?;

        Ok(Task {
            id: parse_uuid(&row.id)?,
            organization_id: parse_uuid(&row.organization_id)?,
            project_id: parse_optional_uuid(row.project_id)?,
            team_id: parse_optional_uuid(row.team_id)?,
            parent_task_id: parse_optional_uuid(row.parent_task_id)?,
            title: row.title,
            description: row.description,
            task_type,
            status,
            priority,
            assigned_hollon_id: parse_optional_uuid(row.assigned_hollon_id)?,
            creator_hollon_id: parse_optional_uuid(row.creator_hollon_id)?,
            reviewer_hollon_id: parse_optional_uuid(row.reviewer_hollon_id)?,
            dependencies: Vec::new(), // Loaded separately
            depth: row.depth as u32,
            estimated_complexity,
            story_points: row.story_points.map(|p| p as u32),
            required_skills: parse_json_or_default(row.required_skills)?,
            affected_files: parse_json_or_default(row.affected_files)?,
            tags: parse_json_or_default(row.tags)?,
            retry_count: row.retry_count as u32,
            due_date: parse_optional_datetime(row.due_date)?,
            result: row.result,
            error_message: row.error_message,
            blocked_reason: row.blocked_reason,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            started_at: parse_optional_datetime(row.started_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
            review_requested_at: parse_optional_datetime(row.review_requested_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use chrono::Duration;

    async fn setup() -> (SqliteTaskRepository, Uuid) {
        let pool = create_migrated_test_pool().await.unwrap();
        let org = Uuid::new_v4();
        sqlx::query("INSERT INTO organizations (id, name, created_at) VALUES (?, 'acme', ?)")
            .bind(org.to_string())
            .bind(format_datetime(Utc::now()))
            .execute(&pool)
            .await
            .unwrap();
        (SqliteTaskRepository::new(pool), org)
    }

    fn ready(org: Uuid, title: &str) -> Task {
        Task::new(org, title, "desc").with_status(TaskStatus::Ready)
    }

    #[tokio::test]
    async fn test_create_and_get_with_dependencies() {
        let (repo, org) = setup().await;
        let dep = ready(org, "dep");
        let main = ready(org, "main")
            .with_dependency(dep.id)
            .with_tags(vec!["backend".into()])
            .with_affected_files(vec!["src/lib.rs".into()]);

        repo.create(&dep).await.unwrap();
        repo.create(&main).await.unwrap();

        let loaded = repo.get(main.id).await.unwrap().unwrap();
        assert_eq!(loaded.dependencies, vec![dep.id]);
        assert_eq!(loaded.tags, vec!["backend".to_string()]);
        assert_eq!(loaded.affected_files, vec!["src/lib.rs".to_string()]);
        assert_eq!(repo.count_unresolved_dependencies(main.id).await.unwrap(), 1);

        let dependents = repo.get_dependents(dep.id).await.unwrap();
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].id, main.id);
    }

    #[tokio::test]
    async fn test_team_candidate_ordering() {
        let (repo, org) = setup().await;
        let team = Uuid::new_v4();
        sqlx::query("INSERT INTO teams (id, organization_id, name, created_at) VALUES (?, ?, 't', ?)")
            .bind(team.to_string())
            .bind(org.to_string())
            .bind(format_datetime(Utc::now()))
            .execute(&repo.pool)
            .await
            .unwrap();

        let low = ready(org, "low").with_team(team).with_priority(TaskPriority::P4Low);
        let undated = ready(org, "undated").with_team(team).with_priority(TaskPriority::P2High);
        let dated = ready(org, "dated")
            .with_team(team)
            .with_priority(TaskPriority::P2High)
            .with_due_date(Utc::now() + Duration::days(3));

        for t in [&low, &undated, &dated] {
            repo.create(t).await.unwrap();
        }

        let next = repo.find_next_team_candidate(team).await.unwrap().unwrap();
        assert_eq!(next.title, "dated");
    }

    #[tokio::test]
    async fn test_capability_candidate_matches_tags_case_insensitive() {
        let (repo, org) = setup().await;
        repo.create(&ready(org, "untagged")).await.unwrap();
        repo.create(&ready(org, "tagged").with_tags(vec!["Frontend".into()])).await.unwrap();

        let caps = vec!["frontend".to_string()];
        let next = repo.find_next_capability_candidate(org, &caps).await.unwrap().unwrap();
        assert_eq!(next.title, "tagged");
        assert!(repo.find_next_capability_candidate(org, &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_completed_is_conditional() {
        let (repo, org) = setup().await;
        let task = ready(org, "once");
        repo.create(&task).await.unwrap();

        assert!(repo.mark_completed(task.id, Some("done")).await.unwrap());
        assert!(!repo.mark_completed(task.id, Some("again")).await.unwrap());

        let loaded = repo.get(task.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Completed);
        assert_eq!(loaded.result.as_deref(), Some("done"));
        assert!(matches!(
            repo.mark_completed(Uuid::new_v4(), None).await,
            Err(DomainError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_active_by_files() {
        let (repo, org) = setup().await;
        let a = ready(org, "a").with_affected_files(vec!["x.ts".into()]);
        let b = ready(org, "b").with_affected_files(vec!["x.ts".into(), "y.ts".into()]);
        let done = ready(org, "done")
            .with_affected_files(vec!["x.ts".into()])
            .with_status(TaskStatus::Completed);
        for t in [&a, &b, &done] {
            repo.create(t).await.unwrap();
        }

        let hits = repo.find_active_by_files(org, &["x.ts".to_string()]).await.unwrap();
        assert_eq!(hits.len(), 2);
    }
}
