//! Task CLI commands.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use std::fmt::Write as _;

use crate::cli::context::CliContext;
use crate::cli::id_resolver::Entity;
use crate::cli::output::{list_table, output, render_list, short_id, short_opt, truncate, ActionOutput, CommandOutput};
use crate::domain::models::{
    EscalationLevel, EscalationResult, EstimatedComplexity, ReviewVerdict, Task, TaskPriority, TaskStatus, TaskType,
};
use crate::domain::ports::TaskFilter;
use crate::services::CycleOutcome;

#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommands,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Submit a new task to the pool
    Submit {
        /// Task title
        title: String,
        /// Task description
        #[arg(short, long, default_value = "")]
        description: String,
        /// Task type (epic, implementation, bugfix, research, review, documentation)
        #[arg(short = 't', long = "type", default_value = "implementation")]
        task_type: String,
        /// Priority (p1, p2, p3, p4)
        #[arg(short, long, default_value = "p3")]
        priority: String,
        /// Estimated complexity (low, high)
        #[arg(long, default_value = "low")]
        complexity: String,
        /// Story points
        #[arg(long)]
        story_points: Option<u32>,
        /// Team the task belongs to
        #[arg(long)]
        team: Option<String>,
        /// Parent task
        #[arg(long)]
        parent: Option<String>,
        /// Task this one depends on (repeatable)
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
        /// Assign directly to a hollon
        #[arg(long)]
        assign: Option<String>,
        /// Required skill (repeatable)
        #[arg(long = "skill")]
        skills: Vec<String>,
        /// File the task will touch (repeatable)
        #[arg(long = "file")]
        files: Vec<String>,
        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Due date (RFC 3339)
        #[arg(long)]
        due: Option<String>,
        /// Keep the task in the backlog instead of releasing it
        #[arg(long)]
        backlog: bool,
        /// Organization (ID, prefix or name)
        #[arg(long)]
        org: Option<String>,
    },
    /// Release a backlog task into the pool
    Release {
        /// Task ID or prefix
        id: String,
    },
    /// List tasks
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,
        /// Filter by team
        #[arg(long)]
        team: Option<String>,
        /// Filter by assigned hollon
        #[arg(long)]
        assignee: Option<String>,
        /// Only subtasks of this task
        #[arg(long)]
        parent: Option<String>,
        /// Maximum number of tasks to show
        #[arg(short, long, default_value = "50")]
        limit: i64,
        /// Organization (ID, prefix or name)
        #[arg(long)]
        org: Option<String>,
    },
    /// Show task details and subtasks
    Show {
        /// Task ID or prefix
        id: String,
    },
    /// Mark a task completed
    Complete {
        /// Task ID or prefix
        id: String,
        /// Result text
        #[arg(short, long)]
        result: Option<String>,
    },
    /// Mark a task failed
    Fail {
        /// Task ID or prefix
        id: String,
        /// Failure reason
        #[arg(short, long)]
        reason: String,
    },
    /// Cancel a task
    Cancel {
        /// Task ID or prefix
        id: String,
    },
    /// Escalate a problem with a task
    Escalate {
        /// Task ID or prefix
        id: String,
        /// Failure reason
        #[arg(short, long)]
        reason: String,
        /// Escalating hollon (defaults to the assignee)
        #[arg(long)]
        hollon: Option<String>,
        /// Level to start at (1-5)
        #[arg(short, long, default_value = "1")]
        level: u8,
    },
    /// Record a review verdict for a task in review
    Verdict {
        /// Task ID or prefix
        id: String,
        /// Request changes instead of approving
        #[arg(long)]
        request_changes: bool,
        /// Review comment (repeatable)
        #[arg(short, long = "comment")]
        comments: Vec<String>,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct TaskListOutput {
    pub tasks: Vec<Task>,
    pub total: usize,
}

impl CommandOutput for TaskListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "title", "type", "status", "priority", "assignee", "parent"]);
        for task in &self.tasks {
            table.add_row(vec![
                short_id(task.id),
                truncate(&task.title, 40),
                task.task_type.as_str().to_string(),
                task.status.to_string(),
                task.priority.as_str().to_string(),
                short_opt(task.assigned_hollon_id),
                short_opt(task.parent_task_id),
            ]);
        }
        render_list("task", &table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TaskDetailOutput {
    pub task: Task,
    pub subtasks: Vec<Task>,
}

impl CommandOutput for TaskDetailOutput {
    fn to_human(&self) -> String {
        let t = &self.task;
        let mut s = format!("Task {}\n", t.id);
        let _ = writeln!(s, "  Title:      {}", t.title);
        let _ = writeln!(s, "  Type:       {}", t.task_type.as_str());
        let _ = writeln!(s, "  Status:     {}", t.status);
        let _ = writeln!(s, "  Priority:   {}", t.priority.as_str());
        let _ = writeln!(s, "  Complexity: {}", t.estimated_complexity.as_str());
        let _ = writeln!(s, "  Depth:      {}", t.depth);
        let _ = writeln!(s, "  Assignee:   {}", short_opt(t.assigned_hollon_id));
        let _ = writeln!(s, "  Reviewer:   {}", short_opt(t.reviewer_hollon_id));
        let _ = writeln!(s, "  Retries:    {}", t.retry_count);
        if let Some(parent) = t.parent_task_id {
            let _ = writeln!(s, "  Parent:     {parent}");
        }
        if !t.dependencies.is_empty() {
            let deps: Vec<String> = t.dependencies.iter().map(|d| short_id(*d)).collect();
            let _ = writeln!(s, "  Depends on: {}", deps.join(", "));
        }
        if !t.affected_files.is_empty() {
            let _ = writeln!(s, "  Files:      {}", t.affected_files.join(", "));
        }
        if let Some(reason) = &t.blocked_reason {
            let _ = writeln!(s, "  Blocked:    {reason}");
        }
        if let Some(err) = &t.error_message {
            let _ = writeln!(s, "  Error:      {err}");
        }
        let _ = writeln!(s, "  Created:    {}", t.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
        if let Some(done) = t.completed_at {
            let _ = writeln!(s, "  Completed:  {}", done.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        if !t.description.is_empty() {
            let _ = write!(s, "\n{}\n", t.description);
        }
        if let Some(result) = &t.result {
            let _ = write!(s, "\nResult:\n{result}\n");
        }
        if !self.subtasks.is_empty() {
            let _ = writeln!(s, "\nSubtasks:");
            for sub in &self.subtasks {
                let _ = writeln!(s, "  {} {:<18} {}", short_id(sub.id), sub.status.as_str(), truncate(&sub.title, 50));
            }
        }
        s.trim_end().to_string()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct EscalationOutput {
    pub task_id: String,
    pub result: EscalationResult,
}

impl CommandOutput for EscalationOutput {
    fn to_human(&self) -> String {
        format!(
            "Escalated task {} at level {} ({}): {}",
            &self.task_id[..8],
            self.result.level.number(),
            self.result.level,
            self.result.message
        )
    }
}

#[derive(Debug, serde::Serialize)]
pub struct VerdictOutput {
    pub outcome: CycleOutcome,
}

impl CommandOutput for VerdictOutput {
    fn to_human(&self) -> String {
        match &self.outcome {
            CycleOutcome::VerdictApplied { task_id, verdict } => {
                format!("Verdict '{}' applied to task {}", verdict.as_str(), short_id(*task_id))
            }
            other => format!("Verdict result: {}", other.label()),
        }
    }
}

fn parse_level(level: u8) -> Result<EscalationLevel> {
    EscalationLevel::ALL
        .into_iter()
        .find(|l| l.number() == level)
        .ok_or_else(|| anyhow!("Escalation level must be between 1 and 5, got {level}"))
}

pub async fn execute(args: TaskArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;
    let orchestrator = ctx.orchestrator();
    let pool = orchestrator.task_pool();

    match args.command {
        TaskCommands::Submit {
            title,
            description,
            task_type,
            priority,
            complexity,
            story_points,
            team,
            parent,
            depends_on,
            assign,
            skills,
            files,
            tags,
            due,
            backlog,
            org,
        } => {
            let org = ctx.organization(org.as_deref()).await?;
            let task_type = TaskType::from_str(&task_type).ok_or_else(|| anyhow!("Invalid task type: {task_type}"))?;
            let priority = TaskPriority::from_str(&priority).ok_or_else(|| anyhow!("Invalid priority: {priority}"))?;
            let complexity = EstimatedComplexity::from_str(&complexity)
                .ok_or_else(|| anyhow!("Invalid complexity: {complexity}"))?;

            let mut task = Task::new(org.id, &title, description)
                .with_type(task_type)
                .with_priority(priority)
                .with_complexity(complexity)
                .with_required_skills(skills)
                .with_affected_files(files)
                .with_tags(tags);
            if !backlog {
                task = task.with_status(TaskStatus::Ready);
            }
            if let Some(points) = story_points {
                task = task.with_story_points(points);
            }
            if let Some(team) = team {
                task = task.with_team(ctx.resolve(Entity::Team, &team).await?);
            }
            if let Some(parent) = parent {
                let parent_id = ctx.resolve(Entity::Task, &parent).await?;
                let parent = pool.load(parent_id).await?;
                task = task.with_parent(parent.id, parent.depth + 1);
            }
            for dep in depends_on {
                task = task.with_dependency(ctx.resolve(Entity::Task, &dep).await?);
            }
            if let Some(assign) = assign {
                task = task.with_assignee(ctx.resolve(Entity::Hollon, &assign).await?);
            }
            if let Some(due) = due {
                let due = DateTime::parse_from_rfc3339(&due)
                    .with_context(|| format!("Invalid due date: {due}"))?
                    .with_timezone(&Utc);
                task = task.with_due_date(due);
            }

            let task = pool.submit(task).await.context("Failed to submit task")?;
            output(
                &ActionOutput::ok(format!("Task '{}' submitted ({})", task.title, task.status), Some(task.id)),
                json_mode,
            );
        }
        TaskCommands::Release { id } => {
            let task_id = ctx.resolve(Entity::Task, &id).await?;
            let task = pool.release(task_id).await?;
            output(
                &ActionOutput::ok(format!("Task {} released ({})", short_id(task.id), task.status), Some(task.id)),
                json_mode,
            );
        }
        TaskCommands::List {
            status,
            team,
            assignee,
            parent,
            limit,
            org,
        } => {
            let org = ctx.organization(org.as_deref()).await?;
            let status = status
                .map(|s| TaskStatus::from_str(&s).ok_or_else(|| anyhow!("Invalid status: {s}")))
                .transpose()?;
            let team_id = match team {
                Some(team) => Some(ctx.resolve(Entity::Team, &team).await?),
                None => None,
            };
            let assigned_hollon_id = match assignee {
                Some(hollon) => Some(ctx.resolve(Entity::Hollon, &hollon).await?),
                None => None,
            };
            let parent_task_id = match parent {
                Some(parent) => Some(ctx.resolve(Entity::Task, &parent).await?),
                None => None,
            };

            let tasks = ctx
                .ports
                .tasks
                .list(TaskFilter {
                    organization_id: Some(org.id),
                    status,
                    team_id,
                    assigned_hollon_id,
                    parent_task_id,
                    limit: Some(limit),
                })
                .await
                .context("Failed to list tasks")?;
            let total = tasks.len();
            output(&TaskListOutput { tasks, total }, json_mode);
        }
        TaskCommands::Show { id } => {
            let task_id = ctx.resolve(Entity::Task, &id).await?;
            let task = pool.load(task_id).await?;
            let subtasks = ctx.ports.tasks.get_subtasks(task_id).await?;
            output(&TaskDetailOutput { task, subtasks }, json_mode);
        }
        TaskCommands::Complete { id, result } => {
            let task_id = ctx.resolve(Entity::Task, &id).await?;
            let task = pool.load(task_id).await?;
            if task.is_terminal() {
                bail!("Task {} is already {}", short_id(task_id), task.status);
            }
            pool.complete_task(task_id, result.as_deref()).await?;
            if let Some(parent_id) = task.parent_task_id {
                pool.promote_parent_if_done(parent_id).await?;
            }
            output(&ActionOutput::ok(format!("Task {} completed", short_id(task_id)), Some(task_id)), json_mode);
        }
        TaskCommands::Fail { id, reason } => {
            let task_id = ctx.resolve(Entity::Task, &id).await?;
            pool.fail_task(task_id, &reason).await?;
            output(&ActionOutput::ok(format!("Task {} failed", short_id(task_id)), Some(task_id)), json_mode);
        }
        TaskCommands::Cancel { id } => {
            let task_id = ctx.resolve(Entity::Task, &id).await?;
            let mut task = pool.load(task_id).await?;
            if task.is_terminal() {
                bail!("Task {} is already {}", short_id(task_id), task.status);
            }
            task.status = TaskStatus::Cancelled;
            pool.save(&mut task).await?;
            tracing::info!(task_id = %task_id, "Task cancelled");
            output(&ActionOutput::ok(format!("Task {} cancelled", short_id(task_id)), Some(task_id)), json_mode);
        }
        TaskCommands::Escalate {
            id,
            reason,
            hollon,
            level,
        } => {
            let level = parse_level(level)?;
            let task_id = ctx.resolve(Entity::Task, &id).await?;
            let hollon_id = match hollon {
                Some(hollon) => ctx.resolve(Entity::Hollon, &hollon).await?,
                None => pool
                    .load(task_id)
                    .await?
                    .assigned_hollon_id
                    .ok_or_else(|| anyhow!("Task has no assignee; pass --hollon"))?,
            };
            let result = ctx.escalation().escalate(hollon_id, task_id, &reason, level).await?;
            output(
                &EscalationOutput {
                    task_id: task_id.to_string(),
                    result,
                },
                json_mode,
            );
        }
        TaskCommands::Verdict {
            id,
            request_changes,
            comments,
        } => {
            let task_id = ctx.resolve(Entity::Task, &id).await?;
            let verdict = if request_changes {
                ReviewVerdict::ChangesRequested
            } else {
                ReviewVerdict::Approved
            };
            let outcome = orchestrator.apply_review_verdict(task_id, verdict, &comments).await?;
            output(&VerdictOutput { outcome }, json_mode);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(1).unwrap(), EscalationLevel::SelfResolve);
        assert_eq!(parse_level(5).unwrap(), EscalationLevel::Human);
        assert!(parse_level(0).is_err());
        assert!(parse_level(6).is_err());
    }
}
