//! Decomposition: ask the Brain for a plan, spawn one temporary hollon per
//! subtask and wire dependencies by title within the batch.

use chrono::Utc;
use std::collections::HashMap;
use std::fmt::Write as _;
use uuid::Uuid;

use super::types::{parse_decomposition, SubtaskSpec};
use super::HollonOrchestrator;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{BrainOptions, BrainRequest, Hollon, Role, Task, TaskStatus};
use crate::services::event_bus::EventPayload;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum DecompositionOutcome {
    /// Subtasks created; the parent stays IN_PROGRESS with the manager
    Delegated(usize),
    /// Spawn limit reached; the parent waits for capacity
    Parked,
    /// Fall back to direct execution
    NotPossible(String),
}

impl HollonOrchestrator {
    pub(super) async fn decompose(&self, hollon: &Hollon, task: &Task) -> DomainResult<DecompositionOutcome> {
        let roles = self.ports.roles.list_spawnable(hollon.organization_id).await?;
        if roles.is_empty() {
            let reason = DomainError::NoSpawnableRoles(hollon.organization_id).to_string();
            tracing::debug!(task_id = %task.id, "{reason}");
            return Ok(DecompositionOutcome::NotPossible(reason));
        }

        let request = BrainRequest::new(hollon.id, decomposition_prompt(task, &roles))
            .for_task(task.id)
            .with_system_prompt(self.system_prompt(hollon).await?)
            .with_context(self.compose_context(task).await?)
            .with_options(BrainOptions::no_tools());

        let response = match self.call_brain(request).await {
            Ok(response) => response,
            Err(e) if e.is_brain_failure() => {
                tracing::warn!(task_id = %task.id, error = %e, "Decomposition call failed");
                return Ok(DecompositionOutcome::NotPossible(e.to_string()));
            }
            Err(e) => return Err(e),
        };
        self.record_cost(hollon, Some(task.id), &response).await;

        let plan = match parse_decomposition(&response.output) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "Unusable decomposition plan");
                return Ok(DecompositionOutcome::NotPossible(e.to_string()));
            }
        };

        let created = match self.create_subtasks(hollon, task, &plan.subtasks).await {
            Ok(created) => created,
            Err(DomainError::SpawnLimitReached { limit, current, max }) => {
                let reason = format!("spawn limit {limit} reached ({current}/{max})");
                self.park(task.id, &reason).await?;
                return Ok(DecompositionOutcome::Parked);
            }
            Err(e) => return Err(e),
        };
        if created.is_empty() {
            return Ok(DecompositionOutcome::NotPossible(
                "no subtask could be given a role".to_string(),
            ));
        }

        let mut parent = self.task_pool.load(task.id).await?;
        parent.status = TaskStatus::InProgress;
        self.task_pool.save(&mut parent).await?;

        tracing::info!(
            task_id = %task.id,
            hollon_id = %hollon.id,
            subtasks = created.len(),
            reasoning = plan.reasoning.as_deref().unwrap_or_default(),
            "Task decomposed"
        );
        self.events.emit_for(
            hollon.id,
            EventPayload::TaskDecomposed {
                task_id: task.id,
                subtask_count: created.len(),
            },
        );
        Ok(DecompositionOutcome::Delegated(created.len()))
    }

    async fn park(&self, task_id: Uuid, reason: &str) -> DomainResult<()> {
        let mut parent = self.task_pool.load(task_id).await?;
        parent.status = TaskStatus::WaitingForWorker;
        self.task_pool.save(&mut parent).await?;

        tracing::info!(task_id = %task_id, reason, "Decomposition parked until a worker slot frees");
        self.events.emit(EventPayload::DecompositionParked {
            task_id,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Create subtasks of `parent` from `specs`, each owned by a fresh
    /// temporary hollon spawned by `hollon`. Specs whose role cannot be
    /// resolved are skipped. On error everything created by this call is
    /// removed again.
    pub(super) async fn create_subtasks(
        &self,
        hollon: &Hollon,
        parent: &Task,
        specs: &[SubtaskSpec],
    ) -> DomainResult<Vec<Task>> {
        let roles = self.ports.roles.list_spawnable(hollon.organization_id).await?;
        let existing = self.ports.tasks.get_subtasks(parent.id).await?.len();

        let mut created: Vec<Task> = Vec::with_capacity(specs.len());
        let mut spawned: Vec<Uuid> = Vec::with_capacity(specs.len());
        let mut by_title: HashMap<String, Uuid> = HashMap::new();

        for spec in specs {
            let Some(role) = resolve_role(spec.role_id.as_deref(), hollon.role_id, &roles) else {
                tracing::error!(task_id = %parent.id, subtask = %spec.title, "No spawnable role for subtask, skipping");
                continue;
            };

            let name = format!("{}-sub-{}", hollon.name, existing + created.len() + 1);
            let worker = match self.registry.create_temporary(hollon, role, &name).await {
                Ok(worker) => worker,
                Err(e) => {
                    self.roll_back(&created, &spawned).await;
                    return Err(e);
                }
            };
            spawned.push(worker.id);

            let subtask = build_subtask(hollon, parent, spec, worker.id, &by_title);
            if let Err(e) = self.ports.tasks.create(&subtask).await {
                self.roll_back(&created, &spawned).await;
                return Err(e);
            }

            tracing::debug!(
                task_id = %subtask.id,
                parent_task_id = %parent.id,
                worker = %worker.name,
                role = %role.name,
                status = %subtask.status,
                "Subtask created"
            );
            by_title.insert(spec.title.trim().to_lowercase(), subtask.id);
            created.push(subtask);
        }

        Ok(created)
    }

    async fn roll_back(&self, created: &[Task], spawned: &[Uuid]) {
        for task in created.iter().rev() {
            if let Err(e) = self.ports.tasks.delete(task.id).await {
                tracing::warn!(task_id = %task.id, error = %e, "Failed to remove subtask during rollback");
            }
        }
        self.registry.destroy_all_temporary(spawned).await;
    }
}

/// Requested role (id or name) → the hollon's own role → first spawnable role.
fn resolve_role<'a>(requested: Option<&str>, own_role_id: Uuid, roles: &'a [Role]) -> Option<&'a Role> {
    requested
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .and_then(|r| {
            roles
                .iter()
                .find(|role| role.id.to_string() == r || role.name.eq_ignore_ascii_case(r))
        })
        .or_else(|| roles.iter().find(|role| role.id == own_role_id))
        .or_else(|| roles.first())
}

fn build_subtask(
    hollon: &Hollon,
    parent: &Task,
    spec: &SubtaskSpec,
    worker_id: Uuid,
    by_title: &HashMap<String, Uuid>,
) -> Task {
    let mut subtask = Task::new(parent.organization_id, spec.title.trim(), spec.description.trim())
        .with_parent(parent.id, parent.depth + 1)
        .with_type(spec.task_type)
        .with_priority(spec.priority)
        .with_affected_files(spec.affected_files.clone())
        .with_assignee(worker_id)
        .with_creator(hollon.id);
    subtask.team_id = parent.team_id.or(hollon.team_id);
    subtask.project_id = parent.project_id;

    // Titles not seen yet in this batch count as satisfied
    for title in &spec.dependencies {
        if let Some(dep_id) = by_title.get(&title.trim().to_lowercase()) {
            subtask = subtask.with_dependency(*dep_id);
        }
    }
    subtask.status = if subtask.dependencies.is_empty() {
        TaskStatus::Ready
    } else {
        TaskStatus::Blocked
    };
    subtask.updated_at = Utc::now();
    subtask
}

fn decomposition_prompt(task: &Task, roles: &[Role]) -> String {
    let mut prompt = format!(
        "Split the task \"{}\" into smaller subtasks that can be worked on independently.\n\nAvailable roles:\n",
        task.title
    );
    for role in roles {
        let _ = writeln!(
            prompt,
            "- {} (id: {}): {}",
            role.name,
            role.id,
            role.capabilities.join(", ")
        );
    }
    prompt.push_str(
        r#"
Respond with a single JSON object:
{
  "subtasks": [
    {
      "title": "short unique title",
      "description": "what to do",
      "type": "implementation|bugfix|research|review|documentation",
      "priority": "p1|p2|p3|p4",
      "roleId": "role id or name from the list above, or null",
      "affectedFiles": ["path"],
      "dependencies": ["title of an earlier subtask"]
    }
  ],
  "reasoning": "why this split"
}
Every subtask field is required; use [] for no files or dependencies."#,
    );
    prompt
}
