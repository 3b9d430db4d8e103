//! Execute path: context composition, Brain call, quality gate and the
//! success/failure handling that follows.

use std::fmt::Write as _;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use super::{CycleOutcome, HollonOrchestrator};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BrainOptions, BrainRequest, BrainResponse, CostRecord, EscalationLevel, Hollon, Task, TaskStatus,
};
use crate::services::event_bus::EventPayload;

impl HollonOrchestrator {
    /// Invoke the Brain under the configured timeout. Elapsed time is
    /// reported as `BrainTimeout` so it takes the same path as any other
    /// Brain failure.
    pub(super) async fn call_brain(&self, request: BrainRequest) -> DomainResult<BrainResponse> {
        let seconds = self.config.brain_timeout_secs;
        let hollon_id = request.hollon_id;
        let task_id = request.task_id;

        tracing::debug!(
            hollon_id = %hollon_id,
            task_id = ?task_id,
            brain = self.ports.brain.name(),
            tools = request.options.allow_tools,
            "Invoking brain"
        );
        match tokio::time::timeout(Duration::from_secs(seconds), self.ports.brain.execute(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(hollon_id = %hollon_id, task_id = ?task_id, seconds, "Brain call timed out");
                Err(DomainError::BrainTimeout { seconds })
            }
        }
    }

    /// Await a CodeHost call under the configured timeout. Elapsed time is
    /// reported as `CodeHostTimeout`; callers treat it like any other code
    /// host failure.
    pub(super) async fn call_code_host<T, F>(&self, operation: &'static str, call: F) -> DomainResult<T>
    where
        F: Future<Output = DomainResult<T>>,
    {
        let seconds = self.config.code_host_timeout_secs;
        match tokio::time::timeout(Duration::from_secs(seconds), call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, seconds, "Code host call timed out");
                Err(DomainError::CodeHostTimeout { operation, seconds })
            }
        }
    }

    /// Best effort: a failed write is logged and the cycle continues.
    pub(super) async fn record_cost(&self, hollon: &Hollon, task_id: Option<Uuid>, response: &BrainResponse) {
        let record = CostRecord::from_response(hollon.organization_id, hollon.id, task_id, response);
        if let Err(e) = self.ports.costs.record(&record).await {
            tracing::warn!(hollon_id = %hollon.id, error = %e, "Failed to record brain cost");
        }
    }

    /// Identity, role and capabilities of `hollon`.
    pub(super) async fn system_prompt(&self, hollon: &Hollon) -> DomainResult<String> {
        let mut prompt = format!("You are {}, a hollon", hollon.name);
        if let Some(role) = self.ports.roles.get(hollon.role_id).await? {
            let _ = write!(prompt, " with the role \"{}\"", role.name);
            if !role.description.is_empty() {
                let _ = write!(prompt, ". {}", role.description);
            }
            if !role.capabilities.is_empty() {
                let _ = write!(prompt, ". Capabilities: {}", role.capabilities.join(", "));
            }
        }
        prompt.push('.');
        Ok(prompt)
    }

    /// Task description, feedback from the previous attempt and the results
    /// of completed dependencies.
    pub(super) async fn compose_context(&self, task: &Task) -> DomainResult<String> {
        let mut context = format!("# Task: {}\n\n{}\n", task.title, task.description.trim());

        if !task.affected_files.is_empty() {
            let _ = write!(context, "\nFiles: {}\n", task.affected_files.join(", "));
        }

        if task.retry_count > 0 {
            if let Some(feedback) = &task.error_message {
                let _ = write!(
                    context,
                    "\n## Previous attempt ({}) was rejected\n{}\n",
                    task.retry_count, feedback
                );
            }
        }

        let mut results = String::new();
        for dep_id in &task.dependencies {
            let Some(dep) = self.ports.tasks.get(*dep_id).await? else {
                continue;
            };
            if let Some(result) = dep.result.as_deref().filter(|r| !r.trim().is_empty()) {
                let _ = write!(results, "\n### {}\n{}\n", dep.title, result.trim());
            }
        }
        if !results.is_empty() {
            context.push_str("\n## Results of prerequisite tasks\n");
            context.push_str(&results);
        }

        Ok(context)
    }

    pub(super) async fn execute_task(&self, hollon: &Hollon, task: Task) -> DomainResult<CycleOutcome> {
        let request = BrainRequest::new(
            hollon.id,
            format!(
                "Carry out the {} task \"{}\" described in the context and report the result.",
                task.task_type.as_str(),
                task.title
            ),
        )
        .for_task(task.id)
        .with_system_prompt(self.system_prompt(hollon).await?)
        .with_context(self.compose_context(&task).await?)
        .with_options(BrainOptions::with_tools());

        let response = match self.call_brain(request).await {
            Ok(response) => response,
            Err(e) if e.is_brain_failure() => {
                let outcome = self
                    .handle_failure(hollon, task.id, &e.to_string(), EscalationLevel::SelfResolve)
                    .await?;
                if hollon.is_temporary() {
                    self.registry.destroy_temporary(hollon.id).await;
                }
                return Ok(outcome);
            }
            Err(e) => return Err(e),
        };

        let verdict = self.quality_gate.validate(&task, &response).await?;
        self.record_cost(hollon, Some(task.id), &response).await;

        if !verdict.passed {
            let reason = verdict.reason.unwrap_or_else(|| "Quality gate failed".to_string());
            self.events.emit_for(
                hollon.id,
                EventPayload::QualityGateFailed {
                    task_id: task.id,
                    reason: reason.clone(),
                    can_retry: verdict.can_retry,
                },
            );
            let start = if verdict.can_retry {
                EscalationLevel::SelfResolve
            } else {
                EscalationLevel::TeamCollaboration
            };
            let outcome = self.handle_failure(hollon, task.id, &reason, start).await?;
            if hollon.is_temporary() && !is_retry(&outcome) {
                self.registry.destroy_temporary(hollon.id).await;
            }
            return Ok(outcome);
        }

        self.finish_success(hollon, task, response.output).await
    }

    /// Mark the task FAILED and hand it to the escalation chain. An error in
    /// the chain itself is logged; the failure is still reported.
    pub(super) async fn handle_failure(
        &self,
        hollon: &Hollon,
        task_id: Uuid,
        reason: &str,
        start: EscalationLevel,
    ) -> DomainResult<CycleOutcome> {
        self.task_pool.fail_task(task_id, reason).await?;

        let escalation = match self.escalation.escalate(hollon.id, task_id, reason, start).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::error!(task_id = %task_id, hollon_id = %hollon.id, error = %e, "Escalation failed");
                None
            }
        };

        Ok(CycleOutcome::Failed {
            task_id,
            reason: reason.to_string(),
            escalation,
        })
    }

    /// Persist accepted output. A code task with an open pull request goes
    /// to review; everything else completes. The output is already accepted,
    /// so a code host failure here only skips the review hand-off.
    async fn finish_success(&self, hollon: &Hollon, mut task: Task, output: String) -> DomainResult<CycleOutcome> {
        let has_pull_request = if task.task_type.produces_code() {
            match self.has_open_pull_request(task.id).await {
                Ok(found) => found,
                Err(e) if e.is_code_host_failure() => {
                    tracing::warn!(task_id = %task.id, error = %e, "Pull request lookup failed, completing without review");
                    false
                }
                Err(e) => return Err(e),
            }
        } else {
            false
        };
        if has_pull_request {
            if let Some(reviewer) = self.find_reviewer(hollon, &task).await? {
                task.status = TaskStatus::ReadyForReview;
                task.reviewer_hollon_id = Some(reviewer);
                task.result = Some(output);
                task.error_message = None;
                self.task_pool.save(&mut task).await?;

                tracing::info!(task_id = %task.id, reviewer = %reviewer, "Task sent to review");
                return Ok(CycleOutcome::SentToReview {
                    task_id: task.id,
                    reviewer_hollon_id: reviewer,
                });
            }
        }

        self.task_pool.complete_task(task.id, Some(&output)).await?;
        if let Some(parent_id) = task.parent_task_id {
            self.task_pool.promote_parent_if_done(parent_id).await?;
        }
        if hollon.is_temporary() {
            self.registry.destroy_temporary(hollon.id).await;
        }
        Ok(CycleOutcome::Completed { task_id: task.id })
    }

    pub(super) async fn has_open_pull_request(&self, task_id: Uuid) -> DomainResult<bool> {
        let prs = self
            .call_code_host("find_pull_requests", self.ports.code_host.find_pull_requests_by_task(task_id))
            .await?;
        Ok(prs.iter().any(|pr| pr.status.is_open()))
    }

    /// The parent task's owner, else whoever spawned this hollon.
    async fn find_reviewer(&self, hollon: &Hollon, task: &Task) -> DomainResult<Option<Uuid>> {
        if let Some(parent_id) = task.parent_task_id {
            if let Some(parent) = self.ports.tasks.get(parent_id).await? {
                if let Some(manager) = parent.assigned_hollon_id.filter(|id| *id != hollon.id) {
                    return Ok(Some(manager));
                }
            }
        }
        Ok(hollon.parent_hollon_id)
    }
}

fn is_retry(outcome: &CycleOutcome) -> bool {
    matches!(
        outcome,
        CycleOutcome::Failed {
            escalation: Some(result),
            ..
        } if result.is_retry()
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_harness::Harness;
    use super::*;
    use crate::adapters::brain::MockResponse;
    use crate::adapters::code_host::CodeHostFault;
    use crate::domain::models::{EscalationAction, HollonStatus, Organization, SpawnLimitsConfig, TaskType};
    use crate::services::test_support::Fixture;

    #[tokio::test]
    async fn test_empty_output_retries_same_task() {
        let h = Harness::new().await;
        let hollon = h.fx.hollon("alice").await;
        let task = h.fx.save(h.fx.task("Write changelog")).await;
        h.brain.push_response(MockResponse::success("   ")).await;

        let outcome = h.orchestrator.run_cycle(hollon.id).await.unwrap();
        let CycleOutcome::Failed { escalation: Some(result), .. } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(result.level, EscalationLevel::SelfResolve);
        assert_eq!(result.action, EscalationAction::Retry);

        let task = h.fx.reload(&task).await;
        assert_eq!(task.status, TaskStatus::Ready);
        assert_eq!(task.retry_count, 1);
        assert_eq!(task.assigned_hollon_id, Some(hollon.id));
        assert_eq!(task.error_message.as_deref(), Some("Output is empty"));

        // Retry resumes the same task with the feedback in context
        h.brain.push_response(MockResponse::success("Changelog updated.")).await;
        let outcome = h.orchestrator.run_cycle(hollon.id).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Completed { task_id: task.id });

        let requests = h.brain.requests().await;
        let context = requests[1].context.as_deref().unwrap();
        assert!(context.contains("Previous attempt (1) was rejected"));
        assert!(context.contains("Output is empty"));
    }

    #[tokio::test]
    async fn test_budget_failure_is_not_retried() {
        let fx = Fixture::with_org(Organization::new("frugal").with_daily_cost_limit(10.0)).await;
        let h = Harness::with_fixture(fx, SpawnLimitsConfig::default()).await;
        let hollon = h.fx.hollon("alice").await;
        let leader = h.fx.hollon("lead").await;
        let mut team = h.fx.team.clone();
        team.leader_hollon_id = Some(leader.id);
        h.fx.orgs.update_team(&team).await.unwrap();
        h.fx.hollons.update_status(leader.id, HollonStatus::Working).await.unwrap();

        let task = h.fx.save(h.fx.task("Write notes")).await;
        h.brain.push_response(MockResponse::success("Done").with_cost(25.0)).await;

        let outcome = h.orchestrator.run_cycle(hollon.id).await.unwrap();
        let CycleOutcome::Failed { reason, escalation: Some(result), .. } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(reason.contains("Daily cost limit exceeded"));
        assert!(result.level >= EscalationLevel::TeamCollaboration);
        assert_eq!(h.fx.reload(&task).await.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_brain_failure_destroys_temporary_worker() {
        let h = Harness::new().await;
        let manager = h.fx.hollon("manager").await;
        let role = h.fx.spawnable_role("worker", &["rust"]).await;
        let worker = h.orchestrator.registry.create_temporary(&manager, &role, "manager-sub-1").await.unwrap();
        let task = h.fx.save(h.fx.task("Write notes").with_assignee(worker.id)).await;
        h.brain.push_response(MockResponse::failure("process exited with 1")).await;

        let outcome = h.orchestrator.run_cycle(worker.id).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Failed { .. }));
        assert!(h.fx.hollons.get(worker.id).await.unwrap().is_none());

        // Retry leaves the task READY; the destroyed worker no longer owns it
        let task = h.fx.reload(&task).await;
        assert_eq!(task.status, TaskStatus::Ready);
        assert_eq!(task.assigned_hollon_id, None);
    }

    #[tokio::test]
    async fn test_brain_timeout_is_failure() {
        let mut h = Harness::new().await;
        h.orchestrator.config.brain_timeout_secs = 1;
        let hollon = h.fx.hollon("alice").await;
        let task = h.fx.save(h.fx.task("Write notes")).await;
        h.brain
            .push_response(MockResponse::success("late").with_delay(Duration::from_secs(3)))
            .await;

        let outcome = h.orchestrator.run_cycle(hollon.id).await.unwrap();
        let CycleOutcome::Failed { reason, .. } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(reason.contains("timed out"));
        assert_eq!(h.fx.reload(&task).await.retry_count, 1);
        assert_eq!(
            h.fx.hollons.get(hollon.id).await.unwrap().unwrap().status,
            HollonStatus::Idle
        );
    }

    #[tokio::test]
    async fn test_code_task_with_pull_request_goes_to_review() {
        let h = Harness::new().await;
        let manager = h.fx.hollon("manager").await;
        let role = h.fx.spawnable_role("worker", &["rust"]).await;
        let worker = h.orchestrator.registry.create_temporary(&manager, &role, "manager-sub-1").await.unwrap();

        let parent = h
            .fx
            .save(
                h.fx.task("Auth epic")
                    .with_type(TaskType::Epic)
                    .with_status(TaskStatus::InProgress)
                    .with_assignee(manager.id),
            )
            .await;
        let task = h
            .fx
            .save(
                h.fx.task("Implement login")
                    .with_parent(parent.id, 1)
                    .with_assignee(worker.id),
            )
            .await;
        h.code_host.open_pull_request(task.id, "login").await;
        h.brain
            .push_response(MockResponse::success("Added handler\n```rust\nfn login() {}\n```"))
            .await;

        let outcome = h.orchestrator.run_cycle(worker.id).await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::SentToReview {
                task_id: task.id,
                reviewer_hollon_id: manager.id
            }
        );
        let task = h.fx.reload(&task).await;
        assert_eq!(task.status, TaskStatus::ReadyForReview);
        assert!(task.result.as_deref().unwrap().contains("fn login"));
        // The implementer stays alive until the review concludes
        assert!(h.fx.hollons.get(worker.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_context_includes_dependency_results() {
        let h = Harness::new().await;
        let dep = h.fx.save(h.fx.task("Collect notes").with_status(TaskStatus::Completed)).await;
        let mut dep = h.fx.reload(&dep).await;
        dep.result = Some("notes: a, b".to_string());
        h.fx.tasks.update(&dep).await.unwrap();

        let task = h.fx.task("Write summary").with_dependency(dep.id);
        let context = h.orchestrator.compose_context(&task).await.unwrap();
        assert!(context.contains("# Task: Write summary"));
        assert!(context.contains("### Collect notes\nnotes: a, b"));
        assert!(!context.contains("Previous attempt"));
    }

    async fn code_task_with_pull_request(h: &Harness) -> (Hollon, Task) {
        let manager = h.fx.hollon("manager").await;
        let worker = h.fx.hollon("worker").await;
        let parent = h
            .fx
            .save(
                h.fx.task("Auth epic")
                    .with_type(TaskType::Epic)
                    .with_status(TaskStatus::InProgress)
                    .with_assignee(manager.id),
            )
            .await;
        let task = h
            .fx
            .save(
                h.fx.task("Implement login")
                    .with_parent(parent.id, 1)
                    .with_assignee(worker.id),
            )
            .await;
        h.code_host.open_pull_request(task.id, "login").await;
        h.brain
            .push_response(MockResponse::success("Added login handler\n```rust\nfn login() {}\n```"))
            .await;
        (worker, task)
    }

    #[tokio::test]
    async fn test_code_host_error_keeps_accepted_output() {
        let h = Harness::new().await;
        let (worker, task) = code_task_with_pull_request(&h).await;
        h.code_host
            .set_fault(Some(CodeHostFault::Error("gh: not logged in".to_string())))
            .await;

        let outcome = h.orchestrator.run_cycle(worker.id).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Completed { task_id: task.id });
        let task = h.fx.reload(&task).await;
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.result.as_deref().unwrap().contains("fn login"));
    }

    #[tokio::test]
    async fn test_code_host_timeout_keeps_accepted_output() {
        let mut h = Harness::new().await;
        h.orchestrator.config.code_host_timeout_secs = 1;
        let (worker, task) = code_task_with_pull_request(&h).await;
        h.code_host
            .set_fault(Some(CodeHostFault::Delay(Duration::from_secs(30))))
            .await;

        let started = std::time::Instant::now();
        let outcome = h.orchestrator.run_cycle(worker.id).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome, CycleOutcome::Completed { task_id: task.id });
        assert!(h.fx.reload(&task).await.result.as_deref().unwrap().contains("fn login"));
    }

    #[tokio::test]
    async fn test_code_host_call_times_out() {
        let mut h = Harness::new().await;
        h.orchestrator.config.code_host_timeout_secs = 1;
        let result: DomainResult<()> = h
            .orchestrator
            .call_code_host("merge", std::future::pending())
            .await;
        assert!(matches!(
            result,
            Err(DomainError::CodeHostTimeout {
                operation: "merge",
                seconds: 1
            })
        ));
    }
}
