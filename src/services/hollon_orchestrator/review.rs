//! Review cycle: reviewer assignment, Brain review decisions, code-review
//! verdicts and the upward completion cascade.

use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use uuid::Uuid;

use super::decomposition::DecompositionOutcome;
use super::types::{parse_decision, ParentCompletionDecision, ReviewDecision, SubtaskSpec};
use super::{CycleOutcome, HollonOrchestrator};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BrainOptions, BrainRequest, Hollon, PullRequest, ReviewVerdict, Task, TaskStatus,
};
use crate::services::event_bus::EventPayload;

impl HollonOrchestrator {
    /// Move READY_FOR_REVIEW tasks waiting on `hollon` into IN_REVIEW.
    ///
    /// Composite tasks and parents whose children are all done are reviewed
    /// by `hollon` itself. Code tasks get a temporary reviewer and a review
    /// request on their pull request; without an open pull request they are
    /// left alone. A failing code host defers that task only.
    pub(super) async fn scan_ready_for_review(&self, hollon: &Hollon) -> DomainResult<()> {
        for task in self.ports.tasks.find_ready_for_review(hollon.id).await? {
            if task.task_type.is_composite() || self.task_pool.children_all_completed(task.id).await? {
                self.start_review(task, hollon.id, Utc::now()).await?;
                continue;
            }

            let pr = match self.open_pull_request(task.id).await {
                Ok(Some(pr)) => pr,
                Ok(None) => {
                    tracing::debug!(task_id = %task.id, "No open pull request, review deferred");
                    continue;
                }
                Err(e) if e.is_code_host_failure() => {
                    tracing::warn!(task_id = %task.id, error = %e, "Pull request lookup failed, review deferred");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let requested_at = Utc::now();
            let Some(reviewer_id) = self.assign_code_reviewer(hollon, &task, &pr).await? else {
                continue;
            };
            self.start_review(task, reviewer_id, requested_at).await?;
        }
        Ok(())
    }

    /// Verdicts submitted before `requested_at` belong to an earlier round.
    async fn start_review(&self, mut task: Task, reviewer_id: Uuid, requested_at: DateTime<Utc>) -> DomainResult<()> {
        task.status = TaskStatus::InReview;
        task.reviewer_hollon_id = Some(reviewer_id);
        task.review_requested_at = Some(requested_at);
        self.task_pool.save(&mut task).await?;

        tracing::info!(task_id = %task.id, reviewer = %reviewer_id, "Review started");
        self.events.emit_for(
            reviewer_id,
            EventPayload::ReviewStarted {
                task_id: task.id,
                reviewer_hollon_id: reviewer_id,
            },
        );
        Ok(())
    }

    /// Spawn a temporary reviewer and request review on `pr`. Hollons that
    /// cannot spawn, or organizations without a review-capable spawnable
    /// role, review the code themselves.
    async fn assign_code_reviewer(&self, hollon: &Hollon, task: &Task, pr: &PullRequest) -> DomainResult<Option<Uuid>> {
        let reviewer = if hollon.can_spawn() {
            let roles = self.ports.roles.list_spawnable(hollon.organization_id).await?;
            match roles.iter().find(|r| r.can_review()) {
                Some(role) => {
                    let name = format!("{}-review-{}", hollon.name, short_id(task.id));
                    match self.registry.create_temporary(hollon, role, &name).await {
                        Ok(reviewer) => Some(reviewer),
                        Err(e @ DomainError::SpawnLimitReached { .. }) => {
                            tracing::info!(task_id = %task.id, error = %e, "No reviewer slot, review deferred");
                            return Ok(None);
                        }
                        Err(e) => return Err(e),
                    }
                }
                None => None,
            }
        } else {
            None
        };
        let reviewer_id = reviewer.as_ref().map_or(hollon.id, |r| r.id);

        let request = self.ports.code_host.request_review(&pr.id, reviewer_id);
        if let Err(e) = self.call_code_host("request_review", request).await {
            tracing::warn!(task_id = %task.id, pr = %pr.id, error = %e, "Review request failed");
            if let Some(reviewer) = reviewer {
                self.registry.destroy_temporary(reviewer.id).await;
            }
            return Ok(None);
        }
        Ok(Some(reviewer_id))
    }

    async fn open_pull_request(&self, task_id: Uuid) -> DomainResult<Option<PullRequest>> {
        let prs = self
            .call_code_host("find_pull_requests", self.ports.code_host.find_pull_requests_by_task(task_id))
            .await?;
        Ok(prs.into_iter().find(|pr| pr.status.is_open()))
    }

    /// One review step on an IN_REVIEW task owned by `hollon`.
    pub(super) async fn run_review_mode(&self, hollon: &Hollon, task: Task) -> DomainResult<CycleOutcome> {
        let children = self.live_children(task.id).await?;

        if children.is_empty() && task.task_type.produces_code() {
            let lookup = self.ports.code_host.find_pull_requests_by_task(task.id);
            let prs = match self.call_code_host("find_pull_requests", lookup).await {
                Ok(prs) => prs,
                Err(e) if e.is_code_host_failure() => {
                    tracing::warn!(task_id = %task.id, error = %e, "Pull request lookup failed");
                    return Ok(CycleOutcome::AwaitingReview { task_id: task.id });
                }
                Err(e) => return Err(e),
            };
            let Some((verdict, comments)) = prs.iter().find_map(|pr| pr.verdict_since(task.review_requested_at))
            else {
                tracing::debug!(task_id = %task.id, "No review verdict yet");
                return Ok(CycleOutcome::AwaitingReview { task_id: task.id });
            };
            return self.apply_review_verdict(task.id, verdict, &comments).await;
        }

        let request = BrainRequest::new(hollon.id, review_prompt(&task, &children))
            .for_task(task.id)
            .with_system_prompt(self.system_prompt(hollon).await?)
            .with_context(self.compose_context(&task).await?)
            .with_options(BrainOptions::no_tools());
        let response = match self.call_brain(request).await {
            Ok(response) => response,
            Err(e) if e.is_brain_failure() => {
                tracing::warn!(task_id = %task.id, error = %e, "Review call failed");
                return Ok(CycleOutcome::AwaitingReview { task_id: task.id });
            }
            Err(e) => return Err(e),
        };
        self.record_cost(hollon, Some(task.id), &response).await;

        let decision: ReviewDecision = match parse_decision(&response.output) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "Unusable review decision");
                return Ok(CycleOutcome::AwaitingReview { task_id: task.id });
            }
        };

        tracing::info!(
            task_id = %task.id,
            action = decision.action(),
            reasoning = decision.reasoning(),
            "Review decided"
        );
        self.events.emit_for(
            hollon.id,
            EventPayload::ReviewDecided {
                task_id: task.id,
                action: decision.action().to_string(),
            },
        );
        self.apply_decision(hollon, task, decision).await
    }

    async fn apply_decision(&self, hollon: &Hollon, task: Task, decision: ReviewDecision) -> DomainResult<CycleOutcome> {
        let action = decision.action().to_string();
        match decision {
            ReviewDecision::Complete { .. } => {
                self.task_pool.complete_task(task.id, None).await?;
                if let Some(parent_id) = task.parent_task_id {
                    self.cascade_parent_completion(parent_id).await?;
                }
            }
            ReviewDecision::Rework {
                subtask_ids,
                rework_instructions,
                ..
            } => {
                self.rework_subtasks(hollon, &task, &subtask_ids, &rework_instructions).await?;
                self.resume_parent(task.id).await?;
            }
            ReviewDecision::AddTasks { new_subtasks, .. } => {
                if !self.add_subtasks(hollon, &task, &new_subtasks).await? {
                    return Ok(CycleOutcome::AwaitingReview { task_id: task.id });
                }
                self.resume_parent(task.id).await?;
            }
            ReviewDecision::Redirect {
                cancel_subtask_ids,
                new_direction,
                ..
            } => return self.redirect(hollon, task, &cancel_subtask_ids, &new_direction).await,
        }
        Ok(CycleOutcome::Reviewed { task_id: task.id, action })
    }

    async fn rework_subtasks(&self, hollon: &Hollon, parent: &Task, ids: &[Uuid], instructions: &str) -> DomainResult<()> {
        for id in ids {
            let Some(mut child) = self.ports.tasks.get(*id).await? else {
                tracing::warn!(task_id = %id, "Rework target not found");
                continue;
            };
            if child.parent_task_id != Some(parent.id) {
                tracing::warn!(task_id = %id, parent_task_id = %parent.id, "Rework target is not a subtask");
                continue;
            }

            child.status = TaskStatus::Ready;
            child.description = instructions.to_string();
            child.retry_count += 1;
            child.reviewer_hollon_id = None;
            child.error_message = None;
            child.completed_at = None;

            let worker_alive = match child.assigned_hollon_id {
                Some(worker_id) => self.registry.find_by_id(worker_id).await?.is_some(),
                None => false,
            };
            if !worker_alive {
                child.assigned_hollon_id = self.respawn_worker(hollon, &child).await?;
            }
            self.task_pool.save(&mut child).await?;
            tracing::info!(task_id = %child.id, retry_count = child.retry_count, "Subtask sent back for rework");
        }
        Ok(())
    }

    /// Fresh temporary worker for a reworked subtask. At the spawn limit the
    /// subtask is left unassigned for the team backlog.
    async fn respawn_worker(&self, hollon: &Hollon, child: &Task) -> DomainResult<Option<Uuid>> {
        let roles = self.ports.roles.list_spawnable(hollon.organization_id).await?;
        let Some(role) = roles.iter().find(|r| r.id == hollon.role_id).or_else(|| roles.first()) else {
            return Ok(None);
        };
        let name = format!("{}-rework-{}", hollon.name, short_id(child.id));
        match self.registry.create_temporary(hollon, role, &name).await {
            Ok(worker) => Ok(Some(worker.id)),
            Err(e @ DomainError::SpawnLimitReached { .. }) => {
                tracing::info!(task_id = %child.id, error = %e, "Rework left unassigned");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Returns false when nothing could be created; the review is retried.
    async fn add_subtasks(&self, hollon: &Hollon, parent: &Task, specs: &[SubtaskSpec]) -> DomainResult<bool> {
        match self.create_subtasks(hollon, parent, specs).await {
            Ok(created) if created.is_empty() => Ok(false),
            Ok(created) => {
                tracing::info!(task_id = %parent.id, added = created.len(), "Subtasks added");
                Ok(true)
            }
            Err(e @ DomainError::SpawnLimitReached { .. }) => {
                tracing::info!(task_id = %parent.id, error = %e, "Cannot add subtasks yet");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn resume_parent(&self, task_id: Uuid) -> DomainResult<()> {
        let mut parent = self.task_pool.load(task_id).await?;
        parent.status = TaskStatus::InProgress;
        parent.reviewer_hollon_id = None;
        self.task_pool.save(&mut parent).await
    }

    async fn redirect(
        &self,
        hollon: &Hollon,
        task: Task,
        cancel_ids: &[Uuid],
        new_direction: &str,
    ) -> DomainResult<CycleOutcome> {
        for id in cancel_ids {
            let Some(mut child) = self.ports.tasks.get(*id).await? else {
                continue;
            };
            if child.parent_task_id != Some(task.id) || child.status == TaskStatus::Cancelled {
                continue;
            }
            child.status = TaskStatus::Cancelled;
            self.task_pool.save(&mut child).await?;
            if let Some(worker_id) = child.assigned_hollon_id {
                self.registry.destroy_temporary(worker_id).await;
            }
            tracing::info!(task_id = %child.id, "Subtask cancelled by redirect");
        }

        let mut parent = self.task_pool.load(task.id).await?;
        parent.append_description(&format!("New direction: {}", new_direction.trim()));
        parent.status = TaskStatus::Ready;
        parent.reviewer_hollon_id = None;
        self.task_pool.save(&mut parent).await?;

        let outcome = if hollon.can_spawn() {
            self.decompose(hollon, &parent).await?
        } else {
            DecompositionOutcome::NotPossible("hollon cannot spawn".to_string())
        };
        match outcome {
            DecompositionOutcome::Delegated(_) | DecompositionOutcome::Parked => Ok(CycleOutcome::Reviewed {
                task_id: task.id,
                action: "redirect".to_string(),
            }),
            DecompositionOutcome::NotPossible(reason) => {
                tracing::debug!(task_id = %task.id, reason = %reason, "Redirected task executed directly");
                let mut parent = self.task_pool.load(task.id).await?;
                parent.status = TaskStatus::InProgress;
                self.task_pool.save(&mut parent).await?;
                self.execute_task(hollon, parent).await
            }
        }
    }

    /// Apply a code-review verdict to an IN_REVIEW task.
    ///
    /// Approval merges the open pull requests and completes the task, then
    /// walks up the parent chain. If merging fails the task stays IN_REVIEW
    /// and the next review cycle tries again. Requested changes send the task
    /// back to its implementer with the comments appended. The temporary
    /// reviewer is destroyed once the verdict is applied.
    pub async fn apply_review_verdict(
        &self,
        task_id: Uuid,
        verdict: ReviewVerdict,
        comments: &[String],
    ) -> DomainResult<CycleOutcome> {
        let mut task = self.task_pool.load(task_id).await?;
        if task.status != TaskStatus::InReview {
            return Err(DomainError::InvalidStateTransition {
                from: task.status.to_string(),
                to: verdict.as_str().to_string(),
                reason: "review verdicts apply to tasks in review".to_string(),
            });
        }
        let reviewer = task.reviewer_hollon_id;

        match verdict {
            ReviewVerdict::Approved => {
                if let Err(e) = self.merge_open_pull_requests(task_id).await {
                    if !e.is_code_host_failure() {
                        return Err(e);
                    }
                    tracing::warn!(task_id = %task_id, error = %e, "Merge failed, task stays in review");
                    return Ok(CycleOutcome::AwaitingReview { task_id });
                }
                self.task_pool.complete_task(task_id, None).await?;

                if let Some(reviewer) = reviewer {
                    self.registry.destroy_temporary(reviewer).await;
                }
                if let Some(implementer) = task.assigned_hollon_id {
                    self.registry.destroy_temporary(implementer).await;
                }
                if let Some(parent_id) = task.parent_task_id {
                    self.cascade_parent_completion(parent_id).await?;
                }
            }
            ReviewVerdict::ChangesRequested => {
                let mut feedback = String::from("Review feedback:");
                if comments.is_empty() {
                    feedback.push_str("\n- Changes requested");
                }
                for comment in comments {
                    let _ = write!(feedback, "\n- {}", comment.trim());
                }
                task.append_description(&feedback);
                task.status = TaskStatus::Ready;
                task.reviewer_hollon_id = None;
                self.task_pool.save(&mut task).await?;

                if let Some(reviewer) = reviewer {
                    self.registry.destroy_temporary(reviewer).await;
                }
            }
        }

        tracing::info!(task_id = %task_id, verdict = verdict.as_str(), "Review verdict applied");
        self.events.emit(EventPayload::ReviewVerdictApplied {
            task_id,
            verdict: verdict.as_str().to_string(),
        });
        Ok(CycleOutcome::VerdictApplied { task_id, verdict })
    }

    async fn merge_open_pull_requests(&self, task_id: Uuid) -> DomainResult<()> {
        let prs = self
            .call_code_host("find_pull_requests", self.ports.code_host.find_pull_requests_by_task(task_id))
            .await?;
        for pr in prs.iter().filter(|pr| pr.status.is_open()) {
            self.call_code_host("merge", self.ports.code_host.merge(&pr.id)).await?;
            tracing::info!(task_id = %task_id, pr = %pr.id, "Pull request merged");
        }
        Ok(())
    }

    /// Walk up from `parent_id` while parents have all children COMPLETED,
    /// asking each parent's owner whether it is done or needs more work.
    async fn cascade_parent_completion(&self, parent_id: Uuid) -> DomainResult<()> {
        let mut next = Some(parent_id);
        while let Some(id) = next {
            let parent = self.task_pool.load(id).await?;
            if parent.is_terminal() || !self.task_pool.children_all_completed(id).await? {
                return Ok(());
            }

            let manager = match parent.assigned_hollon_id {
                Some(manager_id) => self.registry.find_by_id(manager_id).await?,
                None => None,
            };
            let Some(manager) = manager else {
                self.task_pool.complete_task(id, None).await?;
                next = parent.parent_task_id;
                continue;
            };

            match self.ask_parent_completion(&manager, &parent).await {
                Ok(ParentCompletionDecision::Complete { reason }) => {
                    tracing::info!(task_id = %id, reason = %reason, "Parent completed");
                    self.task_pool.complete_task(id, None).await?;
                    next = parent.parent_task_id;
                }
                Ok(ParentCompletionDecision::AddTasks { reason, new_subtasks }) => {
                    tracing::info!(task_id = %id, reason = %reason, "Parent needs more work");
                    if self.add_subtasks(&manager, &parent, &new_subtasks).await? {
                        self.resume_parent(id).await?;
                    } else {
                        self.task_pool.promote_parent_if_done(id).await?;
                    }
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(task_id = %id, error = %e, "Parent completion check failed, handing to review");
                    self.task_pool.promote_parent_if_done(id).await?;
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    async fn ask_parent_completion(&self, manager: &Hollon, parent: &Task) -> DomainResult<ParentCompletionDecision> {
        let children = self.live_children(parent.id).await?;
        let request = BrainRequest::new(manager.id, parent_completion_prompt(parent, &children))
            .for_task(parent.id)
            .with_system_prompt(self.system_prompt(manager).await?)
            .with_options(BrainOptions::no_tools());
        let response = self.call_brain(request).await?;
        self.record_cost(manager, Some(parent.id), &response).await;
        parse_decision(&response.output)
    }

    async fn live_children(&self, task_id: Uuid) -> DomainResult<Vec<Task>> {
        let children = self.ports.tasks.get_subtasks(task_id).await?;
        Ok(children.into_iter().filter(|c| c.status != TaskStatus::Cancelled).collect())
    }
}

fn short_id(id: Uuid) -> String {
    id.simple().to_string().chars().take(8).collect()
}

fn summarize_children(out: &mut String, children: &[Task]) {
    if children.is_empty() {
        out.push_str("\nThis task has no subtasks.\n");
        return;
    }
    out.push_str("\nSubtasks:\n");
    for child in children {
        let _ = writeln!(out, "- [{}] {} (id: {}, status: {})", child.task_type.as_str(), child.title, child.id, child.status);
        if let Some(result) = child.result.as_deref().filter(|r| !r.trim().is_empty()) {
            let _ = writeln!(out, "  result: {}", result.trim().replace('\n', "\n  "));
        }
    }
}

fn review_prompt(task: &Task, children: &[Task]) -> String {
    let mut prompt = format!("Review the outcome of \"{}\".\n", task.title);
    summarize_children(&mut prompt, children);
    prompt.push_str(
        r#"
Respond with a single JSON object. "action" is one of complete, rework, add_tasks, redirect:
{"action": "complete", "reasoning": "..."}
{"action": "rework", "reasoning": "...", "subtaskIds": ["<id>"], "reworkInstructions": "..."}
{"action": "add_tasks", "reasoning": "...", "newSubtasks": [{"title": "...", "description": "...", "type": "implementation", "priority": "p3", "roleId": null, "affectedFiles": [], "dependencies": []}]}
{"action": "redirect", "reasoning": "...", "cancelSubtaskIds": ["<id>"], "newDirection": "..."}"#,
    );
    prompt
}

fn parent_completion_prompt(parent: &Task, children: &[Task]) -> String {
    let mut prompt = format!(
        "All subtasks of \"{}\" are complete. Decide whether the task itself is done.\n\n{}\n",
        parent.title,
        parent.description.trim()
    );
    summarize_children(&mut prompt, children);
    prompt.push_str(
        r#"
Respond with a single JSON object, either
{"action": "complete", "reason": "..."}
or
{"action": "add_tasks", "reason": "...", "newSubtasks": [{"title": "...", "description": "...", "type": "implementation", "priority": "p3", "roleId": null, "affectedFiles": [], "dependencies": []}]}"#,
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::super::test_harness::Harness;
    use super::*;
    use crate::adapters::brain::MockResponse;
    use crate::adapters::code_host::CodeHostFault;
    use crate::domain::models::{PullRequestStatus, TaskType};

    struct Tree {
        manager: Hollon,
        worker: Hollon,
        parent: Task,
        child: Task,
    }

    /// Epic owned by `manager`, one implementation subtask owned by a temporary worker.
    async fn tree(h: &Harness, child_status: TaskStatus) -> Tree {
        let manager = h.fx.hollon("manager").await;
        let role = h.fx.spawnable_role("backend", &["rust"]).await;
        let worker = h.orchestrator.registry.create_temporary(&manager, &role, "manager-sub-1").await.unwrap();
        let parent = h
            .fx
            .save(
                h.fx.task("Login epic")
                    .with_type(TaskType::Epic)
                    .with_status(TaskStatus::InProgress)
                    .with_assignee(manager.id),
            )
            .await;
        let child = h
            .fx
            .save(
                h.fx.task("Implement login")
                    .with_parent(parent.id, 1)
                    .with_assignee(worker.id)
                    .with_status(child_status),
            )
            .await;
        Tree {
            manager,
            worker,
            parent,
            child,
        }
    }

    #[tokio::test]
    async fn test_code_review_round_trip() {
        let h = Harness::new().await;
        let reviewer_role = h.fx.spawnable_role("reviewer", &["review"]).await;
        let t = tree(&h, TaskStatus::ReadyForReview).await;
        let mut child = h.fx.reload(&t.child).await;
        child.reviewer_hollon_id = Some(t.manager.id);
        h.fx.tasks.update(&child).await.unwrap();
        let pr = h.code_host.open_pull_request(child.id, "login").await;

        // Manager assigns a temporary reviewer and has nothing else to do
        let outcome = h.orchestrator.run_cycle(t.manager.id).await.unwrap();
        assert_eq!(outcome, CycleOutcome::NoTask);
        let child = h.fx.reload(&child).await;
        assert_eq!(child.status, TaskStatus::InReview);
        let reviewer_id = child.reviewer_hollon_id.unwrap();
        let reviewer = h.fx.hollons.get(reviewer_id).await.unwrap().unwrap();
        assert!(reviewer.is_temporary());
        assert_eq!(reviewer.role_id, reviewer_role.id);
        assert_eq!(h.code_host.review_requests().await, vec![(pr.clone(), reviewer_id)]);

        // No verdict yet
        let outcome = h.orchestrator.run_cycle(reviewer_id).await.unwrap();
        assert_eq!(outcome, CycleOutcome::AwaitingReview { task_id: child.id });

        h.code_host.submit_review(&pr, Some(ReviewVerdict::Approved), "").await.unwrap();
        h.brain
            .push_response(MockResponse::success(r#"{"action": "complete", "reason": "login shipped"}"#))
            .await;
        let outcome = h.orchestrator.run_cycle(reviewer_id).await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::VerdictApplied {
                task_id: child.id,
                verdict: ReviewVerdict::Approved
            }
        );

        assert_eq!(h.code_host.get(&pr).await.unwrap().status, PullRequestStatus::Merged);
        assert_eq!(h.fx.reload(&child).await.status, TaskStatus::Completed);
        assert_eq!(h.fx.reload(&t.parent).await.status, TaskStatus::Completed);
        assert!(h.fx.hollons.get(reviewer_id).await.unwrap().is_none());
        assert!(h.fx.hollons.get(t.worker.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_changes_requested_returns_to_implementer() {
        let h = Harness::new().await;
        let t = tree(&h, TaskStatus::InReview).await;
        let mut child = h.fx.reload(&t.child).await;
        child.reviewer_hollon_id = Some(t.manager.id);
        h.fx.tasks.update(&child).await.unwrap();
        let pr = h.code_host.open_pull_request(child.id, "login").await;
        h.code_host
            .submit_review(&pr, Some(ReviewVerdict::ChangesRequested), "hash the password")
            .await
            .unwrap();

        let outcome = h
            .orchestrator
            .apply_review_verdict(child.id, ReviewVerdict::ChangesRequested, &["hash the password".to_string()])
            .await
            .unwrap();
        assert!(matches!(outcome, CycleOutcome::VerdictApplied { .. }));

        let child = h.fx.reload(&child).await;
        assert_eq!(child.status, TaskStatus::Ready);
        assert_eq!(child.assigned_hollon_id, Some(t.worker.id));
        assert!(child.reviewer_hollon_id.is_none());
        assert!(child.description.ends_with("Review feedback:\n- hash the password"));
        // The permanent manager is never destroyed
        assert!(h.fx.hollons.get(t.manager.id).await.unwrap().is_some());

        let err = h
            .orchestrator
            .apply_review_verdict(child.id, ReviewVerdict::Approved, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_second_review_round_ignores_earlier_verdict() {
        let h = Harness::new().await;
        h.fx.spawnable_role("reviewer", &["review"]).await;
        let t = tree(&h, TaskStatus::ReadyForReview).await;
        let mut child = h.fx.reload(&t.child).await;
        child.reviewer_hollon_id = Some(t.manager.id);
        h.fx.tasks.update(&child).await.unwrap();
        let pr = h.code_host.open_pull_request(child.id, "login").await;

        // Round one: changes requested
        h.orchestrator.run_cycle(t.manager.id).await.unwrap();
        let first_reviewer = h.fx.reload(&child).await.reviewer_hollon_id.unwrap();
        h.code_host
            .submit_review(&pr, Some(ReviewVerdict::ChangesRequested), "hash the password")
            .await
            .unwrap();
        let outcome = h.orchestrator.run_cycle(first_reviewer).await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::VerdictApplied {
                task_id: child.id,
                verdict: ReviewVerdict::ChangesRequested
            }
        );

        // Rework goes back to review
        h.brain
            .push_response(MockResponse::success("Hashed with argon2\n```rust\nfn hash() {}\n```"))
            .await;
        let outcome = h.orchestrator.run_cycle(t.worker.id).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::SentToReview { .. }));

        // Round two: the old verdict no longer counts
        h.orchestrator.run_cycle(t.manager.id).await.unwrap();
        let child = h.fx.reload(&child).await;
        assert_eq!(child.status, TaskStatus::InReview);
        let second_reviewer = child.reviewer_hollon_id.unwrap();
        assert_ne!(second_reviewer, first_reviewer);
        assert_eq!(h.code_host.get(&pr).await.unwrap().status, PullRequestStatus::ReadyForReview);

        let outcome = h.orchestrator.run_cycle(second_reviewer).await.unwrap();
        assert_eq!(outcome, CycleOutcome::AwaitingReview { task_id: child.id });
        let child = h.fx.reload(&child).await;
        assert_eq!(child.status, TaskStatus::InReview);
        assert_eq!(child.description.matches("Review feedback:").count(), 1);

        h.code_host.submit_review(&pr, Some(ReviewVerdict::Approved), "").await.unwrap();
        h.brain
            .push_response(MockResponse::success(r#"{"action": "complete", "reason": "login shipped"}"#))
            .await;
        let outcome = h.orchestrator.run_cycle(second_reviewer).await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::VerdictApplied {
                task_id: child.id,
                verdict: ReviewVerdict::Approved
            }
        );
        assert_eq!(h.fx.reload(&child).await.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_code_host_failure_defers_review_scan() {
        let h = Harness::new().await;
        let t = tree(&h, TaskStatus::ReadyForReview).await;
        let mut child = h.fx.reload(&t.child).await;
        child.reviewer_hollon_id = Some(t.manager.id);
        h.fx.tasks.update(&child).await.unwrap();
        h.code_host.open_pull_request(child.id, "login").await;
        h.code_host
            .set_fault(Some(CodeHostFault::Error("gh: rate limited".to_string())))
            .await;

        let outcome = h.orchestrator.run_cycle(t.manager.id).await.unwrap();
        assert_eq!(outcome, CycleOutcome::NoTask);
        assert_eq!(h.fx.reload(&child).await.status, TaskStatus::ReadyForReview);

        h.code_host.set_fault(None).await;
        h.orchestrator.run_cycle(t.manager.id).await.unwrap();
        assert_eq!(h.fx.reload(&child).await.status, TaskStatus::InReview);
    }

    #[tokio::test]
    async fn test_merge_timeout_keeps_task_in_review() {
        let mut h = Harness::new().await;
        h.orchestrator.config.code_host_timeout_secs = 1;
        let t = tree(&h, TaskStatus::InReview).await;
        let mut child = h.fx.reload(&t.child).await;
        child.reviewer_hollon_id = Some(t.manager.id);
        h.fx.tasks.update(&child).await.unwrap();
        let pr = h.code_host.open_pull_request(child.id, "login").await;
        h.code_host.submit_review(&pr, Some(ReviewVerdict::Approved), "").await.unwrap();
        h.code_host
            .set_fault(Some(CodeHostFault::Delay(std::time::Duration::from_secs(30))))
            .await;

        let outcome = h
            .orchestrator
            .apply_review_verdict(child.id, ReviewVerdict::Approved, &[])
            .await
            .unwrap();
        assert_eq!(outcome, CycleOutcome::AwaitingReview { task_id: child.id });
        assert_eq!(h.fx.reload(&child).await.status, TaskStatus::InReview);
        assert!(h.fx.hollons.get(t.worker.id).await.unwrap().is_some());

        // The next review cycle finds the verdict again and merges
        h.code_host.set_fault(None).await;
        h.brain
            .push_response(MockResponse::success(r#"{"action": "complete", "reason": "login shipped"}"#))
            .await;
        let outcome = h.orchestrator.run_cycle(t.manager.id).await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::VerdictApplied {
                task_id: child.id,
                verdict: ReviewVerdict::Approved
            }
        );
        assert_eq!(h.code_host.get(&pr).await.unwrap().status, PullRequestStatus::Merged);
    }

    #[tokio::test]
    async fn test_completed_children_put_parent_in_review() {
        let h = Harness::new().await;
        let t = tree(&h, TaskStatus::Completed).await;
        let mut parent = h.fx.reload(&t.parent).await;
        parent.status = TaskStatus::ReadyForReview;
        parent.reviewer_hollon_id = Some(t.manager.id);
        h.fx.tasks.update(&parent).await.unwrap();
        h.brain
            .push_response(MockResponse::success(
                r#"```json
{"action": "complete", "reasoning": "all subtasks delivered"}
```"#,
            ))
            .await;

        let outcome = h.orchestrator.run_cycle(t.manager.id).await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Reviewed {
                task_id: parent.id,
                action: "complete".to_string()
            }
        );
        assert_eq!(h.fx.reload(&parent).await.status, TaskStatus::Completed);
        let requests = h.brain.requests().await;
        assert!(!requests[0].options.allow_tools);
        assert!(requests[0].prompt.contains("Implement login"));
    }

    #[tokio::test]
    async fn test_rework_resets_subtask() {
        let h = Harness::new().await;
        let t = tree(&h, TaskStatus::Completed).await;
        let mut parent = h.fx.reload(&t.parent).await;
        parent.status = TaskStatus::InReview;
        parent.reviewer_hollon_id = Some(t.manager.id);
        h.fx.tasks.update(&parent).await.unwrap();
        // Implementer is gone by the time the review happens
        h.orchestrator.registry.destroy_temporary(t.worker.id).await;

        h.brain
            .push_response(MockResponse::success(format!(
                r#"{{"action": "rework", "reasoning": "no tests", "subtaskIds": ["{}"], "reworkInstructions": "Add tests for login"}}"#,
                t.child.id
            )))
            .await;

        let outcome = h.orchestrator.run_cycle(t.manager.id).await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Reviewed {
                task_id: parent.id,
                action: "rework".to_string()
            }
        );

        let child = h.fx.reload(&t.child).await;
        assert_eq!(child.status, TaskStatus::Ready);
        assert_eq!(child.description, "Add tests for login");
        assert_eq!(child.retry_count, 1);
        let worker = h.fx.hollons.get(child.assigned_hollon_id.unwrap()).await.unwrap().unwrap();
        assert!(worker.is_temporary());

        let parent = h.fx.reload(&parent).await;
        assert_eq!(parent.status, TaskStatus::InProgress);
        assert!(parent.reviewer_hollon_id.is_none());
    }

    #[tokio::test]
    async fn test_redirect_cancels_and_redecomposes() {
        let h = Harness::new().await;
        let t = tree(&h, TaskStatus::Completed).await;
        let mut parent = h.fx.reload(&t.parent).await;
        parent.status = TaskStatus::InReview;
        parent.reviewer_hollon_id = Some(t.manager.id);
        h.fx.tasks.update(&parent).await.unwrap();

        h.brain
            .push_response(MockResponse::success(format!(
                r#"{{"action": "redirect", "reasoning": "wrong approach", "cancelSubtaskIds": ["{}"], "newDirection": "Use OAuth instead"}}"#,
                t.child.id
            )))
            .await;
        h.brain
            .push_response(MockResponse::success(
                r#"{"subtasks": [{"title": "OAuth client", "description": "Integrate the provider", "type": "implementation",
                    "priority": "p2", "roleId": null, "affectedFiles": [], "dependencies": []}]}"#,
            ))
            .await;

        let outcome = h.orchestrator.run_cycle(t.manager.id).await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Reviewed {
                task_id: parent.id,
                action: "redirect".to_string()
            }
        );

        let parent = h.fx.reload(&parent).await;
        assert_eq!(parent.status, TaskStatus::InProgress);
        assert!(parent.description.ends_with("New direction: Use OAuth instead"));

        let children = h.fx.tasks.get_subtasks(parent.id).await.unwrap();
        assert_eq!(children.len(), 2);
        assert!(children
            .iter()
            .any(|c| c.id == t.child.id && c.status == TaskStatus::Cancelled));
        assert!(children
            .iter()
            .any(|c| c.title == "OAuth client" && c.status == TaskStatus::Ready));
    }

    #[tokio::test]
    async fn test_unparseable_review_waits() {
        let h = Harness::new().await;
        let t = tree(&h, TaskStatus::Completed).await;
        let mut parent = h.fx.reload(&t.parent).await;
        parent.status = TaskStatus::InReview;
        parent.reviewer_hollon_id = Some(t.manager.id);
        h.fx.tasks.update(&parent).await.unwrap();
        h.brain.push_response(MockResponse::success("Looks fine to me")).await;

        let outcome = h.orchestrator.run_cycle(t.manager.id).await.unwrap();
        assert_eq!(outcome, CycleOutcome::AwaitingReview { task_id: parent.id });
        assert_eq!(h.fx.reload(&parent).await.status, TaskStatus::InReview);
    }
}
