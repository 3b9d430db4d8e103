//! Cycle outcomes and the decision types decoded from Brain output.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{EscalationResult, ReviewVerdict, TaskPriority, TaskType};
use crate::services::extract_json_from_response;

/// What one orchestrator cycle did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Paused,
    NoTask,
    Completed { task_id: Uuid },
    /// Output accepted; waiting for a reviewer to pick it up
    SentToReview { task_id: Uuid, reviewer_hollon_id: Uuid },
    Delegated { task_id: Uuid, subtask_count: usize },
    WaitingForWorker { task_id: Uuid },
    /// Claimed task lost a conflict and now waits behind another task
    Blocked { task_id: Uuid, conflict_ids: Vec<Uuid> },
    Failed {
        task_id: Uuid,
        reason: String,
        escalation: Option<EscalationResult>,
    },
    Reviewed { task_id: Uuid, action: String },
    VerdictApplied { task_id: Uuid, verdict: ReviewVerdict },
    /// Review could not conclude this cycle (no verdict yet, or no usable decision)
    AwaitingReview { task_id: Uuid },
}

impl CycleOutcome {
    /// Task the cycle worked on.
    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            Self::Paused | Self::NoTask => None,
            Self::Completed { task_id }
            | Self::SentToReview { task_id, .. }
            | Self::Delegated { task_id, .. }
            | Self::WaitingForWorker { task_id }
            | Self::Blocked { task_id, .. }
            | Self::Failed { task_id, .. }
            | Self::Reviewed { task_id, .. }
            | Self::VerdictApplied { task_id, .. }
            | Self::AwaitingReview { task_id } => Some(*task_id),
        }
    }

    /// Short description for CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Paused => "paused",
            Self::NoTask => "no task available",
            Self::Completed { .. } => "completed",
            Self::SentToReview { .. } => "sent to review",
            Self::Delegated { .. } => "delegated",
            Self::WaitingForWorker { .. } => "waiting for worker",
            Self::Blocked { .. } => "blocked",
            Self::Failed { .. } => "failed",
            Self::Reviewed { .. } => "reviewed",
            Self::VerdictApplied { .. } => "verdict applied",
            Self::AwaitingReview { .. } => "awaiting review",
        }
    }
}

/// One subtask in a decomposition plan or an `add_tasks` decision.
///
/// Every field must be present. Unknown type or priority names are
/// rejected rather than replaced with defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskSpec {
    /// Unique within the batch; dependencies refer to it
    pub title: String,
    /// Work to be done
    pub description: String,
    /// Task type name
    #[serde(rename = "type", deserialize_with = "task_type_name")]
    pub task_type: TaskType,
    /// Priority name (`p1`..`p4` or the long forms)
    #[serde(deserialize_with = "priority_name")]
    pub priority: TaskPriority,
    /// Role id or role name; `null` leaves the choice to the planner
    #[serde(alias = "role_id", deserialize_with = "Option::deserialize")]
    pub role_id: Option<String>,
    /// Files the subtask is expected to touch
    #[serde(alias = "affected_files")]
    pub affected_files: Vec<String>,
    /// Titles of earlier subtasks in the same batch
    pub dependencies: Vec<String>,
}

fn task_type_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TaskType, D::Error> {
    let name = String::deserialize(deserializer)?;
    TaskType::from_str(&name).ok_or_else(|| D::Error::custom(format!("unknown task type \"{name}\"")))
}

fn priority_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TaskPriority, D::Error> {
    let name = String::deserialize(deserializer)?;
    TaskPriority::from_str(&name).ok_or_else(|| D::Error::custom(format!("unknown priority \"{name}\"")))
}

/// A manager's split of a complex task.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecompositionPlan {
    /// Subtasks in creation order
    pub subtasks: Vec<SubtaskSpec>,
    /// Free-form explanation, logged only
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// A manager's verdict on a task whose subtasks are all done.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReviewDecision {
    Complete {
        reasoning: String,
    },
    Rework {
        reasoning: String,
        #[serde(rename = "subtaskIds", alias = "subtask_ids")]
        subtask_ids: Vec<Uuid>,
        #[serde(rename = "reworkInstructions", alias = "rework_instructions")]
        rework_instructions: String,
    },
    AddTasks {
        reasoning: String,
        #[serde(rename = "newSubtasks", alias = "new_subtasks")]
        new_subtasks: Vec<SubtaskSpec>,
    },
    Redirect {
        reasoning: String,
        #[serde(rename = "cancelSubtaskIds", alias = "cancel_subtask_ids", default)]
        cancel_subtask_ids: Vec<Uuid>,
        #[serde(rename = "newDirection", alias = "new_direction")]
        new_direction: String,
    },
}

impl ReviewDecision {
    /// Wire name of the action.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Complete { .. } => "complete",
            Self::Rework { .. } => "rework",
            Self::AddTasks { .. } => "add_tasks",
            Self::Redirect { .. } => "redirect",
        }
    }

    /// Explanation given with the decision.
    pub fn reasoning(&self) -> &str {
        match self {
            Self::Complete { reasoning }
            | Self::Rework { reasoning, .. }
            | Self::AddTasks { reasoning, .. }
            | Self::Redirect { reasoning, .. } => reasoning,
        }
    }
}

/// Whether a parent whose children are all done is itself done.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ParentCompletionDecision {
    Complete {
        reason: String,
    },
    AddTasks {
        reason: String,
        #[serde(rename = "newSubtasks", alias = "new_subtasks")]
        new_subtasks: Vec<SubtaskSpec>,
    },
}

/// Decode a decision from raw Brain output. Missing required fields fail.
pub fn parse_decision<T: DeserializeOwned>(output: &str) -> DomainResult<T> {
    let json = extract_json_from_response(output)
        .ok_or_else(|| DomainError::DecisionParse("no JSON object in response".to_string()))?;
    serde_json::from_str(json).map_err(|e| DomainError::DecisionParse(e.to_string()))
}

/// Decode a decomposition plan; an empty plan is an error.
pub fn parse_decomposition(output: &str) -> DomainResult<DecompositionPlan> {
    let plan: DecompositionPlan = parse_decision(output)?;
    if plan.subtasks.is_empty() {
        return Err(DomainError::DecisionParse("decomposition has no subtasks".to_string()));
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_decomposition() {
        let output = r#"Plan below.
```json
{
  "subtasks": [
    {"title": "Schema", "description": "Write schema", "type": "implementation", "priority": "P2_HIGH",
     "roleId": "backend", "affectedFiles": ["db.sql"], "dependencies": []},
    {"title": "API", "description": "Expose it", "type": "bugfix", "priority": "low",
     "roleId": null, "affectedFiles": [], "dependencies": ["Schema"]}
  ],
  "reasoning": "two steps"
}
```"#;
        let plan = parse_decomposition(output).unwrap();
        assert_eq!(plan.subtasks.len(), 2);
        assert_eq!(plan.subtasks[0].priority, TaskPriority::P2High);
        assert_eq!(plan.subtasks[0].affected_files, vec!["db.sql".to_string()]);
        assert_eq!(plan.subtasks[0].role_id.as_deref(), Some("backend"));
        assert_eq!(plan.subtasks[1].task_type, TaskType::Bugfix);
        assert_eq!(plan.subtasks[1].priority, TaskPriority::P4Low);
        assert_eq!(plan.subtasks[1].role_id, None);
        assert_eq!(plan.subtasks[1].dependencies, vec!["Schema".to_string()]);
    }

    const FULL_SUBTASK: &str = r#""title": "Schema", "description": "Write schema", "type": "implementation", "priority": "p3", "roleId": "backend", "affectedFiles": [], "dependencies": []"#;

    #[test]
    fn test_subtask_requires_every_field() {
        assert!(parse_decomposition(&format!(r#"{{"subtasks": [{{{FULL_SUBTASK}}}]}}"#)).is_ok());

        for field in ["\"type\"", "\"priority\"", "\"roleId\"", "\"affectedFiles\"", "\"dependencies\""] {
            let kept: Vec<&str> = FULL_SUBTASK
                .split(", ")
                .filter(|pair| !pair.trim_start().starts_with(field))
                .collect();
            let output = format!(r#"{{"subtasks": [{{{}}}]}}"#, kept.join(", "));
            let err = parse_decomposition(&output).unwrap_err();
            assert!(matches!(err, DomainError::DecisionParse(_)), "{field}: {err}");
            assert!(err.to_string().contains("missing field"), "{field}: {err}");
        }
    }

    #[test]
    fn test_subtask_rejects_unknown_names() {
        let unknown_type = FULL_SUBTASK.replace("\"implementation\"", "\"chore\"");
        let err = parse_decomposition(&format!(r#"{{"subtasks": [{{{unknown_type}}}]}}"#)).unwrap_err();
        assert!(matches!(&err, DomainError::DecisionParse(m) if m.contains("unknown task type \"chore\"")));

        let unknown_priority = FULL_SUBTASK.replace("\"p3\"", "\"urgent\"");
        let err = parse_decomposition(&format!(r#"{{"subtasks": [{{{unknown_priority}}}]}}"#)).unwrap_err();
        assert!(matches!(&err, DomainError::DecisionParse(m) if m.contains("unknown priority \"urgent\"")));

        // The same rules hold inside review decisions
        let add = format!(
            r#"{{"action": "add_tasks", "reasoning": "gap", "newSubtasks": [{{{}}}]}}"#,
            unknown_priority
        );
        assert!(matches!(parse_decision::<ReviewDecision>(&add), Err(DomainError::DecisionParse(_))));
        let partial = r#"{"action": "add_tasks", "reason": "gap", "newSubtasks": [{"title": "a", "description": "b"}]}"#;
        assert!(parse_decision::<ParentCompletionDecision>(partial).is_err());
    }

    #[test]
    fn test_decomposition_rejects_empty_or_missing() {
        assert!(parse_decomposition(r#"{"subtasks": []}"#).is_err());
        assert!(parse_decomposition(r#"{"reasoning": "none"}"#).is_err());
        assert!(parse_decomposition(r#"{"subtasks": [{"title": "no description"}]}"#).is_err());
        assert!(parse_decomposition("I could not decide").is_err());
    }

    #[test]
    fn test_review_decisions() {
        let id = Uuid::new_v4();
        let rework: ReviewDecision = parse_decision(&format!(
            r#"{{"action": "rework", "reasoning": "tests missing", "subtaskIds": ["{id}"], "reworkInstructions": "add tests"}}"#
        ))
        .unwrap();
        assert_eq!(
            rework,
            ReviewDecision::Rework {
                reasoning: "tests missing".to_string(),
                subtask_ids: vec![id],
                rework_instructions: "add tests".to_string(),
            }
        );

        let redirect: ReviewDecision =
            parse_decision(r#"{"action": "redirect", "reasoning": "wrong path", "newDirection": "use sqlite"}"#).unwrap();
        assert_eq!(redirect.action(), "redirect");

        // reasoning is required
        assert!(parse_decision::<ReviewDecision>(r#"{"action": "complete"}"#).is_err());
        assert!(parse_decision::<ReviewDecision>(r#"{"action": "merge", "reasoning": "x"}"#).is_err());
    }

    #[test]
    fn test_parent_completion_restricted() {
        let done: ParentCompletionDecision = parse_decision(r#"{"action": "complete", "reason": "all good"}"#).unwrap();
        assert!(matches!(done, ParentCompletionDecision::Complete { .. }));
        assert!(parse_decision::<ParentCompletionDecision>(r#"{"action": "redirect", "reason": "x"}"#).is_err());
        assert!(parse_decision::<ParentCompletionDecision>(r#"{"action": "add_tasks", "reason": "x"}"#).is_err());
    }
}
