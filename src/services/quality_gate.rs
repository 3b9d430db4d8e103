//! Quality gate: acceptance checks run on an execution's output before the
//! task may be marked done.
//!
//! Every gate is evaluated so the feedback handed to the next attempt lists
//! all problems at once. A result is retryable only if every failing gate is.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::{BrainResponse, Task, TaskStatus};
use crate::domain::ports::{CostRepository, OrganizationRepository, TaskRepository};

const CODE_KEYWORDS: &[&str] = &[
    "implement", "implements", "implementation", "implementing", "code", "coding", "fix", "fixes", "fixed", "fixing", "refactor",
    "refactoring", "function", "functions", "endpoint", "endpoints", "bug", "bugs", "api", "apis", "class",
    "classes", "module", "modules",
];

const ANALYSIS_KEYWORDS: &[&str] = &[
    "analyze", "analyse", "analysis", "analyses", "analyzing", "research", "investigate", "investigation",
    "report", "assess", "assessment", "evaluate", "evaluation", "compare", "comparison", "study",
];

/// Output format expected from a task, inferred from its wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Must contain a fenced code block
    Code,
    /// Must contain at least one markdown heading
    Analysis,
    /// Any non-empty output
    General,
}

impl TaskCategory {
    /// Classify by whole-word keyword matches in the title and description.
    pub fn classify(task: &Task) -> Self {
        let text = format!("{} {}", task.title, task.description).to_lowercase();
        let words: Vec<&str> = text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();
        let mentions = |keywords: &[&str]| words.iter().any(|w| keywords.contains(w));
        if mentions(CODE_KEYWORDS) {
            Self::Code
        } else if mentions(ANALYSIS_KEYWORDS) {
            Self::Analysis
        } else {
            Self::General
        }
    }
}

/// Individual checks run by [`QualityGate::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    NonEmpty,
    Format,
    Budget,
    Deadline,
    Dependencies,
}

/// One failed check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateFailure {
    /// Check that failed
    pub gate: Gate,
    /// Human-readable reason
    pub message: String,
    /// Whether another attempt could pass
    pub retryable: bool,
}

/// Verdict over all gates for one execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityGateResult {
    /// No gate failed
    pub passed: bool,
    /// Every failure is retryable
    pub can_retry: bool,
    /// Failure messages joined with "; ", fed into the next attempt's context
    pub reason: Option<String>,
    /// Every failed check, in gate order
    pub failures: Vec<GateFailure>,
}

impl QualityGateResult {
    fn from_failures(failures: Vec<GateFailure>) -> Self {
        if failures.is_empty() {
            return Self {
                passed: true,
                can_retry: false,
                reason: None,
                failures,
            };
        }
        let reason = failures.iter().map(|f| f.message.as_str()).collect::<Vec<_>>().join("; ");
        Self {
            passed: false,
            can_retry: failures.iter().all(|f| f.retryable),
            reason: Some(reason),
            failures,
        }
    }
}

/// Validates Brain output before a task may complete.
pub struct QualityGate {
    orgs: Arc<dyn OrganizationRepository>,
    costs: Arc<dyn CostRepository>,
    tasks: Arc<dyn TaskRepository>,
}

impl QualityGate {
    /// Build the service over its repositories.
    pub fn new(
        orgs: Arc<dyn OrganizationRepository>,
        costs: Arc<dyn CostRepository>,
        tasks: Arc<dyn TaskRepository>,
    ) -> Self {
        Self { orgs, costs, tasks }
    }

    /// Validate one execution. `response.cost_cents` is this execution's
    /// spend and must not be recorded yet.
    pub async fn validate(&self, task: &Task, response: &BrainResponse) -> DomainResult<QualityGateResult> {
        let mut failures = Vec::new();
        let output = response.output.trim();

        if output.is_empty() {
            failures.push(GateFailure {
                gate: Gate::NonEmpty,
                message: "Output is empty".to_string(),
                retryable: true,
            });
        } else if let Some(message) = check_format(TaskCategory::classify(task), output) {
            failures.push(GateFailure {
                gate: Gate::Format,
                message,
                retryable: true,
            });
        }

        if let Some(message) = self.check_budget(task, response.cost_cents).await? {
            failures.push(GateFailure {
                gate: Gate::Budget,
                message,
                retryable: false,
            });
        }

        if let Some(due) = task.due_date {
            if Utc::now() > due {
                failures.push(GateFailure {
                    gate: Gate::Deadline,
                    message: format!("Task was due at {}", due.to_rfc3339()),
                    retryable: false,
                });
            }
        }

        let mut unfinished = Vec::new();
        for dep_id in &task.dependencies {
            let done = self
                .tasks
                .get(*dep_id)
                .await?
                .is_some_and(|dep| dep.status == TaskStatus::Completed);
            if !done {
                unfinished.push(dep_id.to_string());
            }
        }
        if !unfinished.is_empty() {
            failures.push(GateFailure {
                gate: Gate::Dependencies,
                message: format!("Dependencies not completed: {}", unfinished.join(", ")),
                retryable: false,
            });
        }

        let result = QualityGateResult::from_failures(failures);
        if !result.passed {
            tracing::debug!(
                task_id = %task.id,
                can_retry = result.can_retry,
                reason = result.reason.as_deref().unwrap_or_default(),
                "Quality gate rejected output"
            );
        }
        Ok(result)
    }

    async fn check_budget(&self, task: &Task, cost_cents: f64) -> DomainResult<Option<String>> {
        let Some(org) = self.orgs.get_organization(task.organization_id).await? else {
            return Ok(None);
        };
        let Some(limit) = org.daily_cost_limit_cents else {
            return Ok(None);
        };

        let spent = self.costs.total_for_day(org.id, Utc::now()).await?;
        if spent + cost_cents > limit {
            return Ok(Some(format!(
                "Daily cost limit exceeded: {:.2} + {:.2} > {:.2} cents",
                spent, cost_cents, limit
            )));
        }
        Ok(None)
    }
}

fn check_format(category: TaskCategory, output: &str) -> Option<String> {
    match category {
        TaskCategory::Code if !output.contains("```") => {
            Some("Code task output must include a fenced code block".to_string())
        }
        TaskCategory::Analysis if !output.lines().any(|line| line.trim_start().starts_with('#')) => {
            Some("Analysis output must include at least one heading".to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CostRecord, Organization};
    use crate::services::test_support::Fixture;
    use uuid::Uuid;

    fn gate(fx: &Fixture) -> QualityGate {
        QualityGate::new(fx.orgs.clone(), fx.costs.clone(), fx.tasks.clone())
    }

    #[test]
    fn test_classify() {
        let org = Uuid::new_v4();
        assert_eq!(TaskCategory::classify(&Task::new(org, "Implement login", "")), TaskCategory::Code);
        assert_eq!(
            TaskCategory::classify(&Task::new(org, "Research caching", "compare options")),
            TaskCategory::Analysis
        );
        // Code wins when both match
        assert_eq!(
            TaskCategory::classify(&Task::new(org, "Analyze and fix the bug", "")),
            TaskCategory::Code
        );
        assert_eq!(TaskCategory::classify(&Task::new(org, "Write docs", "user guide")), TaskCategory::General);
    }

    #[test]
    fn test_classify_matches_whole_words() {
        let org = Uuid::new_v4();
        // Keywords embedded in longer words do not count
        for title in ["Rename the decoder", "List capital cities", "Strip the prefix", "Book a classroom"] {
            assert_eq!(TaskCategory::classify(&Task::new(org, title, "")), TaskCategory::General, "{title}");
        }
        assert_eq!(
            TaskCategory::classify(&Task::new(org, "Quarterly reporting", "")),
            TaskCategory::General
        );
        assert_eq!(
            TaskCategory::classify(&Task::new(org, "Login", "the /login API, returning 401")),
            TaskCategory::Code
        );
        assert_eq!(
            TaskCategory::classify(&Task::new(org, "Cost (analysis)", "")),
            TaskCategory::Analysis
        );
    }

    #[tokio::test]
    async fn test_empty_output_is_retryable() {
        let fx = Fixture::new().await;
        let task = fx.save(fx.task("Write docs")).await;

        let result = gate(&fx).validate(&task, &BrainResponse::text("   \n")).await.unwrap();
        assert!(!result.passed);
        assert!(result.can_retry);
        assert_eq!(result.reason.as_deref(), Some("Output is empty"));
    }

    #[tokio::test]
    async fn test_format_gates() {
        let fx = Fixture::new().await;
        let gate = gate(&fx);

        let code = fx.save(fx.task("Implement parser")).await;
        let result = gate.validate(&code, &BrainResponse::text("I wrote it")).await.unwrap();
        assert!(!result.passed && result.can_retry);
        assert_eq!(result.failures[0].gate, Gate::Format);

        let ok = gate.validate(&code, &BrainResponse::text("```rust\nfn main() {}\n```")).await.unwrap();
        assert!(ok.passed);

        let analysis = fx.save(fx.task("Research options")).await;
        assert!(!gate.validate(&analysis, &BrainResponse::text("plain text")).await.unwrap().passed);
        assert!(gate.validate(&analysis, &BrainResponse::text("## Findings\nok")).await.unwrap().passed);
    }

    #[tokio::test]
    async fn test_budget_overrun_not_retryable() {
        let fx = Fixture::with_org(Organization::new("tight").with_daily_cost_limit(100.0)).await;
        let task = fx.save(fx.task("Write docs")).await;
        fx.costs
            .record(&CostRecord::from_response(fx.org.id, Uuid::new_v4(), None, &{
                let mut r = BrainResponse::text("x");
                r.cost_cents = 90.0;
                r
            }))
            .await
            .unwrap();

        let mut response = BrainResponse::text("fine output");
        response.cost_cents = 20.0;
        let result = gate(&fx).validate(&task, &response).await.unwrap();
        assert!(!result.passed);
        assert!(!result.can_retry);
        assert_eq!(result.failures[0].gate, Gate::Budget);
    }

    #[tokio::test]
    async fn test_all_failures_reported() {
        let fx = Fixture::new().await;
        let dep = fx.save(fx.task("dep").with_status(TaskStatus::InProgress)).await;
        let task = fx
            .save(
                fx.task("Write docs")
                    .with_dependency(dep.id)
                    .with_due_date(Utc::now() - chrono::Duration::hours(1)),
            )
            .await;

        let result = gate(&fx).validate(&task, &BrainResponse::text("")).await.unwrap();
        assert!(!result.passed);
        assert!(!result.can_retry);
        let gates: Vec<_> = result.failures.iter().map(|f| f.gate).collect();
        assert_eq!(gates, vec![Gate::NonEmpty, Gate::Deadline, Gate::Dependencies]);
        assert_eq!(result.reason.unwrap().matches("; ").count(), 2);
    }
}
