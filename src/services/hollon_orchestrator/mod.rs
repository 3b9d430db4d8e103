//! Hollon orchestrator: one execution cycle for one hollon.
//!
//! A cycle pulls at most one task and carries it as far as it can go in one
//! step. The work is split across:
//!
//! - **types**: cycle outcomes and the decision types decoded from Brain output
//! - **execution**: Brain invocation, quality gate, success and failure paths
//! - **decomposition**: splitting complex tasks into subtasks with temporary workers
//! - **review**: reviewer assignment, review mode and review verdicts

pub mod types;
mod decomposition;
mod execution;
mod review;

pub use types::{
    parse_decision, parse_decomposition, CycleOutcome, DecompositionPlan, ParentCompletionDecision,
    ReviewDecision, SubtaskSpec,
};

use chrono::Duration;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::sqlite::{
    SqliteApprovalRepository, SqliteConflictRepository, SqliteCostRepository, SqliteHollonRepository,
    SqliteNotifier, SqliteOrganizationRepository, SqliteRoleRepository, SqliteTaskRepository,
};
use crate::domain::errors::DomainResult;
use crate::domain::models::{Config, Hollon, HollonStatus, OrchestratorConfig, Task, TaskStatus};
use crate::domain::ports::{
    ApprovalRepository, Brain, CodeHost, ConflictRepository, CostRepository, HollonRepository, Notifier,
    OrganizationRepository, RoleRepository, TaskFilter, TaskRepository,
};
use crate::services::conflict_resolver::{ConflictContext, ConflictResolver};
use crate::services::escalation::EscalationService;
use crate::services::event_bus::EventBus;
use crate::services::hollon_registry::HollonRegistry;
use crate::services::quality_gate::QualityGate;
use crate::services::task_pool::{PullReason, TaskPool};

use decomposition::DecompositionOutcome;

/// Every collaborator the orchestrator talks to.
#[derive(Clone)]
pub struct OrchestratorPorts {
    /// Task store
    pub tasks: Arc<dyn TaskRepository>,
    /// Hollon store
    pub hollons: Arc<dyn HollonRepository>,
    /// Organizations and teams
    pub orgs: Arc<dyn OrganizationRepository>,
    /// Role store
    pub roles: Arc<dyn RoleRepository>,
    /// Conflict store
    pub conflicts: Arc<dyn ConflictRepository>,
    /// Human approval requests
    pub approvals: Arc<dyn ApprovalRepository>,
    /// Brain spend ledger
    pub costs: Arc<dyn CostRepository>,
    /// Message delivery to hollons and humans
    pub notifier: Arc<dyn Notifier>,
    /// Model backend
    pub brain: Arc<dyn Brain>,
    /// Pull request host
    pub code_host: Arc<dyn CodeHost>,
}

impl OrchestratorPorts {
    /// SQLite-backed repositories sharing one pool.
    pub fn sqlite(pool: SqlitePool, brain: Arc<dyn Brain>, code_host: Arc<dyn CodeHost>) -> Self {
        Self {
            tasks: Arc::new(SqliteTaskRepository::new(pool.clone())),
            hollons: Arc::new(SqliteHollonRepository::new(pool.clone())),
            orgs: Arc::new(SqliteOrganizationRepository::new(pool.clone())),
            roles: Arc::new(SqliteRoleRepository::new(pool.clone())),
            conflicts: Arc::new(SqliteConflictRepository::new(pool.clone())),
            approvals: Arc::new(SqliteApprovalRepository::new(pool.clone())),
            costs: Arc::new(SqliteCostRepository::new(pool.clone())),
            notifier: Arc::new(SqliteNotifier::new(pool)),
            brain,
            code_host,
        }
    }
}

/// Runs execution cycles. Safe to share across concurrent cycles for
/// different hollons; all cross-hollon coordination goes through the task
/// repository's conditional claim.
pub struct HollonOrchestrator {
    pub(super) ports: OrchestratorPorts,
    pub(super) config: OrchestratorConfig,
    pub(super) events: Arc<EventBus>,
    pub(super) task_pool: TaskPool,
    pub(super) registry: HollonRegistry,
    pub(super) quality_gate: QualityGate,
    pub(super) escalation: EscalationService,
    pub(super) conflict_resolver: ConflictResolver,
}

impl HollonOrchestrator {
    /// Wire the services from `ports` and the loaded config.
    pub fn new(ports: OrchestratorPorts, config: &Config, events: Arc<EventBus>) -> Self {
        let task_pool = TaskPool::new(
            ports.tasks.clone(),
            ports.hollons.clone(),
            ports.roles.clone(),
            events.clone(),
        );
        let registry = HollonRegistry::new(ports.hollons.clone(), events.clone(), config.spawn_limits.clone());
        let quality_gate = QualityGate::new(ports.orgs.clone(), ports.costs.clone(), ports.tasks.clone());
        let escalation = EscalationService::new(
            ports.tasks.clone(),
            ports.hollons.clone(),
            ports.orgs.clone(),
            ports.approvals.clone(),
            ports.notifier.clone(),
            events.clone(),
        )
        .with_max_self_retries(config.orchestrator.max_self_retries);
        let conflict_resolver = ConflictResolver::new(
            ports.tasks.clone(),
            ports.conflicts.clone(),
            ports.approvals.clone(),
            ports.notifier.clone(),
            events.clone(),
        )
        .with_deadline_window(Duration::hours(config.conflicts.deadline_window_hours));

        Self {
            ports,
            config: config.orchestrator.clone(),
            events,
            task_pool,
            registry,
            quality_gate,
            escalation,
            conflict_resolver,
        }
    }

    /// Shared task pool.
    pub fn task_pool(&self) -> &TaskPool {
        &self.task_pool
    }

    /// Hollon registry.
    pub fn registry(&self) -> &HollonRegistry {
        &self.registry
    }

    /// Event bus every service publishes to.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Orchestrator settings.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Collaborators this orchestrator was built with.
    pub fn ports(&self) -> &OrchestratorPorts {
        &self.ports
    }

    /// Run one execution cycle for `hollon_id`.
    ///
    /// Only an unknown hollon or a storage failure surfaces as an error;
    /// task-level failures are reported through `CycleOutcome::Failed`.
    pub async fn run_cycle(&self, hollon_id: Uuid) -> DomainResult<CycleOutcome> {
        let hollon = self.registry.require(hollon_id).await?;
        if hollon.status == HollonStatus::Paused {
            tracing::debug!(hollon_id = %hollon_id, "Hollon paused, skipping cycle");
            return Ok(CycleOutcome::Paused);
        }

        self.registry.update_status(hollon_id, HollonStatus::Working).await?;
        let outcome = self.cycle(&hollon).await;
        self.registry.release(hollon_id).await;

        match &outcome {
            Ok(outcome) => tracing::info!(
                hollon_id = %hollon_id,
                hollon = %hollon.name,
                outcome = outcome.label(),
                task_id = ?outcome.task_id(),
                "Cycle finished"
            ),
            Err(e) => tracing::error!(hollon_id = %hollon_id, error = %e, "Cycle aborted"),
        }
        outcome
    }

    async fn cycle(&self, hollon: &Hollon) -> DomainResult<CycleOutcome> {
        self.scan_ready_for_review(hollon).await?;

        let pulled = self.task_pool.pull_next(hollon.id).await?;
        let Some(task) = pulled.task else {
            return Ok(CycleOutcome::NoTask);
        };

        if pulled.reason == PullReason::InReview {
            return self.run_review_mode(hollon, task).await;
        }

        if let Some(outcome) = self.check_conflicts(hollon, &task).await? {
            return Ok(outcome);
        }

        if task.is_complex() && hollon.can_spawn() {
            match self.decompose(hollon, &task).await? {
                DecompositionOutcome::Delegated(subtask_count) => {
                    return Ok(CycleOutcome::Delegated {
                        task_id: task.id,
                        subtask_count,
                    });
                }
                DecompositionOutcome::Parked => return Ok(CycleOutcome::WaitingForWorker { task_id: task.id }),
                DecompositionOutcome::NotPossible(reason) => {
                    tracing::debug!(task_id = %task.id, reason = %reason, "Executing complex task directly");
                }
            }
        }

        let task = self.task_pool.load(task.id).await?;
        self.execute_task(hollon, task).await
    }

    /// Detect conflicts around a freshly claimed task. Returns `Blocked` when
    /// the resolution parked the task behind another one.
    async fn check_conflicts(&self, hollon: &Hollon, task: &Task) -> DomainResult<Option<CycleOutcome>> {
        let assigned = self
            .ports
            .tasks
            .list(TaskFilter {
                assigned_hollon_id: Some(hollon.id),
                ..Default::default()
            })
            .await?;
        let mut task_ids: Vec<Uuid> = assigned.iter().filter(|t| !t.is_terminal()).map(|t| t.id).collect();
        if !task_ids.contains(&task.id) {
            task_ids.push(task.id);
        }

        let ctx = ConflictContext::new(task.organization_id)
            .with_files(task.affected_files.clone())
            .with_tags(task.tags.clone())
            .with_task_ids(task_ids);
        let detection = self.conflict_resolver.detect_and_resolve(&ctx).await?;
        if !detection.has_conflicts {
            return Ok(None);
        }

        let current = self.task_pool.load(task.id).await?;
        if current.status != TaskStatus::Blocked {
            return Ok(None);
        }

        let conflict_ids = detection
            .conflicts
            .iter()
            .filter(|c| c.affected_task_ids.contains(&task.id))
            .map(|c| c.id)
            .collect();
        tracing::info!(
            task_id = %task.id,
            reason = current.blocked_reason.as_deref().unwrap_or("conflict"),
            "Claimed task blocked by conflict resolution"
        );
        Ok(Some(CycleOutcome::Blocked {
            task_id: task.id,
            conflict_ids,
        }))
    }
}

#[cfg(test)]
pub(crate) mod test_harness {
    use super::*;
    use crate::adapters::brain::MockBrain;
    use crate::adapters::code_host::InMemoryCodeHost;
    use crate::domain::models::SpawnLimitsConfig;
    use crate::services::test_support::Fixture;

    pub struct Harness {
        pub fx: Fixture,
        pub brain: Arc<MockBrain>,
        pub code_host: Arc<InMemoryCodeHost>,
        pub orchestrator: HollonOrchestrator,
    }

    impl Harness {
        pub async fn new() -> Self {
            Self::with_fixture(Fixture::new().await, SpawnLimitsConfig::default()).await
        }

        pub async fn with_fixture(fx: Fixture, spawn_limits: SpawnLimitsConfig) -> Self {
            let brain = Arc::new(MockBrain::new());
            let code_host = Arc::new(InMemoryCodeHost::new());
            let ports = OrchestratorPorts {
                tasks: fx.tasks.clone(),
                hollons: fx.hollons.clone(),
                orgs: fx.orgs.clone(),
                roles: fx.roles.clone(),
                conflicts: fx.conflicts.clone(),
                approvals: fx.approvals.clone(),
                costs: fx.costs.clone(),
                notifier: fx.notifier.clone(),
                brain: brain.clone(),
                code_host: code_host.clone(),
            };
            let config = Config {
                spawn_limits,
                ..Config::default()
            };
            let orchestrator = HollonOrchestrator::new(ports, &config, fx.events.clone());
            Self {
                fx,
                brain,
                code_host,
                orchestrator,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_harness::Harness;
    use super::*;
    use crate::adapters::brain::MockResponse;
    use crate::domain::models::{ConflictType, TaskType};

    #[tokio::test]
    async fn test_no_task_returns_idle() {
        let h = Harness::new().await;
        let hollon = h.fx.hollon("alice").await;

        let outcome = h.orchestrator.run_cycle(hollon.id).await.unwrap();
        assert_eq!(outcome, CycleOutcome::NoTask);
        let hollon = h.fx.hollons.get(hollon.id).await.unwrap().unwrap();
        assert_eq!(hollon.status, HollonStatus::Idle);
        assert_eq!(h.brain.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_paused_hollon_skips() {
        let h = Harness::new().await;
        let hollon = h.fx.hollon("alice").await;
        h.fx.save(h.fx.task("work")).await;
        h.fx.hollons.update_status(hollon.id, HollonStatus::Paused).await.unwrap();

        assert_eq!(h.orchestrator.run_cycle(hollon.id).await.unwrap(), CycleOutcome::Paused);
        assert_eq!(h.brain.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_hollon_is_error() {
        let h = Harness::new().await;
        assert!(h.orchestrator.run_cycle(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn test_simple_task_completes() {
        let h = Harness::new().await;
        let hollon = h.fx.hollon("alice").await;
        let task = h.fx.save(h.fx.task("Write notes").with_type(TaskType::Documentation)).await;
        h.brain
            .push_response(MockResponse::success("Notes written for the release.").with_cost(2.0))
            .await;

        let outcome = h.orchestrator.run_cycle(hollon.id).await.unwrap();
        assert_eq!(outcome, CycleOutcome::Completed { task_id: task.id });

        let task = h.fx.reload(&task).await;
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result.as_deref(), Some("Notes written for the release."));
        let spent = h.fx.costs.total_for_day(h.fx.org.id, chrono::Utc::now()).await.unwrap();
        assert!((spent - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_claimed_task_blocked_by_file_conflict() {
        let h = Harness::new().await;
        let alice = h.fx.hollon("alice").await;
        let bob = h.fx.hollon("bob").await;

        let files = vec!["src/auth.rs".to_string()];
        let mut first = h.fx.task("first").with_affected_files(files.clone());
        first.created_at -= Duration::minutes(5);
        let first = h.fx.save(first).await;
        h.fx.tasks.try_claim(first.id, bob.id).await.unwrap();
        let second = h.fx.save(h.fx.task("second").with_affected_files(files)).await;

        let outcome = h.orchestrator.run_cycle(alice.id).await.unwrap();
        let CycleOutcome::Blocked { task_id, conflict_ids } = outcome else {
            panic!("expected blocked, got {outcome:?}");
        };
        assert_eq!(task_id, second.id);
        assert_eq!(conflict_ids.len(), 1);

        let conflict = h.fx.conflicts.get(conflict_ids[0]).await.unwrap().unwrap();
        assert_eq!(conflict.conflict_type, ConflictType::File);
        let second = h.fx.reload(&second).await;
        assert_eq!(second.status, TaskStatus::Blocked);
        assert!(second.dependencies.contains(&first.id));
        assert_eq!(h.brain.call_count().await, 0);
    }
}
