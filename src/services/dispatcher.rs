//! Dispatch loop: runs one orchestrator cycle per active hollon per round.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::HollonStatus;
use crate::services::approval_service::ApprovalService;
use crate::services::hollon_orchestrator::{CycleOutcome, HollonOrchestrator};

/// Results of one dispatch round.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchRound {
    /// Completed cycles, by hollon id
    pub outcomes: Vec<(Uuid, CycleOutcome)>,
    /// Cycles that returned an error, by hollon id
    pub errors: Vec<(Uuid, String)>,
    /// Approval requests expired before the round started
    pub expired_approvals: u64,
}

impl DispatchRound {
    /// Number of cycles attempted.
    pub fn cycles(&self) -> usize {
        self.outcomes.len() + self.errors.len()
    }

    /// Cycles that did something other than find nothing to do.
    pub fn busy(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| !matches!(o, CycleOutcome::NoTask | CycleOutcome::Paused))
            .count()
    }
}

/// Runs orchestrator cycles for every hollon of an organization, with bounded concurrency.
pub struct HollonDispatcher {
    orchestrator: Arc<HollonOrchestrator>,
    approvals: ApprovalService,
    semaphore: Arc<Semaphore>,
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl HollonDispatcher {
    /// Concurrency and interval come from the orchestrator config.
    pub fn new(orchestrator: Arc<HollonOrchestrator>) -> Self {
        let config = orchestrator.config();
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_cycles.max(1)));
        let interval = Duration::from_millis(config.cycle_interval_ms);
        let approvals = ApprovalService::new(orchestrator.ports().approvals.clone());
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            orchestrator,
            approvals,
            semaphore,
            interval,
            shutdown_tx,
        }
    }

    /// Ask a running `run` loop to stop after the current round.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Sender that stops `run` when set to `true`.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// One cycle for every non-paused hollon of the organization, at most
    /// `max_concurrent_cycles` at a time. A failing cycle is recorded and
    /// does not affect the others.
    pub async fn run_round(&self, organization_id: Uuid) -> DomainResult<DispatchRound> {
        let mut round = DispatchRound {
            expired_approvals: self.approvals.expire_stale().await?,
            ..Default::default()
        };

        let hollons = self
            .orchestrator
            .ports()
            .hollons
            .list_by_organization(organization_id)
            .await?;

        let mut handles = Vec::new();
        for hollon in hollons.into_iter().filter(|h| h.status != HollonStatus::Paused) {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| DomainError::ValidationFailed("dispatcher semaphore closed".to_string()))?;
            let orchestrator = self.orchestrator.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                orchestrator.run_cycle(hollon.id).await
            });
            handles.push((hollon.id, handle));
        }

        let joined = join_all(handles.into_iter().map(|(hollon_id, handle)| async move { (hollon_id, handle.await) })).await;
        for (hollon_id, joined) in joined {
            match joined {
                Ok(Ok(outcome)) => round.outcomes.push((hollon_id, outcome)),
                Ok(Err(e)) => round.errors.push((hollon_id, e.to_string())),
                Err(e) => {
                    tracing::error!(hollon_id = %hollon_id, error = %e, "Cycle task panicked");
                    round.errors.push((hollon_id, e.to_string()));
                }
            }
        }

        tracing::debug!(
            organization_id = %organization_id,
            cycles = round.cycles(),
            busy = round.busy(),
            errors = round.errors.len(),
            "Dispatch round finished"
        );
        Ok(round)
    }

    /// Repeat rounds every `cycle_interval_ms` until `shutdown` is called,
    /// Ctrl-C is received or `max_rounds` have run. Returns the number of
    /// rounds run.
    pub async fn run(&self, organization_id: Uuid, max_rounds: Option<u64>) -> DomainResult<u64> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut rounds = 0u64;
        tracing::info!(organization_id = %organization_id, interval_ms = self.interval.as_millis() as u64, "Dispatcher started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            let round = self.run_round(organization_id).await?;
            rounds += 1;
            if !round.errors.is_empty() {
                tracing::warn!(round = rounds, errors = round.errors.len(), "Cycles failed this round");
            }
            if max_rounds.is_some_and(|max| rounds >= max) {
                break;
            }

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                _ = shutdown_rx.changed() => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupt received, stopping dispatcher");
                    break;
                }
            }
        }

        tracing::info!(rounds, "Dispatcher stopped");
        Ok(rounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::brain::MockResponse;
    use crate::domain::models::{TaskStatus, TaskType};
    use crate::services::hollon_orchestrator::test_harness::Harness;

    #[tokio::test]
    async fn test_round_skips_paused_hollons() {
        let h = Harness::new().await;
        let alice = h.fx.hollon("alice").await;
        let bob = h.fx.hollon("bob").await;
        h.fx.hollons.update_status(bob.id, HollonStatus::Paused).await.unwrap();
        let task = h.fx.save(h.fx.task("Write notes").with_type(TaskType::Documentation)).await;
        h.brain.push_response(MockResponse::success("Release notes drafted.")).await;

        let Harness { fx, orchestrator, .. } = h;
        let dispatcher = HollonDispatcher::new(Arc::new(orchestrator));
        let round = dispatcher.run_round(fx.org.id).await.unwrap();

        assert_eq!(round.cycles(), 1);
        assert_eq!(round.outcomes, vec![(alice.id, CycleOutcome::Completed { task_id: task.id })]);
        assert_eq!(fx.reload(&task).await.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_each_task_claimed_once() {
        let h = Harness::new().await;
        for name in ["a", "b", "c", "d", "e"] {
            h.fx.hollon(name).await;
        }
        let task = h.fx.save(h.fx.task("Only one").with_type(TaskType::Documentation)).await;
        h.brain.push_response(MockResponse::success("Done once.")).await;

        let Harness { fx, brain, orchestrator, .. } = h;
        let dispatcher = HollonDispatcher::new(Arc::new(orchestrator));
        let round = dispatcher.run_round(fx.org.id).await.unwrap();

        assert_eq!(round.cycles(), 5);
        assert_eq!(round.busy(), 1);
        assert_eq!(brain.call_count().await, 1);
        assert_eq!(fx.reload(&task).await.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = Harness::new().await;
        h.fx.hollon("alice").await;
        let Harness { fx, orchestrator, .. } = h;
        let dispatcher = HollonDispatcher::new(Arc::new(orchestrator));
        dispatcher.shutdown();

        let rounds = dispatcher.run(fx.org.id, None).await.unwrap();
        assert_eq!(rounds, 0);
    }

    #[tokio::test]
    async fn test_run_honours_round_limit() {
        let h = Harness::new().await;
        h.fx.hollon("alice").await;
        let Harness { fx, orchestrator, .. } = h;
        let dispatcher = HollonDispatcher::new(Arc::new(orchestrator));

        let rounds = dispatcher.run(fx.org.id, Some(1)).await.unwrap();
        assert_eq!(rounds, 1);
    }
}
