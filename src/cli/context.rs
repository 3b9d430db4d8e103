//! Wiring shared by CLI commands: configuration, database pool and ports.

use anyhow::{bail, Context, Result};
use chrono::Duration;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::brain::{ClaudeCodeBrain, ClaudeCodeConfig};
use crate::adapters::code_host::{GithubCliCodeHost, InMemoryCodeHost};
use crate::adapters::sqlite::{database_url, initialize_database, PoolConfig};
use crate::cli::id_resolver::{resolve, Entity};
use crate::domain::models::{Config, Organization};
use crate::domain::ports::{Brain, CodeHost};
use crate::infrastructure::config::ConfigLoader;
use crate::services::{
    ApprovalService, ConflictResolver, EscalationService, EventBus, HollonOrchestrator, OrchestratorPorts,
};

pub struct CliContext {
    pub config: Config,
    pub pool: SqlitePool,
    pub ports: OrchestratorPorts,
    pub events: Arc<EventBus>,
}

impl CliContext {
    /// Load configuration and open the project database.
    pub async fn open() -> Result<Self> {
        let config = ConfigLoader::load().context("Failed to load configuration")?;
        Self::with_config(config).await
    }

    pub async fn with_config(config: Config) -> Result<Self> {
        let pool = initialize_database(
            &database_url(&config.database.path),
            Some(PoolConfig {
                max_connections: config.database.max_connections,
                ..PoolConfig::default()
            }),
        )
        .await
        .context("Failed to initialize database. Run 'hollon init' first.")?;

        let brain: Arc<dyn Brain> = Arc::new(ClaudeCodeBrain::new(ClaudeCodeConfig::from(&config.brain)));
        let code_host: Arc<dyn CodeHost> = match config.code_host.provider.as_str() {
            "github" => Arc::new(GithubCliCodeHost::new(&config.code_host)),
            _ => Arc::new(InMemoryCodeHost::new()),
        };

        Ok(Self {
            ports: OrchestratorPorts::sqlite(pool.clone(), brain, code_host),
            events: Arc::new(EventBus::default()),
            config,
            pool,
        })
    }

    pub fn orchestrator(&self) -> Arc<HollonOrchestrator> {
        Arc::new(HollonOrchestrator::new(
            self.ports.clone(),
            &self.config,
            self.events.clone(),
        ))
    }

    pub fn conflict_resolver(&self) -> ConflictResolver {
        ConflictResolver::new(
            self.ports.tasks.clone(),
            self.ports.conflicts.clone(),
            self.ports.approvals.clone(),
            self.ports.notifier.clone(),
            self.events.clone(),
        )
        .with_deadline_window(Duration::hours(self.config.conflicts.deadline_window_hours))
    }

    pub fn escalation(&self) -> EscalationService {
        EscalationService::new(
            self.ports.tasks.clone(),
            self.ports.hollons.clone(),
            self.ports.orgs.clone(),
            self.ports.approvals.clone(),
            self.ports.notifier.clone(),
            self.events.clone(),
        )
        .with_max_self_retries(self.config.orchestrator.max_self_retries)
    }

    pub fn approvals(&self) -> ApprovalService {
        ApprovalService::new(self.ports.approvals.clone())
    }

    pub async fn resolve(&self, entity: Entity, input: &str) -> Result<Uuid> {
        resolve(&self.pool, entity, input).await
    }

    /// The organization named by `--org`, or the only one when omitted.
    pub async fn organization(&self, reference: Option<&str>) -> Result<Organization> {
        if let Some(reference) = reference {
            let id = self.resolve(Entity::Organization, reference).await?;
            return self
                .ports
                .orgs
                .get_organization(id)
                .await?
                .with_context(|| format!("Organization {id} not found"));
        }

        let mut orgs = self.ports.orgs.list_organizations().await?;
        match orgs.len() {
            0 => bail!("No organization exists. Run 'hollon init' or 'hollon org create' first."),
            1 => Ok(orgs.remove(0)),
            n => bail!("{n} organizations exist; choose one with --org"),
        }
    }
}
