//! Common test utilities for integration tests
//!
//! Builds a file-backed database with a real multi-connection pool, so
//! concurrent cycles contend the way they do in production.

#![allow(dead_code)]

use std::sync::Arc;

use sqlx::SqlitePool;
use tempfile::TempDir;

use hollon::adapters::brain::MockBrain;
use hollon::adapters::code_host::InMemoryCodeHost;
use hollon::adapters::sqlite::{database_url, initialize_database, PoolConfig};
use hollon::domain::models::{Config, Hollon, Organization, Role, Task, TaskStatus, Team};
use hollon::services::{EventBus, HollonOrchestrator, OrchestratorPorts};

pub struct TestEnv {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub ports: OrchestratorPorts,
    pub brain: Arc<MockBrain>,
    pub code_host: Arc<InMemoryCodeHost>,
    pub events: Arc<EventBus>,
    pub config: Config,
    pub org: Organization,
    pub team: Team,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("hollon.db");
        let pool = initialize_database(
            &database_url(&path.display().to_string()),
            Some(PoolConfig {
                max_connections: 8,
                ..PoolConfig::default()
            }),
        )
        .await
        .expect("Failed to initialize database");

        let brain = Arc::new(MockBrain::new());
        let code_host = Arc::new(InMemoryCodeHost::new());
        let ports = OrchestratorPorts::sqlite(pool.clone(), brain.clone(), code_host.clone());

        let org = Organization::new("acme");
        ports.orgs.create_organization(&org).await.unwrap();
        let team = Team::new(org.id, "core");
        ports.orgs.create_team(&team).await.unwrap();

        Self {
            dir,
            pool,
            ports,
            brain,
            code_host,
            events: Arc::new(EventBus::default()),
            config,
            org,
            team,
        }
    }

    pub fn orchestrator(&self) -> Arc<HollonOrchestrator> {
        Arc::new(HollonOrchestrator::new(self.ports.clone(), &self.config, self.events.clone()))
    }

    pub async fn role(&self, name: &str, capabilities: &[&str], spawnable: bool) -> Role {
        let mut role = Role::new(self.org.id, name, capabilities.iter().map(ToString::to_string).collect());
        if spawnable {
            role = role.spawnable();
        }
        self.ports.roles.create(&role).await.unwrap();
        role
    }

    /// Permanent hollon in the environment's team.
    pub async fn hollon(&self, name: &str, role: &Role) -> Hollon {
        let hollon = Hollon::new(self.org.id, role.id, name).with_team(self.team.id);
        self.ports.hollons.create(&hollon).await.unwrap();
        hollon
    }

    pub async fn set_leader(&mut self, hollon: &Hollon) {
        self.team.leader_hollon_id = Some(hollon.id);
        self.ports.orgs.update_team(&self.team).await.unwrap();
    }

    /// READY task in the environment's team.
    pub fn task(&self, title: &str) -> Task {
        Task::new(self.org.id, title, format!("{title}, as described."))
            .with_team(self.team.id)
            .with_status(TaskStatus::Ready)
    }

    pub async fn save(&self, task: Task) -> Task {
        self.ports.tasks.create(&task).await.unwrap();
        task
    }

    pub async fn reload(&self, task: &Task) -> Task {
        self.ports.tasks.get(task.id).await.unwrap().unwrap()
    }
}
