//! Shared fixture for service unit tests: a migrated in-memory database with
//! one organization and one team.

use std::sync::Arc;

use crate::adapters::sqlite::{
    create_migrated_test_pool, SqliteApprovalRepository, SqliteConflictRepository, SqliteCostRepository,
    SqliteHollonRepository, SqliteNotifier, SqliteOrganizationRepository, SqliteRoleRepository,
    SqliteTaskRepository,
};
use crate::domain::models::{Hollon, Organization, Role, Task, TaskStatus, Team};
use crate::domain::ports::{
    ApprovalRepository, ConflictRepository, CostRepository, HollonRepository, Notifier,
    OrganizationRepository, RoleRepository, TaskRepository,
};
use crate::services::event_bus::EventBus;

pub struct Fixture {
    pub tasks: Arc<dyn TaskRepository>,
    pub hollons: Arc<dyn HollonRepository>,
    pub orgs: Arc<dyn OrganizationRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub conflicts: Arc<dyn ConflictRepository>,
    pub approvals: Arc<dyn ApprovalRepository>,
    pub costs: Arc<dyn CostRepository>,
    pub notifier: Arc<dyn Notifier>,
    pub events: Arc<EventBus>,
    pub org: Organization,
    pub team: Team,
    pub default_role: Role,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_org(Organization::new("acme")).await
    }

    pub async fn with_org(org: Organization) -> Self {
        let pool = create_migrated_test_pool().await.unwrap();
        let orgs = Arc::new(SqliteOrganizationRepository::new(pool.clone()));
        let roles = Arc::new(SqliteRoleRepository::new(pool.clone()));

        orgs.create_organization(&org).await.unwrap();
        let team = Team::new(org.id, "core");
        orgs.create_team(&team).await.unwrap();
        let default_role = Role::new(org.id, "developer", vec!["rust".to_string()]);
        roles.create(&default_role).await.unwrap();

        Self {
            tasks: Arc::new(SqliteTaskRepository::new(pool.clone())),
            hollons: Arc::new(SqliteHollonRepository::new(pool.clone())),
            orgs,
            roles,
            conflicts: Arc::new(SqliteConflictRepository::new(pool.clone())),
            approvals: Arc::new(SqliteApprovalRepository::new(pool.clone())),
            costs: Arc::new(SqliteCostRepository::new(pool.clone())),
            notifier: Arc::new(SqliteNotifier::new(pool)),
            events: Arc::new(EventBus::default()),
            org,
            team,
            default_role,
        }
    }

    /// Permanent hollon in the fixture team with the default role.
    pub async fn hollon(&self, name: &str) -> Hollon {
        let hollon = Hollon::new(self.org.id, self.default_role.id, name).with_team(self.team.id);
        self.hollons.create(&hollon).await.unwrap();
        hollon
    }

    pub async fn hollon_with_role(&self, name: &str, role: &Role) -> Hollon {
        let hollon = Hollon::new(self.org.id, role.id, name).with_team(self.team.id);
        self.hollons.create(&hollon).await.unwrap();
        hollon
    }

    pub async fn spawnable_role(&self, name: &str, capabilities: &[&str]) -> Role {
        let role = Role::new(self.org.id, name, capabilities.iter().map(ToString::to_string).collect()).spawnable();
        self.roles.create(&role).await.unwrap();
        role
    }

    /// READY task in the fixture team.
    pub fn task(&self, title: &str) -> Task {
        Task::new(self.org.id, title, format!("{title} description"))
            .with_team(self.team.id)
            .with_status(TaskStatus::Ready)
    }

    pub async fn save(&self, task: Task) -> Task {
        self.tasks.create(&task).await.unwrap();
        task
    }

    pub async fn reload(&self, task: &Task) -> Task {
        self.tasks.get(task.id).await.unwrap().unwrap()
    }
}
