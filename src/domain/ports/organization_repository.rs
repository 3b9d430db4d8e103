//! Organization, team and role persistence ports.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Organization, Role, Team};

/// Organizations and teams.
#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    /// Insert an organization.
    async fn create_organization(&self, organization: &Organization) -> DomainResult<()>;

    /// Load an organization by id.
    async fn get_organization(&self, id: Uuid) -> DomainResult<Option<Organization>>;

    /// Every organization, oldest first.
    async fn list_organizations(&self) -> DomainResult<Vec<Organization>>;

    /// Insert a team.
    async fn create_team(&self, team: &Team) -> DomainResult<()>;

    /// Overwrite a team row.
    async fn update_team(&self, team: &Team) -> DomainResult<()>;

    /// Load a team by id.
    async fn get_team(&self, id: Uuid) -> DomainResult<Option<Team>>;

    /// Teams of an organization.
    async fn list_teams(&self, organization_id: Uuid) -> DomainResult<Vec<Team>>;
}

/// Roles hollons are bound to.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Insert a role.
    async fn create(&self, role: &Role) -> DomainResult<()>;

    /// Load a role by id.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Role>>;

    /// Every role of an organization.
    async fn list_by_organization(&self, organization_id: Uuid) -> DomainResult<Vec<Role>>;

    /// Roles with `available_for_spawn` set, oldest first
    async fn list_spawnable(&self, organization_id: Uuid) -> DomainResult<Vec<Role>>;
}
