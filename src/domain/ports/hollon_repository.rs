//! Hollon persistence port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Hollon, HollonStatus};

/// Worker registry port.
#[async_trait]
pub trait HollonRepository: Send + Sync {
    /// Insert a hollon without limit checks.
    async fn create(&self, hollon: &Hollon) -> DomainResult<()>;

    /// Load a hollon by id.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Hollon>>;

    /// Set the status of a hollon; `HollonNotFound` when absent.
    async fn update_status(&self, id: Uuid, status: HollonStatus) -> DomainResult<()>;

    /// Remove a hollon. Tasks it was assigned to lose their assignee.
    async fn delete(&self, id: Uuid) -> DomainResult<()>;

    /// All hollons of an organization, shallowest first.
    async fn list_by_organization(&self, organization_id: Uuid) -> DomainResult<Vec<Hollon>>;

    /// All hollons of a team, oldest first.
    async fn list_by_team(&self, team_id: Uuid) -> DomainResult<Vec<Hollon>>;

    /// Live temporary hollons spawned by `parent_id`.
    async fn count_temporary_children(&self, parent_id: Uuid) -> DomainResult<u32>;

    /// Live temporary hollons across an organization.
    async fn count_temporary_in_organization(&self, organization_id: Uuid) -> DomainResult<u32>;

    /// Insert a temporary hollon only while its parent has fewer than
    /// `max_per_parent` and its organization fewer than `max_per_organization`
    /// temporary hollons. The check and the insert are one atomic step.
    /// Returns `false` when a limit was met and nothing was inserted.
    async fn create_temporary_within_limits(
        &self,
        hollon: &Hollon,
        max_per_parent: u32,
        max_per_organization: u32,
    ) -> DomainResult<bool>;
}
