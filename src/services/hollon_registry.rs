//! Hollon registry: lookup, status changes and temporary hollon lifecycle.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Hollon, HollonStatus, Role, SpawnLimitsConfig};
use crate::domain::ports::HollonRepository;
use crate::services::event_bus::{EventBus, EventPayload};

/// Hollon lookup plus the lifecycle of TEMPORARY hollons.
pub struct HollonRegistry {
    hollons: Arc<dyn HollonRepository>,
    events: Arc<EventBus>,
    limits: SpawnLimitsConfig,
}

impl HollonRegistry {
    /// Registry enforcing `limits` on temporary spawns.
    pub fn new(hollons: Arc<dyn HollonRepository>, events: Arc<EventBus>, limits: SpawnLimitsConfig) -> Self {
        Self { hollons, events, limits }
    }

    /// Load a hollon, if it exists.
    pub async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Hollon>> {
        self.hollons.get(id).await
    }

    /// Load a hollon, treating absence as caller misuse.
    pub async fn require(&self, id: Uuid) -> DomainResult<Hollon> {
        self.hollons.get(id).await?.ok_or(DomainError::HollonNotFound(id))
    }

    /// Overwrite the hollon status.
    pub async fn update_status(&self, id: Uuid, status: HollonStatus) -> DomainResult<()> {
        self.hollons.update_status(id, status).await
    }

    /// Spawn a TEMPORARY hollon under `parent`, bound to `role`.
    ///
    /// Fails with `SpawnLimitReached` when either the per-parent or the
    /// per-organization cap is already met. The limit check and the insert
    /// happen atomically, so concurrent spawns never overshoot a cap.
    pub async fn create_temporary(&self, parent: &Hollon, role: &Role, name: &str) -> DomainResult<Hollon> {
        let hollon = Hollon::temporary(parent, role.id, name);
        let created = self
            .hollons
            .create_temporary_within_limits(
                &hollon,
                self.limits.max_temporary_per_parent,
                self.limits.max_temporary_per_organization,
            )
            .await?;
        if !created {
            return Err(self.limit_error(parent).await?);
        }

        tracing::info!(
            hollon_id = %hollon.id,
            parent_hollon_id = %parent.id,
            role = %role.name,
            depth = hollon.depth,
            "Spawned temporary hollon"
        );
        self.events.emit_for(
            parent.id,
            EventPayload::HollonSpawned {
                hollon_id: hollon.id,
                parent_hollon_id: parent.id,
                role_id: role.id,
            },
        );
        Ok(hollon)
    }

    /// Which cap blocked a spawn, with the counts seen now.
    async fn limit_error(&self, parent: &Hollon) -> DomainResult<DomainError> {
        let children = self.hollons.count_temporary_children(parent.id).await?;
        if children >= self.limits.max_temporary_per_parent {
            return Ok(DomainError::SpawnLimitReached {
                limit: "max_temporary_per_parent".to_string(),
                current: children,
                max: self.limits.max_temporary_per_parent,
            });
        }
        let in_org = self.hollons.count_temporary_in_organization(parent.organization_id).await?;
        Ok(DomainError::SpawnLimitReached {
            limit: "max_temporary_per_organization".to_string(),
            current: in_org,
            max: self.limits.max_temporary_per_organization,
        })
    }

    /// Delete a temporary hollon. Errors are logged and swallowed; permanent
    /// hollons are never deleted through this path.
    pub async fn destroy_temporary(&self, id: Uuid) {
        match self.hollons.get(id).await {
            Ok(Some(hollon)) if hollon.is_temporary() => match self.hollons.delete(id).await {
                Ok(()) => {
                    tracing::debug!(hollon_id = %id, "Destroyed temporary hollon");
                    self.events.emit(EventPayload::HollonDestroyed { hollon_id: id });
                }
                Err(e) => tracing::warn!(hollon_id = %id, error = %e, "Failed to destroy temporary hollon"),
            },
            Ok(Some(_)) => tracing::debug!(hollon_id = %id, "Not destroying permanent hollon"),
            Ok(None) => {}
            Err(e) => tracing::warn!(hollon_id = %id, error = %e, "Failed to load hollon for cleanup"),
        }
    }

    /// Destroy each temporary hollon in `ids`; failures are logged.
    pub async fn destroy_all_temporary(&self, ids: &[Uuid]) {
        for id in ids {
            self.destroy_temporary(*id).await;
        }
    }

    /// Put a WORKING hollon back to IDLE at the end of a cycle. A pause that
    /// landed mid-cycle is kept; hollons destroyed during the cycle are skipped.
    pub async fn release(&self, id: Uuid) {
        let result = match self.hollons.get(id).await {
            Ok(Some(hollon)) if hollon.status == HollonStatus::Working => {
                self.hollons.update_status(id, HollonStatus::Idle).await
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) | Err(DomainError::HollonNotFound(_)) => {}
            Err(e) => tracing::warn!(hollon_id = %id, error = %e, "Failed to set hollon idle"),
        }
    }
}
