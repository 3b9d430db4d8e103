//! Conflict, approval and cost persistence ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ApprovalRequest, ApprovalStatus, Conflict, ConflictStatus, CostRecord};

/// Persistence for detected resource conflicts.
#[async_trait]
pub trait ConflictRepository: Send + Sync {
    /// Insert a new conflict.
    async fn create(&self, conflict: &Conflict) -> DomainResult<()>;

    /// Load a conflict by id.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Conflict>>;

    /// Overwrite a conflict row.
    async fn update(&self, conflict: &Conflict) -> DomainResult<()>;

    /// Newest first; all statuses when `status` is `None`
    async fn list(&self, organization_id: Uuid, status: Option<ConflictStatus>) -> DomainResult<Vec<Conflict>>;
}

/// Persistence for human approval requests.
#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    /// Insert a new approval request.
    async fn create(&self, request: &ApprovalRequest) -> DomainResult<()>;

    /// Load an approval request by id.
    async fn get(&self, id: Uuid) -> DomainResult<Option<ApprovalRequest>>;

    /// Overwrite an approval request row.
    async fn update(&self, request: &ApprovalRequest) -> DomainResult<()>;

    /// Newest first, optionally narrowed by organization and status.
    async fn list(&self, organization_id: Option<Uuid>, status: Option<ApprovalStatus>) -> DomainResult<Vec<ApprovalRequest>>;

    /// Move every pending request with `expires_at <= now` to EXPIRED
    async fn expire_stale(&self, now: DateTime<Utc>) -> DomainResult<u64>;
}

/// Append-only Brain cost ledger.
#[async_trait]
pub trait CostRepository: Send + Sync {
    /// Append one cost record.
    async fn record(&self, record: &CostRecord) -> DomainResult<()>;

    /// Sum of cost in cents for the organization on the UTC day containing `day`
    async fn total_for_day(&self, organization_id: Uuid, day: DateTime<Utc>) -> DomainResult<f64>;
}
