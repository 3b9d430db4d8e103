//! Human approval workflow: list, approve, reject, expire.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ApprovalRequest, ApprovalStatus};
use crate::domain::ports::ApprovalRepository;

/// Decides pending approval requests on behalf of a human.
pub struct ApprovalService {
    approvals: Arc<dyn ApprovalRepository>,
}

impl ApprovalService {
    /// Wrap an approval repository.
    pub fn new(approvals: Arc<dyn ApprovalRepository>) -> Self {
        Self { approvals }
    }

    /// Approval requests, newest first.
    pub async fn list(
        &self,
        organization_id: Option<Uuid>,
        status: Option<ApprovalStatus>,
    ) -> DomainResult<Vec<ApprovalRequest>> {
        self.approvals.list(organization_id, status).await
    }

    /// Load a request or fail with `ApprovalNotFound`.
    pub async fn get(&self, id: Uuid) -> DomainResult<ApprovalRequest> {
        self.approvals.get(id).await?.ok_or(DomainError::ApprovalNotFound(id))
    }

    /// Mark a pending request APPROVED.
    pub async fn approve(&self, id: Uuid, notes: Option<&str>) -> DomainResult<ApprovalRequest> {
        self.decide(id, ApprovalStatus::Approved, notes).await
    }

    /// Mark a pending request REJECTED.
    pub async fn reject(&self, id: Uuid, notes: Option<&str>) -> DomainResult<ApprovalRequest> {
        self.decide(id, ApprovalStatus::Rejected, notes).await
    }

    async fn decide(&self, id: Uuid, status: ApprovalStatus, notes: Option<&str>) -> DomainResult<ApprovalRequest> {
        let mut request = self.get(id).await?;
        let now = Utc::now();

        if request.is_expired_at(now) {
            request.status = ApprovalStatus::Expired;
            request.resolved_at = Some(now);
            self.approvals.update(&request).await?;
        }
        if request.status != ApprovalStatus::Pending {
            return Err(DomainError::InvalidStateTransition {
                from: request.status.as_str().to_string(),
                to: status.as_str().to_string(),
                reason: "approval request is no longer pending".to_string(),
            });
        }

        request.status = status;
        request.resolution_notes = notes.map(ToString::to_string);
        request.resolved_at = Some(now);
        self.approvals.update(&request).await?;

        tracing::info!(approval_id = %id, status = status.as_str(), "Approval request decided");
        Ok(request)
    }

    /// Expire every pending request past its deadline.
    pub async fn expire_stale(&self) -> DomainResult<u64> {
        let expired = self.approvals.expire_stale(Utc::now()).await?;
        if expired > 0 {
            tracing::info!(count = expired, "Expired stale approval requests");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ApprovalRequestType;
    use crate::services::test_support::Fixture;
    use chrono::Duration;

    #[tokio::test]
    async fn test_approve_once() {
        let fx = Fixture::new().await;
        let service = ApprovalService::new(fx.approvals.clone());
        let request = ApprovalRequest::new(fx.org.id, ApprovalRequestType::Escalation, "stuck", "reason");
        fx.approvals.create(&request).await.unwrap();

        let approved = service.approve(request.id, Some("go ahead")).await.unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);
        assert_eq!(approved.resolution_notes.as_deref(), Some("go ahead"));
        assert!(approved.resolved_at.is_some());

        assert!(matches!(
            service.reject(request.id, None).await,
            Err(DomainError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_expired_cannot_be_approved() {
        let fx = Fixture::new().await;
        let service = ApprovalService::new(fx.approvals.clone());
        let mut request = ApprovalRequest::new(fx.org.id, ApprovalRequestType::Escalation, "old", "reason");
        request.created_at = Utc::now() - Duration::hours(2);
        let request = request.expiring_in(Duration::hours(1));
        fx.approvals.create(&request).await.unwrap();
        let fresh = ApprovalRequest::new(fx.org.id, ApprovalRequestType::Escalation, "new", "reason")
            .expiring_in(Duration::hours(1));
        fx.approvals.create(&fresh).await.unwrap();

        assert!(service.approve(request.id, None).await.is_err());
        assert_eq!(service.get(request.id).await.unwrap().status, ApprovalStatus::Expired);
        assert_eq!(service.expire_stale().await.unwrap(), 0);

        let pending = service.list(Some(fx.org.id), Some(ApprovalStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, fresh.id);
    }
}
