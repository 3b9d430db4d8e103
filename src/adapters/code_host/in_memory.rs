//! In-process CodeHost. Holds pull requests in memory; merges are recorded,
//! never executed against a real repository.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{PullRequest, PullRequestReview, PullRequestStatus, ReviewVerdict};
use crate::domain::ports::CodeHost;

/// Misbehaviour applied to every subsequent call.
#[derive(Debug, Clone)]
pub enum CodeHostFault {
    /// Fail with this message
    Error(String),
    /// Stall for this long before answering
    Delay(Duration),
}

/// CodeHost used when no forge is configured, and in tests.
#[derive(Default)]
pub struct InMemoryCodeHost {
    pull_requests: Arc<RwLock<HashMap<String, PullRequest>>>,
    review_requests: Arc<RwLock<Vec<(String, Uuid)>>>,
    fault: Arc<RwLock<Option<CodeHostFault>>>,
}

impl InMemoryCodeHost {
    /// An empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pull request for a task and return its id.
    pub async fn open_pull_request(&self, task_id: Uuid, title: impl Into<String>) -> String {
        let mut prs = self.pull_requests.write().await;
        let id = format!("pr-{}", prs.len() + 1);
        let pr = PullRequest::new(id.clone(), task_id, title, format!("task/{task_id}"));
        prs.insert(id.clone(), pr);
        id
    }

    /// Set a PR's status, as the author or CI would.
    pub async fn set_status(&self, pr_id: &str, status: PullRequestStatus) -> DomainResult<()> {
        let mut prs = self.pull_requests.write().await;
        let pr = prs.get_mut(pr_id).ok_or_else(|| not_found(pr_id))?;
        pr.status = status;
        Ok(())
    }

    /// Submit a review now. A verdict also moves the PR status.
    pub async fn submit_review(
        &self,
        pr_id: &str,
        verdict: Option<ReviewVerdict>,
        body: impl Into<String>,
    ) -> DomainResult<()> {
        let mut prs = self.pull_requests.write().await;
        let pr = prs.get_mut(pr_id).ok_or_else(|| not_found(pr_id))?;
        if let Some(verdict) = verdict {
            pr.status = verdict.status();
        }
        pr.reviews.push(PullRequestReview {
            verdict,
            body: body.into(),
            submitted_at: Utc::now(),
        });
        Ok(())
    }

    /// Make every later call fail or stall; `None` restores normal service.
    pub async fn set_fault(&self, fault: Option<CodeHostFault>) {
        *self.fault.write().await = fault;
    }

    /// Snapshot of one pull request.
    pub async fn get(&self, pr_id: &str) -> Option<PullRequest> {
        self.pull_requests.read().await.get(pr_id).cloned()
    }

    /// Every review request received, in order.
    pub async fn review_requests(&self) -> Vec<(String, Uuid)> {
        self.review_requests.read().await.clone()
    }

    async fn check_fault(&self) -> DomainResult<()> {
        let fault = self.fault.read().await.clone();
        match fault {
            Some(CodeHostFault::Error(message)) => Err(DomainError::CodeHostError(message)),
            Some(CodeHostFault::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn not_found(pr_id: &str) -> DomainError {
    DomainError::CodeHostError(format!("pull request {pr_id} not found"))
}

#[async_trait]
impl CodeHost for InMemoryCodeHost {
    async fn find_pull_requests_by_task(&self, task_id: Uuid) -> DomainResult<Vec<PullRequest>> {
        self.check_fault().await?;
        let prs = self.pull_requests.read().await;
        let mut found: Vec<_> = prs.values().filter(|pr| pr.task_id == task_id).cloned().collect();
        found.sort_by_key(|pr| pr.created_at);
        Ok(found)
    }

    async fn request_review(&self, pr_id: &str, reviewer_hollon_id: Uuid) -> DomainResult<()> {
        self.check_fault().await?;
        {
            let mut prs = self.pull_requests.write().await;
            let pr = prs.get_mut(pr_id).ok_or_else(|| not_found(pr_id))?;
            pr.reviewer_hollon_id = Some(reviewer_hollon_id);
            // A new round starts without a decision
            if matches!(
                pr.status,
                PullRequestStatus::Draft | PullRequestStatus::Approved | PullRequestStatus::ChangesRequested
            ) {
                pr.status = PullRequestStatus::ReadyForReview;
            }
        }
        self.review_requests.write().await.push((pr_id.to_string(), reviewer_hollon_id));
        Ok(())
    }

    async fn merge(&self, pr_id: &str) -> DomainResult<()> {
        self.check_fault().await?;
        let mut prs = self.pull_requests.write().await;
        let pr = prs.get_mut(pr_id).ok_or_else(|| not_found(pr_id))?;
        if pr.status == PullRequestStatus::Closed {
            return Err(DomainError::CodeHostError(format!("pull request {pr_id} is closed")));
        }
        pr.status = PullRequestStatus::Merged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_review_and_merge() {
        let host = InMemoryCodeHost::new();
        let task_id = Uuid::new_v4();
        let pr_id = host.open_pull_request(task_id, "Add login").await;

        let reviewer = Uuid::new_v4();
        host.request_review(&pr_id, reviewer).await.unwrap();
        assert_eq!(host.review_requests().await, vec![(pr_id.clone(), reviewer)]);

        host.submit_review(&pr_id, Some(ReviewVerdict::Approved), "").await.unwrap();
        assert_eq!(host.get(&pr_id).await.unwrap().status, PullRequestStatus::Approved);
        host.merge(&pr_id).await.unwrap();

        let prs = host.find_pull_requests_by_task(task_id).await.unwrap();
        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].status, PullRequestStatus::Merged);
        assert_eq!(prs[0].reviews.len(), 1);
        assert!(host.merge("pr-404").await.is_err());
    }

    #[tokio::test]
    async fn test_new_review_request_clears_decision() {
        let host = InMemoryCodeHost::new();
        let pr_id = host.open_pull_request(Uuid::new_v4(), "Add login").await;
        host.submit_review(&pr_id, Some(ReviewVerdict::ChangesRequested), "hash the password")
            .await
            .unwrap();

        host.request_review(&pr_id, Uuid::new_v4()).await.unwrap();
        let pr = host.get(&pr_id).await.unwrap();
        assert_eq!(pr.status, PullRequestStatus::ReadyForReview);
        // History is kept; callers filter by the request time
        assert_eq!(pr.reviews.len(), 1);
    }

    #[tokio::test]
    async fn test_fault_applies_until_cleared() {
        let host = InMemoryCodeHost::new();
        let task_id = Uuid::new_v4();
        host.set_fault(Some(CodeHostFault::Error("gh: not logged in".to_string()))).await;
        assert!(matches!(
            host.find_pull_requests_by_task(task_id).await,
            Err(DomainError::CodeHostError(m)) if m == "gh: not logged in"
        ));

        host.set_fault(None).await;
        assert!(host.find_pull_requests_by_task(task_id).await.unwrap().is_empty());
    }
}
