//! Code hosting port: pull requests, review requests and merges.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::PullRequest;

/// Branch/PR collaborator.
#[async_trait]
pub trait CodeHost: Send + Sync {
    /// Pull requests whose branch belongs to `task_id`, oldest first.
    async fn find_pull_requests_by_task(&self, task_id: Uuid) -> DomainResult<Vec<PullRequest>>;

    /// Ask `reviewer_hollon_id` to review `pr_id`. Starts a new review round;
    /// verdicts submitted before it no longer count.
    async fn request_review(&self, pr_id: &str, reviewer_hollon_id: Uuid) -> DomainResult<()>;

    /// Merge `pr_id` into its base branch.
    async fn merge(&self, pr_id: &str) -> DomainResult<()>;
}
