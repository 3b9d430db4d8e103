//! GitHub CodeHost backed by the `gh` CLI.
//!
//! Pull requests are matched to tasks by head branch `task/<task id>`.
//! Hollons are not GitHub users, so a review request is recorded as a PR
//! comment. Verdicts come from the submitted reviews, so a decision from an
//! earlier round can be told apart from a fresh one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CodeHostConfig, PullRequest, PullRequestReview, PullRequestStatus, ReviewVerdict};
use crate::domain::ports::CodeHost;

const PR_FIELDS: &str = "number,title,headRefName,url,state,isDraft,reviewDecision,reviews,createdAt";

/// CodeHost that shells out to `gh` in a working copy.
pub struct GithubCliCodeHost {
    binary_path: String,
    merge_method: String,
    working_dir: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhPullRequest {
    number: u64,
    title: String,
    head_ref_name: String,
    #[serde(default)]
    url: Option<String>,
    state: String,
    #[serde(default)]
    is_draft: bool,
    #[serde(default)]
    review_decision: Option<String>,
    #[serde(default)]
    reviews: Vec<GhReview>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhReview {
    #[serde(default)]
    body: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    submitted_at: Option<DateTime<Utc>>,
}

impl GhReview {
    /// Pending reviews have no submission time and are skipped.
    fn into_review(self) -> Option<PullRequestReview> {
        let verdict = match self.state.as_str() {
            "APPROVED" => Some(ReviewVerdict::Approved),
            "CHANGES_REQUESTED" => Some(ReviewVerdict::ChangesRequested),
            _ => None,
        };
        Some(PullRequestReview {
            verdict,
            body: self.body.trim().to_string(),
            submitted_at: self.submitted_at?,
        })
    }
}

impl GithubCliCodeHost {
    /// Build from the `code_host` config section.
    pub fn new(config: &CodeHostConfig) -> Self {
        Self {
            binary_path: config.binary_path.clone(),
            merge_method: config.merge_method.clone(),
            working_dir: ".".to_string(),
        }
    }

    /// Run `gh` in `dir` instead of the current directory.
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Head branch naming convention for a task.
    pub fn branch_for(task_id: Uuid) -> String {
        format!("task/{task_id}")
    }

    async fn gh(&self, args: &[&str]) -> DomainResult<String> {
        tracing::debug!(args = ?args, "Invoking gh CLI");
        let output = Command::new(&self.binary_path)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DomainError::CodeHostError(format!("failed to spawn {}: {e}", self.binary_path)))?;

        if !output.status.success() {
            return Err(DomainError::CodeHostError(format!(
                "gh {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn parse_list(stdout: &str, task_id: Uuid) -> DomainResult<Vec<PullRequest>> {
        let prs: Vec<GhPullRequest> = serde_json::from_str(stdout.trim())
            .map_err(|e| DomainError::CodeHostError(format!("unreadable gh output: {e}")))?;
        let mut found: Vec<PullRequest> = prs.into_iter().map(|pr| pr.into_pull_request(task_id)).collect();
        found.sort_by_key(|pr| pr.created_at);
        Ok(found)
    }
}

impl GhPullRequest {
    fn status(&self) -> PullRequestStatus {
        match self.state.as_str() {
            "MERGED" => PullRequestStatus::Merged,
            "CLOSED" => PullRequestStatus::Closed,
            _ if self.is_draft => PullRequestStatus::Draft,
            _ => match self.review_decision.as_deref() {
                Some("APPROVED") => PullRequestStatus::Approved,
                Some("CHANGES_REQUESTED") => PullRequestStatus::ChangesRequested,
                _ => PullRequestStatus::ReadyForReview,
            },
        }
    }

    fn into_pull_request(self, task_id: Uuid) -> PullRequest {
        let status = self.status();
        let mut pr = PullRequest::new(self.number.to_string(), task_id, self.title, self.head_ref_name);
        pr.url = self.url;
        pr.status = status;
        pr.created_at = self.created_at;
        pr.reviews = self.reviews.into_iter().filter_map(GhReview::into_review).collect();
        pr.reviews.sort_by_key(|r| r.submitted_at);
        pr
    }
}

#[async_trait]
impl CodeHost for GithubCliCodeHost {
    async fn find_pull_requests_by_task(&self, task_id: Uuid) -> DomainResult<Vec<PullRequest>> {
        let branch = Self::branch_for(task_id);
        let stdout = self
            .gh(&["pr", "list", "--head", &branch, "--state", "all", "--json", PR_FIELDS])
            .await?;
        Self::parse_list(&stdout, task_id)
    }

    async fn request_review(&self, pr_id: &str, reviewer_hollon_id: Uuid) -> DomainResult<()> {
        if let Err(e) = self.gh(&["pr", "ready", pr_id]).await {
            tracing::debug!(pr = pr_id, error = %e, "Pull request not marked ready");
        }
        let body = format!("Review assigned to hollon {reviewer_hollon_id}");
        self.gh(&["pr", "comment", pr_id, "--body", &body]).await?;
        Ok(())
    }

    async fn merge(&self, pr_id: &str) -> DomainResult<()> {
        let method = format!("--{}", self.merge_method);
        self.gh(&["pr", "merge", pr_id, &method]).await?;
        tracing::info!(pr = pr_id, "Pull request merged through gh");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_maps_states() {
        let task_id = Uuid::new_v4();
        let json = r#"[
          {"number": 7, "title": "Login", "headRefName": "task/x", "url": "https://example.test/7",
           "state": "OPEN", "isDraft": false, "reviewDecision": "CHANGES_REQUESTED",
           "reviews": [
             {"body": "looks fine", "state": "COMMENTED", "submittedAt": "2026-01-02T12:00:00Z"},
             {"body": "hash the password", "state": "CHANGES_REQUESTED", "submittedAt": "2026-01-02T11:00:00Z"},
             {"body": "draft note", "state": "PENDING"}
           ],
           "createdAt": "2026-01-02T10:00:00Z"},
          {"number": 3, "title": "Old", "headRefName": "task/x", "state": "MERGED",
           "createdAt": "2026-01-01T10:00:00Z"},
          {"number": 9, "title": "Draft", "headRefName": "task/x", "state": "OPEN", "isDraft": true,
           "reviewDecision": "APPROVED", "createdAt": "2026-01-03T10:00:00Z"}
        ]"#;

        let prs = GithubCliCodeHost::parse_list(json, task_id).unwrap();
        assert_eq!(prs.len(), 3);
        assert_eq!(prs[0].id, "3");
        assert_eq!(prs[0].status, PullRequestStatus::Merged);
        assert_eq!(prs[1].status, PullRequestStatus::ChangesRequested);
        assert_eq!(prs[1].reviews.len(), 2);
        assert_eq!(prs[1].reviews[0].verdict, Some(ReviewVerdict::ChangesRequested));
        assert_eq!(prs[1].reviews[1].verdict, None);
        let requested: DateTime<Utc> = "2026-01-02T11:30:00Z".parse().unwrap();
        assert_eq!(prs[1].verdict_since(Some(requested)), None);
        let (verdict, comments) = prs[1].verdict_since(None).unwrap();
        assert_eq!(verdict, ReviewVerdict::ChangesRequested);
        assert_eq!(comments, vec!["hash the password".to_string(), "looks fine".to_string()]);
        assert_eq!(prs[1].url.as_deref(), Some("https://example.test/7"));
        assert_eq!(prs[2].status, PullRequestStatus::Draft);
        assert!(prs.iter().all(|pr| pr.task_id == task_id));
    }

    #[test]
    fn test_unreadable_output() {
        assert!(matches!(
            GithubCliCodeHost::parse_list("gh: not logged in", Uuid::new_v4()),
            Err(DomainError::CodeHostError(_))
        ));
    }
}
