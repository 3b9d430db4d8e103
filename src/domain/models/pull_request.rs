//! Pull request view exposed by the CodeHost port.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a pull request as reported by the code host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestStatus {
    /// Not yet ready for review
    Draft,
    /// Open and waiting for a verdict
    ReadyForReview,
    /// A reviewer asked for changes
    ChangesRequested,
    /// A reviewer approved
    Approved,
    /// Merged into the base branch
    Merged,
    /// Closed without merging
    Closed,
}

impl PullRequestStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::ReadyForReview => "ready_for_review",
            Self::ChangesRequested => "changes_requested",
            Self::Approved => "approved",
            Self::Merged => "merged",
            Self::Closed => "closed",
        }
    }

    /// Still awaiting merge or close.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Merged | Self::Closed)
    }
}

/// Outcome of a code review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    /// The change may be merged
    Approved,
    /// The implementer has to rework the change
    ChangesRequested,
}

impl ReviewVerdict {
    /// Wire name of the verdict.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::ChangesRequested => "changes_requested",
        }
    }

    /// Parse a verdict, accepting the GitHub spellings.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "approved" | "approve" => Some(Self::Approved),
            "changes_requested" | "request_changes" => Some(Self::ChangesRequested),
            _ => None,
        }
    }

    /// The pull request status a verdict leaves behind.
    pub fn status(&self) -> PullRequestStatus {
        match self {
            Self::Approved => PullRequestStatus::Approved,
            Self::ChangesRequested => PullRequestStatus::ChangesRequested,
        }
    }
}

/// One submitted review. Plain comments carry no verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestReview {
    /// Verdict, or `None` for a comment-only review
    pub verdict: Option<ReviewVerdict>,
    /// Review body
    pub body: String,
    /// When the review was submitted
    pub submitted_at: DateTime<Utc>,
}

/// A pull request linked to a task by its branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Code host identifier (the PR number on GitHub)
    pub id: String,
    /// Task the branch belongs to
    pub task_id: Uuid,
    /// PR title
    pub title: String,
    /// Head branch
    pub branch: String,
    /// Browser URL, when the host has one
    pub url: Option<String>,
    /// Current lifecycle state
    pub status: PullRequestStatus,
    /// Hollon the review was last requested from
    pub reviewer_hollon_id: Option<Uuid>,
    /// Submitted reviews, oldest first
    pub reviews: Vec<PullRequestReview>,
    /// When the PR was opened
    pub created_at: DateTime<Utc>,
}

impl PullRequest {
    /// A new PR ready for review with no reviews yet.
    pub fn new(id: impl Into<String>, task_id: Uuid, title: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_id,
            title: title.into(),
            branch: branch.into(),
            url: None,
            status: PullRequestStatus::ReadyForReview,
            reviewer_hollon_id: None,
            reviews: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Latest verdict submitted strictly after `since`, with the non-empty
    /// bodies of every review in that window. `None` for `since` counts all
    /// reviews.
    pub fn verdict_since(&self, since: Option<DateTime<Utc>>) -> Option<(ReviewVerdict, Vec<String>)> {
        let fresh: Vec<&PullRequestReview> = self
            .reviews
            .iter()
            .filter(|r| since.map_or(true, |s| r.submitted_at > s))
            .collect();
        let (_, verdict) = fresh
            .iter()
            .filter_map(|r| r.verdict.map(|v| (r.submitted_at, v)))
            .max_by_key(|(at, _)| *at)?;
        let comments = fresh
            .iter()
            .map(|r| r.body.trim())
            .filter(|b| !b.is_empty())
            .map(ToString::to_string)
            .collect();
        Some((verdict, comments))
    }
}
