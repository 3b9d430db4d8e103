//! Scripted Brain for tests and dry runs.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{BrainRequest, BrainResponse, TokenUsage};
use crate::domain::ports::Brain;

/// Mock response configuration.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Output text
    pub output: String,
    /// Whether to simulate a process failure
    pub fail: bool,
    /// Error message if failing
    pub error_message: Option<String>,
    /// Artificial latency before answering
    pub delay: Option<Duration>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_cents: f64,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            output: "Mock task completed successfully.".to_string(),
            fail: false,
            error_message: None,
            delay: None,
            input_tokens: 100,
            output_tokens: 50,
            cost_cents: 0.0,
        }
    }
}

impl MockResponse {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            fail: true,
            error_message: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_cost(mut self, cents: f64) -> Self {
        self.cost_cents = cents;
        self
    }
}

/// Answers from, in order: a per-task queue, the shared FIFO script, then the default.
pub struct MockBrain {
    default_response: MockResponse,
    script: Arc<RwLock<VecDeque<MockResponse>>>,
    task_scripts: Arc<RwLock<HashMap<Uuid, VecDeque<MockResponse>>>>,
    requests: Arc<RwLock<Vec<BrainRequest>>>,
}

impl MockBrain {
    pub fn new() -> Self {
        Self::with_default_response(MockResponse::default())
    }

    pub fn with_default_response(response: MockResponse) -> Self {
        Self {
            default_response: response,
            script: Arc::new(RwLock::new(VecDeque::new())),
            task_scripts: Arc::new(RwLock::new(HashMap::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Queue a response for the next call that has no task-specific script.
    pub async fn push_response(&self, response: MockResponse) {
        self.script.write().await.push_back(response);
    }

    /// Queue a response for the next call about `task_id`.
    pub async fn push_response_for_task(&self, task_id: Uuid, response: MockResponse) {
        self.task_scripts.write().await.entry(task_id).or_default().push_back(response);
    }

    /// Every request received so far, oldest first.
    pub async fn requests(&self) -> Vec<BrainRequest> {
        self.requests.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.read().await.len()
    }

    async fn next_response(&self, task_id: Option<Uuid>) -> MockResponse {
        if let Some(task_id) = task_id {
            let mut scripts = self.task_scripts.write().await;
            if let Some(response) = scripts.get_mut(&task_id).and_then(VecDeque::pop_front) {
                return response;
            }
        }
        if let Some(response) = self.script.write().await.pop_front() {
            return response;
        }
        self.default_response.clone()
    }
}

impl Default for MockBrain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Brain for MockBrain {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn execute(&self, request: BrainRequest) -> DomainResult<BrainResponse> {
        let response = self.next_response(request.task_id).await;
        self.requests.write().await.push(request);

        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }

        if response.fail {
            return Err(DomainError::BrainFailed(
                response.error_message.unwrap_or_else(|| "Mock failure".to_string()),
            ));
        }

        Ok(BrainResponse {
            output: response.output,
            usage: TokenUsage {
                input_tokens: response.input_tokens,
                output_tokens: response.output_tokens,
            },
            cost_cents: response.cost_cents,
        })
    }
}
