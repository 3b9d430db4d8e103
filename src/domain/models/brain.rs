//! Request/response types for the Brain port.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-call options for the reasoning engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrainOptions {
    /// Whether the engine may use filesystem/shell tools. Planning and review
    /// calls run without tools so they cannot mutate repository state.
    pub allow_tools: bool,
    pub model: Option<String>,
}

impl BrainOptions {
    pub fn with_tools() -> Self {
        Self {
            allow_tools: true,
            model: None,
        }
    }

    pub fn no_tools() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrainRequest {
    pub hollon_id: Uuid,
    pub task_id: Option<Uuid>,
    pub prompt: String,
    pub system_prompt: Option<String>,
    /// Composed context (task, dependency results, previous feedback)
    pub context: Option<String>,
    pub options: BrainOptions,
}

impl BrainRequest {
    pub fn new(hollon_id: Uuid, prompt: impl Into<String>) -> Self {
        Self {
            hollon_id,
            task_id: None,
            prompt: prompt.into(),
            system_prompt: None,
            context: None,
            options: BrainOptions::default(),
        }
    }

    pub fn for_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_options(mut self, options: BrainOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrainResponse {
    pub output: String,
    pub usage: TokenUsage,
    /// Cost of this call in cents
    pub cost_cents: f64,
}

impl BrainResponse {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            usage: TokenUsage::default(),
            cost_cents: 0.0,
        }
    }
}
