//! Claude Code CLI brain.
//!
//! Runs `claude --print --output-format json` once per call and reads the
//! single JSON result object from stdout.

use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{BrainConfig, BrainRequest, BrainResponse, TokenUsage};
use crate::domain::ports::Brain;

const TOOLSET: &str = "Edit,Write,Bash,Glob,Grep,Read,MultiEdit";

/// Claude Code CLI brain configuration.
#[derive(Debug, Clone)]
pub struct ClaudeCodeConfig {
    /// Path to claude CLI binary
    pub binary_path: String,
    /// Default model, overridden per request
    pub default_model: Option<String>,
    /// Working directory for tool use
    pub working_dir: String,
    /// Additional CLI flags
    pub extra_flags: Vec<String>,
}

impl Default for ClaudeCodeConfig {
    fn default() -> Self {
        Self {
            binary_path: "claude".to_string(),
            default_model: None,
            working_dir: ".".to_string(),
            extra_flags: vec![],
        }
    }
}

impl From<&BrainConfig> for ClaudeCodeConfig {
    fn from(config: &BrainConfig) -> Self {
        Self {
            binary_path: config.binary_path.clone(),
            default_model: config.model.clone(),
            extra_flags: config.extra_flags.clone(),
            ..Default::default()
        }
    }
}

pub struct ClaudeCodeBrain {
    config: ClaudeCodeConfig,
}

/// Subset of the CLI's `--output-format json` result object.
#[derive(Debug, Deserialize)]
struct CliResult {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    total_cost_usd: Option<f64>,
    #[serde(default)]
    usage: Option<CliUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct CliUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
}

impl ClaudeCodeBrain {
    pub fn new(config: ClaudeCodeConfig) -> Self {
        Self { config }
    }

    /// Build CLI arguments for a request.
    fn build_args(&self, request: &BrainRequest) -> Vec<String> {
        let mut args = vec!["--print".to_string(), "--output-format".to_string(), "json".to_string()];

        if let Some(model) = request.options.model.as_ref().or(self.config.default_model.as_ref()) {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        if let Some(system_prompt) = request.system_prompt.as_ref().filter(|s| !s.is_empty()) {
            args.push("--system-prompt".to_string());
            args.push(system_prompt.clone());
        }

        // Without this flag the CLI runs with no tool permissions at all
        if request.options.allow_tools {
            args.push("--allowedTools".to_string());
            args.push(TOOLSET.to_string());
        }

        args.extend(self.config.extra_flags.iter().cloned());

        args.push("-p".to_string());
        args.push(Self::compose_prompt(request));
        args
    }

    fn compose_prompt(request: &BrainRequest) -> String {
        match request.context.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(context) => format!("{context}\n\n{}", request.prompt),
            None => request.prompt.clone(),
        }
    }

    fn parse_output(stdout: &str) -> DomainResult<BrainResponse> {
        let parsed: CliResult = serde_json::from_str(stdout.trim())
            .map_err(|e| DomainError::BrainFailed(format!("unreadable CLI output: {e}")))?;

        if parsed.is_error {
            return Err(DomainError::BrainFailed(
                parsed.result.unwrap_or_else(|| "CLI reported an error".to_string()),
            ));
        }

        let usage = parsed.usage.unwrap_or_default();
        Ok(BrainResponse {
            output: parsed.result.unwrap_or_default(),
            usage: TokenUsage {
                input_tokens: usage.input_tokens + usage.cache_read_input_tokens + usage.cache_creation_input_tokens,
                output_tokens: usage.output_tokens,
            },
            cost_cents: parsed.total_cost_usd.unwrap_or(0.0) * 100.0,
        })
    }
}

#[async_trait]
impl Brain for ClaudeCodeBrain {
    fn name(&self) -> &'static str {
        "claude_code"
    }

    async fn execute(&self, request: BrainRequest) -> DomainResult<BrainResponse> {
        let args = self.build_args(&request);

        let mut cmd = Command::new(&self.config.binary_path);
        cmd.args(&args)
            .current_dir(&self.config.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env("HOLLON_ID", request.hollon_id.to_string());
        if let Some(task_id) = request.task_id {
            cmd.env("HOLLON_TASK_ID", task_id.to_string());
        }

        tracing::debug!(
            hollon_id = %request.hollon_id,
            task_id = ?request.task_id,
            allow_tools = request.options.allow_tools,
            "Invoking claude CLI"
        );

        let output = cmd
            .output()
            .await
            .map_err(|e| DomainError::BrainFailed(format!("failed to spawn {}: {e}", self.config.binary_path)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DomainError::BrainFailed(format!(
                "claude exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Self::parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}
