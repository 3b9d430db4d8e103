//! Configuration schema, deserialized by the config loader.

use serde::{Deserialize, Serialize};

/// Main configuration structure for hollon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Execution cycle configuration
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Temporary hollon limits
    #[serde(default)]
    pub spawn_limits: SpawnLimitsConfig,

    /// Conflict detection configuration
    #[serde(default)]
    pub conflicts: ConflictConfig,

    /// Reasoning engine configuration
    #[serde(default)]
    pub brain: BrainConfig,

    /// Pull request host configuration
    #[serde(default)]
    pub code_host: CodeHostConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".hollon/hollon.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
            retention_days: default_retention_days(),
        }
    }
}

/// Execution cycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OrchestratorConfig {
    /// Delay between dispatch rounds in milliseconds
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,

    /// Timeout applied to every Brain call
    #[serde(default = "default_brain_timeout_secs")]
    pub brain_timeout_secs: u64,

    /// Timeout applied to every code host call
    #[serde(default = "default_code_host_timeout_secs")]
    pub code_host_timeout_secs: u64,

    /// Maximum hollon cycles running at once in one dispatch round
    #[serde(default = "default_max_concurrent_cycles")]
    pub max_concurrent_cycles: usize,

    /// Retry budget consumed by the SELF_RESOLVE escalation level
    #[serde(default = "default_max_self_retries")]
    pub max_self_retries: u32,
}

const fn default_cycle_interval_ms() -> u64 {
    5_000
}

const fn default_brain_timeout_secs() -> u64 {
    600
}

const fn default_code_host_timeout_secs() -> u64 {
    60
}

const fn default_max_concurrent_cycles() -> usize {
    4
}

const fn default_max_self_retries() -> u32 {
    3
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: default_cycle_interval_ms(),
            brain_timeout_secs: default_brain_timeout_secs(),
            code_host_timeout_secs: default_code_host_timeout_secs(),
            max_concurrent_cycles: default_max_concurrent_cycles(),
            max_self_retries: default_max_self_retries(),
        }
    }
}

/// Limits on temporary hollon creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SpawnLimitsConfig {
    /// Live temporary children one hollon may own
    #[serde(default = "default_max_temporary_per_parent")]
    pub max_temporary_per_parent: u32,

    /// Live temporary hollons across an organization
    #[serde(default = "default_max_temporary_per_organization")]
    pub max_temporary_per_organization: u32,
}

const fn default_max_temporary_per_parent() -> u32 {
    10
}

const fn default_max_temporary_per_organization() -> u32 {
    50
}

impl Default for SpawnLimitsConfig {
    fn default() -> Self {
        Self {
            max_temporary_per_parent: default_max_temporary_per_parent(),
            max_temporary_per_organization: default_max_temporary_per_organization(),
        }
    }
}

/// Conflict detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConflictConfig {
    /// Tasks due within this many hours count towards a deadline conflict
    #[serde(default = "default_deadline_window_hours")]
    pub deadline_window_hours: i64,
}

const fn default_deadline_window_hours() -> i64 {
    24
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            deadline_window_hours: default_deadline_window_hours(),
        }
    }
}

/// Reasoning engine (Claude CLI) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BrainConfig {
    /// Path to the claude binary
    #[serde(default = "default_binary_path")]
    pub binary_path: String,

    /// Model override passed with --model
    #[serde(default)]
    pub model: Option<String>,

    /// Extra CLI flags appended to every invocation
    #[serde(default)]
    pub extra_flags: Vec<String>,
}

fn default_binary_path() -> String {
    "claude".to_string()
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
            model: None,
            extra_flags: Vec::new(),
        }
    }
}

/// Pull request host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CodeHostConfig {
    /// `none` keeps pull requests in memory; `github` shells out to `gh`
    #[serde(default = "default_code_host_provider")]
    pub provider: String,

    /// Path to the gh binary
    #[serde(default = "default_gh_binary")]
    pub binary_path: String,

    /// Merge strategy passed to `gh pr merge`: squash, merge or rebase
    #[serde(default = "default_merge_method")]
    pub merge_method: String,
}

fn default_code_host_provider() -> String {
    "none".to_string()
}

fn default_gh_binary() -> String {
    "gh".to_string()
}

fn default_merge_method() -> String {
    "squash".to_string()
}

impl Default for CodeHostConfig {
    fn default() -> Self {
        Self {
            provider: default_code_host_provider(),
            binary_path: default_gh_binary(),
            merge_method: default_merge_method(),
        }
    }
}
