//! Layered configuration loading: defaults, project YAML, then `HOLLON_` env vars.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project-local configuration directory
pub const CONFIG_DIR: &str = ".hollon";

/// Validation failures for a loaded config.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Invalid {field}: must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("Brain binary path cannot be empty")]
    EmptyBrainBinary,

    #[error("Invalid code_host.provider: {0}. Must be one of: none, github")]
    InvalidCodeHostProvider(String),

    #[error("Invalid code_host.merge_method: {0}. Must be one of: squash, merge, rebase")]
    InvalidMergeMethod(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the current project.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.hollon/config.yaml`, written by `hollon init`
    /// 3. `.hollon/local.yaml`, optional developer overrides
    /// 4. `HOLLON_*` environment variables, `__` separating nested keys
    pub fn load() -> Result<Config> {
        Self::load_from_dir(CONFIG_DIR)
    }

    /// Same as [`ConfigLoader::load`] with the config directory at `dir`.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("HOLLON_").split("__"))
            .extract()
            .context("Failed to extract configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a single file, without environment overrides.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Reject zero limits and out-of-range values.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.trim().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let logging = &config.logging;
        if !["trace", "debug", "info", "warn", "error"].contains(&logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(logging.level.clone()));
        }
        if !["json", "pretty"].contains(&logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(logging.format.clone()));
        }
        if !["daily", "hourly", "never"].contains(&logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(logging.rotation.clone()));
        }

        let orchestrator = &config.orchestrator;
        let positive = [
            ("orchestrator.cycle_interval_ms", orchestrator.cycle_interval_ms > 0),
            ("orchestrator.brain_timeout_secs", orchestrator.brain_timeout_secs > 0),
            ("orchestrator.code_host_timeout_secs", orchestrator.code_host_timeout_secs > 0),
            ("orchestrator.max_concurrent_cycles", orchestrator.max_concurrent_cycles > 0),
            ("orchestrator.max_self_retries", orchestrator.max_self_retries > 0),
            ("spawn_limits.max_temporary_per_parent", config.spawn_limits.max_temporary_per_parent > 0),
            (
                "spawn_limits.max_temporary_per_organization",
                config.spawn_limits.max_temporary_per_organization > 0,
            ),
            ("conflicts.deadline_window_hours", config.conflicts.deadline_window_hours > 0),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, ok)| !ok) {
            return Err(ConfigError::NotPositive { field: *field });
        }

        if config.brain.binary_path.trim().is_empty() {
            return Err(ConfigError::EmptyBrainBinary);
        }
        if !["none", "github"].contains(&config.code_host.provider.as_str()) {
            return Err(ConfigError::InvalidCodeHostProvider(config.code_host.provider.clone()));
        }
        if !["squash", "merge", "rebase"].contains(&config.code_host.merge_method.as_str()) {
            return Err(ConfigError::InvalidMergeMethod(config.code_host.merge_method.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) {
        fs::write(dir.path().join(name), contents).unwrap();
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(ConfigLoader::validate(&config).is_ok());
        assert_eq!(config.orchestrator.max_self_retries, 3);
        assert_eq!(config.conflicts.deadline_window_hours, 24);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.database.path = "  ".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::EmptyDatabasePath)));

        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidLogLevel(_))));

        let mut config = Config::default();
        config.logging.rotation = "weekly".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidRotation(_))));

        let mut config = Config::default();
        config.orchestrator.brain_timeout_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::NotPositive {
                field: "orchestrator.brain_timeout_secs"
            })
        ));

        let mut config = Config::default();
        config.orchestrator.code_host_timeout_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::NotPositive {
                field: "orchestrator.code_host_timeout_secs"
            })
        ));
    }

    #[test]
    fn test_local_overrides_project_config() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "config.yaml",
            "logging:\n  level: info\n  format: json\norchestrator:\n  max_concurrent_cycles: 8\n",
        );
        write(&dir, "local.yaml", "logging:\n  level: debug\n");

        temp_env::with_vars_unset(["HOLLON_LOGGING__LEVEL", "HOLLON_ORCHESTRATOR__MAX_CONCURRENT_CYCLES"], || {
            let config = ConfigLoader::load_from_dir(dir.path()).unwrap();
            assert_eq!(config.logging.level, "debug");
            assert_eq!(config.logging.format, "json");
            assert_eq!(config.orchestrator.max_concurrent_cycles, 8);
            assert_eq!(config.orchestrator.max_self_retries, 3);
        });
    }

    #[test]
    fn test_env_overrides_files() {
        let dir = TempDir::new().unwrap();
        write(&dir, "config.yaml", "spawn_limits:\n  max_temporary_per_parent: 4\n");

        temp_env::with_vars(
            [
                ("HOLLON_SPAWN_LIMITS__MAX_TEMPORARY_PER_PARENT", Some("2")),
                ("HOLLON_DATABASE__PATH", Some("/tmp/other.db")),
            ],
            || {
                let config = ConfigLoader::load_from_dir(dir.path()).unwrap();
                assert_eq!(config.spawn_limits.max_temporary_per_parent, 2);
                assert_eq!(config.database.path, "/tmp/other.db");
            },
        );
    }

    #[test]
    fn test_invalid_file_value_fails_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "logging:\n  format: xml\n").unwrap();

        let err = ConfigLoader::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("xml"));
    }
}
