//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/jobdeck/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/jobdeck/` (~/.config/jobdeck/)
//! - Data: `$XDG_DATA_HOME/jobdeck/` (~/.local/share/jobdeck/)
//! - State/Logs: `$XDG_STATE_HOME/jobdeck/` (~/.local/state/jobdeck/)
//!
//! Saved jobs live in the same file as `[[jobs]]` tables. The runner only
//! reads them; editing them is the job configuration UI's business.

use crate::error::{Error, Result};
use crate::types::{JobDefinition, TriggerPolicy};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Job server connection
    #[serde(default)]
    pub server: ServerConfig,

    /// Runner behavior
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Saved job definitions
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
}

/// Job server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Base URL of the dashboard server
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Path of the streaming run endpoint
    #[serde(default = "default_run_path")]
    pub run_path: String,

    /// TCP connect timeout in seconds.
    ///
    /// Only the connect phase is bounded; the run stream itself has no timeout.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            run_path: default_run_path(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl ServerConfig {
    /// Full URL of the run endpoint
    pub fn run_url(&self) -> String {
        let base = self.url.trim_end_matches('/');
        if self.run_path.starts_with('/') {
            format!("{}{}", base, self.run_path)
        } else {
            format!("{}/{}", base, self.run_path)
        }
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "server.url must be an http(s) URL, got {:?}",
                self.url
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(Error::Config(
                "server.connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_run_path() -> String {
    "/api/jobs/run".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

/// Runner configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RunnerConfig {
    /// How often the CLI redraws live progress, in milliseconds
    #[serde(default = "default_progress_refresh")]
    pub progress_refresh_ms: u64,

    /// `maxParallel` sent with ad-hoc runs when none is given
    #[serde(default = "default_max_parallel")]
    pub default_max_parallel: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            progress_refresh_ms: default_progress_refresh(),
            default_max_parallel: default_max_parallel(),
        }
    }
}

fn default_progress_refresh() -> u64 {
    120
}

fn default_max_parallel() -> u32 {
    2
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;

        Ok(config)
    }

    /// Validate the server section and every saved job
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        if self.runner.default_max_parallel == 0 {
            return Err(Error::Config(
                "runner.default_max_parallel must be a positive integer".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        for job in &self.jobs {
            job.validate()?;
            if !ids.insert(job.id.as_str()) {
                return Err(Error::Config(format!("duplicate job id: {}", job.id)));
            }
        }
        Ok(())
    }

    /// Look up a saved job by id
    pub fn job(&self, id: &str) -> Result<&JobDefinition> {
        self.jobs
            .iter()
            .find(|job| job.id == id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    /// Saved jobs that run when the user logs in, in file order
    pub fn on_login_jobs(&self) -> impl Iterator<Item = &JobDefinition> {
        self.jobs
            .iter()
            .filter(|job| job.trigger == TriggerPolicy::OnLogin)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/jobdeck/config.toml` (~/.config/jobdeck/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("jobdeck").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/jobdeck/` (~/.local/share/jobdeck/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("jobdeck")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/jobdeck/` (~/.local/state/jobdeck/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("jobdeck")
    }

    /// Returns the inbox database file path
    ///
    /// `$XDG_DATA_HOME/jobdeck/inbox.db` (~/.local/share/jobdeck/inbox.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("inbox.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/jobdeck/jobdeck.log`; daily files are suffixed with
    /// the date (`jobdeck.2025-01-31.log`).
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("jobdeck.log")
    }

    /// Set unset XDG variables to their defaults so every component resolves
    /// the same directories.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Backend, SkipIf, TriggerPolicy};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.url, "http://localhost:3000");
        assert_eq!(config.server.run_path, "/api/jobs/run");
        assert_eq!(config.runner.default_max_parallel, 2);
        assert_eq!(config.logging.level, "info");
        assert!(config.jobs.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_run_url_joins_slashes() {
        let mut server = ServerConfig {
            url: "https://dash.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(server.run_url(), "https://dash.example.com/api/jobs/run");

        server.run_path = "runs/stream".to_string();
        assert_eq!(server.run_url(), "https://dash.example.com/runs/stream");
    }

    #[test]
    fn test_parse_config_with_jobs() {
        let toml = r#"
[server]
url = "http://127.0.0.1:8080"

[logging]
level = "debug"

[[jobs]]
id = "deps"
name = "Update dependencies"
prompt = "Bump outdated dependencies"
projectPaths = ["/code/api", "/code/web"]
trigger = "on-login"
backend = "codex"
maxParallel = 2
preCheck = { command = "git status --porcelain", skipIf = "non-empty" }

[[jobs]]
id = "lint"
name = "Lint"
prompt = "Fix lint warnings"
projectPaths = ["/code/api"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.url, "http://127.0.0.1:8080");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.jobs.len(), 2);

        let deps = config.job("deps").unwrap();
        assert_eq!(deps.trigger, TriggerPolicy::OnLogin);
        assert_eq!(deps.backend, Backend::Codex);
        assert_eq!(deps.max_parallel, 2);
        assert_eq!(deps.pre_check.as_ref().unwrap().skip_if, SkipIf::NonEmpty);

        let lint = config.job("lint").unwrap();
        assert_eq!(lint.trigger, TriggerPolicy::Manual);
        assert_eq!(lint.max_parallel, 1);
        assert!(lint.pre_check.is_none());

        assert!(matches!(config.job("nope"), Err(Error::JobNotFound(_))));

        let on_login: Vec<&str> = config.on_login_jobs().map(|j| j.id.as_str()).collect();
        assert_eq!(on_login, vec!["deps"]);
    }

    #[test]
    fn test_duplicate_job_ids_rejected() {
        let toml = r#"
[[jobs]]
id = "deps"
name = "a"
prompt = "a"
projectPaths = ["/a"]

[[jobs]]
id = "deps"
name = "b"
prompt = "b"
projectPaths = ["/b"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_server_validation() {
        let server = ServerConfig {
            url: "localhost:3000".to_string(),
            ..Default::default()
        };
        assert!(server.validate().is_err());

        let server = ServerConfig {
            connect_timeout_secs: 0,
            ..Default::default()
        };
        assert!(server.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[runner]\ndefault_max_parallel = 4\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.runner.default_max_parallel, 4);
        assert_eq!(config.runner.progress_refresh_ms, 120);

        std::fs::write(&path, "[runner]\ndefault_max_parallel = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
