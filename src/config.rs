//! Configuration types and loading.
//!
//! YAML with a fallback chain: an explicit `--config` path, then `.soba.yml`
//! in the working directory, then `~/.config/soba/config.yml`, then
//! defaults. Keys are snake_case.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Kind, Result};
use crate::phase::Phase;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GithubConfig,
    pub workflow: WorkflowConfig,
    pub phase: PhaseConfig,
    pub git: GitConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load configuration with the fallback chain.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(".soba.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("soba").join("config.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("no config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| {
            Error::wrap_as(Kind::Validation, "failed to read config file", e)
                .context("path", path.as_ref().display())
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            Error::wrap_as(Kind::Validation, "failed to parse config file", e)
                .context("path", path.as_ref().display())
        })?;
        tracing::info!("loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Startup validation: refuse to run without a well-formed repository.
    pub fn validate(&self) -> Result<()> {
        crate::github::parse_repository(&self.github.repository)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// Repository slug, `owner/repo`. Required.
    pub repository: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Seconds between issue-watcher ticks.
    pub interval: u64,

    pub closed_issue_cleanup_enabled: bool,

    /// Seconds between cleanup-watcher ticks.
    pub closed_issue_cleanup_interval: u64,

    /// Seconds to sleep before injecting a command into a fresh pane.
    pub tmux_command_delay: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            interval: 20,
            closed_issue_cleanup_enabled: true,
            closed_issue_cleanup_interval: 300,
            tmux_command_delay: 0,
        }
    }
}

impl WorkflowConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(1))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.closed_issue_cleanup_interval.max(1))
    }

    pub fn command_delay(&self) -> Duration {
        Duration::from_secs(self.tmux_command_delay)
    }
}

/// Operator-supplied command for one phase. The parameter supports
/// `{{issue-number}}` (and the legacy `{issue_number}`) substitution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseCommand {
    pub command: String,
    pub options: Vec<String>,
    pub parameter: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    pub plan: Option<PhaseCommand>,
    pub implement: Option<PhaseCommand>,
    pub review: Option<PhaseCommand>,
    pub revise: Option<PhaseCommand>,
}

impl PhaseConfig {
    /// Command configured for a phase; label-only phases have none.
    pub fn get(&self, phase: Phase) -> Option<&PhaseCommand> {
        match phase {
            Phase::Plan => self.plan.as_ref(),
            Phase::Implement => self.implement.as_ref(),
            Phase::Review => self.review.as_ref(),
            Phase::Revise => self.revise.as_ref(),
            Phase::Queue | Phase::Merge => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Directory for per-issue worktrees.
    pub worktree_base_path: PathBuf,

    /// Branch new worktrees are based on.
    pub base_branch: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            worktree_base_path: PathBuf::from(".git/soba/worktrees"),
            base_branch: "main".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// trace, debug, info, warn, error.
    pub level: String,

    /// Daemon log file path; `${PID}` is substituted at daemon start.
    /// Defaults to `.soba/logs/soba-${PID}.log` under the working directory.
    pub output_path: Option<String>,

    /// How many log files to keep in the log directory.
    pub retention_count: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output_path: None,
            retention_count: 10,
        }
    }
}

impl LogConfig {
    /// Resolve the daemon log path for the given PID.
    pub fn resolved_output_path(&self, pid: u32) -> PathBuf {
        let raw = self
            .output_path
            .clone()
            .unwrap_or_else(|| ".soba/logs/soba-${PID}.log".to_string());
        PathBuf::from(raw.replace("${PID}", &pid.to_string()))
    }
}
