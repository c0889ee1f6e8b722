//! Git worktree driver: one isolated working directory per issue.
//!
//! Worktrees live under `<base>/issue-<n>` on branch `soba/<n>`, created
//! from the configured base branch. Preparation is idempotent: an existing
//! worktree is a success.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("failed to create worktree: {0}")]
    CreateFailed(String),

    #[error("failed to remove worktree: {0}")]
    RemoveFailed(String),

    #[error("git command failed: {0}")]
    GitError(String),
}

impl From<WorktreeError> for crate::error::Error {
    fn from(err: WorktreeError) -> Self {
        crate::error::Error::wrap_as(crate::error::Kind::External, "worktree operation failed", err)
    }
}

#[derive(Debug, Clone)]
pub struct WorktreeConfig {
    /// Directory the per-issue worktrees are created under.
    pub base_dir: PathBuf,

    /// Path to the main repository checkout.
    pub repo_root: PathBuf,

    /// Branch new worktrees are based on.
    pub base_branch: String,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(".git/soba/worktrees"),
            repo_root: PathBuf::from("."),
            base_branch: "main".to_string(),
        }
    }
}

/// Operations the workflow executor needs from the worktree layer.
#[async_trait]
pub trait WorktreePort: Send + Sync {
    fn path_for(&self, issue: u64) -> PathBuf;

    async fn exists(&self, issue: u64) -> bool;

    /// Create the worktree for an issue if it does not exist yet, returning
    /// its path either way.
    async fn prepare(&self, issue: u64) -> Result<PathBuf, WorktreeError>;

    async fn remove(&self, issue: u64) -> Result<(), WorktreeError>;

    /// Best-effort fetch of the base branch from its remote.
    async fn update_base_branch(&self) -> Result<(), WorktreeError>;
}

pub struct WorktreeManager {
    config: WorktreeConfig,
}

impl WorktreeManager {
    pub fn new(config: WorktreeConfig) -> Self {
        Self { config }
    }

    fn branch_for(&self, issue: u64) -> String {
        format!("soba/{}", issue)
    }

    async fn git(&self, args: &[&str], cwd: &Path) -> Result<std::process::Output, WorktreeError> {
        debug!(?args, "git");
        Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .await
            .map_err(|e| WorktreeError::GitError(e.to_string()))
    }
}

#[async_trait]
impl WorktreePort for WorktreeManager {
    fn path_for(&self, issue: u64) -> PathBuf {
        self.config.base_dir.join(format!("issue-{}", issue))
    }

    async fn exists(&self, issue: u64) -> bool {
        self.path_for(issue).exists()
    }

    async fn prepare(&self, issue: u64) -> Result<PathBuf, WorktreeError> {
        let path = self.path_for(issue);
        if path.exists() {
            debug!(issue, path = %path.display(), "worktree already exists");
            return Ok(path);
        }

        self.update_base_branch().await?;

        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Err(WorktreeError::CreateFailed(format!(
                "failed to create {}: {}",
                parent.display(),
                e
            )));
        }

        let branch = self.branch_for(issue);
        let path_str = path.to_string_lossy().to_string();
        let output = self
            .git(
                &["worktree", "add", &path_str, "-b", &branch, &self.config.base_branch],
                &self.config.repo_root,
            )
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // The branch survives a removed worktree; reattach instead.
            if stderr.contains("already exists") {
                let retry = self
                    .git(&["worktree", "add", &path_str, &branch], &self.config.repo_root)
                    .await?;
                if !retry.status.success() {
                    return Err(WorktreeError::CreateFailed(
                        String::from_utf8_lossy(&retry.stderr).trim().to_string(),
                    ));
                }
            } else {
                return Err(WorktreeError::CreateFailed(stderr.trim().to_string()));
            }
        }

        info!(issue, path = %path.display(), %branch, "created worktree");
        Ok(path)
    }

    async fn remove(&self, issue: u64) -> Result<(), WorktreeError> {
        let path = self.path_for(issue);
        if !path.exists() {
            debug!(issue, "worktree does not exist, skipping removal");
            return Ok(());
        }

        let path_str = path.to_string_lossy().to_string();
        let output = self
            .git(&["worktree", "remove", &path_str, "--force"], &self.config.repo_root)
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.contains("is not a working tree") {
                return Err(WorktreeError::RemoveFailed(stderr.trim().to_string()));
            }
        }

        let branch = self.branch_for(issue);
        let _ = self.git(&["branch", "-D", &branch], &self.config.repo_root).await;

        info!(issue, "removed worktree");
        Ok(())
    }

    async fn update_base_branch(&self) -> Result<(), WorktreeError> {
        let output = self
            .git(&["fetch", "origin", &self.config.base_branch], &self.config.repo_root)
            .await?;
        if !output.status.success() {
            // No remote or offline: the local base branch still works.
            warn!(
                base = %self.config.base_branch,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "fetch of base branch failed, using local ref"
            );
        }
        Ok(())
    }
}
