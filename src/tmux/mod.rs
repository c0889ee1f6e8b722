//! tmux driver: sessions, windows, panes, and command injection.
//!
//! One session per repository hosts one window per issue; operator commands
//! are injected into panes with `send-keys`. The session persists across
//! daemon restarts, which is what lets workers keep running while the
//! scheduler is down.

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Derive the canonical session name from an `owner/repo` slug.
///
/// A malformed or empty repository degrades to the literal `soba`. tmux
/// treats `.` and `:` specially in target names, so both are sanitized.
pub fn session_name(repository: &str) -> String {
    match repository.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            format!("soba-{}-{}", sanitize(owner), sanitize(repo))
        }
        _ => "soba".to_string(),
    }
}

/// Window name for an issue.
pub fn window_name(issue: u64) -> String {
    format!("issue-{}", issue)
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

#[derive(Debug, Error)]
pub enum TmuxError {
    #[error("tmux {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("failed to run tmux: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("unexpected tmux output: {0}")]
    BadOutput(String),
}

impl From<TmuxError> for crate::error::Error {
    fn from(err: TmuxError) -> Self {
        crate::error::Error::wrap_as(crate::error::Kind::External, "tmux operation failed", err)
    }
}

/// Terminal-multiplexer operations the executor and cleanup watcher use.
#[async_trait]
pub trait TmuxPort: Send + Sync {
    async fn session_exists(&self, session: &str) -> Result<bool, TmuxError>;
    async fn create_session(&self, session: &str) -> Result<(), TmuxError>;
    async fn kill_session(&self, session: &str) -> Result<(), TmuxError>;

    async fn window_exists(&self, session: &str, window: &str) -> Result<bool, TmuxError>;
    async fn create_window(&self, session: &str, window: &str) -> Result<(), TmuxError>;
    async fn kill_window(&self, session: &str, window: &str) -> Result<(), TmuxError>;

    /// Pane indexes in the window, ascending.
    async fn list_panes(&self, session: &str, window: &str) -> Result<Vec<u32>, TmuxError>;
    async fn create_pane(&self, session: &str, window: &str) -> Result<(), TmuxError>;
    async fn kill_pane(&self, session: &str, window: &str, index: u32) -> Result<(), TmuxError>;
    /// Even out pane sizes after a split.
    async fn resize_panes(&self, session: &str, window: &str) -> Result<(), TmuxError>;

    /// Type `line` into the pane and press Enter.
    async fn send_line(&self, session: &str, window: &str, pane: u32, line: &str) -> Result<(), TmuxError>;
}

/// Driver that shells out to the `tmux` binary.
pub struct TmuxClient;

impl TmuxClient {
    async fn run(&self, args: &[&str]) -> Result<std::process::Output, TmuxError> {
        debug!(?args, "tmux");
        let output = Command::new("tmux").args(args).output().await?;
        Ok(output)
    }

    async fn run_ok(&self, args: &[&str]) -> Result<std::process::Output, TmuxError> {
        let output = self.run(args).await?;
        if !output.status.success() {
            return Err(TmuxError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl TmuxPort for TmuxClient {
    async fn session_exists(&self, session: &str) -> Result<bool, TmuxError> {
        // `=name` pins an exact match; has-session alone prefix-matches.
        let target = format!("={}", session);
        let output = self.run(&["has-session", "-t", &target]).await?;
        Ok(output.status.success())
    }

    async fn create_session(&self, session: &str) -> Result<(), TmuxError> {
        self.run_ok(&["new-session", "-d", "-s", session]).await?;
        Ok(())
    }

    async fn kill_session(&self, session: &str) -> Result<(), TmuxError> {
        let target = format!("={}", session);
        self.run_ok(&["kill-session", "-t", &target]).await?;
        Ok(())
    }

    async fn window_exists(&self, session: &str, window: &str) -> Result<bool, TmuxError> {
        let target = format!("={}", session);
        let output = self
            .run_ok(&["list-windows", "-t", &target, "-F", "#{window_name}"])
            .await?;
        let names = String::from_utf8_lossy(&output.stdout);
        Ok(names.lines().any(|n| n == window))
    }

    async fn create_window(&self, session: &str, window: &str) -> Result<(), TmuxError> {
        let target = format!("={}", session);
        self.run_ok(&["new-window", "-t", &target, "-n", window]).await?;
        Ok(())
    }

    async fn kill_window(&self, session: &str, window: &str) -> Result<(), TmuxError> {
        let target = format!("={}:{}", session, window);
        self.run_ok(&["kill-window", "-t", &target]).await?;
        Ok(())
    }

    async fn list_panes(&self, session: &str, window: &str) -> Result<Vec<u32>, TmuxError> {
        let target = format!("={}:{}", session, window);
        let output = self
            .run_ok(&["list-panes", "-t", &target, "-F", "#{pane_index}"])
            .await?;
        let text = String::from_utf8_lossy(&output.stdout);
        let mut indexes = Vec::new();
        for line in text.lines().filter(|l| !l.is_empty()) {
            let index = line
                .parse::<u32>()
                .map_err(|_| TmuxError::BadOutput(format!("pane index {:?}", line)))?;
            indexes.push(index);
        }
        indexes.sort_unstable();
        Ok(indexes)
    }

    async fn create_pane(&self, session: &str, window: &str) -> Result<(), TmuxError> {
        let target = format!("={}:{}", session, window);
        self.run_ok(&["split-window", "-t", &target]).await?;
        Ok(())
    }

    async fn kill_pane(&self, session: &str, window: &str, index: u32) -> Result<(), TmuxError> {
        let target = format!("={}:{}.{}", session, window, index);
        self.run_ok(&["kill-pane", "-t", &target]).await?;
        Ok(())
    }

    async fn resize_panes(&self, session: &str, window: &str) -> Result<(), TmuxError> {
        let target = format!("={}:{}", session, window);
        self.run_ok(&["select-layout", "-t", &target, "even-vertical"]).await?;
        Ok(())
    }

    async fn send_line(&self, session: &str, window: &str, pane: u32, line: &str) -> Result<(), TmuxError> {
        let target = format!("={}:{}.{}", session, window, pane);
        self.run_ok(&["send-keys", "-t", &target, line, "Enter"]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_name_from_slug() {
        assert_eq!(session_name("douhashi/soba"), "soba-douhashi-soba");
        assert_eq!(session_name("owner/repo"), "soba-owner-repo");
    }

    #[test]
    fn test_session_name_sanitizes_special_chars() {
        assert_eq!(session_name("my.org/some.repo"), "soba-my-org-some-repo");
    }

    #[test]
    fn test_session_name_degrades_on_malformed_repository() {
        for bad in ["", "noslash", "/repo", "owner/", "a/b/c"] {
            assert_eq!(session_name(bad), "soba", "input {:?}", bad);
        }
    }

    #[test]
    fn test_window_name() {
        assert_eq!(window_name(42), "issue-42");
    }
}
