//! Workflow executor: runs one phase for one issue.
//!
//! The pipeline is label flip -> worktree preparation -> terminal
//! reconciliation -> command dispatch, in that order. Observers of the
//! GitHub state always see the execution label before the worker starts,
//! and the worker always starts in a ready directory.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{PhaseCommand, PhaseConfig};
use crate::error::{Error, Result};
use crate::github::{GithubPort, Issue};
use crate::phase::{ExecutionType, Phase};
use crate::tmux::{TmuxPort, window_name};
use crate::worktree::WorktreePort;

/// Default maximum number of panes per issue window.
pub const DEFAULT_PANE_CAP: usize = 3;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Canonical session the issue windows live in.
    pub session: String,

    /// Pane cap per window; the oldest pane is deleted before a new one is
    /// inserted once the cap is reached.
    pub pane_cap: usize,

    /// Sleep before injecting a command, letting a fresh pane initialize.
    pub command_delay: Duration,

    /// Operator-supplied commands per phase.
    pub phases: PhaseConfig,
}

pub struct WorkflowExecutor {
    github: Arc<dyn GithubPort>,
    tmux: Arc<dyn TmuxPort>,
    worktree: Arc<dyn WorktreePort>,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(
        github: Arc<dyn GithubPort>,
        tmux: Arc<dyn TmuxPort>,
        worktree: Arc<dyn WorktreePort>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            github,
            tmux,
            worktree,
            config,
        }
    }

    /// Execute `phase` for `issue`.
    ///
    /// An issue already carrying the phase's execution label is already
    /// running; executing again is a no-op, which is what makes repeated
    /// ticks against the same state safe.
    pub async fn execute(&self, issue: &Issue, phase: Phase) -> Result<()> {
        let def = phase.def();

        if issue.has_label(def.execution) {
            debug!(issue = issue.number, %phase, "phase already executing");
            return Ok(());
        }

        self.flip_labels(issue.number, def.trigger, def.execution)
            .await
            .map_err(|e| {
                Error::wrap("label update failed", e)
                    .context("issue", issue.number)
                    .context("phase", phase)
            })?;
        info!(issue = issue.number, %phase, "phase started");

        if def.execution_type == ExecutionType::LabelOnly {
            return Ok(());
        }

        let command = self
            .config
            .phases
            .get(phase)
            .ok_or_else(|| Error::validation("no command configured for phase").context("phase", phase))?;

        let worktree_path = if def.requires_worktree {
            Some(self.worktree.prepare(issue.number).await?)
        } else {
            None
        };

        let window = window_name(issue.number);
        let pane = self.reconcile_terminal(&window, def.requires_pane).await?;

        let mut line = build_command(command, issue.number);
        if let Some(path) = worktree_path {
            line = format!("cd {} && {}", path.display(), line);
        }

        if !self.config.command_delay.is_zero() {
            tokio::time::sleep(self.config.command_delay).await;
        }

        self.tmux
            .send_line(&self.config.session, &window, pane, &line)
            .await?;
        info!(issue = issue.number, %phase, pane, "command dispatched");
        Ok(())
    }

    /// Trigger -> execution label flip. Idempotence comes from the client:
    /// a missing trigger on remove and a present execution label on add are
    /// successes.
    async fn flip_labels(&self, issue: u64, trigger: &str, execution: &str) -> Result<()> {
        self.github.remove_label(issue, trigger).await?;
        self.github.add_label(issue, execution).await?;
        Ok(())
    }

    /// Ensure session, window and pane exist; return the pane index to
    /// inject into.
    async fn reconcile_terminal(&self, window: &str, requires_pane: bool) -> Result<u32> {
        let session = self.config.session.as_str();

        if !self.tmux.session_exists(session).await? {
            self.tmux.create_session(session).await?;
            info!(session, "created session");
        }

        if !self.tmux.window_exists(session, window).await? {
            // A fresh window comes with its own pane.
            self.tmux.create_window(session, window).await?;
            info!(session, window, "created window");
        } else if requires_pane {
            // Delete-oldest-then-insert, never the other way around.
            let mut panes = self.tmux.list_panes(session, window).await?;
            while panes.len() >= self.config.pane_cap.max(1) {
                let oldest = panes[0];
                self.tmux.kill_pane(session, window, oldest).await?;
                panes = self.tmux.list_panes(session, window).await?;
            }
            self.tmux.create_pane(session, window).await?;
            self.tmux.resize_panes(session, window).await?;
        }

        let panes = self.tmux.list_panes(session, window).await?;
        panes
            .last()
            .copied()
            .ok_or_else(|| Error::internal("window has no panes").context("window", window))
    }
}

/// Compose the command line: `<command> <options...> "<parameter>"`.
///
/// The parameter is substituted (`{{issue-number}}` and the legacy
/// `{issue_number}`) and always double-quoted to preserve whitespace.
pub fn build_command(command: &PhaseCommand, issue: u64) -> String {
    let number = issue.to_string();
    let mut line = command.command.clone();
    for option in &command.options {
        line.push(' ');
        line.push_str(option);
    }
    if !command.parameter.is_empty() {
        let parameter = command
            .parameter
            .replace("{{issue-number}}", &number)
            .replace("{issue_number}", &number);
        line.push_str(&format!(" \"{}\"", parameter));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::Label;
    use crate::phase;
    use crate::workflow::testing::{MockGithub, MockTmux, MockWorktree};
    use std::path::PathBuf;

    fn issue(number: u64, labels: &[&str]) -> Issue {
        Issue {
            number,
            title: format!("issue {}", number),
            state: "open".to_string(),
            labels: labels
                .iter()
                .map(|n| Label {
                    name: (*n).to_string(),
                })
                .collect(),
            pull_request: None,
        }
    }

    fn phases_with_plan() -> PhaseConfig {
        PhaseConfig {
            plan: Some(PhaseCommand {
                command: "echo".to_string(),
                options: vec![],
                parameter: "x {{issue-number}}".to_string(),
            }),
            ..Default::default()
        }
    }

    fn executor(
        github: Arc<MockGithub>,
        tmux: Arc<MockTmux>,
        worktree: Arc<MockWorktree>,
        phases: PhaseConfig,
    ) -> WorkflowExecutor {
        WorkflowExecutor::new(
            github,
            tmux,
            worktree,
            ExecutorConfig {
                session: "soba-owner-repo".to_string(),
                pane_cap: DEFAULT_PANE_CAP,
                command_delay: Duration::ZERO,
                phases,
            },
        )
    }

    #[test]
    fn test_build_command_substitutes_both_forms() {
        let cmd = PhaseCommand {
            command: "claude".to_string(),
            options: vec!["--verbose".to_string(), "-p".to_string()],
            parameter: "plan {{issue-number}} and {issue_number}".to_string(),
        };
        assert_eq!(build_command(&cmd, 42), "claude --verbose -p \"plan 42 and 42\"");
    }

    #[test]
    fn test_build_command_without_parameter() {
        let cmd = PhaseCommand {
            command: "make".to_string(),
            options: vec!["check".to_string()],
            parameter: String::new(),
        };
        assert_eq!(build_command(&cmd, 1), "make check");
    }

    #[tokio::test]
    async fn test_label_only_phase_flips_and_stops() {
        let github = Arc::new(MockGithub::default());
        let tmux = Arc::new(MockTmux::default());
        let worktree = Arc::new(MockWorktree::new(PathBuf::from(".git/soba/worktrees")));
        let exec = executor(github.clone(), tmux.clone(), worktree.clone(), PhaseConfig::default());

        let issue = issue(9, &["soba:done"]);
        exec.execute(&issue, Phase::Merge).await.unwrap();

        assert_eq!(github.removed(), vec![(9, phase::LABEL_DONE.to_string())]);
        assert_eq!(github.added(), vec![(9, phase::LABEL_MERGED.to_string())]);
        assert!(tmux.sent().is_empty());
        assert!(worktree.prepared().is_empty());
    }

    #[tokio::test]
    async fn test_plan_phase_full_pipeline() {
        let github = Arc::new(MockGithub::default());
        let tmux = Arc::new(MockTmux::default());
        let worktree = Arc::new(MockWorktree::new(PathBuf::from(".git/soba/worktrees")));
        let exec = executor(github.clone(), tmux.clone(), worktree.clone(), phases_with_plan());

        let issue = issue(2, &["soba:queued"]);
        exec.execute(&issue, Phase::Plan).await.unwrap();

        assert_eq!(github.removed(), vec![(2, "soba:queued".to_string())]);
        assert_eq!(github.added(), vec![(2, "soba:planning".to_string())]);
        assert_eq!(worktree.prepared(), vec![2]);

        let sent = tmux.sent();
        assert_eq!(sent.len(), 1);
        let (session, window, _pane, line) = &sent[0];
        assert_eq!(session, "soba-owner-repo");
        assert_eq!(window, "issue-2");
        assert_eq!(line, "cd .git/soba/worktrees/issue-2 && echo \"x 2\"");
    }

    #[tokio::test]
    async fn test_executing_phase_is_noop_when_execution_label_present() {
        let github = Arc::new(MockGithub::default());
        let tmux = Arc::new(MockTmux::default());
        let worktree = Arc::new(MockWorktree::new(PathBuf::from("/wt")));
        let exec = executor(github.clone(), tmux.clone(), worktree.clone(), phases_with_plan());

        let issue = issue(2, &["soba:planning"]);
        exec.execute(&issue, Phase::Plan).await.unwrap();

        assert!(github.removed().is_empty());
        assert!(github.added().is_empty());
        assert!(tmux.sent().is_empty());
    }

    #[tokio::test]
    async fn test_missing_command_is_validation_error() {
        let github = Arc::new(MockGithub::default());
        let tmux = Arc::new(MockTmux::default());
        let worktree = Arc::new(MockWorktree::new(PathBuf::from("/wt")));
        let exec = executor(github.clone(), tmux.clone(), worktree.clone(), PhaseConfig::default());

        let issue = issue(2, &["soba:queued"]);
        let err = exec.execute(&issue, Phase::Plan).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::Validation);
    }

    #[tokio::test]
    async fn test_review_phase_skips_worktree() {
        let github = Arc::new(MockGithub::default());
        let tmux = Arc::new(MockTmux::default());
        let worktree = Arc::new(MockWorktree::new(PathBuf::from("/wt")));
        let phases = PhaseConfig {
            review: Some(PhaseCommand {
                command: "review-bot".to_string(),
                options: vec![],
                parameter: "{{issue-number}}".to_string(),
            }),
            ..Default::default()
        };
        let exec = executor(github.clone(), tmux.clone(), worktree.clone(), phases);

        let issue = issue(4, &["soba:review-requested"]);
        exec.execute(&issue, Phase::Review).await.unwrap();

        assert!(worktree.prepared().is_empty());
        let sent = tmux.sent();
        assert_eq!(sent[0].3, "review-bot \"4\"");
    }

    #[tokio::test]
    async fn test_pane_cap_deletes_oldest_before_insert() {
        let github = Arc::new(MockGithub::default());
        let tmux = Arc::new(MockTmux::default());
        let worktree = Arc::new(MockWorktree::new(PathBuf::from("/wt")));
        let exec = executor(github.clone(), tmux.clone(), worktree.clone(), phases_with_plan());

        // Window already at the cap.
        tmux.seed_window("soba-owner-repo", "issue-2", &[0, 1, 2]);

        let issue = issue(2, &["soba:queued"]);
        exec.execute(&issue, Phase::Plan).await.unwrap();

        let panes = tmux.panes_of("soba-owner-repo", "issue-2");
        assert!(panes.len() <= DEFAULT_PANE_CAP);
        assert_eq!(tmux.killed_panes(), vec![0], "oldest pane goes first");
        // The command lands in the newest pane.
        let sent = tmux.sent();
        assert_eq!(sent[0].2, *panes.last().unwrap());
    }

    #[tokio::test]
    async fn test_fresh_window_skips_pane_split() {
        let github = Arc::new(MockGithub::default());
        let tmux = Arc::new(MockTmux::default());
        let worktree = Arc::new(MockWorktree::new(PathBuf::from("/wt")));
        let exec = executor(github.clone(), tmux.clone(), worktree.clone(), phases_with_plan());

        let issue = issue(2, &["soba:queued"]);
        exec.execute(&issue, Phase::Plan).await.unwrap();

        // Only the window's initial pane exists.
        assert_eq!(tmux.panes_of("soba-owner-repo", "issue-2"), vec![0]);
        assert!(tmux.killed_panes().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_execution_yields_same_labels() {
        let github = Arc::new(MockGithub::default());
        let tmux = Arc::new(MockTmux::default());
        let worktree = Arc::new(MockWorktree::new(PathBuf::from("/wt")));
        let exec = executor(github.clone(), tmux.clone(), worktree.clone(), phases_with_plan());

        // First run flips the labels.
        let before = issue(2, &["soba:queued"]);
        exec.execute(&before, Phase::Plan).await.unwrap();
        // Second run observes the post-flip label set and changes nothing.
        let after = issue(2, &["soba:planning"]);
        exec.execute(&after, Phase::Plan).await.unwrap();

        assert_eq!(github.added(), vec![(2, "soba:planning".to_string())]);
        assert_eq!(github.removed(), vec![(2, "soba:queued".to_string())]);
    }
}
