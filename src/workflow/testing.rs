//! Recording mock drivers shared by the workflow tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::github::{GithubPort, Issue, MergeResult, PullRequest};
use crate::tmux::{TmuxError, TmuxPort};
use crate::worktree::{WorktreeError, WorktreePort};

#[derive(Default)]
pub(crate) struct MockGithub {
    pub open_issues: Mutex<Vec<Issue>>,
    pub closed_issues: Mutex<Vec<Issue>>,
    pub open_prs: Mutex<Vec<PullRequest>>,
    /// Queued responses for `get_pull_request`, per PR number. When the
    /// queue is empty, the PR is served from `open_prs`.
    pub pr_fetches: Mutex<HashMap<u64, VecDeque<PullRequest>>>,
    added: Mutex<Vec<(u64, String)>>,
    removed: Mutex<Vec<(u64, String)>>,
    merges: Mutex<Vec<(u64, String)>>,
}

impl MockGithub {
    pub fn with_open_issues(issues: Vec<Issue>) -> Self {
        Self {
            open_issues: Mutex::new(issues),
            ..Default::default()
        }
    }

    pub fn added(&self) -> Vec<(u64, String)> {
        self.added.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<(u64, String)> {
        self.removed.lock().unwrap().clone()
    }

    pub fn merges(&self) -> Vec<(u64, String)> {
        self.merges.lock().unwrap().clone()
    }

    pub fn queue_pr_fetch(&self, pr: PullRequest) {
        self.pr_fetches
            .lock()
            .unwrap()
            .entry(pr.number)
            .or_default()
            .push_back(pr);
    }
}

#[async_trait]
impl GithubPort for MockGithub {
    async fn list_open_issues(&self) -> Result<Vec<Issue>> {
        Ok(self.open_issues.lock().unwrap().clone())
    }

    async fn list_closed_issues(&self) -> Result<Vec<Issue>> {
        Ok(self.closed_issues.lock().unwrap().clone())
    }

    async fn list_open_pull_requests(&self) -> Result<Vec<PullRequest>> {
        Ok(self.open_prs.lock().unwrap().clone())
    }

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        if let Some(queue) = self.pr_fetches.lock().unwrap().get_mut(&number)
            && let Some(pr) = queue.pop_front()
        {
            return Ok(pr);
        }
        let prs = self.open_prs.lock().unwrap();
        prs.iter()
            .find(|pr| pr.number == number)
            .cloned()
            .ok_or_else(|| crate::error::Error::not_found("no such pull request").context("number", number))
    }

    async fn merge_pull_request(&self, number: u64, commit_title: &str) -> Result<MergeResult> {
        self.merges.lock().unwrap().push((number, commit_title.to_string()));
        Ok(MergeResult {
            sha: "abc123".to_string(),
            merged: true,
            message: "Pull Request successfully merged".to_string(),
        })
    }

    async fn add_label(&self, issue: u64, label: &str) -> Result<()> {
        self.added.lock().unwrap().push((issue, label.to_string()));
        Ok(())
    }

    async fn remove_label(&self, issue: u64, label: &str) -> Result<()> {
        self.removed.lock().unwrap().push((issue, label.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MockTmux {
    sessions: Mutex<HashSet<String>>,
    windows: Mutex<HashSet<(String, String)>>,
    panes: Mutex<HashMap<(String, String), Vec<u32>>>,
    sent: Mutex<Vec<(String, String, u32, String)>>,
    killed_windows: Mutex<Vec<(String, String)>>,
    killed_panes: Mutex<Vec<u32>>,
}

impl MockTmux {
    pub fn seed_session(&self, session: &str) {
        self.sessions.lock().unwrap().insert(session.to_string());
    }

    pub fn seed_window(&self, session: &str, window: &str, panes: &[u32]) {
        self.seed_session(session);
        let key = (session.to_string(), window.to_string());
        self.windows.lock().unwrap().insert(key.clone());
        self.panes.lock().unwrap().insert(key, panes.to_vec());
    }

    pub fn panes_of(&self, session: &str, window: &str) -> Vec<u32> {
        self.panes
            .lock()
            .unwrap()
            .get(&(session.to_string(), window.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn sent(&self) -> Vec<(String, String, u32, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn killed_windows(&self) -> Vec<(String, String)> {
        self.killed_windows.lock().unwrap().clone()
    }

    pub fn killed_panes(&self) -> Vec<u32> {
        self.killed_panes.lock().unwrap().clone()
    }

    pub fn has_window(&self, session: &str, window: &str) -> bool {
        self.windows
            .lock()
            .unwrap()
            .contains(&(session.to_string(), window.to_string()))
    }
}

#[async_trait]
impl TmuxPort for MockTmux {
    async fn session_exists(&self, session: &str) -> std::result::Result<bool, TmuxError> {
        Ok(self.sessions.lock().unwrap().contains(session))
    }

    async fn create_session(&self, session: &str) -> std::result::Result<(), TmuxError> {
        self.sessions.lock().unwrap().insert(session.to_string());
        Ok(())
    }

    async fn kill_session(&self, session: &str) -> std::result::Result<(), TmuxError> {
        self.sessions.lock().unwrap().remove(session);
        Ok(())
    }

    async fn window_exists(&self, session: &str, window: &str) -> std::result::Result<bool, TmuxError> {
        Ok(self.has_window(session, window))
    }

    async fn create_window(&self, session: &str, window: &str) -> std::result::Result<(), TmuxError> {
        let key = (session.to_string(), window.to_string());
        self.windows.lock().unwrap().insert(key.clone());
        self.panes.lock().unwrap().insert(key, vec![0]);
        Ok(())
    }

    async fn kill_window(&self, session: &str, window: &str) -> std::result::Result<(), TmuxError> {
        let key = (session.to_string(), window.to_string());
        self.windows.lock().unwrap().remove(&key);
        self.panes.lock().unwrap().remove(&key);
        self.killed_windows.lock().unwrap().push(key);
        Ok(())
    }

    async fn list_panes(&self, session: &str, window: &str) -> std::result::Result<Vec<u32>, TmuxError> {
        Ok(self.panes_of(session, window))
    }

    async fn create_pane(&self, session: &str, window: &str) -> std::result::Result<(), TmuxError> {
        let key = (session.to_string(), window.to_string());
        let mut panes = self.panes.lock().unwrap();
        let list = panes.entry(key).or_default();
        let next = list.iter().max().map(|m| m + 1).unwrap_or(0);
        list.push(next);
        Ok(())
    }

    async fn kill_pane(&self, session: &str, window: &str, index: u32) -> std::result::Result<(), TmuxError> {
        let key = (session.to_string(), window.to_string());
        if let Some(list) = self.panes.lock().unwrap().get_mut(&key) {
            list.retain(|p| *p != index);
        }
        self.killed_panes.lock().unwrap().push(index);
        Ok(())
    }

    async fn resize_panes(&self, _session: &str, _window: &str) -> std::result::Result<(), TmuxError> {
        Ok(())
    }

    async fn send_line(
        &self,
        session: &str,
        window: &str,
        pane: u32,
        line: &str,
    ) -> std::result::Result<(), TmuxError> {
        self.sent
            .lock()
            .unwrap()
            .push((session.to_string(), window.to_string(), pane, line.to_string()));
        Ok(())
    }
}

pub(crate) struct MockWorktree {
    base: PathBuf,
    prepared: Mutex<Vec<u64>>,
    removed: Mutex<Vec<u64>>,
}

impl MockWorktree {
    pub fn new(base: PathBuf) -> Self {
        Self {
            base,
            prepared: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
        }
    }

    pub fn prepared(&self) -> Vec<u64> {
        self.prepared.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<u64> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorktreePort for MockWorktree {
    fn path_for(&self, issue: u64) -> PathBuf {
        self.base.join(format!("issue-{}", issue))
    }

    async fn exists(&self, issue: u64) -> bool {
        self.prepared.lock().unwrap().contains(&issue)
    }

    async fn prepare(&self, issue: u64) -> std::result::Result<PathBuf, WorktreeError> {
        let mut prepared = self.prepared.lock().unwrap();
        if !prepared.contains(&issue) {
            prepared.push(issue);
        }
        Ok(self.path_for(issue))
    }

    async fn remove(&self, issue: u64) -> std::result::Result<(), WorktreeError> {
        self.removed.lock().unwrap().push(issue);
        Ok(())
    }

    async fn update_base_branch(&self) -> std::result::Result<(), WorktreeError> {
        Ok(())
    }
}
