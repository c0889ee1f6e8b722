//! GitHub integration: wire types, token resolution, retrying client, and
//! the port the watchers talk through.

mod client;
mod retry;
mod token;
mod types;

pub use client::{GithubClient, IssueState, parse_repository};
pub use retry::{RetryError, RetryPolicy};
pub use token::{EnvTokenProvider, GhCliTokenProvider, TokenProvider, resolve_token};
pub use types::{Issue, Label, MergeResult, PullRequest};

use async_trait::async_trait;

use crate::error::Result;

/// Hosting-platform operations the scheduler depends on.
///
/// The watchers and the executor only ever see this trait, so tests inject
/// recording mocks instead of a live client.
#[async_trait]
pub trait GithubPort: Send + Sync {
    async fn list_open_issues(&self) -> Result<Vec<Issue>>;

    async fn list_closed_issues(&self) -> Result<Vec<Issue>>;

    async fn list_open_pull_requests(&self) -> Result<Vec<PullRequest>>;

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest>;

    /// Squash merge with the given commit title.
    async fn merge_pull_request(&self, number: u64, commit_title: &str) -> Result<MergeResult>;

    /// Idempotent: adding a label that is already present succeeds.
    async fn add_label(&self, issue: u64, label: &str) -> Result<()>;

    /// Idempotent: removing a label that is absent succeeds.
    async fn remove_label(&self, issue: u64, label: &str) -> Result<()>;
}
