//! GitHub REST client.
//!
//! A thin wrapper over `reqwest` with bearer auth, Link-header pagination,
//! and the retrying middleware on every call. Label mutations are
//! idempotent: a 404 on remove and a 422 on add are successes.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{Error, Kind, Result};
use crate::shutdown::Shutdown;

use super::retry::{RetryError, RetryPolicy};
use super::types::{Issue, MergeResult, PullRequest};
use super::GithubPort;

const API_BASE: &str = "https://api.github.com";
const PER_PAGE: u32 = 100;

/// Issue state filter for list calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    fn as_str(&self) -> &'static str {
        match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
        }
    }
}

pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    owner: String,
    repo: String,
    token: String,
    retry: RetryPolicy,
    shutdown: Shutdown,
}

impl GithubClient {
    pub fn new(repository: &str, token: String, shutdown: Shutdown) -> Result<Self> {
        let (owner, repo) = parse_repository(repository)?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("soba/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::wrap_as(Kind::Internal, "failed to build HTTP client", e))?;
        Ok(Self {
            http,
            base_url: API_BASE.to_string(),
            owner,
            repo,
            token,
            retry: RetryPolicy::default(),
            shutdown,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.base_url, self.owner, self.repo, path)
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// Send through the retrying middleware. The closure builds a fresh
    /// request per attempt.
    async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let result = self
            .retry
            .execute(&self.shutdown, || async { self.request(build()).send().await })
            .await;
        match result {
            Ok(response) => Ok(response),
            Err(RetryError::Cancelled) => Err(Error::timeout("request cancelled by shutdown")),
            Err(RetryError::Network(e)) => Err(Error::wrap_as(Kind::External, "github request failed", e)),
        }
    }

    async fn fail_for_status(&self, response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::external(format!("{} returned {}", what, status))
            .context("status", status.as_u16())
            .context("body", body.chars().take(200).collect::<String>()))
    }

    async fn list_issues(&self, state: IssueState) -> Result<Vec<Issue>> {
        let mut issues = Vec::new();
        let mut page = 1u32;
        loop {
            let url = self.url("issues");
            let response = self
                .send(|| {
                    self.http.get(&url).query(&[
                        ("state", state.as_str().to_string()),
                        ("sort", "created".to_string()),
                        ("direction", "asc".to_string()),
                        ("per_page", PER_PAGE.to_string()),
                        ("page", page.to_string()),
                    ])
                })
                .await?;
            let response = self.fail_for_status(response, "list issues").await?;
            let has_next = has_next_page(&response);
            let batch: Vec<Issue> = response
                .json()
                .await
                .map_err(|e| Error::wrap_as(Kind::External, "failed to decode issue list", e))?;
            // The issues endpoint interleaves pull requests; drop them.
            issues.extend(batch.into_iter().filter(|i| i.pull_request.is_none()));
            if !has_next {
                break;
            }
            page += 1;
        }
        debug!(count = issues.len(), state = state.as_str(), "listed issues");
        Ok(issues)
    }
}

/// Split an `owner/repo` slug, rejecting malformed values.
pub fn parse_repository(repository: &str) -> Result<(String, String)> {
    match repository.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(Error::validation("repository must be of the form owner/repo").context("repository", repository)),
    }
}

/// Paging is detected via the `rel="next"` link relation.
fn has_next_page(response: &Response) -> bool {
    response
        .headers()
        .get("link")
        .and_then(|v| v.to_str().ok())
        .map(link_has_next)
        .unwrap_or(false)
}

fn link_has_next(link: &str) -> bool {
    link.split(',').any(|part| part.contains("rel=\"next\""))
}

#[async_trait]
impl GithubPort for GithubClient {
    async fn list_open_issues(&self) -> Result<Vec<Issue>> {
        self.list_issues(IssueState::Open).await
    }

    async fn list_closed_issues(&self) -> Result<Vec<Issue>> {
        self.list_issues(IssueState::Closed).await
    }

    async fn list_open_pull_requests(&self) -> Result<Vec<PullRequest>> {
        let mut prs = Vec::new();
        let mut page = 1u32;
        loop {
            let url = self.url("pulls");
            let response = self
                .send(|| {
                    self.http.get(&url).query(&[
                        ("state", "open".to_string()),
                        ("sort", "created".to_string()),
                        ("direction", "asc".to_string()),
                        ("per_page", PER_PAGE.to_string()),
                        ("page", page.to_string()),
                    ])
                })
                .await?;
            let response = self.fail_for_status(response, "list pull requests").await?;
            let has_next = has_next_page(&response);
            let batch: Vec<PullRequest> = response
                .json()
                .await
                .map_err(|e| Error::wrap_as(Kind::External, "failed to decode pull request list", e))?;
            prs.extend(batch);
            if !has_next {
                break;
            }
            page += 1;
        }
        Ok(prs)
    }

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        let url = self.url(&format!("pulls/{}", number));
        let response = self.send(|| self.http.get(&url)).await?;
        let response = self.fail_for_status(response, "get pull request").await?;
        response
            .json()
            .await
            .map_err(|e| Error::wrap_as(Kind::External, "failed to decode pull request", e))
    }

    async fn merge_pull_request(&self, number: u64, commit_title: &str) -> Result<MergeResult> {
        let url = self.url(&format!("pulls/{}/merge", number));
        let body = json!({
            "commit_title": commit_title,
            "merge_method": "squash",
        });
        let response = self.send(|| self.http.put(&url).json(&body)).await?;
        let response = self.fail_for_status(response, "merge pull request").await?;
        response
            .json()
            .await
            .map_err(|e| Error::wrap_as(Kind::External, "failed to decode merge result", e))
    }

    async fn add_label(&self, issue: u64, label: &str) -> Result<()> {
        let url = self.url(&format!("issues/{}/labels", issue));
        let body = json!({ "labels": [label] });
        let response = self.send(|| self.http.post(&url).json(&body)).await?;
        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            warn!(issue, label, "label already present, treating add as success");
            return Ok(());
        }
        self.fail_for_status(response, "add label").await?;
        Ok(())
    }

    async fn remove_label(&self, issue: u64, label: &str) -> Result<()> {
        let url = self.url(&format!("issues/{}/labels/{}", issue, label));
        let response = self.send(|| self.http.delete(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            warn!(issue, label, "label not found, treating remove as success");
            return Ok(());
        }
        self.fail_for_status(response, "remove label").await?;
        Ok(())
    }
}
