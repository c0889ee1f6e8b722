//! Wire types for the GitHub REST API, reduced to the fields the scheduler
//! reads.

use serde::Deserialize;

use crate::phase::{LABEL_LGTM, is_reserved};

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub name: String,
}

/// An issue as returned by `GET /repos/{owner}/{repo}/issues`.
///
/// The issues endpoint also returns pull requests; those entries carry a
/// `pull_request` key and are filtered out by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn is_open(&self) -> bool {
        self.state == "open"
    }

    pub fn is_closed(&self) -> bool {
        self.state == "closed"
    }

    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.name == name)
    }

    pub fn label_names(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|l| l.name.as_str())
    }

    /// Labels in the reserved namespace, the LGTM label excluded.
    pub fn reserved_labels(&self) -> Vec<&str> {
        self.label_names()
            .filter(|l| is_reserved(l) && *l != LABEL_LGTM)
            .collect()
    }

    /// True when any reserved label (LGTM included) is present.
    pub fn carries_reserved_label(&self) -> bool {
        self.label_names().any(is_reserved)
    }
}

/// A pull request. `mergeable` and `mergeable_state` are only populated by
/// the single-PR endpoint; the list endpoint leaves them at their defaults
/// (`None` / empty string).
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub mergeable: Option<bool>,
    #[serde(default)]
    pub mergeable_state: String,
}

impl PullRequest {
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.name == name)
    }
}

/// Response of `PUT /repos/{owner}/{repo}/pulls/{number}/merge`.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeResult {
    #[serde(default)]
    pub sha: String,
    pub merged: bool,
    #[serde(default)]
    pub message: String,
}
