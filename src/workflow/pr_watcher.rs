//! PR watcher: squash-merges approved pull requests.
//!
//! A PR is eligible when it carries the approval label, `mergeable` is
//! true, and its mergeable state is `clean`. GitHub computes mergeability
//! lazily, so an empty state is re-fetched a few times before the PR is
//! skipped for the tick.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::github::{GithubPort, PullRequest};
use crate::phase::LABEL_LGTM;
use crate::shutdown::Shutdown;

const MERGEABLE_STATE_CLEAN: &str = "clean";
const STATE_REFETCH_LIMIT: u32 = 3;
const STATE_REFETCH_WAIT: Duration = Duration::from_secs(2);

pub struct PrWatcher {
    github: Arc<dyn GithubPort>,
    interval: Duration,
}

impl PrWatcher {
    pub fn new(github: Arc<dyn GithubPort>, interval: Duration) -> Self {
        Self { github, interval }
    }

    pub async fn run(self, shutdown: Shutdown) -> eyre::Result<()> {
        info!(interval_secs = self.interval.as_secs(), "PR watcher started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "PR watcher tick failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("PR watcher stopping");
                    return Ok(());
                }
            }
        }
    }

    pub async fn tick(&self) -> Result<()> {
        let prs = self.github.list_open_pull_requests().await?;
        for pr in prs.iter().filter(|pr| pr.has_label(LABEL_LGTM)) {
            if let Err(e) = self.try_merge(pr).await {
                // Merge failures are logged; the loop continues.
                warn!(pr = pr.number, error = %e, "auto-merge failed");
            }
        }
        Ok(())
    }

    async fn try_merge(&self, candidate: &PullRequest) -> Result<()> {
        let mut pr = candidate.clone();

        let mut refetches = 0;
        while pr.mergeable_state.is_empty() && refetches < STATE_REFETCH_LIMIT {
            debug!(pr = pr.number, refetches, "mergeable state pending, re-fetching");
            tokio::time::sleep(STATE_REFETCH_WAIT).await;
            pr = self.github.get_pull_request(pr.number).await?;
            refetches += 1;
        }

        if pr.mergeable_state.is_empty() {
            debug!(pr = pr.number, "mergeable state still empty, skipping this tick");
            return Ok(());
        }

        if pr.mergeable != Some(true) || pr.mergeable_state != MERGEABLE_STATE_CLEAN {
            debug!(
                pr = pr.number,
                mergeable = ?pr.mergeable,
                state = %pr.mergeable_state,
                "PR not clean, skipping"
            );
            return Ok(());
        }

        let commit_title = format!("feat: {} (#{})", pr.title, pr.number);
        let result = self.github.merge_pull_request(pr.number, &commit_title).await?;
        info!(pr = pr.number, sha = %result.sha, "auto-merged pull request");
        Ok(())
    }
}
