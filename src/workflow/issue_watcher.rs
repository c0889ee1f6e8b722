//! Issue watcher: the scheduling loop.
//!
//! Each tick fetches the open reserved-labeled issues, logs an advisory
//! diff against the previous snapshot, then applies the single-issue
//! discipline: drive the in-flight issue through its current phase, or ask
//! the queue manager to admit a new one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::github::{GithubPort, Issue};
use crate::phase::{self, classify};
use crate::shutdown::Shutdown;

use super::executor::WorkflowExecutor;
use super::queue::QueueManager;

#[derive(Debug, Clone, PartialEq, Eq)]
struct IssueSnapshot {
    labels: Vec<String>,
    state: String,
}

impl IssueSnapshot {
    fn of(issue: &Issue) -> Self {
        let mut labels: Vec<String> = issue.label_names().map(str::to_string).collect();
        labels.sort();
        Self {
            labels,
            state: issue.state.clone(),
        }
    }
}

pub struct IssueWatcher {
    github: Arc<dyn GithubPort>,
    queue: QueueManager,
    executor: WorkflowExecutor,
    interval: Duration,
    /// The single issue currently moving through the pipeline.
    in_flight: Option<u64>,
    snapshot: HashMap<u64, IssueSnapshot>,
}

impl IssueWatcher {
    pub fn new(
        github: Arc<dyn GithubPort>,
        queue: QueueManager,
        executor: WorkflowExecutor,
        interval: Duration,
    ) -> Self {
        Self {
            github,
            queue,
            executor,
            interval,
            in_flight: None,
            snapshot: HashMap::new(),
        }
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    /// Run until shutdown. Tick errors are logged, never fatal.
    pub async fn run(mut self, shutdown: Shutdown) -> eyre::Result<()> {
        info!(interval_secs = self.interval.as_secs(), "issue watcher started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "issue watcher tick failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("issue watcher stopping");
                    return Ok(());
                }
            }
        }
    }

    /// One scheduling pass.
    pub async fn tick(&mut self) -> Result<()> {
        let issues: Vec<Issue> = self
            .github
            .list_open_issues()
            .await?
            .into_iter()
            .filter(Issue::carries_reserved_label)
            .collect();

        self.diff_and_log(&issues);

        if let Some(number) = self.in_flight {
            match issues.iter().find(|i| i.number == number) {
                Some(issue) if issue.is_open() && !issue.has_label(phase::LABEL_MERGED) => {
                    match classify(issue.label_names()) {
                        Ok(current) => {
                            self.executor.execute(issue, current).await?;
                        }
                        Err(e) => {
                            warn!(issue = number, error = %e, "skipping unclassifiable in-flight issue");
                        }
                    }
                    return Ok(());
                }
                _ => {
                    info!(issue = number, "in-flight issue finished, clearing token");
                    self.in_flight = None;
                }
            }
        }

        if let Some(admitted) = self.queue.admit(&issues).await? {
            // The admitted issue becomes in-flight on the next tick.
            self.in_flight = Some(admitted);
        }
        Ok(())
    }

    /// Advisory change log; the label state itself stays authoritative.
    fn diff_and_log(&mut self, issues: &[Issue]) {
        let mut next = HashMap::with_capacity(issues.len());
        for issue in issues {
            let snapshot = IssueSnapshot::of(issue);
            match self.snapshot.get(&issue.number) {
                None => {
                    info!(issue = issue.number, labels = ?snapshot.labels, "new tracked issue");
                }
                Some(previous) => {
                    if previous.labels != snapshot.labels {
                        info!(
                            issue = issue.number,
                            from = ?previous.labels,
                            to = ?snapshot.labels,
                            "issue labels changed"
                        );
                    }
                    if previous.state != snapshot.state {
                        info!(
                            issue = issue.number,
                            from = %previous.state,
                            to = %snapshot.state,
                            "issue state changed"
                        );
                    }
                }
            }
            next.insert(issue.number, snapshot);
        }
        for number in self.snapshot.keys() {
            if !next.contains_key(number) {
                debug!(issue = *number, "issue no longer listed");
            }
        }
        self.snapshot = next;
    }
}
