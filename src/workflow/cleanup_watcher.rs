//! Cleanup watcher: reclaims tmux windows for closed issues.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::error::Result;
use crate::github::GithubPort;
use crate::shutdown::Shutdown;
use crate::tmux::{TmuxPort, window_name};

pub struct CleanupWatcher {
    github: Arc<dyn GithubPort>,
    tmux: Arc<dyn TmuxPort>,
    session: String,
    interval: Duration,
    enabled: bool,
}

impl CleanupWatcher {
    pub fn new(
        github: Arc<dyn GithubPort>,
        tmux: Arc<dyn TmuxPort>,
        session: String,
        interval: Duration,
        enabled: bool,
    ) -> Self {
        Self {
            github,
            tmux,
            session,
            interval,
            enabled,
        }
    }

    pub async fn run(self, shutdown: Shutdown) -> eyre::Result<()> {
        if !self.enabled {
            info!("cleanup watcher disabled");
            return Ok(());
        }
        info!(interval_secs = self.interval.as_secs(), "cleanup watcher started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "cleanup watcher tick failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("cleanup watcher stopping");
                    return Ok(());
                }
            }
        }
    }

    pub async fn tick(&self) -> Result<()> {
        // Nothing to reclaim without a session.
        if !self.tmux.session_exists(&self.session).await? {
            debug!(session = %self.session, "session absent, nothing to clean");
            return Ok(());
        }

        let closed = self.github.list_closed_issues().await?;
        for issue in closed {
            let window = window_name(issue.number);
            if self.tmux.window_exists(&self.session, &window).await? {
                self.tmux.kill_window(&self.session, &window).await?;
                info!(issue = issue.number, window = %window, "reclaimed window for closed issue");
            }
        }
        Ok(())
    }
}
