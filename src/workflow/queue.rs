//! Queue manager: admits at most one `soba:todo` issue into the pipeline.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::github::{GithubPort, Issue};
use crate::phase::{LABEL_QUEUED, LABEL_TODO};

/// Pure admission decision over one tick's filtered issue list.
///
/// Returns the minimum-numbered `todo` issue, or `None` when another issue
/// already carries a non-`todo` reserved label (an active task exists) or no
/// `todo` issue is present. Deterministic regardless of fetch order.
pub fn admission_candidate(issues: &[Issue]) -> Option<u64> {
    let active = issues
        .iter()
        .any(|issue| issue.reserved_labels().iter().any(|l| *l != LABEL_TODO));
    if active {
        return None;
    }

    issues
        .iter()
        .filter(|issue| issue.has_label(LABEL_TODO))
        .map(|issue| issue.number)
        .min()
}

pub struct QueueManager {
    github: Arc<dyn GithubPort>,
}

impl QueueManager {
    pub fn new(github: Arc<dyn GithubPort>) -> Self {
        Self { github }
    }

    /// Admit the next issue if the pipeline is idle: flip `todo` -> `queued`
    /// on the chosen issue and return its number.
    ///
    /// Both label operations are idempotent at the client: a missing label
    /// on remove and a present label on add count as success.
    pub async fn admit(&self, issues: &[Issue]) -> Result<Option<u64>> {
        let Some(number) = admission_candidate(issues) else {
            debug!("no admission this tick");
            return Ok(None);
        };

        self.github.remove_label(number, LABEL_TODO).await?;
        self.github.add_label(number, LABEL_QUEUED).await?;
        info!(issue = number, "admitted issue into the pipeline");
        Ok(Some(number))
    }
}
