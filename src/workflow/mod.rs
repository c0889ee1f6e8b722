//! The scheduling engine: queue manager, workflow executor, and the three
//! watcher loops.

mod cleanup_watcher;
mod executor;
mod issue_watcher;
mod pr_watcher;
mod queue;

#[cfg(test)]
pub(crate) mod testing;

pub use cleanup_watcher::CleanupWatcher;
pub use executor::{DEFAULT_PANE_CAP, ExecutorConfig, WorkflowExecutor, build_command};
pub use issue_watcher::IssueWatcher;
pub use pr_watcher::PrWatcher;
pub use queue::{QueueManager, admission_candidate};
