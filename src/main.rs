//! soba - GitHub issue-driven workflow scheduler
//!
//! CLI entry point: start (foreground or daemonized), stop, status.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use soba::cli::{Cli, Command};
use soba::config::{Config, LogConfig};
use soba::daemon::DaemonManager;
use soba::github::{GithubClient, GithubPort, resolve_token};
use soba::phase::classify;
use soba::shutdown::{self, Shutdown};
use soba::tmux::{TmuxClient, TmuxPort, session_name};
use soba::workflow::{
    CleanupWatcher, DEFAULT_PANE_CAP, ExecutorConfig, IssueWatcher, PrWatcher, QueueManager, WorkflowExecutor,
};
use soba::worktree::{WorktreeConfig, WorktreeManager};

fn parse_level(level: &str) -> tracing::Level {
    match level.to_uppercase().as_str() {
        "TRACE" => tracing::Level::TRACE,
        "DEBUG" => tracing::Level::DEBUG,
        "INFO" => tracing::Level::INFO,
        "WARN" | "WARNING" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        other => {
            eprintln!("Warning: unknown log level '{}', defaulting to info", other);
            tracing::Level::INFO
        }
    }
}

/// Foreground logging: stderr sink.
fn setup_stderr_logging(cli_level: Option<&str>, config_level: &str) -> Result<()> {
    let level = parse_level(cli_level.unwrap_or(config_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
    Ok(())
}

/// Daemon logging: file sink with `${PID}` substitution and retention.
fn setup_file_logging(cli_level: Option<&str>, log: &LogConfig) -> Result<()> {
    let level = parse_level(cli_level.unwrap_or(&log.level));
    let path = log.resolved_output_path(std::process::id());

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).context("Failed to create log directory")?;
        prune_old_logs(dir, log.retention_count);
    }

    let log_file = fs::File::create(&path).context("Failed to create log file")?;
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!(path = %path.display(), "logging initialized");
    Ok(())
}

/// Keep the newest `keep` files in the log directory, best-effort.
fn prune_old_logs(dir: &Path, keep: usize) {
    if keep == 0 {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.metadata().and_then(|m| m.modified()).ok().map(|t| (t, e.path())))
        .collect();
    if files.len() < keep {
        return;
    }
    files.sort_by_key(|(t, _)| *t);
    // Leave room for the file about to be created.
    let excess = files.len() + 1 - keep;
    for (_, path) in files.into_iter().take(excess) {
        let _ = fs::remove_file(path);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Start { daemon } => cmd_start(&config, cli.log_level.as_deref(), daemon).await,
        Command::Stop => cmd_stop(&config),
        Command::Status => cmd_status(&config).await,
    }
}

/// Start the scheduler: foreground, daemon parent, or detached child.
async fn cmd_start(config: &Config, cli_level: Option<&str>, daemon: bool) -> Result<()> {
    config.validate()?;

    if !daemon {
        setup_stderr_logging(cli_level, &config.log.level)?;
        println!("Starting soba in foreground mode...");
        return run_scheduler(config).await;
    }

    if DaemonManager::guard_is_set() {
        // Detached child: logging, session, PID file, watchers.
        setup_file_logging(cli_level, &config.log)?;
        let manager = DaemonManager::new();
        reconcile_session(&config.github.repository).await?;
        manager.register_self()?;
        return run_scheduler(config).await;
    }

    // Parent: spawn the detached child and exit.
    let manager = DaemonManager::new();
    let pid = manager.spawn_detached()?;
    println!("soba daemon started (PID: {})", pid);
    Ok(())
}

/// Stop the daemon and kill the canonical session.
fn cmd_stop(config: &Config) -> Result<()> {
    let session = session_name(&config.github.repository);
    let manager = DaemonManager::new();
    let pid = manager.read_pid();
    manager.stop(Some(&session))?;
    match pid {
        Some(pid) => println!("soba stopped (was PID: {})", pid),
        None => println!("soba stopped"),
    }
    Ok(())
}

/// Print daemon run state, session existence, and tracked issues.
async fn cmd_status(config: &Config) -> Result<()> {
    let manager = DaemonManager::new();
    let status = manager.status();

    println!("soba status");
    println!("-----------");
    if status.running {
        println!("Daemon: running (PID: {})", status.pid.unwrap_or_default());
    } else {
        println!("Daemon: stopped");
    }
    println!("PID file: {}", status.pid_file.display());

    let session = session_name(&config.github.repository);
    let tmux = TmuxClient;
    match tmux.session_exists(&session).await {
        Ok(exists) => println!("Session {}: {}", session, if exists { "present" } else { "absent" }),
        Err(e) => println!("Session {}: unknown ({})", session, e),
    }

    if config.validate().is_err() {
        println!("Issues: unavailable (github.repository is not configured)");
        return Ok(());
    }

    match list_tracked_issues(config).await {
        Ok(lines) if lines.is_empty() => println!("Issues: none tracked"),
        Ok(lines) => {
            println!("Issues:");
            for line in lines {
                println!("  {}", line);
            }
        }
        Err(e) => println!("Issues: unavailable ({})", e),
    }

    Ok(())
}

async fn list_tracked_issues(config: &Config) -> Result<Vec<String>> {
    let token = resolve_token()?;
    let client = GithubClient::new(&config.github.repository, token, Shutdown::never())?;
    let issues = client.list_open_issues().await?;
    let lines = issues
        .iter()
        .filter(|i| i.carries_reserved_label())
        .map(|issue| {
            let phase = classify(issue.label_names())
                .map(|p| p.to_string())
                .unwrap_or_else(|e| format!("unclassified: {}", e));
            format!("#{} {} [{}]", issue.number, issue.title, phase)
        })
        .collect();
    Ok(lines)
}

async fn reconcile_session(repository: &str) -> Result<()> {
    let session = session_name(repository);
    let tmux = TmuxClient;
    if !tmux.session_exists(&session).await? {
        tmux.create_session(&session).await?;
        info!(%session, "created canonical session");
    }
    Ok(())
}

/// Build the drivers and run the three watchers until a signal arrives.
async fn run_scheduler(config: &Config) -> Result<()> {
    reconcile_session(&config.github.repository).await?;

    let (trigger, shutdown) = shutdown::channel();

    let token = resolve_token()?;
    let github: Arc<dyn GithubPort> = Arc::new(GithubClient::new(
        &config.github.repository,
        token,
        shutdown.clone(),
    )?);
    let tmux: Arc<dyn TmuxPort> = Arc::new(TmuxClient);
    let worktree = Arc::new(WorktreeManager::new(WorktreeConfig {
        base_dir: config.git.worktree_base_path.clone(),
        repo_root: std::path::PathBuf::from("."),
        base_branch: config.git.base_branch.clone(),
    }));

    let session = session_name(&config.github.repository);
    let executor = WorkflowExecutor::new(
        github.clone(),
        tmux.clone(),
        worktree,
        ExecutorConfig {
            session: session.clone(),
            pane_cap: DEFAULT_PANE_CAP,
            command_delay: config.workflow.command_delay(),
            phases: config.phase.clone(),
        },
    );
    let queue = QueueManager::new(github.clone());

    let issue_watcher = IssueWatcher::new(github.clone(), queue, executor, config.workflow.tick_interval());
    let pr_watcher = PrWatcher::new(github.clone(), config.workflow.tick_interval());
    let cleanup_watcher = CleanupWatcher::new(
        github,
        tmux,
        session,
        config.workflow.cleanup_interval(),
        config.workflow.closed_issue_cleanup_enabled,
    );

    // First signal cancels all watchers; the join below fans them back in.
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => warn!("SIGINT received"),
                _ = sigterm.recv() => warn!("SIGTERM received"),
            }
            trigger.trigger();
        });
    }
    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            trigger.trigger();
        });
    }

    info!("scheduler running");
    tokio::try_join!(
        issue_watcher.run(shutdown.clone()),
        pr_watcher.run(shutdown.clone()),
        cleanup_watcher.run(shutdown),
    )?;

    debug!("all watchers returned");
    info!("scheduler stopped");
    Ok(())
}
