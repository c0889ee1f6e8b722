//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// soba - GitHub issue-driven workflow scheduler
#[derive(Parser)]
#[command(
    name = "soba",
    about = "Drives labeled GitHub issues through plan/implement/review/merge with tmux workers",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the scheduler (foreground unless -d)
    Start {
        /// Detach and run as a daemon
        #[arg(short = 'd', long)]
        daemon: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Show daemon state, session state, and tracked issues
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_start() {
        let cli = Cli::parse_from(["soba", "start"]);
        assert!(matches!(cli.command, Command::Start { daemon: false }));
    }

    #[test]
    fn test_cli_parse_start_daemon() {
        let cli = Cli::parse_from(["soba", "start", "-d"]);
        assert!(matches!(cli.command, Command::Start { daemon: true }));
    }

    #[test]
    fn test_cli_parse_stop() {
        let cli = Cli::parse_from(["soba", "stop"]);
        assert!(matches!(cli.command, Command::Stop));
    }

    #[test]
    fn test_cli_parse_status() {
        let cli = Cli::parse_from(["soba", "status"]);
        assert!(matches!(cli.command, Command::Status));
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["soba", "-c", "/path/to/config.yml", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.yml")));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["soba"]).is_err());
    }
}
