//! Daemon process management.
//!
//! Handles the detach dance, PID file management, and process control. The
//! daemon is started by re-invoking the current executable with the same
//! arguments and a guard environment variable set; the parent exits and the
//! detached child, seeing the guard, proceeds as the real daemon.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Guard variable distinguishing the detached child from the parent.
pub const GUARD_ENV: &str = "SOBA_DAEMON";

/// How long `stop` waits for a graceful exit before SIGKILL.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);
const STOP_POLL: Duration = Duration::from_millis(100);

/// Daemon process manager.
#[derive(Debug)]
pub struct DaemonManager {
    pid_file: PathBuf,
}

impl Default for DaemonManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonManager {
    /// Manager rooted at the current working directory.
    pub fn new() -> Self {
        Self::with_workdir(Path::new("."))
    }

    /// PID file lives at `<workdir>/.soba/soba.pid`.
    pub fn with_workdir(workdir: &Path) -> Self {
        Self {
            pid_file: workdir.join(".soba").join("soba.pid"),
        }
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    /// True in the detached child.
    pub fn guard_is_set() -> bool {
        std::env::var_os(GUARD_ENV).is_some()
    }

    fn read_pid_raw(&self) -> Option<String> {
        let mut file = fs::File::open(&self.pid_file).ok()?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).ok()?;
        Some(contents)
    }

    /// Read the PID, tolerating trailing whitespace.
    pub fn read_pid(&self) -> Option<u32> {
        self.read_pid_raw().and_then(|s| s.trim().parse().ok())
    }

    pub fn is_running(&self) -> bool {
        self.running_pid().is_some()
    }

    pub fn running_pid(&self) -> Option<u32> {
        self.read_pid().filter(|&pid| is_process_running(pid))
    }

    /// Write the current process's PID, mode 0600.
    pub fn register_self(&self) -> Result<()> {
        let pid = std::process::id();
        debug!(pid, path = %self.pid_file.display(), "writing PID file");
        if let Some(parent) = self.pid_file.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::wrap_as(crate::error::Kind::Internal, "failed to create PID directory", e))?;
        }
        fs::write(&self.pid_file, pid.to_string())
            .map_err(|e| Error::wrap_as(crate::error::Kind::Internal, "failed to write PID file", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            let _ = fs::set_permissions(&self.pid_file, perms);
        }
        info!(pid, "daemon registered");
        Ok(())
    }

    pub fn remove_pid_file(&self) -> Result<()> {
        if self.pid_file.exists() {
            fs::remove_file(&self.pid_file)
                .map_err(|e| Error::wrap_as(crate::error::Kind::Internal, "failed to remove PID file", e))?;
            debug!(path = %self.pid_file.display(), "removed PID file");
        }
        Ok(())
    }

    /// Re-invoke the current executable with the same arguments, detached
    /// from the controlling terminal. Returns the child PID; the caller
    /// (the parent) is expected to exit. A stale PID file from a crashed
    /// daemon is cleared automatically.
    pub fn spawn_detached(&self) -> Result<u32> {
        if let Some(pid) = self.running_pid() {
            return Err(Error::conflict("daemon already running").context("pid", pid));
        }
        if self.pid_file.exists() {
            debug!("clearing stale PID file");
            self.remove_pid_file()?;
        }

        let exe = std::env::current_exe()
            .map_err(|e| Error::wrap_as(crate::error::Kind::Internal, "failed to resolve current executable", e))?;
        let args: Vec<String> = std::env::args().skip(1).collect();
        debug!(exe = %exe.display(), ?args, "spawning detached daemon");

        let mut command = Command::new(&exe);
        command
            .args(&args)
            .env(GUARD_ENV, "1")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // New process group: survives the parent's terminal going away.
            command.process_group(0);
        }
        let child = command
            .spawn()
            .map_err(|e| Error::wrap_as(crate::error::Kind::Internal, "failed to spawn daemon process", e))?;

        let pid = child.id();
        info!(pid, "daemon spawned");
        Ok(pid)
    }

    /// Graceful stop: SIGTERM, poll up to the timeout, SIGKILL as a last
    /// resort, then best-effort session kill and PID file removal.
    pub fn stop(&self, session: Option<&str>) -> Result<()> {
        let raw = self
            .read_pid_raw()
            .ok_or_else(|| Error::not_found("daemon is not running"))?;
        let pid: u32 = raw
            .trim()
            .parse()
            .map_err(|_| Error::internal("PID file is corrupt").context("path", self.pid_file.display()))?;

        if !is_process_running(pid) {
            debug!(pid, "process already dead, clearing PID file");
            self.remove_pid_file()?;
            return Err(Error::not_found("daemon is not running").context("stale_pid", pid));
        }

        info!(pid, "stopping daemon");
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
                .map_err(|e| Error::wrap_as(crate::error::Kind::External, "failed to send SIGTERM", e))?;

            let mut waited = Duration::ZERO;
            while is_process_running(pid) && waited < STOP_TIMEOUT {
                std::thread::sleep(STOP_POLL);
                waited += STOP_POLL;
            }

            if is_process_running(pid) {
                warn!(pid, "daemon did not stop gracefully, sending SIGKILL");
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            }
        }

        if let Some(session) = session {
            debug!(session, "killing canonical session");
            let _ = Command::new("tmux")
                .args(["kill-session", "-t", &format!("={}", session)])
                .output();
        }

        self.remove_pid_file()?;
        info!(pid, "daemon stopped");
        Ok(())
    }

    pub fn status(&self) -> DaemonStatus {
        let pid = self.running_pid();
        DaemonStatus {
            running: pid.is_some(),
            pid,
            pid_file: self.pid_file.clone(),
        }
    }
}

/// Signal 0 probes for existence without affecting the process.
fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

/// Daemon status information.
#[derive(Debug)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub pid_file: PathBuf,
}
