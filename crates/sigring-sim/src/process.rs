// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Child process management for the simulation roles.
//!
//! Every role runs as a subcommand of the same `sigring-sim` executable, so
//! the launcher only needs the executable path and the log level to forward.

use crate::error::{Result, SimError};
use sigring::{Pid, Signal};
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Builds commands that re-enter this executable under another role.
#[derive(Debug, Clone)]
pub struct Launcher {
    exe: PathBuf,
    log_level: String,
}

impl Launcher {
    pub fn new(exe: impl Into<PathBuf>, log_level: impl Into<String>) -> Self {
        Self {
            exe: exe.into(),
            log_level: log_level.into(),
        }
    }

    /// Launcher for the running executable.
    pub fn current(log_level: impl Into<String>) -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?, log_level))
    }

    pub fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(&self.exe);
        cmd.arg("--log-level").arg(&self.log_level).arg(subcommand);
        cmd
    }

    pub fn spawn(&self, role: impl Into<String>, mut cmd: Command) -> Result<SimChild> {
        let role = role.into();
        let child = cmd.spawn().map_err(|source| SimError::Spawn {
            role: role.clone(),
            source,
        })?;
        debug!("spawned {} (pid {})", role, child.id());
        Ok(SimChild { role, child })
    }
}

/// A spawned role process.
#[derive(Debug)]
pub struct SimChild {
    role: String,
    child: Child,
}

impl SimChild {
    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn pid(&self) -> Pid {
        // child pids always fit and are positive
        Pid::new(self.child.id() as i32).unwrap_or_else(Pid::current)
    }

    /// Non-blocking exit check.
    pub fn try_exit(&mut self) -> Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    pub fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.child.wait()?)
    }

    /// Ask the child to stop with `SIGTERM`, then kill it after `grace`.
    pub fn terminate(&mut self, grace: Duration) -> Result<ExitStatus> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(status);
        }
        if let Err(e) = sigring::gate::raise(self.pid(), Signal::SIGTERM) {
            debug!("SIGTERM to {} failed: {}", self.role, e);
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            thread::sleep(Duration::from_millis(10));
        }

        warn!("{} ignored SIGTERM, killing", self.role);
        self.child.kill()?;
        Ok(self.child.wait()?)
    }

    /// Kill without grace, ignoring a child that already exited.
    pub fn kill(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Scheduling state of a process as reported by `/proc/<pid>/stat`.
///
/// `'T'` means stopped. Returns `None` if the process is gone.
pub fn process_state(pid: Pid) -> Option<char> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // comm may contain spaces and parentheses; the state follows the last ')'
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.trim_start().chars().next()
}

pub fn is_stopped(pid: Pid) -> bool {
    matches!(process_state(pid), Some('T' | 't'))
}

/// Suspend the calling process until someone sends `SIGCONT`.
pub fn suspend_self() -> io::Result<()> {
    // SAFETY: raise has no memory-safety preconditions
    let rc = unsafe { libc::raise(libc::SIGSTOP) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

static TERM_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_term(_: libc::c_int) {
    TERM_REQUESTED.store(true, Ordering::SeqCst);
}

/// Route `SIGTERM` to a stop flag instead of the default termination.
///
/// Installed without `SA_RESTART`, so a blocking channel wait returns
/// `InterruptedWait` and the caller can check [`term_requested`].
pub fn install_term_handler() -> io::Result<()> {
    // SAFETY: sigaction is plain data; zeroed is a valid "no flags, empty mask" value
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    action.sa_sigaction = on_term as extern "C" fn(libc::c_int) as libc::sighandler_t;
    action.sa_flags = 0;
    // SAFETY: action is initialized; the handler only touches an atomic
    let rc = unsafe {
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(libc::SIGTERM, &action, std::ptr::null_mut())
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn term_requested() -> bool {
    TERM_REQUESTED.load(Ordering::SeqCst)
}

/// Current parent pid, to detect being orphaned.
pub fn parent_pid() -> i32 {
    // SAFETY: getppid cannot fail
    unsafe { libc::getppid() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_state_self_running() {
        let state = process_state(Pid::current()).expect("own /proc entry");
        assert!(matches!(state, 'R' | 'S'), "unexpected state {state}");
        assert!(!is_stopped(Pid::current()));
    }

    #[test]
    fn test_process_state_missing() {
        assert_eq!(process_state(Pid::new(i32::MAX).unwrap()), None);
    }

    #[test]
    fn test_stopped_child_detected() {
        let mut child = Command::new("sleep").arg("5").spawn().unwrap();
        let pid = Pid::new(child.id() as i32).unwrap();
        // SAFETY: plain kill on our own child
        unsafe { libc::kill(pid.as_raw(), libc::SIGSTOP) };

        let deadline = Instant::now() + Duration::from_secs(2);
        while !is_stopped(pid) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(is_stopped(pid));

        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn test_terminate_child() {
        let launcher = Launcher::new("sleep", "info");
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let mut child = launcher.spawn("sleeper", cmd).unwrap();
        assert_eq!(child.role(), "sleeper");
        assert!(child.try_exit().unwrap().is_none());
        let status = child.terminate(Duration::from_secs(2)).unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_launcher_command_args() {
        let launcher = Launcher::new("/bin/true", "debug");
        let cmd = launcher.command("worker");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["--log-level", "debug", "worker"]);
    }
}
