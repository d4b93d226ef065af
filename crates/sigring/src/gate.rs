// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Notification gate: cross-process wait/wake built from signals.
//!
//! Two processes share the ring but no kernel synchronization object. A side
//! that finds the ring full (or empty) records its interest in a one-bit flag
//! in the shared header and sleeps until the peer raises the matching signal.
//!
//! # Blocked signals
//!
//! The notification signals are added to the thread's blocked mask with
//! [`block_target_signals`]. A blocked signal stays *pending* until
//! `sigwaitinfo` consumes it, so a wake raised between "mark interest" and
//! "start waiting" is not lost: the wait returns immediately. Standard signals
//! coalesce, so several wakes may collapse into one; the waiter always
//! re-checks the ring after waking, which makes that harmless.
//!
//! # Wait Protocol (waiter side)
//!
//! 1. Try the ring operation
//! 2. Mark interest (SeqCst store + fence)
//! 3. Re-try the ring operation (catches a peer that moved in between)
//! 4. Still blocked: wait for the signal, then go to 1
//!
//! # Wake Protocol (peer side)
//!
//! 1. Publish the index change (Release)
//! 2. Fence (SeqCst)
//! 3. Swap the interest flag to 0; if it was set, raise the signal

use crate::layout::{Interest, RingHeader};
use crate::{ChannelError, Result};
use std::fmt;
use std::io;
use std::ptr;
use std::str::FromStr;
use std::sync::atomic::{fence, Ordering};
use std::time::Duration;

/// Poll interval used when no signal is configured for a direction.
pub const FALLBACK_POLL: Duration = Duration::from_micros(500);

/// Signal number usable as a notification.
///
/// `SIGKILL` and `SIGSTOP` cannot be blocked or waited for and are rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Signal(i32);

impl Signal {
    pub const SIGHUP: Self = Self(libc::SIGHUP);
    pub const SIGALRM: Self = Self(libc::SIGALRM);
    pub const SIGCONT: Self = Self(libc::SIGCONT);
    pub const SIGWINCH: Self = Self(libc::SIGWINCH);
    pub const SIGUSR1: Self = Self(libc::SIGUSR1);
    pub const SIGUSR2: Self = Self(libc::SIGUSR2);
    pub const SIGTERM: Self = Self(libc::SIGTERM);
    pub const SIGURG: Self = Self(libc::SIGURG);

    const NAMES: &'static [(&'static str, i32)] = &[
        ("HUP", libc::SIGHUP),
        ("INT", libc::SIGINT),
        ("QUIT", libc::SIGQUIT),
        ("USR1", libc::SIGUSR1),
        ("USR2", libc::SIGUSR2),
        ("PIPE", libc::SIGPIPE),
        ("ALRM", libc::SIGALRM),
        ("TERM", libc::SIGTERM),
        ("CHLD", libc::SIGCHLD),
        ("CONT", libc::SIGCONT),
        ("TSTP", libc::SIGTSTP),
        ("TTIN", libc::SIGTTIN),
        ("TTOU", libc::SIGTTOU),
        ("URG", libc::SIGURG),
        ("XCPU", libc::SIGXCPU),
        ("XFSZ", libc::SIGXFSZ),
        ("VTALRM", libc::SIGVTALRM),
        ("PROF", libc::SIGPROF),
        ("WINCH", libc::SIGWINCH),
        ("IO", libc::SIGIO),
        ("SYS", libc::SIGSYS),
    ];

    /// Validate a raw signal number.
    pub fn new(signo: i32) -> Result<Self> {
        if signo <= 0 || signo > libc::SIGRTMAX() {
            return Err(ChannelError::InvalidSignal(signo));
        }
        if signo == libc::SIGKILL || signo == libc::SIGSTOP {
            return Err(ChannelError::InvalidSignal(signo));
        }
        Ok(Self(signo))
    }

    #[inline]
    #[must_use]
    pub fn as_raw(self) -> i32 {
        self.0
    }

    /// Symbolic name (`SIGALRM`), or `SIG<n>` for unnamed numbers.
    #[must_use]
    pub fn name(self) -> String {
        Self::NAMES
            .iter()
            .find(|(_, n)| *n == self.0)
            .map_or_else(|| format!("SIG{}", self.0), |(s, _)| format!("SIG{s}"))
    }
}

impl FromStr for Signal {
    type Err = ChannelError;

    /// Accepts `SIGALRM`, `ALRM` (any case) or a number such as `14`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Ok(n) = trimmed.parse::<i32>() {
            return Self::new(n);
        }
        let upper = trimmed.to_ascii_uppercase();
        let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
        Self::NAMES
            .iter()
            .find(|(name, _)| *name == bare)
            .map(|(_, n)| Self(*n))
            .ok_or(ChannelError::InvalidSignal(-1))
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Process id of the peer that receives our notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pid(libc::pid_t);

impl Pid {
    /// Wrap a positive process id; `0` and negatives would address process groups.
    #[must_use]
    pub fn new(pid: i32) -> Option<Self> {
        (pid > 0).then_some(Self(pid))
    }

    /// Id of the calling process
    #[must_use]
    pub fn current() -> Self {
        Self(std::process::id() as libc::pid_t)
    }

    #[inline]
    #[must_use]
    pub fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn sigset_of(signals: &[Signal]) -> libc::sigset_t {
    // SAFETY: sigset_t is plain data; sigemptyset initializes it before use
    let mut set: libc::sigset_t = unsafe { std::mem::zeroed() };
    // SAFETY: set is a valid, writable sigset_t; signal numbers are validated
    unsafe {
        libc::sigemptyset(&mut set);
        for sig in signals {
            libc::sigaddset(&mut set, sig.as_raw());
        }
    }
    set
}

fn change_mask(how: libc::c_int, signals: &[Signal]) -> Result<()> {
    let set = sigset_of(signals);
    // SAFETY: set is initialized; old mask is not requested
    let rc = unsafe { libc::pthread_sigmask(how, &set, ptr::null_mut()) };
    if rc != 0 {
        return Err(ChannelError::SignalMask(io::Error::from_raw_os_error(rc)));
    }
    Ok(())
}

/// Block the notification signals in the calling thread.
///
/// Must run before the first blocking `send`/`receive`, and before spawning
/// threads that should inherit the mask. `None` entries are skipped.
pub fn block_target_signals(a: Option<Signal>, b: Option<Signal>) -> Result<()> {
    let signals: Vec<Signal> = [a, b].into_iter().flatten().collect();
    if signals.is_empty() {
        return Ok(());
    }
    change_mask(libc::SIG_BLOCK, &signals)?;
    log::debug!(
        "[GATE] blocked {}",
        signals
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

/// Suspend the calling thread until `signal` is pending, then consume it.
///
/// Returns [`ChannelError::InterruptedWait`] if a handled, non-target signal
/// interrupts the wait. With `None` the wait is a short fallback sleep.
pub fn wait_for(signal: Option<Signal>) -> Result<()> {
    let Some(signal) = signal else {
        std::thread::sleep(FALLBACK_POLL);
        return Ok(());
    };

    let set = sigset_of(&[signal]);
    loop {
        // SAFETY: set is initialized; info pointer may be null
        let rc = unsafe { libc::sigwaitinfo(&set, ptr::null_mut()) };
        if rc == signal.as_raw() {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            log::debug!("[GATE] wait for {} interrupted", signal);
            return Err(ChannelError::InterruptedWait);
        }
        if rc < 0 {
            return Err(ChannelError::SignalMask(err));
        }
    }
}

/// Like [`wait_for`] but gives up after `timeout`; returns whether the signal arrived.
pub fn wait_for_timeout(signal: Signal, timeout: Duration) -> Result<bool> {
    let set = sigset_of(&[signal]);
    let ts = libc::timespec {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_nsec: timeout.subsec_nanos() as libc::c_long,
    };
    // SAFETY: set and ts are initialized; info pointer may be null
    let rc = unsafe { libc::sigtimedwait(&set, ptr::null_mut(), &ts) };
    if rc == signal.as_raw() {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EAGAIN) => Ok(false),
        Some(libc::EINTR) => Err(ChannelError::InterruptedWait),
        _ => Err(ChannelError::SignalMask(err)),
    }
}

/// Consume any already-pending instances of `signal` without waiting.
///
/// Returns `true` if one was pending.
pub fn drain_pending(signal: Signal) -> Result<bool> {
    let mut drained = false;
    while wait_for_timeout(signal, Duration::ZERO)? {
        drained = true;
    }
    Ok(drained)
}

/// Send `signal` to `peer`.
pub fn raise(peer: Pid, signal: Signal) -> Result<()> {
    // SAFETY: kill has no memory-safety preconditions; pid is positive
    let rc = unsafe { libc::kill(peer.as_raw(), signal.as_raw()) };
    if rc < 0 {
        return Err(ChannelError::Notify(io::Error::last_os_error()));
    }
    log::trace!("[GATE] raised {} -> pid {}", signal, peer);
    Ok(())
}

/// Record that this side is about to wait.
///
/// The fence orders the flag store before the caller's re-check of the ring,
/// pairing with the fence in [`take_interest`] on the peer side.
#[inline]
pub fn mark_interest(header: &RingHeader, interest: Interest) {
    header.interest(interest).store(1, Ordering::SeqCst);
    fence(Ordering::SeqCst);
}

/// Clear the peer's interest flag, returning whether it was set.
///
/// Called right after publishing an index change.
#[inline]
pub fn take_interest(header: &RingHeader, interest: Interest) -> bool {
    fence(Ordering::SeqCst);
    header.interest(interest).swap(0, Ordering::SeqCst) != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_signal_validation() {
        assert!(Signal::new(libc::SIGALRM).is_ok());
        assert!(Signal::new(0).is_err());
        assert!(Signal::new(-3).is_err());
        assert!(Signal::new(libc::SIGKILL).is_err());
        assert!(Signal::new(libc::SIGSTOP).is_err());
        assert!(Signal::new(libc::SIGRTMAX() + 1).is_err());
    }

    #[test]
    fn test_signal_parse() {
        assert_eq!("SIGALRM".parse::<Signal>().unwrap(), Signal::SIGALRM);
        assert_eq!("winch".parse::<Signal>().unwrap(), Signal::SIGWINCH);
        assert_eq!("1".parse::<Signal>().unwrap(), Signal::SIGHUP);
        assert!("SIGNOPE".parse::<Signal>().is_err());
        assert!("9".parse::<Signal>().is_err());
    }

    #[test]
    fn test_signal_name() {
        assert_eq!(Signal::SIGCONT.to_string(), "SIGCONT");
        assert_eq!(Signal::SIGUSR2.name(), "SIGUSR2");
    }

    #[test]
    fn test_pid() {
        assert!(Pid::new(0).is_none());
        assert!(Pid::new(-1).is_none());
        assert_eq!(Pid::new(42).unwrap().as_raw(), 42);
        assert_eq!(Pid::current().as_raw() as u32, std::process::id());
    }

    #[test]
    fn test_interest_flags() {
        let header = RingHeader::new(4, 4);
        assert!(!take_interest(&header, Interest::ReaderWaiting));

        mark_interest(&header, Interest::ReaderWaiting);
        assert!(take_interest(&header, Interest::ReaderWaiting));
        // cleared by take
        assert!(!take_interest(&header, Interest::ReaderWaiting));
        assert!(!take_interest(&header, Interest::WriterWaiting));
    }

    #[test]
    fn test_fallback_wait_sleeps_briefly() {
        let start = Instant::now();
        wait_for(None).unwrap();
        assert!(start.elapsed() >= FALLBACK_POLL);
    }

    // The tests below direct signals at a single thread with pthread_kill so the
    // rest of the test process never sees them.

    #[test]
    fn test_pending_signal_ends_wait() {
        thread::spawn(|| {
            block_target_signals(Some(Signal::SIGWINCH), None).unwrap();
            // SAFETY: targets the current thread with a blocked signal
            unsafe { libc::pthread_kill(libc::pthread_self(), libc::SIGWINCH) };
            // Raised before the wait starts: must not be lost.
            wait_for(Some(Signal::SIGWINCH)).unwrap();
            assert!(!drain_pending(Signal::SIGWINCH).unwrap());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_wait_timeout_without_signal() {
        thread::spawn(|| {
            block_target_signals(Some(Signal::SIGURG), None).unwrap();
            let arrived = wait_for_timeout(Signal::SIGURG, Duration::from_millis(20)).unwrap();
            assert!(!arrived);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_drain_pending_coalesces() {
        thread::spawn(|| {
            block_target_signals(Some(Signal::SIGCONT), None).unwrap();
            for _ in 0..3 {
                // SAFETY: targets the current thread with a blocked signal
                unsafe { libc::pthread_kill(libc::pthread_self(), libc::SIGCONT) };
            }
            assert!(drain_pending(Signal::SIGCONT).unwrap());
            assert!(!drain_pending(Signal::SIGCONT).unwrap());
        })
        .join()
        .unwrap();
    }

    static HANDLED: AtomicBool = AtomicBool::new(false);

    extern "C" fn note_signal(_: libc::c_int) {
        HANDLED.store(true, Ordering::SeqCst);
    }

    #[test]
    fn test_non_target_signal_interrupts_wait() {
        // SAFETY: installs a trivial async-signal-safe handler for SIGPROF,
        // without SA_RESTART so sigwaitinfo reports EINTR.
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = note_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(libc::SIGPROF, &action, ptr::null_mut());
        }

        let (tx, rx) = mpsc::channel();
        let waiter = thread::spawn(move || {
            let target = Signal::new(libc::SIGXCPU).unwrap();
            block_target_signals(Some(target), None).unwrap();
            // SAFETY: pthread_self has no preconditions
            tx.send(unsafe { libc::pthread_self() } as usize).unwrap();
            wait_for(Some(target))
        });

        let tid = rx.recv().unwrap() as libc::pthread_t;
        thread::sleep(Duration::from_millis(50));
        // SAFETY: tid refers to the live waiter thread, which has SIGPROF unblocked
        unsafe { libc::pthread_kill(tid, libc::SIGPROF) };

        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(ChannelError::InterruptedWait)));
        assert!(HANDLED.load(Ordering::SeqCst));
    }

    #[test]
    fn test_raise_to_missing_process_fails() {
        // Highest pid values are never assigned on default Linux configs.
        let ghost = Pid::new(i32::MAX).unwrap();
        assert!(matches!(
            raise(ghost, Signal::SIGURG),
            Err(ChannelError::Notify(_))
        ));
    }

    #[test]
    fn test_mark_then_take_across_threads() {
        let header = std::sync::Arc::new(RingHeader::new(4, 4));
        let seen = std::sync::Arc::new(AtomicU32::new(0));

        let h = std::sync::Arc::clone(&header);
        let s = std::sync::Arc::clone(&seen);
        let peer = thread::spawn(move || {
            while !take_interest(&h, Interest::WriterWaiting) {
                thread::yield_now();
            }
            s.store(1, Ordering::SeqCst);
        });

        mark_interest(&header, Interest::WriterWaiting);
        peer.join().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
