// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Interrupt controller process.
//!
//! Receives I/O requests from the kernel and raises IRQ1 at the kernel once
//! the simulated I/O has taken `io_delay`. A timer child raises IRQ0 every
//! period. `SIGTERM` stops both.

use crate::error::{Result, SimError};
use crate::message::{IcMessage, WIRE_SIZE};
use crate::process::{self, Launcher, SimChild};
use sigring::{block_target_signals, gate, Channel, ChannelError, PeerConfig, Pid, Signal};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Granularity of the I/O delay sleep, so `SIGTERM` is noticed promptly.
const DELAY_SLICE: Duration = Duration::from_millis(50);

/// Longest receive wait between stop-flag checks. A `SIGTERM` landing after
/// the check but before the wait starts only runs the handler, so the wait
/// has to end on its own.
const RECEIVE_SLICE: Duration = Duration::from_millis(200);

/// Controller settings.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Kernel -> controller channel name
    pub channel: String,
    pub kernel: Pid,
    pub io_delay: Duration,
    pub timer_period: Duration,
    pub data_signal: Signal,
    pub space_signal: Signal,
    pub irq0: Signal,
    pub irq1: Signal,
}

/// Timer settings.
#[derive(Debug, Clone, Copy)]
pub struct TimerOptions {
    pub kernel: Pid,
    pub period: Duration,
    pub irq0: Signal,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControllerReport {
    pub io_requests: u64,
    pub irq1_raised: u64,
}

/// Sleep `total`, returning early (with `false`) once `stop` reports true.
fn interruptible_sleep(total: Duration, stop: &dyn Fn() -> bool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if stop() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(DELAY_SLICE.min(deadline - now));
    }
}

fn spawn_timer(launcher: &Launcher, opts: &ControllerOptions) -> Result<SimChild> {
    let mut cmd = launcher.command("timer");
    cmd.arg("--kernel-pid")
        .arg(opts.kernel.to_string())
        .arg("--period-ms")
        .arg(opts.timer_period.as_millis().to_string())
        .arg("--signal")
        .arg(opts.irq0.to_string());
    launcher.spawn("timer", cmd)
}

/// Run the controller until `SIGTERM` or until the kernel disappears.
pub fn run_controller(opts: ControllerOptions, launcher: &Launcher) -> Result<ControllerReport> {
    process::install_term_handler()?;
    block_target_signals(Some(opts.data_signal), Some(opts.space_signal))?;

    let mut channel = Channel::open_with_element_size(&opts.channel, WIRE_SIZE)?;
    channel.configure(PeerConfig::new(
        opts.data_signal,
        opts.space_signal,
        opts.kernel,
    ))?;

    let mut timer = spawn_timer(launcher, &opts)?;
    info!(
        "controller (pid {}) serving kernel {}, timer pid {}",
        Pid::current(),
        opts.kernel,
        timer.pid()
    );

    let outcome = serve(&channel, &opts, &process::term_requested);

    if let Err(e) = timer.terminate(Duration::from_secs(1)) {
        warn!("timer shutdown failed: {}", e);
    }
    channel.close();

    let report = outcome?;
    info!(
        "controller done: {} io requests, {} IRQ1",
        report.io_requests, report.irq1_raised
    );
    Ok(report)
}

fn serve(
    channel: &Channel,
    opts: &ControllerOptions,
    stop: &dyn Fn() -> bool,
) -> Result<ControllerReport> {
    let mut report = ControllerReport::default();
    let mut buf = [0u8; WIRE_SIZE];

    while !stop() {
        match channel.receive_timeout(&mut buf, RECEIVE_SLICE) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(ChannelError::InterruptedWait) => {
                if !stop() {
                    debug!("receive interrupted, retrying");
                }
                continue;
            }
            Err(e) => return Err(e.into()),
        }

        let msg = match IcMessage::decode(&buf) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("dropping malformed message: {}", e);
                continue;
            }
        };

        match msg {
            IcMessage::IoStart { pid } => {
                report.io_requests += 1;
                debug!("io start for pid {}", pid);
                if !interruptible_sleep(opts.io_delay, stop) {
                    break;
                }
                match gate::raise(opts.kernel, opts.irq1) {
                    Ok(()) => report.irq1_raised += 1,
                    Err(e) => {
                        warn!("kernel unreachable, stopping: {}", e);
                        break;
                    }
                }
            }
        }
    }
    Ok(report)
}

/// Raise IRQ0 at the kernel every period.
///
/// Stops when the kernel cannot be signalled or this process is orphaned.
pub fn run_timer(opts: TimerOptions) -> Result<u64> {
    let parent = process::parent_pid();
    let mut ticks = 0u64;
    loop {
        thread::sleep(opts.period);
        if process::parent_pid() != parent {
            debug!("timer orphaned after {} ticks", ticks);
            break;
        }
        match gate::raise(opts.kernel, opts.irq0) {
            Ok(()) => ticks += 1,
            Err(ChannelError::Notify(e)) => {
                debug!("kernel gone after {} ticks: {}", ticks, e);
                break;
            }
            Err(e) => return Err(SimError::Channel(e)),
        }
    }
    Ok(ticks)
}
