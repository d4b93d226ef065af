// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Worker process: executes a simulated instruction stream.
//!
//! For each program counter the worker reports its status to the kernel and
//! spends one tick "executing". At an I/O point it issues a syscall message
//! and suspends itself with `SIGSTOP` until the kernel resumes it.

use crate::error::Result;
use crate::message::{AppMessage, WIRE_SIZE};
use crate::process;
use crate::profile::WorkerPlan;
use sigring::{block_target_signals, gate, Channel, PeerConfig, Pid, Signal};
use std::time::Duration;
use tracing::{debug, info};

/// Worker settings.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// App -> kernel channel name
    pub channel: String,
    /// 1-based worker index
    pub index: u32,
    pub kernel: Pid,
    pub plan: WorkerPlan,
    pub max_pc: u32,
    pub tick: Duration,
    /// Raised at the kernel when data is available
    pub data_signal: Signal,
    /// Raised at this worker when space is available
    pub space_signal: Signal,
}

/// What a worker did before exiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub statuses: u32,
    pub syscalls: u32,
}

struct WorkerContext {
    pid: i32,
    channel: Channel,
    opts: WorkerOptions,
    report: WorkerReport,
}

impl WorkerContext {
    fn send(&mut self, msg: AppMessage) -> Result<()> {
        self.channel.send(&msg.encode())?;
        Ok(())
    }

    fn step(&mut self, pc: u32) -> Result<()> {
        self.send(AppMessage::status(self.pid, pc))?;
        self.report.statuses += 1;
        std::thread::sleep(self.opts.tick);

        if let Some(direction) = self.opts.plan.io_at(pc) {
            debug!("worker {} pc={} syscall {}", self.opts.index, pc, direction);
            self.send(AppMessage::syscall(self.pid, direction))?;
            self.report.syscalls += 1;

            process::suspend_self()?;

            // the resume SIGCONT may double as our space signal; it carries no data
            if self.opts.space_signal == Signal::SIGCONT {
                gate::drain_pending(Signal::SIGCONT)?;
            }
            debug!("worker {} resumed at pc={}", self.opts.index, pc);
        }
        Ok(())
    }
}

/// Run one worker to completion.
pub fn run_worker(opts: WorkerOptions) -> Result<WorkerReport> {
    block_target_signals(Some(opts.data_signal), Some(opts.space_signal))?;

    let mut channel = Channel::open_with_element_size(&opts.channel, WIRE_SIZE)?;
    channel.configure(PeerConfig::new(
        opts.data_signal,
        opts.space_signal,
        opts.kernel,
    ))?;

    info!(
        "worker {} (pid {}) started: io_points={:?}",
        opts.index,
        Pid::current(),
        opts.plan.io_points()
    );

    let mut ctx = WorkerContext {
        pid: Pid::current().as_raw(),
        channel,
        opts,
        report: WorkerReport::default(),
    };

    for pc in 1..=ctx.opts.max_pc {
        ctx.step(pc)?;
    }

    info!(
        "worker {} done: {} statuses, {} syscalls, {}",
        ctx.opts.index,
        ctx.report.statuses,
        ctx.report.syscalls,
        ctx.channel.metrics().snapshot()
    );
    let report = ctx.report;
    ctx.channel.close();
    Ok(report)
}
