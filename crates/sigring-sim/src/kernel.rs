// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Kernel process: owns every channel and drives the simulation.
//!
//! # Topology
//!
//! ```text
//!  worker 1 ──app channel──┐
//!  worker 2 ──app channel──┤                      ┌── IRQ0 (timer child)
//!     ...                  ├──> kernel ──ic channel──> controller
//!  worker N ──app channel──┘      ^                   │
//!                                 └────── IRQ1 ───────┘
//! ```
//!
//! The kernel polls the app channels without blocking, forwards each I/O
//! syscall to the controller, and resumes the oldest I/O-blocked worker with
//! `SIGCONT` on every IRQ1. It ends once all workers have exited.

use crate::config::{SignalSet, SimConfig};
use crate::error::{Result, SimError};
use crate::message::{AppKind, AppMessage, IcMessage, WIRE_SIZE};
use crate::process::{self, Launcher, SimChild};
use sigring::{block_target_signals, gate, Channel, PeerConfig, Pid, Signal};
use std::collections::VecDeque;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Main loop period.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Time the controller gets to honour `SIGTERM`.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Running,
    BlockedIo,
    Exited,
}

struct WorkerSlot {
    index: u32,
    channel: Channel,
    child: Option<SimChild>,
    state: WorkerState,
    last_pc: u32,
    statuses: u32,
    syscalls: u32,
    exit_code: Option<i32>,
}

impl WorkerSlot {
    fn pid(&self) -> Option<Pid> {
        self.child.as_ref().map(SimChild::pid)
    }
}

/// Per-worker outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub index: u32,
    pub pid: i32,
    pub last_pc: u32,
    pub statuses: u32,
    pub syscalls: u32,
    pub exit_code: Option<i32>,
}

/// Outcome of a whole simulation run.
#[derive(Debug, Clone, Default)]
pub struct KernelReport {
    pub ticks: u64,
    pub io_requests: u64,
    pub irq1: u64,
    pub elapsed: Duration,
    pub workers: Vec<WorkerSummary>,
}

impl KernelReport {
    /// Whether every worker exited with status 0.
    pub fn all_succeeded(&self) -> bool {
        self.workers.iter().all(|w| w.exit_code == Some(0))
    }
}

impl fmt::Display for KernelReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Simulation summary")?;
        writeln!(f, "==================")?;
        writeln!(
            f,
            "elapsed: {:.2}s  ticks: {}  io requests: {}  irq1: {}",
            self.elapsed.as_secs_f64(),
            self.ticks,
            self.io_requests,
            self.irq1
        )?;
        writeln!(
            f,
            "{:<8} {:>8} {:>8} {:>9} {:>9} {:>6}",
            "worker", "pid", "last_pc", "statuses", "syscalls", "exit"
        )?;
        for w in &self.workers {
            let exit = w
                .exit_code
                .map_or_else(|| "-".to_string(), |c| c.to_string());
            writeln!(
                f,
                "{:<8} {:>8} {:>8} {:>9} {:>9} {:>6}",
                format!("A{}", w.index),
                w.pid,
                w.last_pc,
                w.statuses,
                w.syscalls,
                exit
            )?;
        }
        Ok(())
    }
}

/// Channel names are scoped by kernel pid so concurrent runs do not collide.
pub fn app_channel_name(index: u32, kernel: Pid) -> String {
    format!("/sigring_app{index}_{kernel}")
}

pub fn ic_channel_name(kernel: Pid) -> String {
    format!("/sigring_ic_{kernel}")
}

struct Kernel {
    pid: Pid,
    signals: SignalSet,
    ic: Channel,
    ic_name: String,
    controller: Option<SimChild>,
    workers: Vec<WorkerSlot>,
    io_queue: VecDeque<usize>,
    pending_resumes: u32,
    report: KernelReport,
}

impl Kernel {
    fn new(config: &SimConfig, signals: SignalSet) -> Result<Self> {
        let pid = Pid::current();
        let ic_name = ic_channel_name(pid);
        let ic = Channel::create(&ic_name, WIRE_SIZE, config.capacity)?;

        let mut kernel = Self {
            pid,
            signals,
            ic,
            ic_name,
            controller: None,
            workers: Vec::with_capacity(config.workers as usize),
            io_queue: VecDeque::new(),
            pending_resumes: 0,
            report: KernelReport::default(),
        };

        // pushed one by one so Drop unlinks whatever was created before a failure
        for index in 1..=config.workers {
            let channel = Channel::create(
                &app_channel_name(index, pid),
                WIRE_SIZE,
                config.capacity,
            )?;
            kernel.workers.push(WorkerSlot {
                index,
                channel,
                child: None,
                state: WorkerState::Running,
                last_pc: 0,
                statuses: 0,
                syscalls: 0,
                exit_code: None,
            });
        }
        Ok(kernel)
    }

    fn spawn_controller(&mut self, config: &SimConfig, launcher: &Launcher) -> Result<()> {
        let s = self.signals;
        let mut cmd = launcher.command("controller");
        cmd.arg("--channel")
            .arg(&self.ic_name)
            .arg("--kernel-pid")
            .arg(self.pid.to_string())
            .arg("--io-delay-ms")
            .arg(config.io_delay_ms.to_string())
            .arg("--timer-period-ms")
            .arg(config.timer_period_ms.to_string())
            .arg("--data-signal")
            .arg(s.ic_data.to_string())
            .arg("--space-signal")
            .arg(s.ic_space.to_string())
            .arg("--irq0")
            .arg(s.irq0.to_string())
            .arg("--irq1")
            .arg(s.irq1.to_string());

        let child = launcher.spawn("controller", cmd)?;
        self.ic
            .configure(PeerConfig::new(s.ic_data, s.ic_space, child.pid()))?;
        self.controller = Some(child);
        Ok(())
    }

    fn spawn_workers(&mut self, config: &SimConfig, launcher: &Launcher) -> Result<()> {
        let s = self.signals;
        for slot in &mut self.workers {
            let mut cmd = launcher.command("worker");
            cmd.arg("--channel")
                .arg(slot.channel.name())
                .arg("--index")
                .arg(slot.index.to_string())
                .arg("--kernel-pid")
                .arg(self.pid.to_string())
                .arg("--max-pc")
                .arg(config.max_pc.to_string())
                .arg("--tick-ms")
                .arg(config.tick_ms.to_string())
                .arg("--profile")
                .arg(config.profile.to_string())
                .arg("--data-signal")
                .arg(s.app_data.to_string())
                .arg("--space-signal")
                .arg(s.app_space.to_string());

            if let Some(o) = config.override_for(slot.index) {
                if o.io_points.is_empty() {
                    cmd.arg("--no-io");
                } else {
                    let points: Vec<String> = o.io_points.iter().map(u32::to_string).collect();
                    cmd.arg("--io-points").arg(points.join(","));
                }
            }

            let child = launcher.spawn(format!("worker {}", slot.index), cmd)?;
            slot.channel
                .configure(PeerConfig::new(s.app_data, s.app_space, child.pid()))?;
            slot.child = Some(child);
        }
        Ok(())
    }

    /// Drain every app channel without blocking.
    fn poll_apps(&mut self) -> Result<()> {
        let mut buf = [0u8; WIRE_SIZE];
        for i in 0..self.workers.len() {
            while self.workers[i].channel.try_receive(&mut buf)? {
                match AppMessage::decode(&buf) {
                    Ok(msg) => self.handle(i, msg)?,
                    Err(e) => warn!("worker {}: malformed message: {}", self.workers[i].index, e),
                }
            }
        }
        Ok(())
    }

    fn handle(&mut self, slot: usize, msg: AppMessage) -> Result<()> {
        let w = &mut self.workers[slot];
        match msg.kind {
            AppKind::Status { pc } => {
                w.last_pc = pc;
                w.statuses += 1;
                debug!("A{} pc={}", w.index, pc);
            }
            AppKind::SyscallRw(direction) => {
                w.syscalls += 1;
                w.state = WorkerState::BlockedIo;
                info!("A{} blocked on {} at pc={}", w.index, direction, w.last_pc);
                self.io_queue.push_back(slot);
                self.ic.send(&IcMessage::IoStart { pid: msg.pid }.encode())?;
                self.report.io_requests += 1;
            }
        }
        Ok(())
    }

    fn poll_interrupts(&mut self) -> Result<()> {
        if gate::drain_pending(self.signals.irq0)? {
            self.report.ticks += 1;
            let running = self
                .workers
                .iter()
                .filter(|w| w.state == WorkerState::Running)
                .count();
            info!(
                "tick {}: running={} blocked={}",
                self.report.ticks,
                running,
                self.io_queue.len()
            );
        }
        if gate::drain_pending(self.signals.irq1)? {
            self.report.irq1 += 1;
            if self.io_queue.is_empty() {
                warn!("IRQ1 with no worker waiting on I/O");
            } else {
                self.pending_resumes += 1;
            }
        }
        Ok(())
    }

    /// Resume the oldest I/O-blocked worker per pending IRQ1.
    ///
    /// A worker is only continued once it has actually stopped; a resume
    /// delivered before its `SIGSTOP` would leave it stopped forever.
    fn resume_ready(&mut self) -> Result<()> {
        while self.pending_resumes > 0 {
            let Some(&slot) = self.io_queue.front() else {
                self.pending_resumes = 0;
                break;
            };
            let w = &mut self.workers[slot];
            if w.state == WorkerState::Exited {
                self.io_queue.pop_front();
                continue;
            }
            let Some(pid) = w.pid() else {
                self.io_queue.pop_front();
                continue;
            };
            if !process::is_stopped(pid) {
                break;
            }
            gate::raise(pid, Signal::SIGCONT)?;
            w.state = WorkerState::Running;
            info!("A{} resumed after I/O", w.index);
            self.io_queue.pop_front();
            self.pending_resumes -= 1;
        }
        Ok(())
    }

    fn reap_workers(&mut self) -> Result<bool> {
        for w in &mut self.workers {
            if w.state == WorkerState::Exited {
                continue;
            }
            if let Some(child) = w.child.as_mut() {
                if let Some(status) = child.try_exit()? {
                    info!("A{} exited with {}", w.index, status);
                    w.state = WorkerState::Exited;
                    w.exit_code = status.code();
                }
            }
        }
        Ok(self
            .workers
            .iter()
            .all(|w| w.state == WorkerState::Exited))
    }

    fn controller_alive(&mut self) -> Result<bool> {
        match self.controller.as_mut() {
            Some(c) => Ok(c.try_exit()?.is_none()),
            None => Ok(false),
        }
    }

    fn run(&mut self) -> Result<()> {
        loop {
            self.poll_apps()?;
            self.poll_interrupts()?;
            self.resume_ready()?;

            if self.reap_workers()? {
                // messages sent right before exiting
                self.poll_apps()?;
                return Ok(());
            }
            if !self.controller_alive()? {
                return Err(SimError::ChildFailed("controller".into()));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn shutdown(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            match controller.terminate(SHUTDOWN_GRACE) {
                Ok(status) => debug!("controller exited with {}", status),
                Err(e) => warn!("controller shutdown failed: {}", e),
            }
        }
    }

    fn summarize(&mut self) -> KernelReport {
        self.report.workers = self
            .workers
            .iter()
            .map(|w| WorkerSummary {
                index: w.index,
                pid: w.pid().map_or(0, Pid::as_raw),
                last_pc: w.last_pc,
                statuses: w.statuses,
                syscalls: w.syscalls,
                exit_code: w.exit_code,
            })
            .collect();
        self.report.clone()
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        self.shutdown();
        for w in &mut self.workers {
            if let Some(child) = w.child.as_mut() {
                child.kill();
            }
            if let Err(e) = Channel::unlink(w.channel.name()) {
                warn!("unlink {} failed: {}", w.channel.name(), e);
            }
        }
        if let Err(e) = Channel::unlink(&self.ic_name) {
            warn!("unlink {} failed: {}", self.ic_name, e);
        }
    }
}

/// Run the full simulation: channels, controller, workers, cleanup.
pub fn run_kernel(config: &SimConfig, launcher: &Launcher) -> Result<KernelReport> {
    config.validate()?;
    let signals = config.signals.resolve()?;
    let start = Instant::now();

    block_target_signals(Some(signals.app_data), Some(signals.ic_space))?;
    block_target_signals(Some(signals.irq0), Some(signals.irq1))?;

    let mut kernel = Kernel::new(config, signals)?;
    info!(
        "kernel (pid {}) starting {} workers, profile {}",
        kernel.pid, config.workers, config.profile
    );

    kernel.spawn_controller(config, launcher)?;
    kernel.spawn_workers(config, launcher)?;
    kernel.run()?;
    kernel.shutdown();

    kernel.report.elapsed = start.elapsed();
    let report = kernel.summarize();
    debug!("ic channel: {}", kernel.ic.metrics().snapshot());
    Ok(report)
}
