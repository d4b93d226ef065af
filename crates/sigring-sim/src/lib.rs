// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-level machine emulation over `sigring` channels.
//!
//! A kernel process owns one channel per worker plus one toward the interrupt
//! controller. Workers report their program counter and suspend themselves
//! on simulated I/O; the controller answers each I/O request with IRQ1 after
//! a delay, and a timer raises IRQ0 periodically.
//!
//! # Quick Start
//!
//! ```bash
//! # Default run: 6 workers, split profile, 1s ticks
//! sigring-sim kernel
//!
//! # Fast run, every worker doing I/O
//! sigring-sim kernel --workers 3 --tick-ms 100 --io-delay-ms 300 --profile io
//!
//! # Using config file
//! sigring-sim kernel --config sim.toml
//!
//! # Cross-process channel stress
//! sigring-sim stress --count 100000 --capacity 8
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! workers = 6
//! tick_ms = 1000
//! profile = "split"
//!
//! [[workers_override]]
//! index = 2
//! io_points = [4, 8]
//!
//! [signals]
//! irq0 = "SIGUSR1"
//! irq1 = "SIGUSR2"
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod kernel;
pub mod message;
pub mod process;
pub mod profile;
pub mod stress;
pub mod worker;

pub use config::{ConfigError, SignalSet, SimConfig, WorkerOverride};
pub use controller::{run_controller, run_timer, ControllerOptions, TimerOptions};
pub use error::{Result, SimError};
pub use kernel::{run_kernel, KernelReport, WorkerSummary};
pub use message::{AppKind, AppMessage, IcMessage, IoDirection, MessageError};
pub use process::Launcher;
pub use profile::{ExecutionProfile, WorkerPlan};
pub use stress::{run_feed, run_stress, FeedOptions, StressOptions, StressReport};
pub use worker::{run_worker, WorkerOptions, WorkerReport};
