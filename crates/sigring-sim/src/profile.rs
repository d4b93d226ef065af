// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Worker execution profiles.
//!
//! A profile decides, per worker index, at which program counters the worker
//! issues an I/O syscall and suspends itself.
//!
//! | Profile | Worker 1   | Worker 2 | Worker 3 | Worker 4   | Worker 5 | Others  |
//! |---------|------------|----------|----------|------------|----------|---------|
//! | cpu     | -          | -        | -        | -          | -        | -       |
//! | io      | 3, 7, 12   | 4, 9     | 5, 10    | 6, 11      | 6, 11    | 6, 11   |
//! | split   | -          | -        | -        | 3, 7, 12   | 6, 11    | 5, 10   |

use crate::message::IoDirection;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment variable read by workers and the kernel.
pub const PROFILE_ENV: &str = "APP_PROFILE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProfile {
    /// No worker ever blocks on I/O
    Cpu,
    /// Every worker blocks on I/O
    Io,
    /// Workers 1..=3 are CPU-bound, the rest I/O-bound
    #[default]
    Split,
}

impl FromStr for ExecutionProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "io" => Ok(Self::Io),
            "split" => Ok(Self::Split),
            _ => Err(format!("Unknown profile: {s}. Use: cpu, io, split")),
        }
    }
}

impl fmt::Display for ExecutionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Io => write!(f, "io"),
            Self::Split => write!(f, "split"),
        }
    }
}

/// Resolved I/O schedule of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkerPlan {
    io_points: Vec<u32>,
}

impl WorkerPlan {
    #[must_use]
    pub fn new(mut io_points: Vec<u32>) -> Self {
        io_points.sort_unstable();
        io_points.dedup();
        Self { io_points }
    }

    /// Plan for worker `index` (1-based) under `profile`.
    #[must_use]
    pub fn for_worker(profile: ExecutionProfile, index: u32) -> Self {
        let points: &[u32] = match profile {
            ExecutionProfile::Cpu => &[],
            ExecutionProfile::Io => match index {
                1 => &[3, 7, 12],
                2 => &[4, 9],
                3 => &[5, 10],
                _ => &[6, 11],
            },
            ExecutionProfile::Split => match index {
                0..=3 => &[],
                4 => &[3, 7, 12],
                5 => &[6, 11],
                _ => &[5, 10],
            },
        };
        Self::new(points.to_vec())
    }

    #[must_use]
    pub fn io_points(&self) -> &[u32] {
        &self.io_points
    }

    /// I/O request due after executing `pc`, if any.
    #[must_use]
    pub fn io_at(&self, pc: u32) -> Option<IoDirection> {
        self.io_points
            .binary_search(&pc)
            .ok()
            .map(|_| IoDirection::at_pc(pc))
    }

    #[must_use]
    pub fn is_cpu_bound(&self) -> bool {
        self.io_points.is_empty()
    }
}
