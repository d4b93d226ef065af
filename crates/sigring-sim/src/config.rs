// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Simulation configuration.
//!
//! Supports both programmatic and file-based configuration. Every field has a
//! default, so an empty file is a valid configuration.

use crate::profile::{ExecutionProfile, WorkerPlan};
use serde::{Deserialize, Serialize};
use sigring::Signal;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Number of worker processes.
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Last program counter a worker executes.
    #[serde(default = "default_max_pc")]
    pub max_pc: u32,

    /// Time a worker spends on each program counter (milliseconds).
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Slot count of every channel.
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Simulated I/O duration before IRQ1 fires (milliseconds).
    #[serde(default = "default_io_delay_ms")]
    pub io_delay_ms: u64,

    /// Timer interrupt (IRQ0) period (milliseconds).
    #[serde(default = "default_timer_period_ms")]
    pub timer_period_ms: u64,

    /// Default I/O schedule family.
    #[serde(default)]
    pub profile: ExecutionProfile,

    /// Per-worker I/O schedule overrides.
    #[serde(default)]
    pub workers_override: Vec<WorkerOverride>,

    /// Signal assignments.
    #[serde(default)]
    pub signals: SignalConfig,
}

fn default_workers() -> u32 {
    6
}

fn default_max_pc() -> u32 {
    15
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_capacity() -> u32 {
    16
}

fn default_io_delay_ms() -> u64 {
    3000
}

fn default_timer_period_ms() -> u64 {
    1000
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_pc: default_max_pc(),
            tick_ms: default_tick_ms(),
            capacity: default_capacity(),
            io_delay_ms: default_io_delay_ms(),
            timer_period_ms: default_timer_period_ms(),
            profile: ExecutionProfile::default(),
            workers_override: Vec::new(),
            signals: SignalConfig::default(),
        }
    }
}

impl SimConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("No workers configured".into()));
        }
        if self.max_pc == 0 {
            return Err(ConfigError::Invalid("max_pc must be at least 1".into()));
        }
        if self.capacity < 2 {
            return Err(ConfigError::Invalid(format!(
                "Channel capacity {} cannot hold an element (minimum 2)",
                self.capacity
            )));
        }
        if self.tick_ms == 0 || self.timer_period_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_ms and timer_period_ms must be positive".into(),
            ));
        }

        self.signals.resolve()?;

        let mut seen = HashSet::new();
        for o in &self.workers_override {
            if o.index == 0 || o.index > self.workers {
                return Err(ConfigError::Invalid(format!(
                    "Override for worker {} outside 1..={}",
                    o.index, self.workers
                )));
            }
            if !seen.insert(o.index) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate override for worker {}",
                    o.index
                )));
            }
            if o.io_points.contains(&0) {
                return Err(ConfigError::Invalid(format!(
                    "Worker {} has an I/O point at pc 0",
                    o.index
                )));
            }
        }

        Ok(())
    }

    /// I/O schedule of worker `index`, honouring overrides.
    pub fn plan_for(&self, index: u32) -> WorkerPlan {
        self.override_for(index)
            .map(|o| WorkerPlan::new(o.io_points.clone()))
            .unwrap_or_else(|| WorkerPlan::for_worker(self.profile, index))
    }

    /// Explicit override for worker `index`, if configured.
    pub fn override_for(&self, index: u32) -> Option<&WorkerOverride> {
        self.workers_override.iter().find(|o| o.index == index)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn io_delay(&self) -> Duration {
        Duration::from_millis(self.io_delay_ms)
    }

    pub fn timer_period(&self) -> Duration {
        Duration::from_millis(self.timer_period_ms)
    }
}

/// Signal role assignments, by name (`"SIGALRM"`, `"alrm"`) or number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Worker -> kernel "data available".
    #[serde(default = "default_app_data")]
    pub app_data: String,

    /// Kernel -> worker "space available".
    #[serde(default = "default_app_space")]
    pub app_space: String,

    /// Kernel -> controller "data available".
    #[serde(default = "default_ic_data")]
    pub ic_data: String,

    /// Controller -> kernel "space available".
    #[serde(default = "default_ic_space")]
    pub ic_space: String,

    /// Timer interrupt.
    #[serde(default = "default_irq0")]
    pub irq0: String,

    /// I/O completion interrupt.
    #[serde(default = "default_irq1")]
    pub irq1: String,
}

fn default_app_data() -> String {
    "SIGALRM".to_string()
}

fn default_app_space() -> String {
    "SIGCONT".to_string()
}

fn default_ic_data() -> String {
    "SIGHUP".to_string()
}

fn default_ic_space() -> String {
    "SIGWINCH".to_string()
}

fn default_irq0() -> String {
    "SIGUSR1".to_string()
}

fn default_irq1() -> String {
    "SIGUSR2".to_string()
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            app_data: default_app_data(),
            app_space: default_app_space(),
            ic_data: default_ic_data(),
            ic_space: default_ic_space(),
            irq0: default_irq0(),
            irq1: default_irq1(),
        }
    }
}

/// Parsed signal assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSet {
    pub app_data: Signal,
    pub app_space: Signal,
    pub ic_data: Signal,
    pub ic_space: Signal,
    pub irq0: Signal,
    pub irq1: Signal,
}

impl SignalConfig {
    /// Parse every role and check that no signal serves two roles.
    ///
    /// `SIGTERM` is reserved for shutting down the controller.
    pub fn resolve(&self) -> Result<SignalSet, ConfigError> {
        let parse = |role: &str, value: &str| {
            value.parse::<Signal>().map_err(|e| {
                ConfigError::Invalid(format!("Signal for {role} ({value}): {e}"))
            })
        };
        let set = SignalSet {
            app_data: parse("app_data", &self.app_data)?,
            app_space: parse("app_space", &self.app_space)?,
            ic_data: parse("ic_data", &self.ic_data)?,
            ic_space: parse("ic_space", &self.ic_space)?,
            irq0: parse("irq0", &self.irq0)?,
            irq1: parse("irq1", &self.irq1)?,
        };

        let all = set.all();
        let mut seen = HashSet::new();
        for sig in all {
            if sig == Signal::SIGTERM {
                return Err(ConfigError::Invalid(
                    "SIGTERM is reserved for shutdown".into(),
                ));
            }
            if !seen.insert(sig) {
                return Err(ConfigError::Invalid(format!(
                    "{sig} assigned to more than one role"
                )));
            }
        }
        Ok(set)
    }
}

impl Default for SignalSet {
    fn default() -> Self {
        Self {
            app_data: Signal::SIGALRM,
            app_space: Signal::SIGCONT,
            ic_data: Signal::SIGHUP,
            ic_space: Signal::SIGWINCH,
            irq0: Signal::SIGUSR1,
            irq1: Signal::SIGUSR2,
        }
    }
}

impl SignalSet {
    pub fn all(&self) -> [Signal; 6] {
        [
            self.app_data,
            self.app_space,
            self.ic_data,
            self.ic_space,
            self.irq0,
            self.irq1,
        ]
    }
}

/// Explicit I/O schedule for one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerOverride {
    /// Worker index (1-based).
    pub index: u32,

    /// Program counters at which the worker issues an I/O syscall.
    #[serde(default)]
    pub io_points: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workers, 6);
        assert_eq!(config.max_pc, 15);
        assert_eq!(config.io_delay(), Duration::from_secs(3));
        assert_eq!(config.signals.resolve().unwrap(), SignalSet::default());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: SimConfig = toml::from_str("").unwrap();
        assert_eq!(config.capacity, 16);
        assert_eq!(config.profile, ExecutionProfile::Split);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
workers = 2
tick_ms = 50
profile = "io"

[signals]
irq0 = "SIGURG"

[[workers_override]]
index = 2
io_points = [2, 4]
"#
        )
        .unwrap();

        let config = SimConfig::from_file(file.path()).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.tick(), Duration::from_millis(50));
        assert_eq!(config.signals.resolve().unwrap().irq0, Signal::SIGURG);
        assert_eq!(config.plan_for(1).io_points(), &[3, 7, 12]);
        assert_eq!(config.plan_for(2).io_points(), &[2, 4]);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            SimConfig::from_file("/nonexistent/sim.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers = \"many\"").unwrap();
        assert!(matches!(
            SimConfig::from_file(file.path()),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = SimConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_small_capacity() {
        let config = SimConfig {
            capacity: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shared_signal() {
        let mut config = SimConfig::default();
        config.signals.irq1 = "SIGUSR1".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_sigterm_and_unknown() {
        let mut config = SimConfig::default();
        config.signals.irq0 = "SIGTERM".into();
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.signals.irq0 = "SIGBOGUS".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_override() {
        let config = SimConfig {
            workers: 2,
            workers_override: vec![WorkerOverride {
                index: 3,
                io_points: vec![1],
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SimConfig {
            workers_override: vec![
                WorkerOverride {
                    index: 1,
                    io_points: vec![],
                },
                WorkerOverride {
                    index: 1,
                    io_points: vec![2],
                },
            ],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialize_roundtrip_through_toml() {
        let config = SimConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: SimConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.workers, config.workers);
        assert_eq!(back.signals.ic_space, "SIGWINCH");
    }
}
