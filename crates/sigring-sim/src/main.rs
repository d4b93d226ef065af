// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! sigring-sim CLI
//!
//! One executable, one subcommand per process role. The kernel re-executes
//! this binary to start the controller and the workers.
//!
//! # Usage
//!
//! ```bash
//! # Full simulation with defaults
//! sigring-sim kernel
//!
//! # Quick run
//! sigring-sim kernel --workers 2 --max-pc 5 --tick-ms 100 --io-delay-ms 200 --profile io
//!
//! # Generate and validate a configuration file
//! sigring-sim gen-config --output sim.toml
//! sigring-sim validate --config sim.toml
//!
//! # Cross-process stress, slow consumer
//! sigring-sim stress --count 5000 --capacity 4 --recv-delay-us 50
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sigring::{Pid, Signal};
use sigring_sim::{
    run_controller, run_feed, run_kernel, run_stress, run_timer, run_worker, ControllerOptions,
    ExecutionProfile, FeedOptions, Launcher, SimConfig, StressOptions, TimerOptions,
    WorkerOptions, WorkerPlan,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Signal-gated shared memory channels: machine emulation and stress tool
#[derive(Parser, Debug)]
#[command(name = "sigring-sim")]
#[command(about = "Kernel, workers and interrupt controller over signal-gated shared memory rings")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full simulation (spawns controller and workers)
    Kernel {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of workers
        #[arg(short, long)]
        workers: Option<u32>,

        /// Last program counter per worker
        #[arg(long)]
        max_pc: Option<u32>,

        /// Milliseconds per program counter
        #[arg(long)]
        tick_ms: Option<u64>,

        /// Slot count of every channel
        #[arg(long)]
        capacity: Option<u32>,

        /// Simulated I/O duration (milliseconds)
        #[arg(long)]
        io_delay_ms: Option<u64>,

        /// IRQ0 period (milliseconds)
        #[arg(long)]
        timer_period_ms: Option<u64>,

        /// Execution profile (cpu, io, split)
        #[arg(short, long, env = "APP_PROFILE")]
        profile: Option<ExecutionProfile>,
    },

    /// Worker role (started by the kernel)
    Worker {
        /// App -> kernel channel name
        #[arg(long)]
        channel: String,

        /// Worker index (1-based)
        #[arg(long)]
        index: u32,

        #[arg(long, value_parser = parse_pid)]
        kernel_pid: Pid,

        #[arg(long, default_value = "15")]
        max_pc: u32,

        #[arg(long, default_value = "1000")]
        tick_ms: u64,

        /// Execution profile (cpu, io, split)
        #[arg(long, env = "APP_PROFILE", default_value = "split")]
        profile: ExecutionProfile,

        /// Explicit I/O points, overriding the profile
        #[arg(long, value_delimiter = ',', conflicts_with = "no_io")]
        io_points: Option<Vec<u32>>,

        /// Never issue I/O, overriding the profile
        #[arg(long)]
        no_io: bool,

        #[arg(long, default_value = "SIGALRM")]
        data_signal: Signal,

        #[arg(long, default_value = "SIGCONT")]
        space_signal: Signal,
    },

    /// Interrupt controller role (started by the kernel)
    Controller {
        /// Kernel -> controller channel name
        #[arg(long)]
        channel: String,

        #[arg(long, value_parser = parse_pid)]
        kernel_pid: Pid,

        #[arg(long, default_value = "3000")]
        io_delay_ms: u64,

        #[arg(long, default_value = "1000")]
        timer_period_ms: u64,

        #[arg(long, default_value = "SIGHUP")]
        data_signal: Signal,

        #[arg(long, default_value = "SIGWINCH")]
        space_signal: Signal,

        #[arg(long, default_value = "SIGUSR1")]
        irq0: Signal,

        #[arg(long, default_value = "SIGUSR2")]
        irq1: Signal,
    },

    /// Timer role (started by the controller)
    Timer {
        #[arg(long, value_parser = parse_pid)]
        kernel_pid: Pid,

        #[arg(long, default_value = "1000")]
        period_ms: u64,

        #[arg(long, default_value = "SIGUSR1")]
        signal: Signal,
    },

    /// Cross-process FIFO check: consume 1..=count from a spawned feeder
    Stress {
        /// Channel name (default: scoped by pid)
        #[arg(long)]
        channel: Option<String>,

        #[arg(short = 'n', long, default_value = "10000")]
        count: u64,

        #[arg(short, long, default_value = "16")]
        capacity: u32,

        /// Consumer pause per element (microseconds)
        #[arg(long, default_value = "0")]
        recv_delay_us: u64,

        /// Producer pause per element (microseconds)
        #[arg(long, default_value = "0")]
        send_delay_us: u64,

        #[arg(long, default_value = "SIGUSR1")]
        data_signal: Signal,

        #[arg(long, default_value = "SIGUSR2")]
        space_signal: Signal,
    },

    /// Feeder role (started by stress)
    Feed {
        #[arg(long)]
        channel: String,

        #[arg(long, value_parser = parse_pid)]
        consumer_pid: Pid,

        #[arg(short = 'n', long)]
        count: u64,

        #[arg(long, default_value = "0")]
        delay_us: u64,

        #[arg(long, default_value = "SIGUSR1")]
        data_signal: Signal,

        #[arg(long, default_value = "SIGUSR2")]
        space_signal: Signal,
    },

    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "sim.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn parse_pid(s: &str) -> std::result::Result<Pid, String> {
    let raw: i32 = s.parse().map_err(|e| format!("invalid pid '{s}': {e}"))?;
    Pid::new(raw).ok_or_else(|| format!("pid must be positive, got {raw}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries reports
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Kernel {
            config,
            workers,
            max_pc,
            tick_ms,
            capacity,
            io_delay_ms,
            timer_period_ms,
            profile,
        } => {
            let mut sim = match config {
                Some(path) => SimConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => SimConfig::default(),
            };
            if let Some(v) = workers {
                sim.workers = v;
            }
            if let Some(v) = max_pc {
                sim.max_pc = v;
            }
            if let Some(v) = tick_ms {
                sim.tick_ms = v;
            }
            if let Some(v) = capacity {
                sim.capacity = v;
            }
            if let Some(v) = io_delay_ms {
                sim.io_delay_ms = v;
            }
            if let Some(v) = timer_period_ms {
                sim.timer_period_ms = v;
            }
            if let Some(v) = profile {
                sim.profile = v;
            }

            let launcher = Launcher::current(&cli.log_level)?;
            let report = run_kernel(&sim, &launcher)?;
            print!("{report}");
            if !report.all_succeeded() {
                bail!("one or more workers failed");
            }
        }

        Commands::Worker {
            channel,
            index,
            kernel_pid,
            max_pc,
            tick_ms,
            profile,
            io_points,
            no_io,
            data_signal,
            space_signal,
        } => {
            let plan = if no_io {
                WorkerPlan::default()
            } else {
                io_points.map_or_else(|| WorkerPlan::for_worker(profile, index), WorkerPlan::new)
            };
            run_worker(WorkerOptions {
                channel,
                index,
                kernel: kernel_pid,
                plan,
                max_pc,
                tick: Duration::from_millis(tick_ms),
                data_signal,
                space_signal,
            })
            .with_context(|| format!("worker {index}"))?;
        }

        Commands::Controller {
            channel,
            kernel_pid,
            io_delay_ms,
            timer_period_ms,
            data_signal,
            space_signal,
            irq0,
            irq1,
        } => {
            let launcher = Launcher::current(&cli.log_level)?;
            run_controller(
                ControllerOptions {
                    channel,
                    kernel: kernel_pid,
                    io_delay: Duration::from_millis(io_delay_ms),
                    timer_period: Duration::from_millis(timer_period_ms),
                    data_signal,
                    space_signal,
                    irq0,
                    irq1,
                },
                &launcher,
            )
            .context("controller")?;
        }

        Commands::Timer {
            kernel_pid,
            period_ms,
            signal,
        } => {
            run_timer(TimerOptions {
                kernel: kernel_pid,
                period: Duration::from_millis(period_ms),
                irq0: signal,
            })?;
        }

        Commands::Stress {
            channel,
            count,
            capacity,
            recv_delay_us,
            send_delay_us,
            data_signal,
            space_signal,
        } => {
            let launcher = Launcher::current(&cli.log_level)?;
            let report = run_stress(
                &StressOptions {
                    channel,
                    count,
                    capacity,
                    recv_delay: Duration::from_micros(recv_delay_us),
                    send_delay: Duration::from_micros(send_delay_us),
                    data_signal,
                    space_signal,
                },
                &launcher,
            )
            .context("stress")?;
            println!(
                "stress ok: {} elements in {:.3}s ({:.0}/s)",
                report.received,
                report.elapsed.as_secs_f64(),
                report.rate()
            );
            println!("{}", report.metrics);
        }

        Commands::Feed {
            channel,
            consumer_pid,
            count,
            delay_us,
            data_signal,
            space_signal,
        } => {
            run_feed(&FeedOptions {
                channel,
                consumer: consumer_pid,
                count,
                delay: Duration::from_micros(delay_us),
                data_signal,
                space_signal,
            })
            .context("feed")?;
        }

        Commands::GenConfig { output } => {
            let text = toml::to_string_pretty(&SimConfig::default())?;
            std::fs::write(&output, text)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Configuration written to {}", output.display());
        }

        Commands::Validate { config } => {
            let sim = SimConfig::from_file(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            println!(
                "Configuration valid: {} workers, profile {}, {} overrides",
                sim.workers,
                sim.profile,
                sim.workers_override.len()
            );
        }
    }

    Ok(())
}
