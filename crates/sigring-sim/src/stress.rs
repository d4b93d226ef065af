// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cross-process channel stress: an owner consumes a numbered stream fed by
//! a child process and checks that nothing is lost, repeated or reordered.
//!
//! ```text
//! stress (owner, consumer)            feed (child, producer)
//!   create channel
//!   spawn feed ──────────────────────>  open, configure
//!   receive 1..=count  <── ring ──────  send 1..=count
//!   verify, wait child, unlink
//! ```

use crate::error::{Result, SimError};
use crate::process::Launcher;
use sigring::{block_target_signals, Channel, ChannelMetricsSnapshot, PeerConfig, Pid, Signal};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Sequence numbers travel as native-order u64.
const ELEMENT_SIZE: usize = 8;

/// How long the owner waits for data before checking on the feeder.
const EXIT_CHECK: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct StressOptions {
    /// Channel name; defaults to one scoped by pid
    pub channel: Option<String>,
    pub count: u64,
    pub capacity: u32,
    /// Consumer pause after each element
    pub recv_delay: Duration,
    /// Producer pause after each element
    pub send_delay: Duration,
    pub data_signal: Signal,
    pub space_signal: Signal,
}

impl Default for StressOptions {
    fn default() -> Self {
        Self {
            channel: None,
            count: 10_000,
            capacity: 16,
            recv_delay: Duration::ZERO,
            send_delay: Duration::ZERO,
            data_signal: Signal::SIGUSR1,
            space_signal: Signal::SIGUSR2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedOptions {
    pub channel: String,
    pub consumer: Pid,
    pub count: u64,
    pub delay: Duration,
    pub data_signal: Signal,
    pub space_signal: Signal,
}

#[derive(Debug, Clone)]
pub struct StressReport {
    pub received: u64,
    pub elapsed: Duration,
    pub metrics: ChannelMetricsSnapshot,
}

impl StressReport {
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.received as f64 / secs
        } else {
            0.0
        }
    }
}

/// Checks that values arrive as 1, 2, 3, ...
#[derive(Debug)]
pub struct SequenceCheck {
    next: u64,
}

impl Default for SequenceCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceCheck {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn observe(&mut self, value: u64) -> Result<()> {
        if value != self.next {
            return Err(SimError::Sequence {
                expected: self.next,
                got: value,
            });
        }
        self.next += 1;
        Ok(())
    }

    pub fn seen(&self) -> u64 {
        self.next.saturating_sub(1)
    }
}

/// Owner side: create, spawn the feeder, consume and verify, tear down.
pub fn run_stress(opts: &StressOptions, launcher: &Launcher) -> Result<StressReport> {
    block_target_signals(Some(opts.data_signal), Some(opts.space_signal))?;

    let name = opts
        .channel
        .clone()
        .unwrap_or_else(|| format!("/sigring_stress_{}", Pid::current()));
    let mut channel = Channel::create(&name, ELEMENT_SIZE, opts.capacity)?;
    info!(
        "stress: {} elements through {} ({} usable slots)",
        opts.count,
        name,
        channel.usable_capacity()
    );

    let outcome = consume(&mut channel, opts, launcher);
    channel.close();
    Channel::unlink(&name)?;
    outcome
}

fn consume(channel: &mut Channel, opts: &StressOptions, launcher: &Launcher) -> Result<StressReport> {
    let mut cmd = launcher.command("feed");
    cmd.arg("--channel")
        .arg(channel.name())
        .arg("--consumer-pid")
        .arg(Pid::current().to_string())
        .arg("--count")
        .arg(opts.count.to_string())
        .arg("--delay-us")
        .arg(opts.send_delay.as_micros().to_string())
        .arg("--data-signal")
        .arg(opts.data_signal.to_string())
        .arg("--space-signal")
        .arg(opts.space_signal.to_string());
    let mut feeder = launcher.spawn("feed", cmd)?;

    let result = (|| {
        channel.configure(PeerConfig::new(
            opts.data_signal,
            opts.space_signal,
            feeder.pid(),
        ))?;

        let start = Instant::now();
        let mut check = SequenceCheck::new();
        let mut buf = [0u8; ELEMENT_SIZE];
        while check.seen() < opts.count {
            if !channel.receive_timeout(&mut buf, EXIT_CHECK)? {
                // nothing arrived: make sure the feeder is still there
                if feeder.try_exit()?.is_some() && channel.is_empty() {
                    return Err(SimError::ChildFailed("feed".into()));
                }
                continue;
            }
            check.observe(u64::from_ne_bytes(buf))?;
            if !opts.recv_delay.is_zero() {
                thread::sleep(opts.recv_delay);
            }
        }
        Ok::<_, SimError>((check.seen(), start.elapsed()))
    })();

    let (received, elapsed) = match result {
        Ok(v) => v,
        Err(e) => {
            feeder.kill();
            return Err(e);
        }
    };

    let status = feeder.wait()?;
    if !status.success() {
        return Err(SimError::ChildFailed("feed".into()));
    }

    let report = StressReport {
        received,
        elapsed,
        metrics: channel.metrics().snapshot(),
    };
    info!(
        "stress ok: {} elements in {:.3}s ({:.0}/s), {}",
        report.received,
        report.elapsed.as_secs_f64(),
        report.rate(),
        report.metrics
    );
    Ok(report)
}

/// Producer side: send `1..=count` to the owner.
pub fn run_feed(opts: &FeedOptions) -> Result<ChannelMetricsSnapshot> {
    block_target_signals(Some(opts.data_signal), Some(opts.space_signal))?;

    let mut channel = Channel::open_with_element_size(&opts.channel, ELEMENT_SIZE)?;
    channel.configure(PeerConfig::new(
        opts.data_signal,
        opts.space_signal,
        opts.consumer,
    ))?;

    for value in 1..=opts.count {
        channel.send(&value.to_ne_bytes())?;
        if !opts.delay.is_zero() {
            thread::sleep(opts.delay);
        }
    }

    let metrics = channel.metrics().snapshot();
    debug!("feed done: {}", metrics);
    channel.close();
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_check_accepts_order() {
        let mut check = SequenceCheck::new();
        for v in 1..=5 {
            check.observe(v).unwrap();
        }
        assert_eq!(check.seen(), 5);
    }

    #[test]
    fn test_sequence_check_detects_gap() {
        let mut check = SequenceCheck::new();
        check.observe(1).unwrap();
        assert!(matches!(
            check.observe(3),
            Err(SimError::Sequence {
                expected: 2,
                got: 3
            })
        ));
    }

    #[test]
    fn test_sequence_check_detects_repeat() {
        let mut check = SequenceCheck::new();
        check.observe(1).unwrap();
        check.observe(2).unwrap();
        assert!(check.observe(2).is_err());
    }

    #[test]
    fn test_report_rate() {
        let report = StressReport {
            received: 1000,
            elapsed: Duration::from_millis(500),
            metrics: ChannelMetricsSnapshot::default(),
        };
        assert!((report.rate() - 2000.0).abs() < 1e-6);
    }
}
