// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel Metrics
//!
//! Per-handle atomic counters for channel traffic and gate activity.
//!
//! # Tracked Metrics
//!
//! - `sends`: Elements enqueued through this handle
//! - `receives`: Elements dequeued through this handle
//! - `full_waits`: Times a send found the ring full and waited
//! - `empty_waits`: Times a receive found the ring empty and waited
//! - `notifications`: Signals raised toward the peer
//! - `rechecks`: Waits avoided because the re-check after marking interest succeeded
//! - `notify_failures`: Notifications that could not be delivered (peer gone)

use std::sync::atomic::{AtomicU64, Ordering};

/// Channel metrics with atomic counters.
///
/// All counters use `Relaxed` ordering; they are process-local and only
/// describe this handle, not the peer.
#[derive(Debug, Default)]
pub struct ChannelMetrics {
    sends: AtomicU64,
    receives: AtomicU64,
    full_waits: AtomicU64,
    empty_waits: AtomicU64,
    notifications: AtomicU64,
    rechecks: AtomicU64,
    notify_failures: AtomicU64,
}

impl ChannelMetrics {
    /// Create new metrics instance with all counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sends: AtomicU64::new(0),
            receives: AtomicU64::new(0),
            full_waits: AtomicU64::new(0),
            empty_waits: AtomicU64::new(0),
            notifications: AtomicU64::new(0),
            rechecks: AtomicU64::new(0),
            notify_failures: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn inc_sends(&self) {
        self.sends.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_receives(&self) {
        self.receives.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_full_waits(&self) {
        self.full_waits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_empty_waits(&self) {
        self.empty_waits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_notifications(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_rechecks(&self) {
        self.rechecks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_notify_failures(&self) {
        self.notify_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.sends.store(0, Ordering::Relaxed);
        self.receives.store(0, Ordering::Relaxed);
        self.full_waits.store(0, Ordering::Relaxed);
        self.empty_waits.store(0, Ordering::Relaxed);
        self.notifications.store(0, Ordering::Relaxed);
        self.rechecks.store(0, Ordering::Relaxed);
        self.notify_failures.store(0, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> ChannelMetricsSnapshot {
        ChannelMetricsSnapshot {
            sends: self.sends.load(Ordering::Relaxed),
            receives: self.receives.load(Ordering::Relaxed),
            full_waits: self.full_waits.load(Ordering::Relaxed),
            empty_waits: self.empty_waits.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            rechecks: self.rechecks.load(Ordering::Relaxed),
            notify_failures: self.notify_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of channel metrics (non-atomic, for reporting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelMetricsSnapshot {
    pub sends: u64,
    pub receives: u64,
    pub full_waits: u64,
    pub empty_waits: u64,
    pub notifications: u64,
    pub rechecks: u64,
    pub notify_failures: u64,
}

impl ChannelMetricsSnapshot {
    /// Fraction of operations that had to block (0.0 when idle).
    #[must_use]
    pub fn wait_ratio(&self) -> f64 {
        let ops = self.sends + self.receives;
        if ops == 0 {
            0.0
        } else {
            (self.full_waits + self.empty_waits) as f64 / ops as f64
        }
    }
}

impl std::fmt::Display for ChannelMetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CHAN[sends={}, receives={}, full_waits={}, empty_waits={}, notify={}, rechecks={}, notify_failed={}]",
            self.sends,
            self.receives,
            self.full_waits,
            self.empty_waits,
            self.notifications,
            self.rechecks,
            self.notify_failures
        )
    }
}
