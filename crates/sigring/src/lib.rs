// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Signal-gated SPSC ring buffer over POSIX shared memory.
//!
//! Two unrelated processes exchange fixed-size elements through a bounded
//! ring living in a named shared memory segment. When the ring is full (or
//! empty) the blocked side sleeps in `sigwaitinfo` until the peer raises a
//! notification signal, so an idle channel costs no CPU.
//!
//! # Architecture
//!
//! ```text
//! Producer process                             Consumer process
//! +-----------------+    /dev/shm/<name>     +-----------------+
//! | Channel::send   |--> [hdr | slots...] -->| Channel::receive|
//! |                 |                        |                 |
//! |  waits on space |<---- space signal -----|                 |
//! |                 |----- data signal ----->|  waits on data  |
//! +-----------------+                        +-----------------+
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sigring::{block_target_signals, Channel, PeerConfig, Pid, Signal};
//!
//! # fn main() -> sigring::Result<()> {
//! block_target_signals(Some(Signal::SIGALRM), Some(Signal::SIGCONT))?;
//!
//! let mut tx = Channel::create("/app_ring", 12, 16)?;
//! # let consumer_pid = Pid::current();
//! tx.configure(PeerConfig::new(Signal::SIGALRM, Signal::SIGCONT, consumer_pid))?;
//! tx.send(&[0u8; 12])?;
//!
//! tx.close();
//! Channel::unlink("/app_ring")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Platform
//!
//! POSIX only (Linux primarily). Both processes must share the machine
//! architecture: the header is stored in native byte order.

mod channel;
mod error;
pub mod gate;
pub mod layout;
pub mod metrics;
mod name;
pub mod ring;
mod segment;

pub use channel::{Channel, PeerConfig};
pub use error::{ChannelError, Result};
pub use gate::{block_target_signals, Pid, Signal, FALLBACK_POLL};
pub use layout::{RingHeader, HEADER_SIZE};
pub use metrics::{ChannelMetrics, ChannelMetricsSnapshot};
pub use name::SegmentName;
pub use segment::ShmSegment;
