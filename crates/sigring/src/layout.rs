// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ring metadata placed at the head of the shared segment.
//!
//! # Memory Layout
//!
//! ```text
//! Offset  Size   Field
//! 0       4      capacity        (slot count, fixed at creation)
//! 4       4      element_size    (bytes per slot, fixed at creation)
//! 8       4      head            (AtomicU32, written by the consumer only)
//! 12      4      tail            (AtomicU32, written by the producer only)
//! 16      4      writer_waiting  (AtomicU32 flag, producer waits for space)
//! 20      4      reader_waiting  (AtomicU32 flag, consumer waits for data)
//! 24      ...    capacity x element_size payload bytes, no padding
//! ```
//!
//! Native byte order, no version word. Both processes must run on the same
//! machine architecture.
//!
//! # Memory Ordering Strategy
//!
//! - **Release** when publishing an index (`tail` after writing a slot, `head`
//!   after reading one): everything copied before the store is visible to the
//!   process that later loads the index with Acquire.
//! - **Acquire** when loading the index owned by the other side.
//! - **Relaxed** when loading the index we own ourselves.
//! - **SeqCst** on the interest flags: marking interest and re-checking the ring
//!   must not be reordered against the peer's publish-then-check sequence.

use crate::{ChannelError, Result};
use std::sync::atomic::{AtomicU32, Ordering};

/// Size of [`RingHeader`] in bytes.
pub const HEADER_SIZE: usize = std::mem::size_of::<RingHeader>();

/// Shared ring metadata.
#[repr(C)]
pub struct RingHeader {
    /// Slot count (usable capacity is one less)
    pub capacity: u32,
    /// Bytes per slot
    pub element_size: u32,
    /// Next slot to read
    pub head: AtomicU32,
    /// Next slot to write
    pub tail: AtomicU32,
    /// Producer is waiting for a free slot
    pub writer_waiting: AtomicU32,
    /// Consumer is waiting for an element
    pub reader_waiting: AtomicU32,
}

impl RingHeader {
    /// Create a fresh header with both indices at zero and no interest recorded
    #[must_use]
    pub const fn new(capacity: u32, element_size: u32) -> Self {
        Self {
            capacity,
            element_size,
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
            writer_waiting: AtomicU32::new(0),
            reader_waiting: AtomicU32::new(0),
        }
    }

    /// Flag recording that the given side is blocked
    #[inline]
    pub fn interest(&self, interest: Interest) -> &AtomicU32 {
        match interest {
            Interest::WriterWaiting => &self.writer_waiting,
            Interest::ReaderWaiting => &self.reader_waiting,
        }
    }

    /// Check that this header describes a ring of exactly `mapped_size` bytes.
    pub fn validate(&self, mapped_size: usize) -> Result<()> {
        let expected = segment_size(self.capacity, self.element_size).map_err(|_| {
            ChannelError::LayoutMismatch(format!(
                "header declares capacity={} element_size={}",
                self.capacity, self.element_size
            ))
        })?;
        if expected != mapped_size {
            return Err(ChannelError::LayoutMismatch(format!(
                "header expects {expected} bytes, segment has {mapped_size}"
            )));
        }
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        if head >= self.capacity || tail >= self.capacity {
            return Err(ChannelError::LayoutMismatch(format!(
                "indices out of range: head={head} tail={tail} capacity={}",
                self.capacity
            )));
        }
        Ok(())
    }
}

/// Which side of the channel is recording interest in a state change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interest {
    /// Producer blocked on a full ring, wants the "space available" signal
    WriterWaiting,
    /// Consumer blocked on an empty ring, wants the "data available" signal
    ReaderWaiting,
}

/// Total segment size for a ring of `capacity` slots of `element_size` bytes.
///
/// Rejects geometries that cannot hold a single element (`capacity < 2`),
/// zero-sized elements, and sizes that overflow `usize`.
pub fn segment_size(capacity: u32, element_size: u32) -> Result<usize> {
    let invalid = ChannelError::InvalidGeometry {
        capacity,
        element_size,
    };
    if capacity < 2 || element_size == 0 {
        return Err(invalid);
    }
    (capacity as usize)
        .checked_mul(element_size as usize)
        .and_then(|payload| payload.checked_add(HEADER_SIZE))
        .ok_or(invalid)
}
