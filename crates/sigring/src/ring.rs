// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lock-free single-producer/single-consumer ring over shared memory.
//!
//! Each index has exactly one writer across the whole system: the producer
//! owns `tail`, the consumer owns `head`. Both only read the other's index,
//! so plain atomic loads and stores are enough, no compare-and-swap.
//!
//! # Synchronization Protocol
//!
//! Enqueue:
//! 1. Load head (Acquire), load tail (Relaxed)
//! 2. `next = advance(tail)`; full when `next == head`
//! 3. Copy element into slot `tail`
//! 4. Publish: `tail = next` (Release)
//!
//! Dequeue:
//! 1. Load tail (Acquire), load head (Relaxed)
//! 2. Empty when `head == tail`
//! 3. Copy element out of slot `head`
//! 4. Release the slot: `head = advance(head)` (Release)
//!
//! One slot is always left unused so that full and empty can be told apart
//! with two indices only: usable capacity is `capacity - 1`.

use crate::layout::{RingHeader, HEADER_SIZE};
use std::ptr;
use std::sync::atomic::Ordering;

/// View of a ring living at the start of a mapped segment.
#[derive(Clone, Copy)]
pub struct Ring<'a> {
    header: &'a RingHeader,
    slots: *mut u8,
}

impl<'a> Ring<'a> {
    /// Build a view over a header followed by its payload slots.
    ///
    /// # Safety
    ///
    /// `base` must point to a 4-byte aligned region of at least
    /// `HEADER_SIZE + capacity * element_size` bytes, holding an initialized
    /// [`RingHeader`], that stays mapped for `'a`.
    #[inline]
    pub unsafe fn from_raw(base: *mut u8) -> Self {
        Self {
            header: &*(base as *const RingHeader),
            slots: base.add(HEADER_SIZE),
        }
    }

    #[inline]
    #[must_use]
    pub fn header(&self) -> &'a RingHeader {
        self.header
    }

    /// Slot count (one more than the number of elements that fit)
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.header.capacity
    }

    #[inline]
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.header.element_size as usize
    }

    /// Next index after `index`, wrapping at capacity
    #[inline]
    #[must_use]
    pub fn advance(&self, index: u32) -> u32 {
        if index + 1 == self.header.capacity {
            0
        } else {
            index + 1
        }
    }

    #[inline]
    fn slot_ptr(&self, index: u32) -> *mut u8 {
        debug_assert!(index < self.header.capacity);
        // SAFETY: index < capacity, so the offset stays within the payload region
        // described by the header (checked at create/open time).
        unsafe { self.slots.add(index as usize * self.element_size()) }
    }

    /// Producer side: append one element, or return `false` if the ring is full.
    ///
    /// `element.len()` must equal the element size.
    pub fn try_enqueue(&self, element: &[u8]) -> bool {
        debug_assert_eq!(element.len(), self.element_size());

        let head = self.header.head.load(Ordering::Acquire);
        let tail = self.header.tail.load(Ordering::Relaxed);
        let next = self.advance(tail);

        if next == head {
            return false;
        }

        // SAFETY:
        // - slot `tail` lies in the payload region (tail < capacity)
        // - the consumer never touches slot `tail` until the Release store below
        //   makes it visible, and there is a single producer
        // - source and destination do not overlap (caller buffer vs shared memory)
        unsafe {
            ptr::copy_nonoverlapping(element.as_ptr(), self.slot_ptr(tail), element.len());
        }

        self.header.tail.store(next, Ordering::Release);
        true
    }

    /// Consumer side: take the oldest element into `out`, or return `false` if empty.
    ///
    /// `out.len()` must equal the element size.
    pub fn try_dequeue(&self, out: &mut [u8]) -> bool {
        debug_assert_eq!(out.len(), self.element_size());

        let tail = self.header.tail.load(Ordering::Acquire);
        let head = self.header.head.load(Ordering::Relaxed);

        if head == tail {
            return false;
        }

        // SAFETY:
        // - slot `head` lies in the payload region (head < capacity)
        // - the Acquire load of tail synchronizes with the producer's Release store,
        //   so the slot contents are fully written
        // - the producer does not reuse slot `head` until head advances below
        unsafe {
            ptr::copy_nonoverlapping(self.slot_ptr(head), out.as_mut_ptr(), out.len());
        }

        self.header.head.store(self.advance(head), Ordering::Release);
        true
    }

    /// Number of queued elements (snapshot)
    #[must_use]
    pub fn len(&self) -> u32 {
        let head = self.header.head.load(Ordering::Acquire);
        let tail = self.header.tail.load(Ordering::Acquire);
        if tail >= head {
            tail - head
        } else {
            self.header.capacity - head + tail
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.header.head.load(Ordering::Acquire) == self.header.tail.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        let head = self.header.head.load(Ordering::Acquire);
        let tail = self.header.tail.load(Ordering::Acquire);
        self.advance(tail) == head
    }
}
