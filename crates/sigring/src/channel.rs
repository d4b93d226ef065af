// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel handle: ring + notification gate + peer identity.
//!
//! # Usage Flow
//!
//! 1. Owner calls [`Channel::create`] (allocates, sizes, maps, initializes)
//! 2. Peer calls [`Channel::open`] with the same name (maps, no re-initialization)
//! 3. Both sides call [`block_target_signals`](crate::block_target_signals) and
//!    [`Channel::configure`] with the peer's pid
//! 4. Producer calls [`Channel::send`], consumer calls [`Channel::receive`]
//! 5. Both sides [`Channel::close`]; the owner then calls [`Channel::unlink`]
//!
//! Exactly one producer and one consumer may use a channel at a time.

use crate::gate::{self, Pid, Signal};
use crate::layout::{self, Interest, RingHeader, HEADER_SIZE};
use crate::metrics::ChannelMetrics;
use crate::name::SegmentName;
use crate::ring::Ring;
use crate::segment::ShmSegment;
use crate::{ChannelError, Result};
use std::fmt;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// Notification wiring toward the peer process.
///
/// `data_signal` means "an element is available", `space_signal` means "a slot
/// was freed". The producer raises `data_signal` and waits on `space_signal`;
/// the consumer does the opposite. A `None` direction falls back to polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerConfig {
    pub data_signal: Option<Signal>,
    pub space_signal: Option<Signal>,
    pub peer: Pid,
}

impl PeerConfig {
    #[must_use]
    pub fn new(data_signal: Signal, space_signal: Signal, peer: Pid) -> Self {
        Self {
            data_signal: Some(data_signal),
            space_signal: Some(space_signal),
            peer,
        }
    }

    /// Peer wiring without signals: both directions poll.
    #[must_use]
    pub fn polling(peer: Pid) -> Self {
        Self {
            data_signal: None,
            space_signal: None,
            peer,
        }
    }
}

/// Process-local handle on a shared SPSC channel.
pub struct Channel {
    segment: ShmSegment,
    peer: Option<PeerConfig>,
    owner: bool,
    metrics: ChannelMetrics,
}

impl Channel {
    /// Create and initialize a new channel segment.
    ///
    /// `capacity` is the slot count; one slot stays free, so at most
    /// `capacity - 1` elements are queued at once.
    pub fn create(name: &str, element_size: usize, capacity: u32) -> Result<Self> {
        let name = SegmentName::new(name)?;
        let element_size = u32::try_from(element_size).map_err(|_| {
            ChannelError::InvalidGeometry {
                capacity,
                element_size: u32::MAX,
            }
        })?;
        let size = layout::segment_size(capacity, element_size)?;
        let segment = ShmSegment::create(&name, size)?;

        // SAFETY:
        // - the segment is at least HEADER_SIZE bytes and page-aligned
        // - it was just created and zero-filled; no other process has mapped it yet
        unsafe {
            std::ptr::write(
                segment.as_ptr().cast::<RingHeader>(),
                RingHeader::new(capacity, element_size),
            );
        }

        log::debug!(
            "[CHANNEL] created {} capacity={} element_size={}",
            name,
            capacity,
            element_size
        );

        Ok(Self {
            segment,
            peer: None,
            owner: true,
            metrics: ChannelMetrics::new(),
        })
    }

    /// Map an existing channel created by the peer.
    ///
    /// The header is checked against the mapped size; an inconsistent segment
    /// is rejected with [`ChannelError::LayoutMismatch`].
    pub fn open(name: &str) -> Result<Self> {
        let name = SegmentName::new(name)?;
        let segment = ShmSegment::open(&name)?;

        if segment.size() < HEADER_SIZE {
            return Err(ChannelError::LayoutMismatch(format!(
                "segment {name} is {} bytes, smaller than the ring header",
                segment.size()
            )));
        }

        let channel = Self {
            segment,
            peer: None,
            owner: false,
            metrics: ChannelMetrics::new(),
        };
        channel.header().validate(channel.segment.size())?;

        log::debug!(
            "[CHANNEL] opened {} capacity={} element_size={}",
            name,
            channel.capacity(),
            channel.element_size()
        );
        Ok(channel)
    }

    /// Open and additionally require a specific element size.
    pub fn open_with_element_size(name: &str, element_size: usize) -> Result<Self> {
        let channel = Self::open(name)?;
        if channel.element_size() != element_size {
            return Err(ChannelError::LayoutMismatch(format!(
                "element size is {}, expected {element_size}",
                channel.element_size()
            )));
        }
        Ok(channel)
    }

    /// Bind notification signals and the peer process. Required before send/receive.
    pub fn configure(&mut self, config: PeerConfig) -> Result<()> {
        if let (Some(data), Some(space)) = (config.data_signal, config.space_signal) {
            if data == space {
                return Err(ChannelError::InvalidSignal(data.as_raw()));
            }
        }
        log::debug!(
            "[CHANNEL] {} peer={} data={:?} space={:?}",
            self.name(),
            config.peer,
            config.data_signal.map(Signal::name),
            config.space_signal.map(Signal::name)
        );
        self.peer = Some(config);
        Ok(())
    }

    #[inline]
    fn header(&self) -> &RingHeader {
        // SAFETY:
        // - the segment starts with a RingHeader (written by create, validated by open)
        // - mmap memory is page-aligned, satisfying RingHeader's 4-byte alignment
        // - the reference lives no longer than &self, which keeps the mapping alive
        unsafe { &*(self.segment.as_ptr() as *const RingHeader) }
    }

    #[inline]
    fn ring(&self) -> Ring<'_> {
        // SAFETY: the mapping holds a valid header followed by
        // capacity * element_size bytes, and lives as long as &self
        unsafe { Ring::from_raw(self.segment.as_ptr()) }
    }

    fn peer_config(&self) -> Result<PeerConfig> {
        self.peer.ok_or(ChannelError::NotConfigured)
    }

    fn check_len(&self, len: usize) -> Result<()> {
        let expected = self.element_size();
        if len != expected {
            return Err(ChannelError::ElementSize {
                expected,
                actual: len,
            });
        }
        Ok(())
    }

    /// Send one element, blocking while the ring is full.
    ///
    /// There is no timeout: a send stays blocked until the consumer frees a
    /// slot and notifies, or until [`ChannelError::InterruptedWait`] is returned
    /// because a non-target signal interrupted the wait.
    pub fn send(&self, element: &[u8]) -> Result<()> {
        let peer = self.peer_config()?;
        self.check_len(element.len())?;
        let ring = self.ring();

        loop {
            if ring.try_enqueue(element) {
                self.after_enqueue(&peer);
                return Ok(());
            }

            gate::mark_interest(ring.header(), Interest::WriterWaiting);
            if ring.try_enqueue(element) {
                // Consumer freed a slot in the window; no need to wait.
                self.withdraw_interest(Interest::WriterWaiting);
                self.metrics.inc_rechecks();
                self.after_enqueue(&peer);
                return Ok(());
            }

            self.metrics.inc_full_waits();
            log::trace!("[CHANNEL] {} full, waiting for space", self.name());
            if let Err(e) = gate::wait_for(peer.space_signal) {
                self.withdraw_interest(Interest::WriterWaiting);
                return Err(e);
            }
        }
    }

    /// Send without blocking. Returns `Ok(false)` if the ring is full.
    pub fn try_send(&self, element: &[u8]) -> Result<bool> {
        let peer = self.peer_config()?;
        self.check_len(element.len())?;
        if !self.ring().try_enqueue(element) {
            return Ok(false);
        }
        self.after_enqueue(&peer);
        Ok(true)
    }

    /// Element is published: from here on the send has happened, so a
    /// failed notification is only logged and counted.
    fn after_enqueue(&self, peer: &PeerConfig) {
        self.metrics.inc_sends();
        if gate::take_interest(self.header(), Interest::ReaderWaiting) {
            if let Some(signal) = peer.data_signal {
                self.notify(peer.peer, signal);
            }
        }
    }

    fn notify(&self, peer: Pid, signal: Signal) {
        match gate::raise(peer, signal) {
            Ok(()) => self.metrics.inc_notifications(),
            Err(e) => {
                self.metrics.inc_notify_failures();
                log::warn!("[CHANNEL] {} could not notify pid {}: {}", self.name(), peer, e);
            }
        }
    }

    /// Clear this side's interest flag after deciding not to wait.
    fn withdraw_interest(&self, interest: Interest) {
        self.header().interest(interest).store(0, Ordering::SeqCst);
    }

    /// Receive one element into `out`, blocking while the ring is empty.
    pub fn receive(&self, out: &mut [u8]) -> Result<()> {
        let peer = self.peer_config()?;
        self.check_len(out.len())?;
        let ring = self.ring();

        loop {
            if ring.try_dequeue(out) {
                self.after_dequeue(&peer);
                return Ok(());
            }

            gate::mark_interest(ring.header(), Interest::ReaderWaiting);
            if ring.try_dequeue(out) {
                self.withdraw_interest(Interest::ReaderWaiting);
                self.metrics.inc_rechecks();
                self.after_dequeue(&peer);
                return Ok(());
            }

            self.metrics.inc_empty_waits();
            log::trace!("[CHANNEL] {} empty, waiting for data", self.name());
            if let Err(e) = gate::wait_for(peer.data_signal) {
                self.withdraw_interest(Interest::ReaderWaiting);
                return Err(e);
            }
        }
    }

    /// Receive without blocking. Returns `Ok(false)` if the ring is empty.
    pub fn try_receive(&self, out: &mut [u8]) -> Result<bool> {
        let peer = self.peer_config()?;
        self.check_len(out.len())?;
        if !self.ring().try_dequeue(out) {
            return Ok(false);
        }
        self.after_dequeue(&peer);
        Ok(true)
    }

    /// Like [`Channel::receive`] but gives up after `timeout`.
    ///
    /// Returns `Ok(false)` if no element arrived in time.
    pub fn receive_timeout(&self, out: &mut [u8], timeout: Duration) -> Result<bool> {
        let peer = self.peer_config()?;
        self.check_len(out.len())?;
        let ring = self.ring();
        let deadline = Instant::now() + timeout;

        loop {
            if ring.try_dequeue(out) {
                self.after_dequeue(&peer);
                return Ok(true);
            }

            gate::mark_interest(ring.header(), Interest::ReaderWaiting);
            if ring.try_dequeue(out) {
                self.withdraw_interest(Interest::ReaderWaiting);
                self.metrics.inc_rechecks();
                self.after_dequeue(&peer);
                return Ok(true);
            }

            let now = Instant::now();
            if now >= deadline {
                self.withdraw_interest(Interest::ReaderWaiting);
                return Ok(false);
            }

            self.metrics.inc_empty_waits();
            match peer.data_signal {
                Some(signal) => {
                    if let Err(e) = gate::wait_for_timeout(signal, deadline - now) {
                        self.withdraw_interest(Interest::ReaderWaiting);
                        return Err(e);
                    }
                }
                None => std::thread::sleep(gate::FALLBACK_POLL.min(deadline - now)),
            }
        }
    }

    /// Element is consumed: a failed notification must not turn it into an error.
    fn after_dequeue(&self, peer: &PeerConfig) {
        self.metrics.inc_receives();
        if gate::take_interest(self.header(), Interest::WriterWaiting) {
            if let Some(signal) = peer.space_signal {
                self.notify(peer.peer, signal);
            }
        }
    }

    /// Release the local mapping. The segment itself stays until unlinked.
    pub fn close(self) {
        log::debug!("[CHANNEL] closed {}", self.name());
        drop(self);
    }

    /// Remove a channel segment from the system namespace.
    ///
    /// Owner's responsibility, once both sides are done. Unlinking a name that
    /// no longer exists succeeds.
    pub fn unlink(name: &str) -> Result<()> {
        ShmSegment::unlink(&SegmentName::new(name)?)
    }

    /// Check whether a channel segment with this name exists.
    #[must_use]
    pub fn exists(name: &str) -> bool {
        SegmentName::new(name).is_ok_and(|n| ShmSegment::exists(&n))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.segment.name().as_str()
    }

    /// Slot count fixed at creation
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.header().capacity
    }

    /// Maximum number of queued elements (`capacity - 1`)
    #[must_use]
    pub fn usable_capacity(&self) -> u32 {
        self.capacity() - 1
    }

    #[must_use]
    pub fn element_size(&self) -> usize {
        self.header().element_size as usize
    }

    /// Number of queued elements (snapshot)
    #[must_use]
    pub fn len(&self) -> u32 {
        self.ring().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring().is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.ring().is_full()
    }

    /// Whether this handle created the segment
    #[must_use]
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    #[must_use]
    pub fn peer(&self) -> Option<&PeerConfig> {
        self.peer.as_ref()
    }

    #[must_use]
    pub fn metrics(&self) -> &ChannelMetrics {
        &self.metrics
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name())
            .field("capacity", &self.capacity())
            .field("element_size", &self.element_size())
            .field("len", &self.len())
            .field("owner", &self.owner)
            .field("peer", &self.peer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::tests::unique_name;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;

    fn polling_pair(capacity: u32) -> (Channel, Channel, String) {
        let name = unique_name("chan").to_string();
        let mut producer = Channel::create(&name, 4, capacity).expect("create");
        let mut consumer = Channel::open(&name).expect("open");
        producer.configure(PeerConfig::polling(Pid::current())).unwrap();
        consumer.configure(PeerConfig::polling(Pid::current())).unwrap();
        (producer, consumer, name)
    }

    fn recv_u32(ch: &Channel) -> u32 {
        let mut buf = [0u8; 4];
        ch.receive(&mut buf).expect("receive");
        u32::from_ne_bytes(buf)
    }

    #[test]
    fn test_create_open_geometry() {
        let name = unique_name("geom").to_string();
        let owner = Channel::create(&name, 12, 16).unwrap();
        let peer = Channel::open(&name).unwrap();
        assert!(owner.is_owner());
        assert!(!peer.is_owner());
        assert_eq!(peer.capacity(), 16);
        assert_eq!(peer.usable_capacity(), 15);
        assert_eq!(peer.element_size(), 12);
        assert!(peer.is_empty());
        Channel::unlink(&name).unwrap();
    }

    #[test]
    fn test_create_rejects_bad_geometry() {
        let name = unique_name("badgeom").to_string();
        assert!(matches!(
            Channel::create(&name, 4, 1),
            Err(ChannelError::InvalidGeometry { .. })
        ));
        assert!(matches!(
            Channel::create(&name, 0, 8),
            Err(ChannelError::InvalidGeometry { .. })
        ));
        assert!(!Channel::exists(&name));
    }

    #[test]
    fn test_create_existing_name_fails() {
        let name = unique_name("twice").to_string();
        let _first = Channel::create(&name, 4, 4).unwrap();
        assert!(matches!(
            Channel::create(&name, 4, 4),
            Err(ChannelError::AlreadyExists(_))
        ));
        Channel::unlink(&name).unwrap();
    }

    #[test]
    fn test_open_before_create_fails() {
        let name = unique_name("never").to_string();
        for _ in 0..3 {
            assert!(matches!(
                Channel::open(&name),
                Err(ChannelError::NotFound(_))
            ));
        }
    }

    #[test]
    fn test_open_rejects_overlong_name() {
        let name = format!("/{}", "x".repeat(SegmentName::MAX_LEN));
        assert!(matches!(
            Channel::open(&name),
            Err(ChannelError::InvalidName(_))
        ));
    }

    #[test]
    fn test_open_with_element_size_mismatch() {
        let name = unique_name("esz").to_string();
        let _owner = Channel::create(&name, 8, 4).unwrap();
        assert!(Channel::open_with_element_size(&name, 8).is_ok());
        assert!(matches!(
            Channel::open_with_element_size(&name, 4),
            Err(ChannelError::LayoutMismatch(_))
        ));
        Channel::unlink(&name).unwrap();
    }

    #[test]
    fn test_open_rejects_foreign_segment() {
        let name = unique_name("foreign");
        let _raw = ShmSegment::create(&name, 4096).unwrap();
        // zero-filled: capacity 0, cannot be a ring
        assert!(matches!(
            Channel::open(name.as_str()),
            Err(ChannelError::LayoutMismatch(_))
        ));
        ShmSegment::unlink(&name).unwrap();
    }

    #[test]
    fn test_send_before_configure() {
        let name = unique_name("unconf").to_string();
        let ch = Channel::create(&name, 4, 4).unwrap();
        assert!(matches!(
            ch.send(&1u32.to_ne_bytes()),
            Err(ChannelError::NotConfigured)
        ));
        let mut out = [0u8; 4];
        assert!(matches!(
            ch.try_receive(&mut out),
            Err(ChannelError::NotConfigured)
        ));
        Channel::unlink(&name).unwrap();
    }

    #[test]
    fn test_configure_rejects_same_signal() {
        let name = unique_name("samesig").to_string();
        let mut ch = Channel::create(&name, 4, 4).unwrap();
        let cfg = PeerConfig::new(Signal::SIGALRM, Signal::SIGALRM, Pid::current());
        assert!(matches!(
            ch.configure(cfg),
            Err(ChannelError::InvalidSignal(_))
        ));
        assert!(ch.peer().is_none());
        Channel::unlink(&name).unwrap();
    }

    #[test]
    fn test_element_size_enforced() {
        let (producer, consumer, name) = polling_pair(4);
        assert!(matches!(
            producer.send(&[1, 2, 3]),
            Err(ChannelError::ElementSize {
                expected: 4,
                actual: 3
            })
        ));
        let mut big = [0u8; 8];
        assert!(consumer.try_receive(&mut big).is_err());
        Channel::unlink(&name).unwrap();
    }

    #[test]
    fn test_fifo_without_interleaving() {
        let (producer, consumer, name) = polling_pair(8);
        for v in 1..=7u32 {
            producer.send(&v.to_ne_bytes()).unwrap();
        }
        let got: Vec<u32> = (0..7).map(|_| recv_u32(&consumer)).collect();
        assert_eq!(got, (1..=7).collect::<Vec<_>>());
        assert_eq!(producer.metrics().snapshot().sends, 7);
        assert_eq!(consumer.metrics().snapshot().receives, 7);
        Channel::unlink(&name).unwrap();
    }

    #[test]
    fn test_try_ops_report_full_and_empty() {
        let (producer, consumer, name) = polling_pair(4);
        let mut out = [0u8; 4];
        assert!(!consumer.try_receive(&mut out).unwrap());
        for v in 1..=3u32 {
            assert!(producer.try_send(&v.to_ne_bytes()).unwrap());
        }
        assert!(producer.is_full());
        assert!(!producer.try_send(&4u32.to_ne_bytes()).unwrap());
        assert_eq!(consumer.len(), 3);
        assert!(consumer.try_receive(&mut out).unwrap());
        assert_eq!(u32::from_ne_bytes(out), 1);
        Channel::unlink(&name).unwrap();
    }

    #[test]
    fn test_capacity_bound_blocks_until_receive() {
        // capacity 4, 4-byte elements: 1,2,3 fill it, the 4th send blocks
        let (producer, consumer, name) = polling_pair(4);
        for v in 1..=3u32 {
            producer.send(&v.to_ne_bytes()).unwrap();
        }

        let done = Arc::new(AtomicBool::new(false));
        let done_flag = Arc::clone(&done);
        let blocked = thread::spawn(move || {
            producer.send(&4u32.to_ne_bytes()).unwrap();
            done_flag.store(true, Ordering::SeqCst);
            producer
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!done.load(Ordering::SeqCst), "4th send must block while full");

        assert_eq!(recv_u32(&consumer), 1);
        let producer = blocked.join().unwrap();
        assert!(done.load(Ordering::SeqCst));
        assert!(producer.metrics().snapshot().full_waits >= 1);

        let rest: Vec<u32> = (0..3).map(|_| recv_u32(&consumer)).collect();
        assert_eq!(rest, vec![2, 3, 4]);
        Channel::unlink(&name).unwrap();
    }

    #[test]
    fn test_receive_wakes_after_send() {
        let (producer, consumer, name) = polling_pair(4);
        let reader = thread::spawn(move || {
            let start = Instant::now();
            let v = recv_u32(&consumer);
            (v, start.elapsed(), consumer)
        });

        thread::sleep(Duration::from_millis(30));
        producer.send(&99u32.to_ne_bytes()).unwrap();

        let (v, waited, consumer) = reader.join().unwrap();
        assert_eq!(v, 99);
        assert!(waited >= Duration::from_millis(20));
        assert!(consumer.metrics().snapshot().empty_waits >= 1);
        Channel::unlink(&name).unwrap();
    }

    #[test]
    fn test_interleaved_no_loss_no_duplication() {
        let (producer, consumer, name) = polling_pair(3);
        let count = 2_000u32;

        let reader = thread::spawn(move || {
            let mut seen = Vec::with_capacity(count as usize);
            for _ in 0..count {
                seen.push(recv_u32(&consumer));
                if fastrand::u8(..) < 8 {
                    thread::yield_now();
                }
            }
            seen
        });

        for v in 1..=count {
            producer.send(&v.to_ne_bytes()).unwrap();
            if fastrand::u8(..) < 8 {
                thread::yield_now();
            }
        }

        let seen = reader.join().unwrap();
        assert_eq!(seen, (1..=count).collect::<Vec<_>>());
        Channel::unlink(&name).unwrap();
    }

    #[test]
    fn test_teardown_leaves_no_residue() {
        let name = unique_name("teardown").to_string();
        let owner = Channel::create(&name, 4, 4).unwrap();
        let peer = Channel::open(&name).unwrap();
        peer.close();
        owner.close();
        assert!(Channel::exists(&name));
        Channel::unlink(&name).unwrap();
        assert!(!Channel::exists(&name));
        assert!(matches!(
            Channel::open(&name),
            Err(ChannelError::NotFound(_))
        ));
        // idempotent
        assert!(Channel::unlink(&name).is_ok());
    }

    #[test]
    fn test_receive_timeout_expires_then_delivers() {
        let (producer, consumer, name) = polling_pair(4);
        let mut out = [0u8; 4];

        let start = Instant::now();
        assert!(!consumer
            .receive_timeout(&mut out, Duration::from_millis(20))
            .unwrap());
        assert!(start.elapsed() >= Duration::from_millis(20));

        producer.send(&5u32.to_ne_bytes()).unwrap();
        assert!(consumer
            .receive_timeout(&mut out, Duration::from_millis(20))
            .unwrap());
        assert_eq!(u32::from_ne_bytes(out), 5);
        Channel::unlink(&name).unwrap();
    }

    fn ghost_peer() -> PeerConfig {
        // Highest pid values are never assigned on default Linux configs.
        PeerConfig::new(
            Signal::SIGURG,
            Signal::SIGWINCH,
            Pid::new(i32::MAX).unwrap(),
        )
    }

    #[test]
    fn test_receive_keeps_element_when_peer_is_gone() {
        let (producer, mut consumer, name) = polling_pair(4);
        consumer.configure(ghost_peer()).unwrap();
        producer.send(&7u32.to_ne_bytes()).unwrap();
        // a writer was waiting when it disappeared
        consumer
            .header()
            .interest(Interest::WriterWaiting)
            .store(1, Ordering::SeqCst);

        assert_eq!(recv_u32(&consumer), 7);
        assert!(consumer.is_empty());
        let snap = consumer.metrics().snapshot();
        assert_eq!(snap.receives, 1);
        assert_eq!(snap.notify_failures, 1);
        assert_eq!(snap.notifications, 0);
        Channel::unlink(&name).unwrap();
    }

    #[test]
    fn test_send_commits_once_when_peer_is_gone() {
        let (mut producer, consumer, name) = polling_pair(4);
        producer.configure(ghost_peer()).unwrap();
        consumer
            .header()
            .interest(Interest::ReaderWaiting)
            .store(1, Ordering::SeqCst);

        producer.send(&9u32.to_ne_bytes()).unwrap();
        assert_eq!(producer.len(), 1);
        assert_eq!(producer.metrics().snapshot().notify_failures, 1);

        // flag was consumed: later sends do not retry the notification
        assert!(producer.try_send(&10u32.to_ne_bytes()).unwrap());
        assert_eq!(producer.metrics().snapshot().notify_failures, 1);
        assert_eq!(recv_u32(&consumer), 9);
        assert_eq!(recv_u32(&consumer), 10);
        Channel::unlink(&name).unwrap();
    }

    static INTERRUPTED: AtomicBool = AtomicBool::new(false);

    extern "C" fn note_interrupt(_: libc::c_int) {
        INTERRUPTED.store(true, Ordering::SeqCst);
    }

    #[test]
    fn test_interrupted_receive_withdraws_interest() {
        // SAFETY: trivial async-signal-safe handler, no SA_RESTART
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction =
                note_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(libc::SIGVTALRM, &action, std::ptr::null_mut());
        }

        let name = unique_name("eintr").to_string();
        let producer = Channel::create(&name, 4, 4).unwrap();
        let mut consumer = Channel::open(&name).unwrap();
        let data = Signal::new(libc::SIGXFSZ).unwrap();
        let space = Signal::new(libc::SIGTTIN).unwrap();
        consumer
            .configure(PeerConfig::new(data, space, Pid::current()))
            .unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let waiter = thread::spawn(move || {
            gate::block_target_signals(Some(data), Some(space)).unwrap();
            // SAFETY: pthread_self has no preconditions
            tx.send(unsafe { libc::pthread_self() } as usize).unwrap();
            let mut out = [0u8; 4];
            let result = consumer.receive(&mut out);
            (result, consumer)
        });

        let tid = rx.recv().unwrap() as libc::pthread_t;
        thread::sleep(Duration::from_millis(50));
        assert_eq!(
            producer
                .header()
                .interest(Interest::ReaderWaiting)
                .load(Ordering::SeqCst),
            1
        );
        // SAFETY: tid is the live waiter thread, which has SIGVTALRM unblocked
        unsafe { libc::pthread_kill(tid, libc::SIGVTALRM) };

        let (result, consumer) = waiter.join().unwrap();
        assert!(matches!(result, Err(ChannelError::InterruptedWait)));
        assert!(INTERRUPTED.load(Ordering::SeqCst));
        assert_eq!(
            producer
                .header()
                .interest(Interest::ReaderWaiting)
                .load(Ordering::SeqCst),
            0
        );
        assert_eq!(consumer.metrics().snapshot().empty_waits, 1);
        Channel::unlink(&name).unwrap();
    }

    #[test]
    fn test_debug_format() {
        let (producer, _consumer, name) = polling_pair(4);
        let s = format!("{producer:?}");
        assert!(s.contains("capacity: 4"));
        assert!(s.contains(&name));
        Channel::unlink(&name).unwrap();
    }
}
