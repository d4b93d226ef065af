// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Errors returned by channel operations.

use std::fmt;
use std::io;

/// Errors that can occur while creating, opening or driving a channel.
#[derive(Debug)]
pub enum ChannelError {
    /// Shared memory segment creation (`shm_open`/`ftruncate`) failed
    SegmentCreate(io::Error),

    /// Shared memory segment open (`shm_open`/`fstat`) failed
    SegmentOpen(io::Error),

    /// Memory mapping failed
    Mmap(io::Error),

    /// A segment with this name already exists
    AlreadyExists(String),

    /// No segment with this name exists
    NotFound(String),

    /// Segment name rejected by validation
    InvalidName(String),

    /// Capacity or element size cannot describe a usable ring
    InvalidGeometry { capacity: u32, element_size: u32 },

    /// Opened segment does not match its header or the expected element size
    LayoutMismatch(String),

    /// Caller buffer length differs from the ring element size
    ElementSize { expected: usize, actual: usize },

    /// Signal number outside the usable range
    InvalidSignal(i32),

    /// Changing the thread signal mask failed
    SignalMask(io::Error),

    /// Delivering a notification to the peer failed
    Notify(io::Error),

    /// Blocking wait was interrupted by a non-target signal
    InterruptedWait,

    /// Send or receive attempted before `configure`
    NotConfigured,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SegmentCreate(e) => write!(f, "Shared memory segment creation failed: {e}"),
            Self::SegmentOpen(e) => write!(f, "Shared memory segment open failed: {e}"),
            Self::Mmap(e) => write!(f, "Memory mapping failed: {e}"),
            Self::AlreadyExists(name) => write!(f, "Segment already exists: {name}"),
            Self::NotFound(name) => write!(f, "Segment not found: {name}"),
            Self::InvalidName(name) => write!(f, "Invalid segment name: {name}"),
            Self::InvalidGeometry {
                capacity,
                element_size,
            } => write!(
                f,
                "Invalid ring geometry: capacity={capacity}, element_size={element_size}"
            ),
            Self::LayoutMismatch(reason) => write!(f, "Segment layout mismatch: {reason}"),
            Self::ElementSize { expected, actual } => write!(
                f,
                "Element size mismatch: expected {expected} bytes, got {actual}"
            ),
            Self::InvalidSignal(signo) => write!(f, "Invalid notification signal: {signo}"),
            Self::SignalMask(e) => write!(f, "Failed to update signal mask: {e}"),
            Self::Notify(e) => write!(f, "Failed to notify peer: {e}"),
            Self::InterruptedWait => write!(f, "Wait for notification was interrupted"),
            Self::NotConfigured => write!(f, "Channel peer is not configured"),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SegmentCreate(e)
            | Self::SegmentOpen(e)
            | Self::Mmap(e)
            | Self::SignalMask(e)
            | Self::Notify(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for channel operations
pub type Result<T> = std::result::Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display_messages() {
        let e = ChannelError::NotFound("/missing".into());
        assert_eq!(e.to_string(), "Segment not found: /missing");

        let e = ChannelError::ElementSize {
            expected: 4,
            actual: 8,
        };
        assert!(e.to_string().contains("expected 4 bytes, got 8"));

        let e = ChannelError::InvalidGeometry {
            capacity: 1,
            element_size: 4,
        };
        assert!(e.to_string().contains("capacity=1"));
    }

    #[test]
    fn test_source_only_for_io_variants() {
        let io = ChannelError::Mmap(io::Error::from_raw_os_error(libc::ENOMEM));
        assert!(io.source().is_some());
        assert!(ChannelError::InterruptedWait.source().is_none());
        assert!(ChannelError::NotConfigured.source().is_none());
    }
}
