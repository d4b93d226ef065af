// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Messages carried by the simulation channels.
//!
//! # Wire Format
//!
//! Every message occupies one 12-byte ring element, native byte order:
//!
//! ```text
//! Offset  Size  Field
//! 0       4     kind  (i32: 1 = app status, 2 = syscall rw, 3 = io start)
//! 4       4     pid   (i32, sender or subject process)
//! 8       4     arg   (i32: pc for status, 0 = read / 1 = write for syscall)
//! ```

use std::fmt;
use thiserror::Error;

/// Ring element size for every simulation channel.
pub const WIRE_SIZE: usize = 12;

pub const MSG_APP_STATUS: i32 = 1;
pub const MSG_SYSCALL_RW: i32 = 2;
pub const MSG_IO_START: i32 = 3;

/// Decoding errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("Element is {0} bytes, expected 12")]
    Length(usize),

    #[error("Unknown message kind {0}")]
    UnknownKind(i32),

    #[error("Message kind {kind} not valid on this channel")]
    UnexpectedKind { kind: i32 },

    #[error("Invalid argument {arg} for message kind {kind}")]
    InvalidArg { kind: i32, arg: i32 },
}

/// Direction of a simulated I/O request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDirection {
    Read,
    Write,
}

impl IoDirection {
    /// Direction requested at program counter `pc`: even writes, odd reads.
    #[must_use]
    pub fn at_pc(pc: u32) -> Self {
        if pc % 2 == 0 {
            Self::Write
        } else {
            Self::Read
        }
    }

    fn as_arg(self) -> i32 {
        match self {
            Self::Read => 0,
            Self::Write => 1,
        }
    }
}

impl fmt::Display for IoDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// What a worker reports to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppKind {
    /// Worker reached program counter `pc`
    Status { pc: u32 },
    /// Worker issued an I/O syscall and is about to suspend itself
    SyscallRw(IoDirection),
}

/// Worker -> kernel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppMessage {
    pub pid: i32,
    pub kind: AppKind,
}

impl AppMessage {
    #[must_use]
    pub fn status(pid: i32, pc: u32) -> Self {
        Self {
            pid,
            kind: AppKind::Status { pc },
        }
    }

    #[must_use]
    pub fn syscall(pid: i32, direction: IoDirection) -> Self {
        Self {
            pid,
            kind: AppKind::SyscallRw(direction),
        }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; WIRE_SIZE] {
        let (kind, arg) = match self.kind {
            // pc values come from a small config-bounded range
            AppKind::Status { pc } => (MSG_APP_STATUS, i32::try_from(pc).unwrap_or(i32::MAX)),
            AppKind::SyscallRw(direction) => (MSG_SYSCALL_RW, direction.as_arg()),
        };
        encode_raw(kind, self.pid, arg)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        let (kind, pid, arg) = decode_raw(bytes)?;
        let kind = match kind {
            MSG_APP_STATUS => {
                let pc = u32::try_from(arg).map_err(|_| MessageError::InvalidArg { kind, arg })?;
                AppKind::Status { pc }
            }
            MSG_SYSCALL_RW => match arg {
                0 => AppKind::SyscallRw(IoDirection::Read),
                1 => AppKind::SyscallRw(IoDirection::Write),
                _ => return Err(MessageError::InvalidArg { kind, arg }),
            },
            MSG_IO_START => return Err(MessageError::UnexpectedKind { kind }),
            other => return Err(MessageError::UnknownKind(other)),
        };
        Ok(Self { pid, kind })
    }
}

/// Kernel -> interrupt controller message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcMessage {
    /// Start a simulated I/O on behalf of process `pid`
    IoStart { pid: i32 },
}

impl IcMessage {
    #[must_use]
    pub fn encode(&self) -> [u8; WIRE_SIZE] {
        match self {
            Self::IoStart { pid } => encode_raw(MSG_IO_START, *pid, 0),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        let (kind, pid, _arg) = decode_raw(bytes)?;
        match kind {
            MSG_IO_START => Ok(Self::IoStart { pid }),
            MSG_APP_STATUS | MSG_SYSCALL_RW => Err(MessageError::UnexpectedKind { kind }),
            other => Err(MessageError::UnknownKind(other)),
        }
    }
}

fn encode_raw(kind: i32, pid: i32, arg: i32) -> [u8; WIRE_SIZE] {
    let mut out = [0u8; WIRE_SIZE];
    out[0..4].copy_from_slice(&kind.to_ne_bytes());
    out[4..8].copy_from_slice(&pid.to_ne_bytes());
    out[8..12].copy_from_slice(&arg.to_ne_bytes());
    out
}

fn decode_raw(bytes: &[u8]) -> Result<(i32, i32, i32), MessageError> {
    let bytes: &[u8; WIRE_SIZE] = bytes
        .try_into()
        .map_err(|_| MessageError::Length(bytes.len()))?;
    let word = |i: usize| i32::from_ne_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
    Ok((word(0), word(4), word(8)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        let msg = AppMessage::status(4242, 7);
        assert_eq!(AppMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_syscall_wire_layout() {
        let bytes = AppMessage::syscall(100, IoDirection::Write).encode();
        assert_eq!(&bytes[0..4], &MSG_SYSCALL_RW.to_ne_bytes());
        assert_eq!(&bytes[4..8], &100i32.to_ne_bytes());
        assert_eq!(&bytes[8..12], &1i32.to_ne_bytes());
    }

    #[test]
    fn test_io_start_roundtrip() {
        let msg = IcMessage::IoStart { pid: 77 };
        assert_eq!(IcMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_direction_from_pc() {
        assert_eq!(IoDirection::at_pc(12), IoDirection::Write);
        assert_eq!(IoDirection::at_pc(7), IoDirection::Read);
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let bytes = encode_raw(9, 1, 0);
        assert_eq!(
            AppMessage::decode(&bytes),
            Err(MessageError::UnknownKind(9))
        );
        assert_eq!(IcMessage::decode(&bytes), Err(MessageError::UnknownKind(9)));
    }

    #[test]
    fn test_decode_rejects_wrong_channel_kind() {
        let io = IcMessage::IoStart { pid: 1 }.encode();
        assert!(matches!(
            AppMessage::decode(&io),
            Err(MessageError::UnexpectedKind { .. })
        ));
        let status = AppMessage::status(1, 1).encode();
        assert!(matches!(
            IcMessage::decode(&status),
            Err(MessageError::UnexpectedKind { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_args() {
        assert!(matches!(
            AppMessage::decode(&encode_raw(MSG_SYSCALL_RW, 1, 5)),
            Err(MessageError::InvalidArg { arg: 5, .. })
        ));
        assert!(matches!(
            AppMessage::decode(&encode_raw(MSG_APP_STATUS, 1, -3)),
            Err(MessageError::InvalidArg { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_short_element() {
        assert_eq!(
            AppMessage::decode(&[0u8; 8]),
            Err(MessageError::Length(8))
        );
    }
}
