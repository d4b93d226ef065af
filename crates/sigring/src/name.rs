// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded, validated POSIX shared memory names.

use crate::{ChannelError, Result};
use std::ffi::CString;
use std::fmt;
use std::str::FromStr;

/// Validated segment name.
///
/// Must start with `/`, contain no other `/`, no NUL byte, and be at most
/// [`SegmentName::MAX_LEN`] bytes long. Names that do not fit are rejected,
/// never truncated.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SegmentName(String);

impl SegmentName {
    /// Maximum length in bytes, leading slash included (POSIX `NAME_MAX`).
    pub const MAX_LEN: usize = 255;

    /// Validate and wrap a segment name.
    pub fn new(name: &str) -> Result<Self> {
        if !name.starts_with('/') {
            return Err(ChannelError::InvalidName(format!(
                "Segment name must start with '/': {name}"
            )));
        }
        if name.len() < 2 {
            return Err(ChannelError::InvalidName(
                "Segment name is empty after '/'".to_string(),
            ));
        }
        if name[1..].contains('/') {
            return Err(ChannelError::InvalidName(format!(
                "Segment name cannot contain '/' after prefix: {name}"
            )));
        }
        if name.contains('\0') {
            return Err(ChannelError::InvalidName(format!(
                "Segment name contains NUL: {name:?}"
            )));
        }
        if name.len() > Self::MAX_LEN {
            return Err(ChannelError::InvalidName(format!(
                "Segment name too long ({} > {}): {name}",
                name.len(),
                Self::MAX_LEN
            )));
        }
        Ok(Self(name.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name as seen under `/dev/shm` (without the leading slash).
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.0[1..]
    }

    pub(crate) fn to_cstring(&self) -> CString {
        // NUL bytes are rejected in `new`, so this cannot fail.
        CString::new(self.0.as_bytes()).unwrap_or_default()
    }
}

impl FromStr for SegmentName {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for SegmentName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(SegmentName::new("/foo").is_ok());
        assert!(SegmentName::new("/app4_to_kernel").is_ok());
        let name = SegmentName::new("/k2ic").unwrap();
        assert_eq!(name.as_str(), "/k2ic");
        assert_eq!(name.file_name(), "k2ic");
        assert_eq!(name.to_string(), "/k2ic");
    }

    #[test]
    fn test_rejects_missing_slash() {
        assert!(matches!(
            SegmentName::new("foo"),
            Err(ChannelError::InvalidName(_))
        ));
    }

    #[test]
    fn test_rejects_bare_slash() {
        assert!(SegmentName::new("/").is_err());
        assert!(SegmentName::new("").is_err());
    }

    #[test]
    fn test_rejects_embedded_slash() {
        assert!(SegmentName::new("/foo/bar").is_err());
    }

    #[test]
    fn test_rejects_nul() {
        assert!(SegmentName::new("/foo\0bar").is_err());
    }

    #[test]
    fn test_length_bound_is_exact() {
        let at_limit = format!("/{}", "a".repeat(SegmentName::MAX_LEN - 1));
        assert!(SegmentName::new(&at_limit).is_ok());

        let over = format!("/{}", "a".repeat(SegmentName::MAX_LEN));
        match SegmentName::new(&over) {
            Err(ChannelError::InvalidName(msg)) => assert!(msg.contains("too long")),
            other => panic!("expected InvalidName, got {other:?}"),
        }
    }

    #[test]
    fn test_from_str() {
        let name: SegmentName = "/parsed".parse().unwrap();
        assert_eq!(name.as_ref(), "/parsed");
    }
}
