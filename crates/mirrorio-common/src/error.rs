//! Error types for MirrorIO
//!
//! This module defines the error taxonomy shared by the storage adapters
//! and the mirror engine.

use crate::types::MemberId;
use thiserror::Error;

/// Common result type for MirrorIO operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for MirrorIO
#[derive(Debug, Error)]
pub enum Error {
    // Request errors
    #[error("request out of range: offset {offset} + length {length} exceeds capacity {capacity}")]
    OutOfRange {
        offset: u64,
        length: u64,
        capacity: u64,
    },

    // Device errors
    #[error("disk I/O error: {0}")]
    DiskIo(#[from] std::io::Error),

    #[error("I/O error on {member}: {source}")]
    Io {
        member: MemberId,
        #[source]
        source: std::io::Error,
    },

    // Mirror errors
    #[error("write failed on {}", member_list(.failed))]
    PartialWriteFailure { failed: Vec<MemberId> },

    #[error("flush failed on {}", member_list(.failed))]
    PartialFlushFailure { failed: Vec<MemberId> },

    #[error("mirror divergence at offset {offset} ({length} bytes)")]
    MirrorDivergence { offset: u64, length: u64 },

    #[error("mirror unavailable: no healthy member remains")]
    MirrorUnavailable,

    #[error("member not found: {0}")]
    MemberNotFound(MemberId),

    // Internal errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

fn member_list(members: &[MemberId]) -> String {
    members
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Attribute a device-level failure to a member
    ///
    /// Errors that already name a member, or that are not device failures,
    /// pass through unchanged.
    #[must_use]
    pub fn on_member(self, member: MemberId) -> Self {
        match self {
            Self::DiskIo(source) => Self::Io { member, source },
            other => other,
        }
    }

    /// Member the error is attributed to, if any
    #[must_use]
    pub const fn member(&self) -> Option<MemberId> {
        match self {
            Self::Io { member, .. } | Self::MemberNotFound(member) => Some(*member),
            _ => None,
        }
    }

    /// Members marked Degraded as a consequence of this error
    #[must_use]
    pub fn degraded_members(&self) -> &[MemberId] {
        match self {
            Self::PartialWriteFailure { failed } | Self::PartialFlushFailure { failed } => failed,
            _ => &[],
        }
    }

    /// Check if this is a retryable error
    ///
    /// Only raw device failures are candidates for a caller retry policy;
    /// range errors are caller bugs and mirror-level failures already
    /// changed member state.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DiskIo(_) | Self::Io { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::DiskIo(std::io::Error::other("boom")).is_retryable());
        assert!(!Error::MirrorUnavailable.is_retryable());
        assert!(
            !Error::OutOfRange {
                offset: 0,
                length: 1,
                capacity: 0
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_on_member() {
        let err = Error::DiskIo(std::io::Error::other("boom")).on_member(MemberId::new(1));
        assert_eq!(err.member(), Some(MemberId::new(1)));
        assert_eq!(err.to_string(), "I/O error on member1: boom");

        let err = Error::MirrorUnavailable.on_member(MemberId::new(0));
        assert!(matches!(err, Error::MirrorUnavailable));
    }

    #[test]
    fn test_partial_failure_display() {
        let err = Error::PartialWriteFailure {
            failed: vec![MemberId::new(0), MemberId::new(1)],
        };
        assert_eq!(err.to_string(), "write failed on member0, member1");
        assert_eq!(err.degraded_members().len(), 2);
    }
}
