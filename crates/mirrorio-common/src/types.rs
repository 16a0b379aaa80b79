//! Core type definitions for MirrorIO
//!
//! This module defines the fundamental types shared by the storage adapters,
//! the mirror engine and the tooling: member identifiers, member health,
//! byte ranges and divergence reports.

use crate::error::{Error, Result};
use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Position of a member within its mirror set
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From,
    Into,
)]
#[display("member{_0}")]
pub struct MemberId(usize);

impl MemberId {
    /// Create a member id from its slot index
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the slot index
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

/// Health of a single member slot
///
/// Degraded is sticky: only an external repair action moves a member back
/// to Healthy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum MemberState {
    #[default]
    #[display("healthy")]
    Healthy,
    #[display("degraded")]
    Degraded,
}

impl MemberState {
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Overall health of a mirror set
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorHealth {
    /// Every member is healthy
    Online,
    /// Some members are degraded (count), at least one is healthy
    Degraded(usize),
    /// No healthy member remains
    Unavailable,
}

impl MirrorHealth {
    /// Derive the overall health from per-member states
    #[must_use]
    pub fn from_states(states: &[MemberState]) -> Self {
        let degraded = states.iter().filter(|s| !s.is_healthy()).count();
        if degraded == 0 {
            Self::Online
        } else if degraded == states.len() {
            Self::Unavailable
        } else {
            Self::Degraded(degraded)
        }
    }
}

/// A byte range `[offset, offset + length)` on the virtual device
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IoRange {
    pub offset: u64,
    pub length: u64,
}

impl IoRange {
    #[must_use]
    pub const fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Build a range and check it lies within `capacity`
    pub fn checked(offset: u64, length: u64, capacity: u64) -> Result<Self> {
        match offset.checked_add(length) {
            Some(end) if end <= capacity => Ok(Self::new(offset, length)),
            _ => Err(Error::OutOfRange {
                offset,
                length,
                capacity,
            }),
        }
    }

    /// Exclusive end of the range
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.length
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Check if two ranges share at least one byte
    #[must_use]
    pub const fn overlaps(&self, other: &IoRange) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.offset < other.end()
            && other.offset < self.end()
    }
}

/// Byte value held by one member at a mismatching offset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberByte {
    pub member: MemberId,
    pub value: u8,
}

/// First mismatching byte found by a comparison
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Absolute offset on the virtual device
    pub offset: u64,
    /// What every compared member holds at that offset
    pub bytes: Vec<MemberByte>,
}

/// Result of comparing a region across members
///
/// Produced by the consistency verifier and by verify-all reads; it is
/// handed to the caller and never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivergenceReport {
    /// Start of the compared region
    pub offset: u64,
    /// Length of the compared region
    pub length: u64,
    /// Members that took part in the comparison
    pub members: Vec<MemberId>,
    /// First differing byte
    pub first: Mismatch,
    /// Maximal runs of differing bytes, in offset order. Holds only the
    /// first run unless every range was requested.
    pub ranges: Vec<IoRange>,
}

impl DivergenceReport {
    /// Total number of differing bytes across the reported ranges
    #[must_use]
    pub fn mismatched_bytes(&self) -> u64 {
        self.ranges.iter().map(|r| r.length).sum()
    }

    /// The run containing the first differing byte
    #[must_use]
    pub fn first_range(&self) -> IoRange {
        self.ranges
            .first()
            .copied()
            .unwrap_or(IoRange::new(self.first.offset, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_id_display() {
        assert_eq!(MemberId::new(1).to_string(), "member1");
        assert_eq!(MemberId::from(3).index(), 3);
    }

    #[test]
    fn test_range_checked() {
        assert!(IoRange::checked(0, 10, 10).is_ok());
        assert!(IoRange::checked(9, 1, 10).is_ok());
        assert!(matches!(
            IoRange::checked(9, 2, 10),
            Err(Error::OutOfRange { offset: 9, length: 2, capacity: 10 })
        ));
        assert!(IoRange::checked(u64::MAX, 2, 10).is_err());
    }

    #[test]
    fn test_range_overlap() {
        let a = IoRange::new(0, 10);
        assert!(a.overlaps(&IoRange::new(9, 1)));
        assert!(!a.overlaps(&IoRange::new(10, 5)));
        assert!(!a.overlaps(&IoRange::new(5, 0)));
        assert!(!IoRange::new(5, 0).overlaps(&a));
        assert!(!IoRange::new(0, 0).overlaps(&IoRange::new(0, 0)));
    }

    #[test]
    fn test_mirror_health() {
        use MemberState::{Degraded, Healthy};
        assert_eq!(MirrorHealth::from_states(&[Healthy, Healthy]), MirrorHealth::Online);
        assert_eq!(
            MirrorHealth::from_states(&[Healthy, Degraded]),
            MirrorHealth::Degraded(1)
        );
        assert_eq!(
            MirrorHealth::from_states(&[Degraded, Degraded]),
            MirrorHealth::Unavailable
        );
    }
}
