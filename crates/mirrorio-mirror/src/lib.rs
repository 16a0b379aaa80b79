//! MirrorIO Mirror Engine
//!
//! This crate exposes one virtual block device backed by N (normally two)
//! member stores of identical logical size and keeps them bit-identical
//! under concurrent I/O.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐
//! │        MirrorSet        │  read / write / flush / verify
//! └───────┬─────────┬───────┘
//!         │         │
//! ┌───────▼───┐ ┌───▼───────────┐   ┌──────────────┐
//! │  Fan-out  │ │ Read selector │   │  Verifier    │
//! │ (+ range  │ │ rr / primary /│   │ (all healthy │
//! │   lock)   │ │  verify-all)  │   │   members)   │
//! └───────┬───┘ └───┬───────────┘   └──────┬───────┘
//!         │         │                      │
//! ┌───────▼─────────▼──────────────────────▼───────┐
//! │     MemberTable: Healthy / Degraded slots      │
//! └───────┬───────────────────────────────┬────────┘
//!         │                               │
//!   ┌─────▼──────┐                  ┌─────▼──────┐
//!   │ BlockStore │  member0         │ BlockStore │  member1
//!   └────────────┘                  └────────────┘
//! ```
//!
//! # Guarantees
//!
//! - A write is acknowledged only when every healthy member took it. A
//!   member that fails a write or flush is marked Degraded and no longer
//!   serves reads until it is repaired externally.
//! - Overlapping writes are serialized by a range lock held for the whole
//!   fan-out, so concurrent writers cannot interleave differently on
//!   different members.
//! - Durability requires an explicit flush. Flushes are not atomic across
//!   members: a partial flush failure does not roll back the members that
//!   did sync.
//! - The verifier reads members without the range lock; its result is a
//!   best-effort snapshot while writes are in flight.

pub mod fanout;
pub mod member;
pub mod mirror;
pub mod range_lock;
pub mod selector;
pub mod verify;

pub use member::{MemberStatus, MemberTable};
pub use mirror::{MirrorOptions, MirrorSet, MirrorStatus};
pub use range_lock::{RangeGuard, RangeLock};
pub use selector::ReadSelector;
pub use verify::VerifyMode;
