//! MirrorIO Common - Shared types and utilities
//!
//! This crate provides the error taxonomy, configuration structures and
//! core types used across all MirrorIO components.

pub mod config;
pub mod error;
pub mod types;

pub use config::{MISSING_MEMBER, MemberSpec, MirrorConfig, ReadPolicy};
pub use error::{Error, Result};
pub use types::*;
