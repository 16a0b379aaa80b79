//! Configuration types for MirrorIO
//!
//! A mirror is described by its ordered member list, a block size used to
//! truncate the logical capacity, and a read policy. Configuration is read
//! from TOML; binaries layer command-line overrides on top.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Member path that assembles the slot as absent (degraded-mode start-up)
pub const MISSING_MEMBER: &str = "MISSING";

/// Root configuration for a mirror set
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Alignment hint for callers; the logical capacity is truncated to a
    /// multiple of it. Requests are not required to be aligned.
    pub block_size: u64,
    /// Ordered list of backing extents (files or block devices)
    pub member_paths: Vec<String>,
    /// How reads pick a member
    pub read_policy: ReadPolicy,
    /// Preferred member for the fixed-primary policy
    pub primary: usize,
    /// Window size used by the consistency verifier
    pub verify_chunk_size: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            block_size: 1024,
            member_paths: Vec::new(),
            read_policy: ReadPolicy::default(),
            primary: 0,
            verify_chunk_size: 1024 * 1024, // 1 MiB
        }
    }
}

impl MirrorConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::configuration(format!("invalid config: {e}")))
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Members in slot order
    pub fn members(&self) -> impl Iterator<Item = MemberSpec> + '_ {
        self.member_paths.iter().map(|p| MemberSpec::parse(p))
    }

    /// Check the configuration is usable for assembly
    pub fn validate(&self) -> Result<()> {
        if self.member_paths.len() < 2 {
            return Err(Error::configuration(format!(
                "a mirror needs at least 2 members, got {}",
                self.member_paths.len()
            )));
        }
        if self.block_size == 0 {
            return Err(Error::configuration("block_size must be non-zero"));
        }
        if self.verify_chunk_size == 0 {
            return Err(Error::configuration("verify_chunk_size must be non-zero"));
        }
        if self.primary >= self.member_paths.len() {
            return Err(Error::configuration(format!(
                "primary {} is not a member index (0..{})",
                self.primary,
                self.member_paths.len()
            )));
        }
        let missing = self.members().filter(MemberSpec::is_missing).count();
        if missing > 1 {
            return Err(Error::configuration(format!(
                "at most one member may be {MISSING_MEMBER}, got {missing}"
            )));
        }
        Ok(())
    }
}

/// One entry of `member_paths`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberSpec {
    Path(PathBuf),
    Missing,
}

impl MemberSpec {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s == MISSING_MEMBER {
            Self::Missing
        } else {
            Self::Path(PathBuf::from(s))
        }
    }

    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

/// Read selection policy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadPolicy {
    /// Rotate across healthy members
    RoundRobin,
    /// Always read the configured primary; fail over to the lowest-index
    /// healthy member when it is degraded
    #[default]
    FixedPrimary,
    /// Read every healthy member and fail on any difference
    VerifyAll,
}

impl ReadPolicy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round-robin",
            Self::FixedPrimary => "fixed-primary",
            Self::VerifyAll => "verify-all",
        }
    }
}

impl fmt::Display for ReadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "round-robin" => Ok(Self::RoundRobin),
            "fixed-primary" => Ok(Self::FixedPrimary),
            "verify-all" => Ok(Self::VerifyAll),
            other => Err(Error::configuration(format!(
                "unknown read policy '{other}' (expected round-robin, fixed-primary or verify-all)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = MirrorConfig::default();
        assert_eq!(config.block_size, 1024);
        assert_eq!(config.read_policy, ReadPolicy::FixedPrimary);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let config = MirrorConfig::from_toml_str(
            r#"
            block_size = 4096
            member_paths = ["/tmp/a.img", "MISSING"]
            read_policy = "round-robin"
            "#,
        )
        .unwrap();
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.read_policy, ReadPolicy::RoundRobin);
        assert_eq!(config.primary, 0);
        let members: Vec<_> = config.members().collect();
        assert_eq!(members[0], MemberSpec::Path(PathBuf::from("/tmp/a.img")));
        assert!(members[1].is_missing());
        config.validate().unwrap();
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "member_paths = [\"a\", \"b\"]\nread_policy = \"verify-all\"").unwrap();
        let config = MirrorConfig::load(file.path()).unwrap();
        assert_eq!(config.read_policy, ReadPolicy::VerifyAll);
        assert_eq!(config.member_paths.len(), 2);
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = MirrorConfig {
            member_paths: vec!["MISSING".into(), "MISSING".into()],
            ..MirrorConfig::default()
        };
        assert!(config.validate().is_err());

        config.member_paths = vec!["a".into(), "b".into()];
        config.primary = 2;
        assert!(config.validate().is_err());

        config.primary = 1;
        config.block_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_read_policy_from_str() {
        assert_eq!("verify-all".parse::<ReadPolicy>().unwrap(), ReadPolicy::VerifyAll);
        assert_eq!(ReadPolicy::RoundRobin.to_string(), "round-robin");
        assert!("random".parse::<ReadPolicy>().is_err());
    }
}
