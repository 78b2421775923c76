// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ambient configuration: the system clock abstraction and verification
//! policy knobs that are not themselves part of the core algorithm.
//!
//! The clock is the sole ambient input to expiry checks, and multi-signer
//! disagreement handling is an explicit policy knob rather than a hidden
//! default. Both live here, away from `op-verify`'s pipeline logic, so
//! tests can substitute a [`FixedClock`] or a non-default
//! [`LinkDisagreementPolicy`] without touching the pipeline itself.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A source of the current time, injected so expiry checks are testable.
pub trait Clock: Send + Sync {
    /// The current instant, per this clock.
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to one instant, for deterministic expiry tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// How the verification pipeline handles disagreement across multiple
/// valid signers of the same step, once `>= threshold` have verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkDisagreementPolicy {
    /// Any disagreement among retained links is `StepLinkMismatch`.
    #[default]
    Strict,
    /// The majority `materials`/`products` pairing wins; ties are still
    /// `StepLinkMismatch`. Not the default — an explicit opt-in.
    MajorityVote,
}

/// Policy knobs for one verification run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifyPolicy {
    /// Directory link files are loaded from.
    pub link_dir: PathBuf,
    /// How long to wait for an inspection subprocess before giving up.
    /// `None` means wait indefinitely, the default.
    #[serde(with = "duration_seconds_opt")]
    pub inspection_timeout: Option<Duration>,
    /// Multi-signer disagreement handling.
    pub link_disagreement: LinkDisagreementPolicy,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            link_dir: PathBuf::from("."),
            inspection_timeout: None,
            link_disagreement: LinkDisagreementPolicy::default(),
        }
    }
}

mod duration_seconds_opt {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: Option<u64> = Option::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

/// Failure to load a `originproof.toml` policy file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path being read.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file was not valid TOML for [`VerifyPolicy`].
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Path being parsed.
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Load a [`VerifyPolicy`] from an optional `originproof.toml` path. When
/// `path` is `None`, the default policy is returned (strict disagreement,
/// no inspection timeout, `link_dir = "."`).
///
/// # Errors
///
/// Returns [`ConfigError`] if `path` is `Some` and the file cannot be
/// read or parsed.
pub fn load_policy(path: Option<&Path>) -> Result<VerifyPolicy, ConfigError> {
    let Some(path) = path else {
        return Ok(VerifyPolicy::default());
    };
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_strict_with_no_timeout() {
        let policy = VerifyPolicy::default();
        assert_eq!(policy.link_disagreement, LinkDisagreementPolicy::Strict);
        assert_eq!(policy.inspection_timeout, None);
    }

    #[test]
    fn fixed_clock_returns_the_pinned_instant() {
        let when = DateTime::parse_from_rfc3339("2000-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = FixedClock(when);
        assert_eq!(clock.now(), when);
    }

    #[test]
    fn loads_policy_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("originproof.toml");
        std::fs::write(
            &path,
            "link_dir = \"links\"\ninspection_timeout = 30\nlink_disagreement = \"majority_vote\"\n",
        )
        .unwrap();
        let policy = load_policy(Some(&path)).unwrap();
        assert_eq!(policy.link_dir, PathBuf::from("links"));
        assert_eq!(policy.inspection_timeout, Some(Duration::from_secs(30)));
        assert_eq!(policy.link_disagreement, LinkDisagreementPolicy::MajorityVote);
    }

    #[test]
    fn missing_path_yields_defaults() {
        let policy = load_policy(None).unwrap();
        assert_eq!(policy.link_dir, PathBuf::from("."));
    }
}
