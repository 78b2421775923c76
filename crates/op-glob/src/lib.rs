// SPDX-License-Identifier: MIT OR Apache-2.0
//! Path glob matching for artifact rule patterns.
//!
//! Patterns are matched against the *full* artifact path, anchored at both
//! ends. `*` matches any run of characters except `/`, `?` matches exactly
//! one character except `/`, and `[...]` character classes are supported.
//! `**` is not given any special cross-separator meaning — it behaves as a
//! run of `*`s, matching nothing across a `/`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use globset::{GlobBuilder, GlobMatcher};

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    matcher: GlobMatcher,
}

/// A pattern failed to compile.
#[derive(Debug, thiserror::Error)]
#[error("invalid artifact path pattern {pattern:?}: {source}")]
pub struct PatternError {
    /// The offending pattern text.
    pub pattern: String,
    #[source]
    source: globset::Error,
}

impl PathPattern {
    /// Compile `pattern`. `*` and `?` never cross a `/`.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if `pattern` is not valid glob syntax.
    pub fn new(pattern: impl Into<String>) -> Result<Self, PatternError> {
        let raw = pattern.into();
        let matcher = GlobBuilder::new(&raw)
            .literal_separator(true)
            .build()
            .map_err(|source| PatternError {
                pattern: raw.clone(),
                source,
            })?
            .compile_matcher();
        Ok(Self { raw, matcher })
    }

    /// The original pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether `path` matches this pattern.
    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }

    /// Select every path in `candidates` that matches this pattern,
    /// preserving input order.
    pub fn select<'a, I>(&self, candidates: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter(|p| self.is_match(p))
            .collect()
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for PathPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
