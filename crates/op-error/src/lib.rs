// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy for OriginProof.
//!
//! Every fatal condition the verification pipeline can raise carries a
//! stable, machine-readable [`ErrorCode`] in addition to a human-readable
//! message. Components lower in the stack (`op-canon`, `op-crypto`,
//! `op-glob`, `op-rules`, `op-model`, `op-format`, `op-inspect`) define
//! their own small `thiserror` enums; `op-verify` and `op-cli` lift those
//! into [`OpError`] so a caller only ever has to match on one type.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Broad family an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Canonical-encoding errors.
    Encode,
    /// Signing/verification errors.
    Signature,
    /// Rule grammar errors.
    RuleSyntax,
    /// Layout/link parsing errors.
    Format,
    /// Inspection execution errors.
    Inspection,
    /// Rule evaluation errors.
    RuleEvaluation,
    /// Verification pipeline errors.
    Pipeline,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Encode => "encode",
            Self::Signature => "signature",
            Self::RuleSyntax => "rule_syntax",
            Self::Format => "format",
            Self::Inspection => "inspection",
            Self::RuleEvaluation => "rule_evaluation",
            Self::Pipeline => "pipeline",
        };
        f.write_str(s)
    }
}

/// A single rule-evaluation failure kind.
///
/// This replaces the convention of a free-text reason string (e.g.
/// `RuleVerificationFailed("match")`) with an exhaustively matchable enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFailureKind {
    /// A `CREATE` pattern matched nothing in the queue.
    Create,
    /// A `DELETE` pattern matched something still present in the queue.
    Delete,
    /// A `MODIFY` pattern matched nothing modified in the queue.
    Modify,
    /// A `MATCH` rule's source and target hit-set cardinalities differ.
    MatchCardinality,
    /// A `MATCH` rule's source artifact has no counterpart in the target set.
    MatchMissing,
    /// A `MATCH` rule's source and target digests disagree.
    MatchDigest,
}

impl fmt::Display for RuleFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Modify => "modify",
            Self::MatchCardinality => "match: cardinality",
            Self::MatchMissing => "match: missing",
            Self::MatchDigest => "match: digest",
        };
        f.write_str(s)
    }
}

/// Machine-readable, stable error code. Every variant names one way the
/// verification pipeline can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A signable value contained a float, non-string key, or NaN/Inf.
    EncodeError,
    /// A layout or link document is structurally invalid.
    FormatError,
    /// A rule tuple has the wrong arity or an unknown keyword.
    RuleSyntaxError,
    /// A single rule failed to account for its artifacts.
    RuleVerificationFailed,
    /// Artifacts remained in the queue after all rules ran.
    UnmatchedArtifacts,
    /// The layout's signatures do not meet the supplied threshold.
    LayoutSignatureError,
    /// `now >= layout.expires`.
    LayoutExpired,
    /// Fewer than `step.threshold` valid links are on disk.
    StepAuthorizationError,
    /// Two signers of one step disagree on materials/products.
    StepLinkMismatch,
    /// The inspection subprocess could not be run.
    InspectionFailed,
    /// Rule evaluation failed for some step or inspection.
    ArtifactVerificationError,
}

impl ErrorCode {
    /// The broad [`ErrorCategory`] this code belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EncodeError => ErrorCategory::Encode,
            Self::FormatError => ErrorCategory::Format,
            Self::RuleSyntaxError => ErrorCategory::RuleSyntax,
            Self::RuleVerificationFailed | Self::UnmatchedArtifacts => {
                ErrorCategory::RuleEvaluation
            }
            Self::LayoutSignatureError | Self::StepAuthorizationError => {
                ErrorCategory::Signature
            }
            Self::InspectionFailed => ErrorCategory::Inspection,
            Self::LayoutExpired
            | Self::StepLinkMismatch
            | Self::ArtifactVerificationError => ErrorCategory::Pipeline,
        }
    }

    /// Whether this code is fatal. All current codes are fatal;
    /// `CommandAlignmentWarning` has no [`ErrorCode`] because it never
    /// reaches this type — it is logged directly by `op-verify` via
    /// `tracing::warn!` and never constructed as an error value.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        true
    }

    /// Stable `SCREAMING_SNAKE_CASE` string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EncodeError => "ENCODE_ERROR",
            Self::FormatError => "FORMAT_ERROR",
            Self::RuleSyntaxError => "RULE_SYNTAX_ERROR",
            Self::RuleVerificationFailed => "RULE_VERIFICATION_FAILED",
            Self::UnmatchedArtifacts => "UNMATCHED_ARTIFACTS",
            Self::LayoutSignatureError => "LAYOUT_SIGNATURE_ERROR",
            Self::LayoutExpired => "LAYOUT_EXPIRED",
            Self::StepAuthorizationError => "STEP_AUTHORIZATION_ERROR",
            Self::StepLinkMismatch => "STEP_LINK_MISMATCH",
            Self::InspectionFailed => "INSPECTION_FAILED",
            Self::ArtifactVerificationError => "ARTIFACT_VERIFICATION_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified OriginProof error: a stable code, a message, an optional cause,
/// and free-form diagnostic context.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct OpError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Underlying cause, if any.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Structured diagnostic context (e.g. `step`, `path`, `keyid`).
    pub context: BTreeMap<String, serde_json::Value>,
}

impl OpError {
    /// Construct a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value diagnostic. Serialization failures are swallowed
    /// (the context entry is simply skipped) so this never panics.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_category_mapping_is_total() {
        let codes = [
            ErrorCode::EncodeError,
            ErrorCode::FormatError,
            ErrorCode::RuleSyntaxError,
            ErrorCode::RuleVerificationFailed,
            ErrorCode::UnmatchedArtifacts,
            ErrorCode::LayoutSignatureError,
            ErrorCode::LayoutExpired,
            ErrorCode::StepAuthorizationError,
            ErrorCode::StepLinkMismatch,
            ErrorCode::InspectionFailed,
            ErrorCode::ArtifactVerificationError,
        ];
        for c in codes {
            assert!(c.is_fatal());
            let _ = c.category();
            let _ = c.as_str();
        }
    }

    #[test]
    fn context_roundtrips_through_json() {
        let err = OpError::new(ErrorCode::RuleVerificationFailed, "create rule matched nothing")
            .with_context("step", "write-code")
            .with_context("pattern", "foo.py");
        assert_eq!(err.context.get("step").unwrap(), "write-code");
        assert_eq!(err.context.get("pattern").unwrap(), "foo.py");
    }

    #[test]
    fn rule_failure_kind_display() {
        assert_eq!(RuleFailureKind::MatchCardinality.to_string(), "match: cardinality");
        assert_eq!(RuleFailureKind::Create.to_string(), "create");
    }
}
