//! Shape/invariant errors for the data model (`FormatError`).

/// A layout or link failed to parse or violated a model invariant.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormatError {
    /// The `_type` tag did not match what this position in the file expects.
    #[error("expected _type {expected:?}, found {found:?}")]
    UnknownType {
        /// The `_type` tag this parser accepts.
        expected: &'static str,
        /// The `_type` tag actually present.
        found: String,
    },
    /// A step's `pubkeys` entry names a `keyid` absent from `layout.keys`.
    #[error("step {step:?} references unknown keyid {keyid:?}")]
    UnknownKeyid {
        /// The step whose `pubkeys` is at fault.
        step: String,
        /// The dangling `keyid`.
        keyid: String,
    },
    /// Two steps, or a step and an inspection, share a name.
    #[error("duplicate step/inspection name {name:?}")]
    DuplicateName {
        /// The repeated name.
        name: String,
    },
    /// A step declared `threshold: 0`, which can never be satisfied —
    /// thresholds are always `N >= 1`.
    #[error("step {step:?} has threshold 0, must be >= 1")]
    ZeroThreshold {
        /// The offending step.
        step: String,
    },
}
