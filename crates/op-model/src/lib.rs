// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed layout/link/step/inspection/artifact data model.
//!
//! This crate owns the shapes of a layout and its links and their
//! structural invariants ([`LayoutBody::validate`]); it does not itself
//! evaluate artifact rules (see `op-rules`) or decide pass/fail (see
//! `op-verify`).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod artifact;
mod envelope;
mod error;
mod link;
mod layout;
mod rule;

pub use artifact::{digests_agree, ArtifactSet, DigestSet};
pub use envelope::{Envelope, VerifyEnvelopeError};
pub use error::FormatError;
pub use link::{synthetic_link, Byproducts, Link, LinkBody};
pub use layout::{Inspection, Layout, LayoutBody, Step};
pub use rule::{ArtifactSide, Rule, RuleSyntaxError};

/// Re-exported so downstream crates can name the type stored in
/// [`LayoutBody::keys`] without a direct `op-crypto` dependency.
pub use op_crypto::PublicKey;
