//! The on-disk signed object wrapper: `{ signed, signatures }`.

use std::collections::{BTreeMap, BTreeSet};

use op_canon::EncodeError;
use op_crypto::{PublicKey, Signature, ThresholdNotMet};
use serde::{Deserialize, Serialize};

/// A signable payload plus the signatures collected over its canonical
/// encoding. The signable encoding never includes `signatures` itself.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Envelope<T> {
    /// The signed payload.
    pub signed: T,
    /// Signatures over the canonical encoding of `signed`.
    pub signatures: Vec<Signature>,
}

impl<T: Serialize> Envelope<T> {
    /// Construct an envelope around `signed` with no signatures yet.
    pub fn unsigned(signed: T) -> Self {
        Self {
            signed,
            signatures: Vec::new(),
        }
    }

    /// The canonical byte encoding of `signed` — what signatures are taken
    /// over and verified against.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if `signed` contains a value the canonical
    /// encoder rejects (e.g. a floating-point field).
    pub fn signable_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        op_canon::canonicalize(&self.signed)
    }

    /// Check this envelope's signatures against `authorized` under
    /// `threshold`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if the payload cannot be canonically
    /// encoded, or the inner [`ThresholdNotMet`] if too few distinct
    /// authorized keys verify.
    pub fn verify_threshold(
        &self,
        authorized: &BTreeMap<String, PublicKey>,
        threshold: usize,
    ) -> Result<BTreeSet<String>, VerifyEnvelopeError> {
        let bytes = self.signable_bytes()?;
        op_crypto::verify_threshold(&bytes, &self.signatures, authorized, threshold)
            .map_err(VerifyEnvelopeError::ThresholdNotMet)
    }
}

/// Failure to verify an [`Envelope`]'s signatures.
#[derive(Debug, thiserror::Error)]
pub enum VerifyEnvelopeError {
    /// The payload itself could not be canonically encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// Fewer than `threshold` distinct authorized keys verified.
    #[error(transparent)]
    ThresholdNotMet(#[from] ThresholdNotMet),
}
