// SPDX-License-Identifier: MIT OR Apache-2.0
//! Signing, verification, and threshold-signature policy.
//!
//! The engine is key-algorithm agnostic in spirit — [`PublicKey`] carries a
//! [`KeyType`] tag — but only Ed25519 is implemented today, via
//! `ed25519-dalek`. `keyid` is a SHA-256 digest over the canonical encoding
//! (see `op-canon`) of the key's type and public material, so the same key
//! always produces the same id regardless of whether it is held alongside
//! a private half.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use ed25519_dalek::{Signature as DalekSignature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Signature algorithm tag carried on a [`PublicKey`].
///
/// Only Ed25519 is implemented today. Adding `KeyType::RsaPssSha256` later
/// is a matter of a new enum arm plus a new verification branch — nothing
/// upstream needs to change because callers only ever deal in `PublicKey`
/// and `Signature`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    /// Ed25519 (RFC 8032).
    Ed25519,
}

/// A public key plus its derived `keyid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    /// SHA-256 digest over the canonical encoding of `(key_type, public)`.
    pub keyid: String,
    /// Signature algorithm.
    pub key_type: KeyType,
    /// Hex-encoded public key material.
    pub public: String,
}

impl PublicKey {
    /// Construct a `PublicKey` from raw type + hex material, deriving `keyid`.
    #[must_use]
    pub fn new(key_type: KeyType, public_hex: impl Into<String>) -> Self {
        let public = public_hex.into();
        let keyid = compute_keyid(key_type, &public);
        Self {
            keyid,
            key_type,
            public,
        }
    }

    /// Verify `payload` against `signature` using this key.
    ///
    /// # Errors
    ///
    /// Returns [`BadSignature`] if the signature's `keyid` does not match
    /// this key, the encodings are malformed, or the cryptographic check
    /// fails. This function never panics on attacker-controlled input.
    pub fn verify(&self, payload: &[u8], signature: &Signature) -> Result<(), BadSignature> {
        if signature.keyid != self.keyid {
            return Err(BadSignature::KeyIdMismatch {
                signature_keyid: signature.keyid.clone(),
                key_keyid: self.keyid.clone(),
            });
        }
        match self.key_type {
            KeyType::Ed25519 => {
                let key_bytes = hex::decode(&self.public)
                    .map_err(|e| BadSignature::Malformed(format!("public key hex: {e}")))?;
                let key_bytes: [u8; 32] = key_bytes
                    .try_into()
                    .map_err(|_| BadSignature::Malformed("public key is not 32 bytes".into()))?;
                let verifying_key = VerifyingKey::from_bytes(&key_bytes)
                    .map_err(|e| BadSignature::Malformed(format!("public key: {e}")))?;

                let sig_bytes = hex::decode(&signature.sig)
                    .map_err(|e| BadSignature::Malformed(format!("signature hex: {e}")))?;
                let sig_bytes: [u8; 64] = sig_bytes
                    .try_into()
                    .map_err(|_| BadSignature::Malformed("signature is not 64 bytes".into()))?;
                let dalek_sig = DalekSignature::from_bytes(&sig_bytes);

                verifying_key
                    .verify(payload, &dalek_sig)
                    .map_err(|_| BadSignature::Invalid)
            }
        }
    }
}

/// An Ed25519 keypair: the private half plus its derived [`PublicKey`].
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh random keypair.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        let signing_key = SigningKey::generate(&mut rng);
        Self::from_signing_key(signing_key)
    }

    /// Build a keypair from an existing Ed25519 signing key.
    #[must_use]
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_hex = hex::encode(signing_key.verifying_key().to_bytes());
        let public = PublicKey::new(KeyType::Ed25519, public_hex);
        Self {
            signing_key,
            public,
        }
    }

    /// Load a keypair from 32 raw secret-key bytes.
    ///
    /// # Errors
    ///
    /// Never fails for well-formed input; kept fallible for symmetry with
    /// future key types that may reject malformed material.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(&bytes))
    }

    /// This keypair's public half.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Sign `payload`, producing a [`Signature`] tagged with this key's id.
    #[must_use]
    pub fn sign(&self, payload: &[u8]) -> Signature {
        let sig = self.signing_key.sign(payload);
        Signature {
            keyid: self.public.keyid.clone(),
            sig: hex::encode(sig.to_bytes()),
        }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

fn compute_keyid(key_type: KeyType, public_hex: &str) -> String {
    let v = serde_json::json!({ "key_type": key_type, "public": public_hex });
    let bytes =
        op_canon::canonicalize(&v).expect("key material has no floats and always canonicalizes");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
}

/// A detached signature over a canonically-encoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Id of the key that produced this signature.
    pub keyid: String,
    /// Hex-encoded signature bytes.
    pub sig: String,
}

/// A failed signature verification. Never raised as a panic — always a
/// value, since a bad signature is an expected, recoverable outcome.
#[derive(Debug, thiserror::Error)]
pub enum BadSignature {
    /// The signature names a different key than the one it was checked against.
    #[error("signature keyid {signature_keyid} does not match key {key_keyid}")]
    KeyIdMismatch {
        /// `keyid` carried on the signature.
        signature_keyid: String,
        /// `keyid` of the key checked against.
        key_keyid: String,
    },
    /// The key or signature hex/length encoding was invalid.
    #[error("malformed key or signature: {0}")]
    Malformed(String),
    /// The cryptographic check itself failed.
    #[error("cryptographic signature verification failed")]
    Invalid,
}

/// The outcome of [`verify_threshold`] when the threshold was not met.
#[derive(Debug, thiserror::Error)]
#[error("threshold not met: needed {needed} distinct authorized keys, got {got} ({valid_keyids:?})")]
pub struct ThresholdNotMet {
    /// Minimum number of distinct authorized keys required.
    pub needed: usize,
    /// Number of distinct authorized keys that actually verified.
    pub got: usize,
    /// The `keyid`s that did verify, for diagnostics.
    pub valid_keyids: BTreeSet<String>,
}

/// Accept `payload` iff at least `threshold` *distinct* `keyid`s drawn
/// from `authorized` each produce a
/// verifying signature in `signatures`. Duplicate signatures by the same
/// key count once. Unauthorized or malformed signatures are ignored, not
/// fatal — only the final count matters.
///
/// Returns the set of distinct authorized `keyid`s that verified.
///
/// # Errors
///
/// Returns [`ThresholdNotMet`] if fewer than `threshold` distinct
/// authorized keys verify.
pub fn verify_threshold(
    payload: &[u8],
    signatures: &[Signature],
    authorized: &BTreeMap<String, PublicKey>,
    threshold: usize,
) -> Result<BTreeSet<String>, ThresholdNotMet> {
    let mut verified = BTreeSet::new();
    for sig in signatures {
        if verified.contains(&sig.keyid) {
            continue;
        }
        let Some(key) = authorized.get(&sig.keyid) else {
            continue;
        };
        if key.verify(payload, sig).is_ok() {
            verified.insert(sig.keyid.clone());
        }
    }
    if verified.len() >= threshold {
        Ok(verified)
    } else {
        Err(ThresholdNotMet {
            needed: threshold,
            got: verified.len(),
            valid_keyids: verified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_roundtrips() {
        let kp = KeyPair::generate();
        let payload = b"hello supply chain";
        let sig = kp.sign(payload);
        kp.public_key().verify(payload, &sig).unwrap();
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"original");
        let err = kp.public_key().verify(b"tampered", &sig).unwrap_err();
        assert!(matches!(err, BadSignature::Invalid));
    }

    #[test]
    fn public_only_and_public_plus_private_share_keyid() {
        let kp = KeyPair::generate();
        let public_only = kp.public_key().clone();
        assert_eq!(public_only.keyid, kp.public_key().keyid);
    }

    #[test]
    fn wrong_key_signature_mismatch_is_bad_signature_not_panic() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let sig = alice.sign(b"payload");
        let err = bob.public_key().verify(b"payload", &sig).unwrap_err();
        assert!(matches!(err, BadSignature::KeyIdMismatch { .. }));
    }

    #[test]
    fn malformed_signature_hex_is_bad_signature_not_panic() {
        let kp = KeyPair::generate();
        let bad = Signature {
            keyid: kp.public_key().keyid.clone(),
            sig: "not-hex!!".into(),
        };
        let err = kp.public_key().verify(b"payload", &bad).unwrap_err();
        assert!(matches!(err, BadSignature::Malformed(_)));
    }

    #[test]
    fn threshold_counts_distinct_keys_not_signatures() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let payload = b"layout bytes";
        let mut authorized = BTreeMap::new();
        authorized.insert(alice.public_key().keyid.clone(), alice.public_key().clone());
        authorized.insert(bob.public_key().keyid.clone(), bob.public_key().clone());

        let sig_a = alice.sign(payload);
        let sig_a_dup = alice.sign(payload);
        let signatures = vec![sig_a.clone(), sig_a_dup];

        let err = verify_threshold(payload, &signatures, &authorized, 2).unwrap_err();
        assert_eq!(err.got, 1);

        let signatures_with_bob = vec![sig_a, bob.sign(payload)];
        let ok = verify_threshold(payload, &signatures_with_bob, &authorized, 2).unwrap();
        assert_eq!(ok.len(), 2);
    }

    #[test]
    fn threshold_ignores_unauthorized_signers() {
        let alice = KeyPair::generate();
        let mallory = KeyPair::generate();
        let payload = b"layout bytes";
        let mut authorized = BTreeMap::new();
        authorized.insert(alice.public_key().keyid.clone(), alice.public_key().clone());

        let signatures = vec![mallory.sign(payload), alice.sign(payload)];
        let ok = verify_threshold(payload, &signatures, &authorized, 1).unwrap();
        assert_eq!(ok, BTreeSet::from([alice.public_key().keyid.clone()]));
    }

    proptest::proptest! {
        #[test]
        fn any_payload_roundtrips(bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256)) {
            let kp = KeyPair::generate();
            let sig = kp.sign(&bytes);
            proptest::prop_assert!(kp.public_key().verify(&bytes, &sig).is_ok());
        }
    }
}
