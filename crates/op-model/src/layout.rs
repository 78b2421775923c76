//! The layout model: steps, inspections, and the signed layout body.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use op_crypto::PublicKey;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::error::FormatError;
use crate::rule::Rule;

/// One step of the supply chain, authored once by the project owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Step {
    /// Discriminator, always `"step"` on disk.
    #[serde(rename = "_type")]
    pub type_tag: String,
    /// Unique name within the layout.
    pub name: String,
    /// Command the owner expects this step's link to have run, for drift
    /// detection. Empty means "don't check".
    #[serde(default)]
    pub expected_command: Vec<String>,
    /// `keyid`s of keys authorized to sign this step's link.
    pub pubkeys: Vec<String>,
    /// Minimum number of distinct authorized keys that must sign.
    pub threshold: usize,
    /// Rules checked against the link's `materials`.
    pub material_matchrules: Vec<Rule>,
    /// Rules checked against the link's `products`.
    pub product_matchrules: Vec<Rule>,
}

impl Step {
    /// Construct a step, stamping the `_type` tag.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        pubkeys: Vec<String>,
        threshold: usize,
        material_matchrules: Vec<Rule>,
        product_matchrules: Vec<Rule>,
    ) -> Self {
        Self {
            type_tag: "step".into(),
            name: name.into(),
            expected_command: Vec::new(),
            pubkeys,
            threshold,
            material_matchrules,
            product_matchrules,
        }
    }
}

/// A verifier-run inspection: same rule shape as a [`Step`], but executed
/// and trusted locally rather than signed by a remote party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Inspection {
    /// Discriminator, always `"inspection"` on disk.
    #[serde(rename = "_type")]
    pub type_tag: String,
    /// Unique name within the layout.
    pub name: String,
    /// Command the verifier runs to produce the synthetic link.
    pub run: Vec<String>,
    /// Rules checked against the synthetic link's `materials`.
    pub material_matchrules: Vec<Rule>,
    /// Rules checked against the synthetic link's `products`.
    pub product_matchrules: Vec<Rule>,
}

impl Inspection {
    /// Construct an inspection, stamping the `_type` tag.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        run: Vec<String>,
        material_matchrules: Vec<Rule>,
        product_matchrules: Vec<Rule>,
    ) -> Self {
        Self {
            type_tag: "inspection".into(),
            name: name.into(),
            run,
            material_matchrules,
            product_matchrules,
        }
    }
}

/// The signed payload of a layout: everything but `signatures`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LayoutBody {
    /// Discriminator, always `"layout"` on disk.
    #[serde(rename = "_type")]
    pub type_tag: String,
    /// Absolute UTC instant after which the layout is no longer valid.
    pub expires: DateTime<Utc>,
    /// Every key this layout's steps may cite, by `keyid`.
    pub keys: BTreeMap<String, PublicKey>,
    /// The ordered list of pipeline steps.
    pub steps: Vec<Step>,
    /// Verifier-run inspections.
    pub inspect: Vec<Inspection>,
}

impl LayoutBody {
    /// Validate structural invariants: `_type` tag, unique step and
    /// inspection names, every step's `pubkeys` resolving against
    /// `layout.keys`, and every `threshold >= 1`.
    ///
    /// # Errors
    ///
    /// Returns the first [`FormatError`] encountered.
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.type_tag != "layout" {
            return Err(FormatError::UnknownType {
                expected: "layout",
                found: self.type_tag.clone(),
            });
        }

        let mut seen_names = BTreeSet::new();
        for name in self
            .steps
            .iter()
            .map(|s| &s.name)
            .chain(self.inspect.iter().map(|i| &i.name))
        {
            if !seen_names.insert(name.clone()) {
                return Err(FormatError::DuplicateName { name: name.clone() });
            }
        }

        for step in &self.steps {
            if step.threshold == 0 {
                return Err(FormatError::ZeroThreshold {
                    step: step.name.clone(),
                });
            }
            for keyid in &step.pubkeys {
                if !self.keys.contains_key(keyid) {
                    return Err(FormatError::UnknownKeyid {
                        step: step.name.clone(),
                        keyid: keyid.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Whether this layout has expired as of `now`. Comparison is strict:
    /// `now >= expires` counts as expired.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires
    }
}

/// A fully signed layout: the root input to the verification pipeline.
pub type Layout = Envelope<LayoutBody>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_key(id: &str) -> PublicKey {
        op_crypto::PublicKey::new(op_crypto::KeyType::Ed25519, format!("{id}deadbeef"))
    }

    fn base_layout() -> LayoutBody {
        LayoutBody {
            type_tag: "layout".into(),
            expires: Utc.with_ymd_and_hms(2999, 1, 1, 0, 0, 0).unwrap(),
            keys: BTreeMap::new(),
            steps: Vec::new(),
            inspect: Vec::new(),
        }
    }

    #[test]
    fn rejects_duplicate_names_across_steps_and_inspections() {
        let mut layout = base_layout();
        layout.steps.push(Step::new("shared", vec![], 1, vec![], vec![]));
        layout.inspect.push(Inspection::new("shared", vec![], vec![], vec![]));
        assert!(matches!(
            layout.validate(),
            Err(FormatError::DuplicateName { .. })
        ));
    }

    #[test]
    fn rejects_dangling_pubkey_reference() {
        let mut layout = base_layout();
        layout.steps.push(Step::new(
            "write-code",
            vec!["missing-keyid".into()],
            1,
            vec![],
            vec![],
        ));
        assert!(matches!(
            layout.validate(),
            Err(FormatError::UnknownKeyid { .. })
        ));
    }

    #[test]
    fn accepts_well_formed_layout() {
        let mut layout = base_layout();
        let key = sample_key("alice");
        layout.steps.push(Step::new(
            "write-code",
            vec![key.keyid.clone()],
            1,
            vec![],
            vec![],
        ));
        layout.keys.insert(key.keyid.clone(), key);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn expiry_is_strict_at_the_boundary() {
        let mut layout = base_layout();
        layout.expires = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert!(layout.is_expired(layout.expires));
        assert!(layout.is_expired(layout.expires + chrono::Duration::seconds(1)));
        assert!(!layout.is_expired(layout.expires - chrono::Duration::seconds(1)));
    }
}
