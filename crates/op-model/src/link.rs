//! The link model: a signed attestation that a step ran.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactSet;
use crate::envelope::Envelope;
use crate::error::FormatError;

/// Captured byproducts of a step's command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Byproducts {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Process exit code.
    pub return_value: i64,
}

/// The signed payload of a link: everything but `signatures`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LinkBody {
    /// Discriminator, always `"link"` on disk.
    #[serde(rename = "_type")]
    pub type_tag: String,
    /// Name of the step this link attests to.
    pub name: String,
    /// The command actually run.
    pub command: Vec<String>,
    /// Artifacts present before the command ran.
    pub materials: ArtifactSet,
    /// Artifacts present after the command ran.
    pub products: ArtifactSet,
    /// Captured stdout/stderr/exit code.
    pub byproducts: Byproducts,
    /// Environment the command ran under.
    #[serde(default)]
    pub environment: std::collections::BTreeMap<String, String>,
}

impl LinkBody {
    /// Construct a link body, stamping `_type` and normalizing nothing else
    /// — links carry no rules, so there is no keyword case to normalize.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        command: Vec<String>,
        materials: ArtifactSet,
        products: ArtifactSet,
        byproducts: Byproducts,
    ) -> Self {
        Self {
            type_tag: "link".into(),
            name: name.into(),
            command,
            materials,
            products,
            byproducts,
            environment: std::collections::BTreeMap::new(),
        }
    }

    /// Validate the `_type` tag read from disk.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::UnknownType`] if `_type` is not `"link"`.
    pub fn validate_type_tag(&self) -> Result<(), FormatError> {
        if self.type_tag == "link" {
            Ok(())
        } else {
            Err(FormatError::UnknownType {
                expected: "link",
                found: self.type_tag.clone(),
            })
        }
    }
}

/// A fully signed link: the on-disk unit named `<step_name>.link` (or
/// `<step_name>.<keyid prefix>.link` when multiple signers exist).
pub type Link = Envelope<LinkBody>;

/// A synthetic link produced by running an inspection. Carries the same
/// shape as a signed [`Link`] but is never itself signed — it is trusted
/// because the verifier produced it directly.
#[must_use]
pub fn synthetic_link(
    inspection_name: &str,
    run: &[String],
    materials: ArtifactSet,
    products: ArtifactSet,
    byproducts: Byproducts,
) -> LinkBody {
    LinkBody::new(inspection_name, run.to_vec(), materials, products, byproducts)
}
