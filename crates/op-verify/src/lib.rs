// SPDX-License-Identifier: MIT OR Apache-2.0
//! The end-to-end verification pipeline.
//!
//! [`verify`] runs, in order: layout signature and expiry checks, per-step
//! link loading and authorization, multi-signer agreement, command-drift
//! warnings, inspection execution, and rule evaluation across the
//! combined link index. It is the only layer that decides fatal vs
//! warning-only — every lower layer surfaces a typed error and this
//! crate lifts it into [`op_error::OpError`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::path::Path;

use op_config::{Clock, LinkDisagreementPolicy, VerifyPolicy};
use op_error::{ErrorCode, OpError};
use op_model::{Layout, LinkBody, PublicKey, Step};

/// The inputs to one verification run.
pub struct VerifyRequest<'a> {
    /// Path to the signed layout file.
    pub layout_path: &'a Path,
    /// Keys the caller trusts to have signed the layout, and the
    /// threshold (conventionally, every supplied key must verify).
    pub layout_keys: Vec<PublicKey>,
    /// Directory holding `<step>.link` files.
    pub link_dir: &'a Path,
    /// Working directory inspections run in.
    pub workdir: &'a Path,
    /// Ambient policy (disagreement handling, inspection timeout).
    pub policy: VerifyPolicy,
}

/// Run the full verification pipeline.
///
/// # Errors
///
/// Returns the first fatal [`OpError`] encountered. Command-drift
/// conditions never appear here; they
/// are emitted via `tracing::warn!` and do not affect the result.
pub fn verify(request: VerifyRequest<'_>, clock: &dyn Clock) -> Result<(), OpError> {
    let layout = op_format::read_layout(request.layout_path)
        .map_err(|e| OpError::new(ErrorCode::FormatError, e.to_string()).with_source(e))?;

    let authorized_layout_keys: BTreeMap<String, PublicKey> = request
        .layout_keys
        .iter()
        .map(|k| (k.keyid.clone(), k.clone()))
        .collect();
    let layout_threshold = authorized_layout_keys.len().max(1);
    layout
        .verify_threshold(&authorized_layout_keys, layout_threshold)
        .map_err(|e| {
            OpError::new(ErrorCode::LayoutSignatureError, e.to_string()).with_source(e)
        })?;

    let now = clock.now();
    if layout.signed.is_expired(now) {
        return Err(OpError::new(
            ErrorCode::LayoutExpired,
            format!("layout expired at {}, now is {now}", layout.signed.expires),
        )
        .with_context("expires", layout.signed.expires.to_rfc3339()));
    }

    let mut links_index: BTreeMap<String, LinkBody> = BTreeMap::new();

    for step in &layout.signed.steps {
        let canonical = authorize_and_merge_step(&layout, step, request.link_dir, &request.policy)?;
        check_command_alignment(step, &canonical);
        links_index.insert(step.name.clone(), canonical);
    }

    for inspection in &layout.signed.inspect {
        let synthetic = op_inspect::run_inspection(inspection, request.workdir).map_err(|e| {
            OpError::new(ErrorCode::InspectionFailed, e.to_string())
                .with_context("inspection", inspection.name.clone())
                .with_source(e)
        })?;
        links_index.insert(inspection.name.clone(), synthetic);
    }

    for step in &layout.signed.steps {
        let link = &links_index[&step.name];
        evaluate_side(&step.material_matchrules, &link.materials, &links_index, &step.name, "materials")?;
        evaluate_side(&step.product_matchrules, &link.products, &links_index, &step.name, "products")?;
    }
    for inspection in &layout.signed.inspect {
        let link = &links_index[&inspection.name];
        evaluate_side(
            &inspection.material_matchrules,
            &link.materials,
            &links_index,
            &inspection.name,
            "materials",
        )?;
        evaluate_side(
            &inspection.product_matchrules,
            &link.products,
            &links_index,
            &inspection.name,
            "products",
        )?;
    }

    Ok(())
}

fn authorize_and_merge_step(
    layout: &Layout,
    step: &Step,
    link_dir: &Path,
    policy: &VerifyPolicy,
) -> Result<LinkBody, OpError> {
    let authorized: BTreeMap<String, PublicKey> = step
        .pubkeys
        .iter()
        .filter_map(|kid| layout.signed.keys.get(kid).map(|pk| (kid.clone(), pk.clone())))
        .collect();

    let paths = op_format::links_for_step(link_dir, &step.name)
        .map_err(|e| OpError::new(ErrorCode::StepAuthorizationError, e.to_string()).with_source(e))?;

    let mut verified_keyids = std::collections::BTreeSet::new();
    let mut valid_bodies = Vec::new();
    for path in paths {
        let Ok(link) = op_format::read_link(&path) else {
            continue;
        };
        if let Ok(keyids) = link.verify_threshold(&authorized, 1) {
            verified_keyids.extend(keyids);
            valid_bodies.push(link.signed);
        }
    }

    if verified_keyids.len() < step.threshold {
        return Err(OpError::new(
            ErrorCode::StepAuthorizationError,
            format!(
                "step {:?} needs {} distinct authorized signers, found {}",
                step.name,
                step.threshold,
                verified_keyids.len()
            ),
        )
        .with_context("step", step.name.clone()));
    }

    pick_agreeing_body(&step.name, valid_bodies, policy.link_disagreement)
}

fn pick_agreeing_body(
    step_name: &str,
    bodies: Vec<LinkBody>,
    policy: LinkDisagreementPolicy,
) -> Result<LinkBody, OpError> {
    let first = bodies.first().cloned().ok_or_else(|| {
        OpError::new(
            ErrorCode::StepAuthorizationError,
            format!("step {step_name:?} has no valid links"),
        )
    })?;

    match policy {
        LinkDisagreementPolicy::Strict => {
            if bodies.iter().all(|b| b.materials == first.materials && b.products == first.products) {
                Ok(first)
            } else {
                Err(OpError::new(
                    ErrorCode::StepLinkMismatch,
                    format!("step {step_name:?} has disagreeing signed links"),
                )
                .with_context("step", step_name.to_string()))
            }
        }
        LinkDisagreementPolicy::MajorityVote => {
            let mut counts: BTreeMap<(op_model::ArtifactSet, op_model::ArtifactSet), usize> = BTreeMap::new();
            for b in &bodies {
                *counts.entry((b.materials.clone(), b.products.clone())).or_default() += 1;
            }
            let max = counts.values().copied().max().unwrap_or(0);
            let winners: Vec<_> = counts.iter().filter(|(_, c)| **c == max).collect();
            if winners.len() != 1 {
                return Err(OpError::new(
                    ErrorCode::StepLinkMismatch,
                    format!("step {step_name:?} has no majority agreement among signed links"),
                )
                .with_context("step", step_name.to_string()));
            }
            let ((materials, products), _) = winners[0];
            bodies
                .into_iter()
                .find(|b| &b.materials == materials && &b.products == products)
                .ok_or_else(|| {
                    OpError::new(
                        ErrorCode::StepLinkMismatch,
                        format!("step {step_name:?} majority winner vanished unexpectedly"),
                    )
                })
        }
    }
}

/// Command drift between a step's `expected_command` and what the link
/// actually ran is a warning, never fatal.
fn check_command_alignment(step: &Step, link: &LinkBody) {
    if step.expected_command.is_empty() {
        return;
    }
    if step.expected_command != link.command {
        tracing::warn!(
            step = %step.name,
            expected = ?step.expected_command,
            actual = ?link.command,
            "CommandAlignmentWarning: link command does not match expected_command"
        );
    }
}

fn evaluate_side(
    rules: &[op_model::Rule],
    artifacts: &op_model::ArtifactSet,
    links_index: &BTreeMap<String, LinkBody>,
    owner_name: &str,
    side: &str,
) -> Result<(), OpError> {
    op_rules::evaluate(rules, artifacts, links_index).map_err(|e| {
        OpError::new(ErrorCode::ArtifactVerificationError, e.to_string())
            .with_context("step_or_inspection", owner_name.to_string())
            .with_context("side", side.to_string())
            .with_source(e)
    })
}
