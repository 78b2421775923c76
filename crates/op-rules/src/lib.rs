// SPDX-License-Identifier: MIT OR Apache-2.0
//! The artifact rule evaluation engine — the hard core of verification.
//!
//! [`evaluate`] decides, for one side (materials or products) of one step
//! or inspection, whether the declared rule list accounts for every
//! artifact in that side's set. Rules run strictly in declaration order
//! against a single mutable **artifact queue**; a non-empty residue after
//! the last rule is itself a failure.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};

use op_error::RuleFailureKind;
use op_glob::PathPattern;
use op_model::{digests_agree, ArtifactSet, ArtifactSide, LinkBody, Rule};

/// The engine failed to reach an empty queue, or a rule was individually
/// unsatisfiable.
#[derive(Debug, thiserror::Error)]
pub enum RuleEvalError {
    /// A single rule's condition was not met.
    #[error("rule verification failed ({kind}): {detail}")]
    VerificationFailed {
        /// Which rule/condition failed.
        kind: RuleFailureKind,
        /// Human-readable detail (offending paths, counts, etc).
        detail: String,
    },
    /// After all rules ran, artifacts remained unaccounted for.
    #[error("unmatched artifacts remain: {residue:?}")]
    UnmatchedArtifacts {
        /// The leftover queue, in lexicographic order.
        residue: Vec<String>,
    },
    /// A `MATCH …FROM step` rule named a step/inspection absent from the
    /// link index passed to this evaluation.
    #[error("rule references unknown step/inspection {step:?}")]
    UnknownStepReference {
        /// The dangling step/inspection name.
        step: String,
    },
    /// A rule's glob pattern failed to compile.
    #[error(transparent)]
    Pattern(#[from] op_glob::PatternError),
}

/// Evaluate `rules` against `artifacts`, in declaration order, using
/// `links_index` to resolve `MATCH …FROM` references.
///
/// # Errors
///
/// Returns [`RuleEvalError`] on the first rule that cannot be satisfied,
/// or [`RuleEvalError::UnmatchedArtifacts`] if artifacts remain once every
/// rule has run.
pub fn evaluate(
    rules: &[Rule],
    artifacts: &ArtifactSet,
    links_index: &BTreeMap<String, LinkBody>,
) -> Result<(), RuleEvalError> {
    let mut queue: BTreeSet<String> = artifacts.keys().cloned().collect();

    for rule in rules {
        apply_rule(rule, &mut queue, artifacts, links_index)?;
    }

    if queue.is_empty() {
        Ok(())
    } else {
        Err(RuleEvalError::UnmatchedArtifacts {
            residue: queue.into_iter().collect(),
        })
    }
}

fn apply_rule(
    rule: &Rule,
    queue: &mut BTreeSet<String>,
    artifacts: &ArtifactSet,
    links_index: &BTreeMap<String, LinkBody>,
) -> Result<(), RuleEvalError> {
    tracing::debug!(?rule, queue_len = queue.len(), "applying rule");
    match rule {
        Rule::Create { pattern } => apply_create_like(pattern, queue, RuleFailureKind::Create),
        Rule::Modify { pattern } => apply_create_like(pattern, queue, RuleFailureKind::Modify),
        Rule::Delete { pattern } => apply_delete(pattern, queue),
        Rule::Match {
            src_type,
            pattern,
            from_step,
        } => apply_match(
            *src_type, pattern, None, from_step, queue, artifacts, links_index,
        ),
        Rule::MatchAs {
            src_type,
            pattern,
            dst_pattern,
            from_step,
        } => apply_match(
            *src_type,
            pattern,
            Some(dst_pattern),
            from_step,
            queue,
            artifacts,
            links_index,
        ),
    }
}

/// `CREATE` and `MODIFY` share the same queue mechanics: at least one
/// match required, consumed on success. They are kept distinguishable by
/// tagging the failure with a different `RuleFailureKind` rather than by
/// any difference in behavior — see `DESIGN.md`.
fn apply_create_like(
    pattern: &str,
    queue: &mut BTreeSet<String>,
    kind: RuleFailureKind,
) -> Result<(), RuleEvalError> {
    let compiled = PathPattern::new(pattern)?;
    let hits: Vec<String> = queue.iter().filter(|p| compiled.is_match(p)).cloned().collect();
    if hits.is_empty() {
        return Err(RuleEvalError::VerificationFailed {
            kind,
            detail: format!("pattern {pattern:?} matched nothing in the queue"),
        });
    }
    for hit in hits {
        queue.remove(&hit);
    }
    Ok(())
}

fn apply_delete(pattern: &str, queue: &BTreeSet<String>) -> Result<(), RuleEvalError> {
    let compiled = PathPattern::new(pattern)?;
    let hits: Vec<&String> = queue.iter().filter(|p| compiled.is_match(p)).collect();
    if hits.is_empty() {
        Ok(())
    } else {
        Err(RuleEvalError::VerificationFailed {
            kind: RuleFailureKind::Delete,
            detail: format!("pattern {pattern:?} still present: {hits:?}"),
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_match(
    src_type: ArtifactSide,
    pattern: &str,
    dst_pattern: Option<&str>,
    from_step: &str,
    queue: &mut BTreeSet<String>,
    artifacts: &ArtifactSet,
    links_index: &BTreeMap<String, LinkBody>,
) -> Result<(), RuleEvalError> {
    let link = links_index
        .get(from_step)
        .ok_or_else(|| RuleEvalError::UnknownStepReference {
            step: from_step.to_string(),
        })?;
    let target_set = match src_type {
        ArtifactSide::Material => &link.materials,
        ArtifactSide::Product => &link.products,
    };

    let src_pattern = PathPattern::new(pattern)?;
    let src_hits: Vec<String> = queue.iter().filter(|p| src_pattern.is_match(p)).cloned().collect();

    let tgt_pattern_str = dst_pattern.unwrap_or(pattern);
    let tgt_pattern = PathPattern::new(tgt_pattern_str)?;
    let tgt_hits: Vec<String> = target_set
        .keys()
        .filter(|p| tgt_pattern.is_match(p))
        .cloned()
        .collect();

    if src_hits.len() != tgt_hits.len() {
        return Err(RuleEvalError::VerificationFailed {
            kind: RuleFailureKind::MatchCardinality,
            detail: format!(
                "source side matched {} path(s), target side matched {} path(s)",
                src_hits.len(),
                tgt_hits.len()
            ),
        });
    }

    for source_path in &src_hits {
        let target_path = match dst_pattern {
            None => source_path.clone(),
            Some(dst) => rename(pattern, dst, source_path).ok_or_else(|| {
                RuleEvalError::VerificationFailed {
                    kind: RuleFailureKind::MatchMissing,
                    detail: format!("{source_path:?} does not fit pattern {pattern:?} for renaming"),
                }
            })?,
        };

        let Some(target_digests) = target_set.get(&target_path) else {
            return Err(RuleEvalError::VerificationFailed {
                kind: RuleFailureKind::MatchMissing,
                detail: format!("target path {target_path:?} absent from {from_step:?}"),
            });
        };
        let Some(source_digests) = artifacts.get(source_path) else {
            return Err(RuleEvalError::VerificationFailed {
                kind: RuleFailureKind::MatchMissing,
                detail: format!("source path {source_path:?} absent from artifact set"),
            });
        };
        if !digests_agree(source_digests, target_digests) {
            return Err(RuleEvalError::VerificationFailed {
                kind: RuleFailureKind::MatchDigest,
                detail: format!("{source_path:?} and {target_path:?} disagree on digest"),
            });
        }
    }

    for hit in src_hits {
        queue.remove(&hit);
    }
    Ok(())
}

/// Single-wildcard substitution: `pattern` and `dst_pattern` each carry at
/// most one `*`. Given `matched`, a string known to satisfy `pattern`,
/// extract the substring that stood in for `*` and splice it into
/// `dst_pattern`'s `*` position. If `pattern` has no wildcard, `matched`
/// must equal `pattern` literally and `dst_pattern` is returned unchanged.
fn rename(pattern: &str, dst_pattern: &str, matched: &str) -> Option<String> {
    match pattern.find('*') {
        None => (matched == pattern).then(|| dst_pattern.to_string()),
        Some(star_at) => {
            let prefix = &pattern[..star_at];
            let suffix = &pattern[star_at + 1..];
            if !matched.starts_with(prefix) || !matched.ends_with(suffix) {
                return None;
            }
            let middle_start = prefix.len();
            let middle_end = matched.len().checked_sub(suffix.len())?;
            if middle_end < middle_start {
                return None;
            }
            let middle = &matched[middle_start..middle_end];
            Some(dst_pattern.replacen('*', middle, 1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use op_model::{Byproducts, LinkBody};

    fn artifacts(paths: &[&str]) -> ArtifactSet {
        paths
            .iter()
            .map(|p| ((*p).to_string(), BTreeMap::new()))
            .collect()
    }

    fn digest(algo: &str, hex: &str) -> op_model::DigestSet {
        BTreeMap::from([(algo.to_string(), hex.to_string())])
    }

    #[test]
    fn delete_star_on_empty_queue_passes() {
        let empty = ArtifactSet::new();
        let rules = vec![Rule::Delete { pattern: "*".into() }];
        assert!(evaluate(&rules, &empty, &BTreeMap::new()).is_ok());
    }

    #[test]
    fn delete_star_on_nonempty_queue_fails() {
        let set = artifacts(&["foo"]);
        let rules = vec![Rule::Delete { pattern: "*".into() }];
        assert!(evaluate(&rules, &set, &BTreeMap::new()).is_err());
    }

    #[test]
    fn create_star_on_empty_queue_fails() {
        let empty = ArtifactSet::new();
        let rules = vec![Rule::Create { pattern: "*".into() }];
        assert!(evaluate(&rules, &empty, &BTreeMap::new()).is_err());
    }

    #[test]
    fn create_star_on_nonempty_queue_passes_with_empty_residue() {
        let set = artifacts(&["foo"]);
        let rules = vec![Rule::Create { pattern: "*".into() }];
        assert!(evaluate(&rules, &set, &BTreeMap::new()).is_ok());
    }

    #[test]
    fn empty_rules_with_nonempty_artifacts_is_unmatched() {
        let set = artifacts(&["foo"]);
        let err = evaluate(&[], &set, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, RuleEvalError::UnmatchedArtifacts { .. }));
    }

    #[test]
    fn create_then_match_conflict_fails_either_order() {
        let set = artifacts(&["foo"]);
        let mut links = BTreeMap::new();
        links.insert(
            "l".to_string(),
            LinkBody::new(
                "l",
                vec![],
                ArtifactSet::new(),
                artifacts(&["foo"]),
                Byproducts {
                    stdout: String::new(),
                    stderr: String::new(),
                    return_value: 0,
                },
            ),
        );

        let rules = vec![
            Rule::Create { pattern: "foo".into() },
            Rule::Match {
                src_type: ArtifactSide::Product,
                pattern: "foo".into(),
                from_step: "l".into(),
            },
        ];
        assert!(evaluate(&rules, &set, &links).is_err());

        let rules_swapped = vec![
            Rule::Match {
                src_type: ArtifactSide::Product,
                pattern: "foo".into(),
                from_step: "l".into(),
            },
            Rule::Create { pattern: "foo".into() },
        ];
        assert!(evaluate(&rules_swapped, &set, &links).is_err());
    }

    #[test]
    fn match_passes_on_equal_digests() {
        let mut set = artifacts(&["foo.py"]);
        set.insert("foo.py".into(), digest("sha256", "abc"));
        let mut target = ArtifactSet::new();
        target.insert("foo.py".into(), digest("sha256", "abc"));

        let mut links = BTreeMap::new();
        links.insert(
            "write-code".to_string(),
            LinkBody::new(
                "write-code",
                vec![],
                ArtifactSet::new(),
                target,
                Byproducts {
                    stdout: String::new(),
                    stderr: String::new(),
                    return_value: 0,
                },
            ),
        );

        let rules = vec![Rule::Match {
            src_type: ArtifactSide::Product,
            pattern: "foo.py".into(),
            from_step: "write-code".into(),
        }];
        assert!(evaluate(&rules, &set, &links).is_ok());
    }

    #[test]
    fn match_fails_on_digest_disagreement() {
        let mut set = artifacts(&["foo.py"]);
        set.insert("foo.py".into(), digest("sha256", "abc"));
        let mut target = ArtifactSet::new();
        target.insert("foo.py".into(), digest("sha256", "different"));

        let mut links = BTreeMap::new();
        links.insert(
            "write-code".to_string(),
            LinkBody::new(
                "write-code",
                vec![],
                ArtifactSet::new(),
                target,
                Byproducts {
                    stdout: String::new(),
                    stderr: String::new(),
                    return_value: 0,
                },
            ),
        );

        let rules = vec![Rule::Match {
            src_type: ArtifactSide::Product,
            pattern: "foo.py".into(),
            from_step: "write-code".into(),
        }];
        let err = evaluate(&rules, &set, &links).unwrap_err();
        assert!(matches!(
            err,
            RuleEvalError::VerificationFailed {
                kind: RuleFailureKind::MatchDigest,
                ..
            }
        ));
    }

    #[test]
    fn match_as_renames_via_single_wildcard() {
        assert_eq!(
            rename("src/*.py", "dst/*.py", "src/main.py"),
            Some("dst/main.py".to_string())
        );
        assert_eq!(rename("src/*.py", "dst/*.py", "src/sub/main.py"), None);
        assert_eq!(rename("foo", "bar", "foo"), Some("bar".to_string()));
        assert_eq!(rename("foo", "bar", "baz"), None);
    }

    #[test]
    fn match_as_end_to_end() {
        let mut set = artifacts(&["src/main.py"]);
        set.insert("src/main.py".into(), digest("sha256", "abc"));
        let mut target = ArtifactSet::new();
        target.insert("dst/main.py".into(), digest("sha256", "abc"));

        let mut links = BTreeMap::new();
        links.insert(
            "build".to_string(),
            LinkBody::new(
                "build",
                vec![],
                ArtifactSet::new(),
                target,
                Byproducts {
                    stdout: String::new(),
                    stderr: String::new(),
                    return_value: 0,
                },
            ),
        );

        let rules = vec![Rule::MatchAs {
            src_type: ArtifactSide::Product,
            pattern: "src/*.py".into(),
            dst_pattern: "dst/*.py".into(),
            from_step: "build".into(),
        }];
        assert!(evaluate(&rules, &set, &links).is_ok());
    }

    #[test]
    fn evaluation_is_deterministic_across_repeated_runs() {
        let set = artifacts(&["a", "b", "c"]);
        let rules = vec![Rule::Create { pattern: "*".into() }];
        let first = evaluate(&rules, &set, &BTreeMap::new());
        let second = evaluate(&rules, &set, &BTreeMap::new());
        assert_eq!(first.is_ok(), second.is_ok());
    }

    #[test]
    fn match_rule_unknown_step_reference_is_reported() {
        let set = artifacts(&["foo"]);
        let rules = vec![Rule::Match {
            src_type: ArtifactSide::Product,
            pattern: "foo".into(),
            from_step: "ghost".into(),
        }];
        let err = evaluate(&rules, &set, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, RuleEvalError::UnknownStepReference { .. }));
    }

    proptest::proptest! {
        #[test]
        fn delete_star_never_passes_on_nonempty_queue(name in "[a-z]{1,8}") {
            let set = artifacts(&[name.as_str()]);
            let rules = vec![Rule::Delete { pattern: "*".into() }];
            proptest::prop_assert!(evaluate(&rules, &set, &BTreeMap::new()).is_err());
        }
    }
}
