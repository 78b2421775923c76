//! Artifacts and artifact sets.

use std::collections::BTreeMap;

/// `hash-algorithm name -> lowercase hex digest`, e.g. `{"sha256": "abcd..."}`.
pub type DigestSet = BTreeMap<String, String>;

/// `path -> digest_set`. A `BTreeMap` keeps paths in lexicographic order so
/// that error messages and residue reports are reproducible across runs.
pub type ArtifactSet = BTreeMap<String, DigestSet>;

/// Compare two digest sets on the intersection of algorithms present on
/// both sides. An empty intersection is incomparable and therefore counts
/// as a mismatch — there is no algorithm either side can trust.
#[must_use]
pub fn digests_agree(a: &DigestSet, b: &DigestSet) -> bool {
    let mut compared_any = false;
    for (algo, digest) in a {
        if let Some(other) = b.get(algo) {
            compared_any = true;
            if digest != other {
                return false;
            }
        }
    }
    compared_any
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ds(pairs: &[(&str, &str)]) -> DigestSet {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn agrees_on_shared_algorithm() {
        let a = ds(&[("sha256", "aaa"), ("md5", "xxx")]);
        let b = ds(&[("sha256", "aaa")]);
        assert!(digests_agree(&a, &b));
    }

    #[test]
    fn disagrees_on_conflicting_shared_algorithm() {
        let a = ds(&[("sha256", "aaa")]);
        let b = ds(&[("sha256", "bbb")]);
        assert!(!digests_agree(&a, &b));
    }

    #[test]
    fn empty_intersection_is_a_mismatch() {
        let a = ds(&[("sha256", "aaa")]);
        let b = ds(&[("sha512", "aaa")]);
        assert!(!digests_agree(&a, &b));
    }

    proptest::proptest! {
        #[test]
        fn any_nonempty_digest_set_agrees_with_itself(algo in "[a-z0-9]{1,8}", digest in "[a-f0-9]{1,64}") {
            let set = ds(&[(algo.as_str(), digest.as_str())]);
            proptest::prop_assert!(digests_agree(&set, &set));
        }
    }
}
