#![no_main]
use std::collections::BTreeMap;

use libfuzzer_sys::fuzz_target;
use op_model::{ArtifactSet, LinkBody, Rule};
use serde_json::Value;

#[derive(arbitrary::Arbitrary, Debug)]
struct Input {
    rules_json: String,
    artifacts_json: String,
}

// Arbitrary rule lists against arbitrary artifact sets must never panic
// the evaluation engine, regardless of how malformed the glob patterns
// or step references are.
fuzz_target!(|input: Input| {
    let Ok(rules_value) = serde_json::from_str::<Value>(&input.rules_json) else {
        return;
    };
    let Some(rule_tuples) = rules_value.as_array() else {
        return;
    };
    let rules: Vec<Rule> = rule_tuples
        .iter()
        .filter_map(|v| v.as_array())
        .filter_map(|elems| Rule::from_tuple(elems).ok())
        .collect();

    let Ok(artifacts) = serde_json::from_str::<ArtifactSet>(&input.artifacts_json) else {
        return;
    };

    let links_index: BTreeMap<String, LinkBody> = BTreeMap::new();
    let _ = op_rules::evaluate(&rules, &artifacts, &links_index);
});
