#![no_main]
use libfuzzer_sys::fuzz_target;
use op_model::Rule;
use serde_json::Value;

// Rule tuples are the one hand-rolled (de)serializer in the model crate;
// arbitrary JSON arrays must never panic it.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return;
    };
    let Some(elements) = value.as_array() else {
        return;
    };
    if let Ok(rule) = Rule::from_tuple(elements) {
        let back = rule.to_tuple();
        let _ = Rule::from_tuple(&back);
    }
});
