#![no_main]
use libfuzzer_sys::fuzz_target;
use serde_json::Value;

// Canonicalizing arbitrary JSON must never panic, and a value it accepts
// must decode back to the same logical value.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return;
    };
    if let Ok(bytes) = op_canon::canonicalize(&value) {
        let decoded: Value = op_canon::decode(&bytes).expect("canonical bytes must decode");
        assert_eq!(decoded, value);
    }
});
