#![no_main]
use libfuzzer_sys::fuzz_target;
use op_model::Layout;

// A malformed or hostile layout file must never panic the parser, only
// fail with an ordinary deserialize error.
fuzz_target!(|data: &[u8]| {
    if let Ok(layout) = serde_json::from_slice::<Layout>(data) {
        let _ = layout.signed.validate();
    }
});
