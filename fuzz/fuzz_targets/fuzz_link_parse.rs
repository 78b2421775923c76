#![no_main]
use libfuzzer_sys::fuzz_target;
use op_model::Link;

fuzz_target!(|data: &[u8]| {
    if let Ok(link) = serde_json::from_slice::<Link>(data) {
        let _ = link.signed.validate_type_tag();
    }
});
