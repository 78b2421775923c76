#![no_main]
use libfuzzer_sys::fuzz_target;
use op_glob::PathPattern;

#[derive(arbitrary::Arbitrary, Debug)]
struct Input {
    pattern: String,
    path: String,
}

fuzz_target!(|input: Input| {
    if let Ok(pattern) = PathPattern::new(input.pattern) {
        let _ = pattern.is_match(&input.path);
    }
});
