#![no_main]

use libfuzzer_sys::fuzz_target;
use testgap_adapters_coverage::parse_jacoco;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // The decoder should never panic, regardless of input
        // Errors are expected and acceptable; panics are not
        let _ = parse_jacoco(text);
    }
});
