#![no_main]

use libfuzzer_sys::fuzz_target;
use testgap_adapters_java::parse_java;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // Syntax errors are reported, never panicked on
        let _ = parse_java("Fuzz.java", text);
    }
});
