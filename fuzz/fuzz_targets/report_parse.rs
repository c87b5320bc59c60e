#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Report deserialization should never panic on any input
    if let Ok(raw) = std::str::from_utf8(data) {
        let _ = serde_json::from_str::<plugsight::BundleReport>(raw);
    }
});
