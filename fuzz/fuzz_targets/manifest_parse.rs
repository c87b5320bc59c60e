#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Metadata parsing should never panic on any input
    if let Ok(raw) = std::str::from_utf8(data) {
        let _ = plugsight::BundleManifest::parse(raw);
    }
});
