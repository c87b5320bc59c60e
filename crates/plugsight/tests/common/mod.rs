//! Common test utilities for plugsight integration tests

use std::io::Write as _;
use std::path::Path;

/// Builds zip bundles entry by entry, in insertion order.
#[derive(Default)]
pub struct BundleBuilder {
    entries: Vec<(String, Vec<u8>)>,
}

impl BundleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the `bundle.mf` metadata record.
    pub fn manifest(self, raw: &str) -> Self {
        self.file("bundle.mf", raw.as_bytes().to_vec())
    }

    /// Adds an arbitrary entry.
    pub fn file(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.entries.push((name.to_string(), bytes));
        self
    }

    /// Compiles WAT source and adds the resulting wasm module.
    pub fn wat_module(self, name: &str, wat_src: &str) -> Self {
        let wasm = wat::parse_str(wat_src).expect("valid wat");
        self.file(name, wasm)
    }

    pub fn write_to(self, path: &Path) {
        let file = std::fs::File::create(path).expect("create bundle");
        let mut archive = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        for (name, bytes) in self.entries {
            archive.start_file(name, options).expect("zip entry");
            archive.write_all(&bytes).expect("entry bytes");
        }
        archive.finish().expect("finish zip");
    }
}

/// WAT for an entry-point module that emits `descriptors_json` through
/// `set_output` and returns the emission status.
pub fn entry_point_wat(descriptors_json: &str) -> String {
    format!(
        r#"(module
    (import "plugin_host" "set_output" (func $set_output (param i32 i32) (result i32)))
    (memory (export "memory") 1)
    (data (i32.const 64) "{payload}")
    (func (export "plugin_extensions") (result i32)
        i32.const 64
        i32.const {len}
        call $set_output))"#,
        payload = wat_escape(descriptors_json),
        len = descriptors_json.len(),
    )
}

/// WAT for a rule-registry module that registers one repository, names it,
/// loads rules from `resource_path`, and commits it. The key, language, and
/// display name each must stay under 64 bytes to fit their data slots.
pub fn rules_registry_wat(
    repo_key: &str,
    language: &str,
    display_name: &str,
    resource_path: &str,
) -> String {
    format!(
        r#"(module
    (import "plugin_host" "repository_new" (func $repository_new (param i32 i32 i32 i32) (result i32)))
    (import "plugin_host" "repository_set_name" (func $repository_set_name (param i32 i32 i32) (result i32)))
    (import "plugin_host" "repository_load_rules" (func $repository_load_rules (param i32 i32 i32) (result i32)))
    (import "plugin_host" "repository_done" (func $repository_done (param i32) (result i32)))
    (memory (export "memory") 1)
    (data (i32.const 64) "{key}")
    (data (i32.const 128) "{language}")
    (data (i32.const 192) "{name}")
    (data (i32.const 256) "{path}")
    (func (export "rules_define") (result i32)
        (local $repo i32)
        i32.const 64
        i32.const {key_len}
        i32.const 128
        i32.const {language_len}
        call $repository_new
        local.set $repo
        local.get $repo
        i32.const 192
        i32.const {name_len}
        call $repository_set_name
        drop
        local.get $repo
        i32.const 256
        i32.const {path_len}
        call $repository_load_rules
        drop
        local.get $repo
        call $repository_done))"#,
        key = wat_escape(repo_key),
        language = wat_escape(language),
        name = wat_escape(display_name),
        path = wat_escape(resource_path),
        key_len = repo_key.len(),
        language_len = language.len(),
        name_len = display_name.len(),
        path_len = resource_path.len(),
    )
}

fn wat_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            c => escaped.push(c),
        }
    }
    escaped
}
