use serde::{Deserialize, Serialize};

/// Archive path of the metadata record inside a plugin bundle.
pub const BUNDLE_MANIFEST_NAME: &str = "bundle.mf";

/// Metadata attribute naming the entry-point wasm module.
pub const ENTRY_POINT_ATTRIBUTE: &str = "Entry-Point";

/// A single `Key: Value` attribute from the metadata record, spelled exactly
/// as it appears in the file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestAttribute {
    pub key: String,
    pub value: String,
}

/// The flat metadata record of a plugin bundle.
///
/// Attributes keep the order they were written in. A repeated key keeps its
/// first position but takes the last value. Lookup is case-insensitive;
/// reporting preserves the original spelling.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BundleManifest {
    attributes: Vec<ManifestAttribute>,
}

impl BundleManifest {
    /// Parses the line-oriented metadata record.
    ///
    /// Each logical line is `Key: Value`; an empty key is accepted and
    /// passes through verbatim. A physical line starting with a single
    /// space continues the previous value. Blank lines are skipped. Any
    /// other line shape is malformed; the error names the offending
    /// 1-based line number.
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let mut manifest = BundleManifest::default();
        let mut pending: Option<ManifestAttribute> = None;

        for (idx, line) in raw.lines().enumerate() {
            let line_no = idx + 1;

            if line.is_empty() {
                manifest.flush(&mut pending);
                continue;
            }

            if let Some(rest) = line.strip_prefix(' ') {
                let Some(attr) = pending.as_mut() else {
                    return Err(format!(
                        "line {line_no}: continuation line has no preceding attribute"
                    ));
                };
                attr.value.push_str(rest);
                continue;
            }

            manifest.flush(&mut pending);
            let Some((key, value)) = line.split_once(": ") else {
                return Err(format!(
                    "line {line_no}: expected a `Key: Value` attribute"
                ));
            };
            pending = Some(ManifestAttribute {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        manifest.flush(&mut pending);

        Ok(manifest)
    }

    fn flush(&mut self, pending: &mut Option<ManifestAttribute>) {
        let Some(attr) = pending.take() else {
            return;
        };
        match self
            .attributes
            .iter_mut()
            .find(|existing| existing.key.eq_ignore_ascii_case(&attr.key))
        {
            Some(existing) => existing.value = attr.value,
            None => self.attributes.push(attr),
        }
    }

    /// All attributes in record order.
    pub fn attributes(&self) -> &[ManifestAttribute] {
        &self.attributes
    }

    /// Case-insensitive attribute lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.key.eq_ignore_ascii_case(key))
            .map(|attr| attr.value.as_str())
    }

    /// The declared entry-point module path, if any.
    pub fn entry_point(&self) -> Option<&str> {
        self.get(ENTRY_POINT_ATTRIBUTE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_attributes_in_record_order() {
        let raw = "Plugin-Key: demo\nPlugin-Name: Demo Analyzer\nEntry-Point: analyzer.wasm\n";

        let manifest = BundleManifest::parse(raw).expect("manifest parsed");
        let keys: Vec<&str> = manifest
            .attributes()
            .iter()
            .map(|a| a.key.as_str())
            .collect();
        assert_eq!(keys, vec!["Plugin-Key", "Plugin-Name", "Entry-Point"]);
        assert_eq!(manifest.get("Plugin-Name"), Some("Demo Analyzer"));
        assert_eq!(manifest.entry_point(), Some("analyzer.wasm"));
    }

    #[test]
    fn joins_continuation_lines() {
        let raw = "Plugin-Description: A very long description that\n wraps across two lines\nEntry-Point: analyzer.wasm\n";

        let manifest = BundleManifest::parse(raw).expect("manifest parsed");
        assert_eq!(
            manifest.get("Plugin-Description"),
            Some("A very long description thatwraps across two lines")
        );
        assert_eq!(manifest.entry_point(), Some("analyzer.wasm"));
    }

    #[test]
    fn lookup_is_case_insensitive_but_spelling_is_preserved() {
        let raw = "entry-point: analyzer.wasm\n";

        let manifest = BundleManifest::parse(raw).expect("manifest parsed");
        assert_eq!(manifest.get("Entry-Point"), Some("analyzer.wasm"));
        assert_eq!(manifest.get("ENTRY-POINT"), Some("analyzer.wasm"));
        assert_eq!(manifest.attributes()[0].key, "entry-point");
    }

    #[test]
    fn repeated_key_keeps_first_position_and_last_value() {
        let raw = "Plugin-Key: first\nPlugin-Name: Demo\nplugin-key: second\n";

        let manifest = BundleManifest::parse(raw).expect("manifest parsed");
        assert_eq!(manifest.attributes().len(), 2);
        assert_eq!(manifest.attributes()[0].key, "Plugin-Key");
        assert_eq!(manifest.attributes()[0].value, "second");
        assert_eq!(manifest.attributes()[1].key, "Plugin-Name");
    }

    #[test]
    fn accepts_crlf_line_endings_and_blank_lines() {
        let raw = "Plugin-Key: demo\r\n\r\nEntry-Point: analyzer.wasm\r\n";

        let manifest = BundleManifest::parse(raw).expect("manifest parsed");
        assert_eq!(manifest.get("Plugin-Key"), Some("demo"));
        assert_eq!(manifest.entry_point(), Some("analyzer.wasm"));
    }

    #[test]
    fn accepts_attribute_with_empty_key() {
        let raw = ": orphan value\nEntry-Point: analyzer.wasm\n";

        let manifest = BundleManifest::parse(raw).expect("manifest parsed");
        assert_eq!(manifest.attributes()[0].key, "");
        assert_eq!(manifest.attributes()[0].value, "orphan value");
        assert_eq!(manifest.get(""), Some("orphan value"));
        assert_eq!(manifest.entry_point(), Some("analyzer.wasm"));
    }

    #[test]
    fn rejects_line_without_separator() {
        let raw = "Plugin-Key: demo\nnot an attribute\n";

        let err = BundleManifest::parse(raw).expect_err("must be malformed");
        assert!(err.contains("line 2"), "unexpected reason: {err}");
    }

    #[test]
    fn rejects_leading_continuation_line() {
        let raw = " dangling continuation\n";

        let err = BundleManifest::parse(raw).expect_err("must be malformed");
        assert!(
            err.contains("no preceding attribute"),
            "unexpected reason: {err}"
        );
    }

    #[test]
    fn empty_record_has_no_attributes() {
        let manifest = BundleManifest::parse("").expect("manifest parsed");
        assert!(manifest.attributes().is_empty());
        assert_eq!(manifest.entry_point(), None);
    }
}
