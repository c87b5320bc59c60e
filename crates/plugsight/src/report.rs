//! The inspection report document.
//!
//! One JSON tree per run: the bundle path, the metadata record in record
//! order, and one node per enumerated extension descriptor in enumeration
//! order. Nothing is ever sorted, so two runs over the same artifact produce
//! byte-identical files and reports taken before and after a change diff
//! cleanly.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bundle::ManifestAttribute;
use crate::error::{Error, Result};

/// Suffix appended to the bundle path when no report path is given.
pub const REPORT_SUFFIX: &str = ".dump.json";

/// Default report destination for a bundle: the bundle path plus
/// [`REPORT_SUFFIX`].
pub fn default_report_path(bundle_path: &Path) -> PathBuf {
    let mut raw = bundle_path.as_os_str().to_os_string();
    raw.push(REPORT_SUFFIX);
    PathBuf::from(raw)
}

/// A rule copied verbatim from an embedded rules resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub key: String,
    pub name: String,
    pub internal_key: String,
    pub severity: String,
}

/// A rule repository committed through the simulated registration context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub key: String,
    pub name: String,
    pub language: String,
    pub rules: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// One classified extension descriptor.
///
/// `class` carries the descriptor's runtime type name: the JSON type name
/// for data descriptors, or the referenced module path for rule-registry
/// providers. A descriptor whose rendering failed is reported as `Unknown`
/// with the failure in `error`; such failures never abort the run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExtensionNode {
    #[serde(rename_all = "camelCase")]
    PropertyDefinition {
        class: String,
        key: String,
        default_value: String,
    },
    #[serde(rename_all = "camelCase")]
    RulesDefinition {
        class: String,
        repositories: Vec<Repository>,
    },
    #[serde(rename_all = "camelCase")]
    Unknown {
        class: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// The complete inspection report for one bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleReport {
    pub bundle_path: String,
    pub manifest: Vec<ManifestAttribute>,
    pub extensions: Vec<ExtensionNode>,
}

impl BundleReport {
    /// Writes the report atomically: the JSON is written to a sibling
    /// temporary file which is then renamed over the destination. On failure
    /// no partial report is left behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        let write_failed = |reason: String| Error::ReportWriteFailed {
            path: path.to_path_buf(),
            reason,
        };

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| write_failed(format!("serialization failed: {e}")))?;

        let mut tmp_name = path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        if let Err(e) = std::fs::write(&tmp, format!("{json}\n")) {
            let _ = std::fs::remove_file(&tmp);
            return Err(write_failed(e.to_string()));
        }
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(write_failed(e.to_string()));
        }

        tracing::debug!(report = %path.display(), "inspection report written");
        Ok(())
    }

    /// Loads a previously saved report, for comparison against a later run.
    pub fn load(path: &Path) -> Result<Self> {
        let load_failed = |reason: String| Error::ReportLoadFailed {
            path: path.to_path_buf(),
            reason,
        };

        let raw = std::fs::read_to_string(path).map_err(|e| load_failed(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| load_failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn sample_report() -> BundleReport {
        BundleReport {
            bundle_path: "demo-bundle.zip".to_string(),
            manifest: vec![
                ManifestAttribute {
                    key: "Plugin-Key".to_string(),
                    value: "demo".to_string(),
                },
                ManifestAttribute {
                    key: "Entry-Point".to_string(),
                    value: "analyzer.wasm".to_string(),
                },
            ],
            extensions: vec![
                ExtensionNode::PropertyDefinition {
                    class: "object".to_string(),
                    key: "sonar.demo.enabled".to_string(),
                    default_value: "true".to_string(),
                },
                ExtensionNode::RulesDefinition {
                    class: "rules/demo.wasm".to_string(),
                    repositories: vec![Repository {
                        key: "demo".to_string(),
                        name: "Demo Rules".to_string(),
                        language: "cs".to_string(),
                        rules: vec![Rule {
                            key: "S1000".to_string(),
                            name: "First rule".to_string(),
                            internal_key: "S1000".to_string(),
                            severity: "MAJOR".to_string(),
                        }],
                        note: None,
                    }],
                },
                ExtensionNode::Unknown {
                    class: "number".to_string(),
                    error: None,
                },
            ],
        }
    }

    #[test]
    fn default_report_path_appends_suffix() {
        let path = default_report_path(Path::new("out/demo-bundle.zip"));
        assert_eq!(path, PathBuf::from("out/demo-bundle.zip.dump.json"));
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("report.dump.json");

        let report = sample_report();
        report.save(&path).expect("save report");
        let loaded = BundleReport::load(&path).expect("load report");
        assert_eq!(loaded, report);
    }

    #[test]
    fn saved_report_is_byte_identical_across_saves() {
        let dir = TempDir::new().expect("tempdir");
        let first = dir.path().join("first.dump.json");
        let second = dir.path().join("second.dump.json");

        let report = sample_report();
        report.save(&first).expect("first save");
        report.save(&second).expect("second save");

        let a = std::fs::read(&first).expect("read first");
        let b = std::fs::read(&second).expect("read second");
        assert_eq!(a, b);
        assert_eq!(a.last(), Some(&b'\n'));
    }

    #[test]
    fn save_into_missing_directory_leaves_no_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("absent").join("report.dump.json");

        let err = sample_report().save(&path).expect_err("must fail");
        assert!(matches!(err, Error::ReportWriteFailed { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn extension_nodes_serialize_with_type_tags() {
        let value = serde_json::to_value(sample_report()).expect("to value");
        let extensions = value["extensions"].as_array().expect("extensions array");

        assert_eq!(extensions[0]["type"], "PropertyDefinition");
        assert_eq!(extensions[0]["class"], "object");
        assert_eq!(extensions[0]["defaultValue"], "true");
        assert_eq!(extensions[1]["type"], "RulesDefinition");
        assert_eq!(extensions[1]["repositories"][0]["rules"][0]["internalKey"], "S1000");
        assert_eq!(extensions[2]["type"], "Unknown");
        assert!(extensions[2].get("error").is_none());
    }
}
