#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

//! # Plugsight - Plugin Bundle Inspection
//!
//! This crate answers one question about a packaged analyzer plugin without
//! installing it anywhere: what would it contribute to a host that loaded
//! it? The pipeline:
//! - `BundleArchive`: reads the zip bundle and its `bundle.mf` metadata
//! - `BundleInspector`: activates the declared entry point inside an
//!   isolated wasm runtime and enumerates its extension descriptors
//! - Classification: property definitions and rule registries are
//!   recognized by shape; registries are driven against a recording
//!   registration surface to capture their repositories and rules
//! - `BundleReport`: a deterministic JSON dump of everything found
//!
//! Plugin code only ever sees the `plugin_host` import namespace and the
//! contents of its own bundle. Whole-bundle problems abort the run with a
//! distinct [`Error`] kind; problems inside a single descriptor are
//! recorded in the report and inspection continues.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use plugsight::{default_report_path, BundleInspector, InspectorOptions};
//!
//! let inspector = BundleInspector::new(InspectorOptions::default());
//! let bundle = Path::new("demo-plugin.zip");
//! let report = inspector
//!     .inspect_to_file(bundle, &default_report_path(bundle))
//!     .unwrap();
//! println!("{} extensions", report.extensions.len());
//! ```

pub mod bundle;
pub mod error;
pub mod inspector;
pub mod report;
pub mod runtime;

mod dispatch;

pub use bundle::{
    read_bundle_manifest, BundleArchive, BundleManifest, ManifestAttribute, BUNDLE_MANIFEST_NAME,
    ENTRY_POINT_ATTRIBUTE,
};
pub use error::{Error, Result};
pub use inspector::{BundleInspector, InspectorOptions};
pub use report::{
    default_report_path, BundleReport, ExtensionNode, Repository, Rule, REPORT_SUFFIX,
};
pub use runtime::{ResourceLimits, ENTRY_POINT_EXPORT, HOST_NAMESPACE, RULES_DEFINE_EXPORT};
