//! The inspection pipeline: open the bundle, read its metadata, activate the
//! declared entry point in an isolated runtime, classify what it exposes,
//! and assemble the report.

use std::path::Path;

use crate::bundle::{read_bundle_manifest, BundleArchive};
use crate::dispatch::classify_descriptors;
use crate::error::{Error, Result};
use crate::report::BundleReport;
use crate::runtime::{build_engine, build_linker, enumerate_extensions, ResourceLimits};

/// Knobs for a [`BundleInspector`].
#[derive(Clone, Debug, Default)]
pub struct InspectorOptions {
    /// Resource ceilings applied to every plugin invocation of the run.
    pub resources: ResourceLimits,
}

/// Inspects plugin bundles without installing them anywhere.
///
/// A single inspector can serve many bundles; every `inspect` call builds a
/// fresh engine and store, so no state leaks between runs.
#[derive(Clone, Debug)]
pub struct BundleInspector {
    options: InspectorOptions,
}

impl BundleInspector {
    pub fn new(options: InspectorOptions) -> Self {
        Self { options }
    }

    /// Runs the full pipeline against `bundle_path` and returns the report.
    ///
    /// Whole-bundle problems (unreadable archive, missing metadata, entry
    /// point absent or failing) abort with the matching [`Error`] kind.
    /// Per-descriptor problems do not: they surface as `Unknown` nodes in
    /// the returned report.
    pub fn inspect(&self, bundle_path: &Path) -> Result<BundleReport> {
        tracing::info!(bundle = %bundle_path.display(), "inspecting plugin bundle");

        let archive = BundleArchive::open(bundle_path)?;
        let manifest = read_bundle_manifest(&archive)?;
        let entry_path = manifest
            .entry_point()
            .ok_or_else(|| Error::EntryPointUndeclared {
                path: bundle_path.to_path_buf(),
            })?
            .to_string();
        tracing::debug!(entry_point = %entry_path, "bundle metadata read");

        let engine = build_engine()?;
        let linker = build_linker(&engine)?;
        let limits = &self.options.resources;

        let descriptors = enumerate_extensions(&engine, &linker, &archive, &entry_path, limits)?;
        let extensions = classify_descriptors(&engine, &linker, &archive, descriptors, limits);

        let report = BundleReport {
            bundle_path: bundle_path.display().to_string(),
            manifest: manifest.attributes().to_vec(),
            extensions,
        };
        tracing::info!(
            bundle = %bundle_path.display(),
            extensions = report.extensions.len(),
            "inspection complete"
        );
        Ok(report)
    }

    /// Inspects the bundle and persists the report to `report_path`.
    pub fn inspect_to_file(&self, bundle_path: &Path, report_path: &Path) -> Result<BundleReport> {
        let report = self.inspect(bundle_path)?;
        report.save(report_path)?;
        tracing::info!(report = %report_path.display(), "report written");
        Ok(report)
    }
}
