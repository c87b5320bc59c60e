//! Error types for plugsight

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while inspecting a plugin bundle.
///
/// Every variant is fatal to the run it occurs in; per-descriptor failures
/// are absorbed into the report instead (see [`crate::report::ExtensionNode`]).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    #[error("unreadable plugin bundle {}: {}", .path.display(), .reason)]
    ArtifactUnreadable { path: PathBuf, reason: String },

    #[error("plugin bundle {} has no metadata record (bundle.mf)", .path.display())]
    MetadataMissing { path: PathBuf },

    #[error("malformed metadata record in plugin bundle {}: {}", .path.display(), .reason)]
    MetadataMalformed { path: PathBuf, reason: String },

    #[error("metadata record in plugin bundle {} does not declare Entry-Point", .path.display())]
    EntryPointUndeclared { path: PathBuf },

    #[error("entry-point module {} is not present in plugin bundle {}", .module, .path.display())]
    EntryPointNotFound { path: PathBuf, module: String },

    #[error("failed to construct entry point {} from plugin bundle {}: {}", .module, .path.display(), .reason)]
    EntryPointConstructionFailed {
        path: PathBuf,
        module: String,
        reason: String,
    },

    #[error("entry point {} in plugin bundle {} exceeded its inspection budget: {}", .module, .path.display(), .reason)]
    EntryPointTimeout {
        path: PathBuf,
        module: String,
        reason: String,
    },

    #[error("entry point {} in plugin bundle {} failed while enumerating extensions: {}", .module, .path.display(), .reason)]
    ExtensionEnumerationFailed {
        path: PathBuf,
        module: String,
        reason: String,
    },

    #[error("failed to write inspection report {}: {}", .path.display(), .reason)]
    ReportWriteFailed { path: PathBuf, reason: String },

    #[error("failed to load inspection report {}: {}", .path.display(), .reason)]
    ReportLoadFailed { path: PathBuf, reason: String },

    #[error("internal runtime failure: {0}")]
    Internal(String),
}

/// Result type for plugsight operations
pub type Result<T> = std::result::Result<T, Error>;
