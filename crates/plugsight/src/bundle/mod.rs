//! Plugin bundle access: archive reading and the flat metadata record.
//!
//! Opening a bundle and reading its metadata never executes or compiles any
//! artifact code.

mod archive;
mod manifest;

pub use archive::BundleArchive;
pub(crate) use archive::lookup_entry;
pub use manifest::{
    BundleManifest, ManifestAttribute, BUNDLE_MANIFEST_NAME, ENTRY_POINT_ATTRIBUTE,
};

use crate::error::{Error, Result};

/// Reads and parses the metadata record of an opened bundle.
pub fn read_bundle_manifest(archive: &BundleArchive) -> Result<BundleManifest> {
    let Some(bytes) = archive.read(BUNDLE_MANIFEST_NAME) else {
        return Err(Error::MetadataMissing {
            path: archive.path().to_path_buf(),
        });
    };

    let raw = std::str::from_utf8(bytes).map_err(|e| Error::MetadataMalformed {
        path: archive.path().to_path_buf(),
        reason: format!("metadata record is not UTF-8: {e}"),
    })?;

    BundleManifest::parse(raw).map_err(|reason| Error::MetadataMalformed {
        path: archive.path().to_path_buf(),
        reason,
    })
}
