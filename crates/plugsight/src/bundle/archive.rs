use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use zip::ZipArchive;

use crate::error::{Error, Result};

/// Cap on the buffer capacity preallocated from an entry's declared size.
const ENTRY_PREALLOC_CAP: u64 = 1 << 20;

/// An opened plugin bundle.
///
/// The archive is read once, in full, when opened; every later lookup is
/// answered from memory. Plugin-side resource resolution goes through the
/// same entry table, so nothing a plugin reads can come from the inspector's
/// own filesystem.
#[derive(Clone, Debug)]
pub struct BundleArchive {
    path: PathBuf,
    entries: Arc<BTreeMap<String, Vec<u8>>>,
}

impl BundleArchive {
    /// Opens a bundle and loads its entries.
    ///
    /// A missing file, a non-zip file, or a corrupt entry all make the
    /// artifact unreadable.
    pub fn open(path: &Path) -> Result<Self> {
        let unreadable = |reason: String| Error::ArtifactUnreadable {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| unreadable(e.to_string()))?;
        let mut zip = ZipArchive::new(file).map_err(|e| unreadable(e.to_string()))?;

        let mut entries = BTreeMap::new();
        for index in 0..zip.len() {
            let mut entry = zip
                .by_index(index)
                .map_err(|e| unreadable(format!("entry {index}: {e}")))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            // Declared sizes in the central directory are untrusted; cap the
            // hint and let the read grow the buffer.
            let hint = usize::try_from(entry.size().min(ENTRY_PREALLOC_CAP)).unwrap_or(0);
            let mut bytes = Vec::with_capacity(hint);
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| unreadable(format!("entry {name}: {e}")))?;
            entries.insert(name, bytes);
        }

        tracing::debug!(
            bundle = %path.display(),
            entries = entries.len(),
            "opened plugin bundle"
        );

        Ok(Self {
            path: path.to_path_buf(),
            entries: Arc::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the bundle contains an entry with this name.
    pub fn contains(&self, name: &str) -> bool {
        lookup_entry(&self.entries, name).is_some()
    }

    /// The bytes of a bundle entry, if present.
    pub fn read(&self, name: &str) -> Option<&[u8]> {
        lookup_entry(&self.entries, name)
    }

    pub(crate) fn entries(&self) -> Arc<BTreeMap<String, Vec<u8>>> {
        Arc::clone(&self.entries)
    }
}

/// Entry lookup shared by the archive API and the runtime's resource
/// hostcalls. A leading `/` is ignored so plugins may use absolute-style
/// resource paths.
pub(crate) fn lookup_entry<'a>(
    entries: &'a BTreeMap<String, Vec<u8>>,
    name: &str,
) -> Option<&'a [u8]> {
    let normalized = name.strip_prefix('/').unwrap_or(name);
    entries.get(normalized).map(Vec::as_slice)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::TempDir;
    use zip::write::{FileOptions, ZipWriter};

    use super::*;

    fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).expect("create zip");
        let mut zip = ZipWriter::new(file);
        let opts = FileOptions::default();
        for (name, bytes) in files {
            zip.start_file(*name, opts).expect("start entry");
            zip.write_all(bytes).expect("write entry");
        }
        zip.finish().expect("finish zip");
    }

    #[test]
    fn open_missing_file_is_unreadable() {
        let dir = TempDir::new().expect("tempdir");
        let err = BundleArchive::open(&dir.path().join("absent.zip")).expect_err("must fail");
        assert!(matches!(err, Error::ArtifactUnreadable { .. }));
    }

    #[test]
    fn open_non_zip_file_is_unreadable() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("bundle.zip");
        std::fs::write(&path, b"this is not a zip archive").expect("write file");

        let err = BundleArchive::open(&path).expect_err("must fail");
        assert!(matches!(err, Error::ArtifactUnreadable { .. }));
    }

    #[test]
    fn reads_entries_with_and_without_leading_slash() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("bundle.zip");
        write_zip(&path, &[("resources/data.txt", b"payload")]);

        let archive = BundleArchive::open(&path).expect("open bundle");
        assert_eq!(archive.read("resources/data.txt"), Some(&b"payload"[..]));
        assert_eq!(archive.read("/resources/data.txt"), Some(&b"payload"[..]));
        assert!(archive.contains("/resources/data.txt"));
        assert!(!archive.contains("resources/other.txt"));
    }

    #[test]
    fn reads_entry_whose_declared_size_lies() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("lying.zip");
        let file = File::create(&path).expect("create zip");
        let mut zip = ZipWriter::new(file);
        let opts = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file("blob.bin", opts).expect("start entry");
        zip.write_all(b"payload").expect("write entry");
        zip.finish().expect("finish zip");

        // Rewrite the central directory record so it declares an
        // uncompressed size of u64::MAX through a zip64 extra field; the
        // entry data and its compressed size stay honest.
        let mut bytes = std::fs::read(&path).expect("read zip");
        let eocd = bytes
            .windows(4)
            .rposition(|window| window == b"PK\x05\x06")
            .expect("end of central directory");
        let cd = usize::try_from(u32::from_le_bytes([
            bytes[eocd + 16],
            bytes[eocd + 17],
            bytes[eocd + 18],
            bytes[eocd + 19],
        ]))
        .expect("central directory offset");
        bytes[cd + 24..cd + 28].fill(0xFF);
        let name_len = usize::from(u16::from_le_bytes([bytes[cd + 28], bytes[cd + 29]]));
        let extra_len = u16::from_le_bytes([bytes[cd + 30], bytes[cd + 31]]);
        bytes[cd + 30..cd + 32].copy_from_slice(&(extra_len + 12).to_le_bytes());
        let cd_size = u32::from_le_bytes([
            bytes[eocd + 12],
            bytes[eocd + 13],
            bytes[eocd + 14],
            bytes[eocd + 15],
        ]);
        bytes[eocd + 12..eocd + 16].copy_from_slice(&(cd_size + 12).to_le_bytes());
        let mut zip64_extra = vec![0x01, 0x00, 0x08, 0x00];
        zip64_extra.extend_from_slice(&u64::MAX.to_le_bytes());
        let insert_at = cd + 46 + name_len + usize::from(extra_len);
        bytes.splice(insert_at..insert_at, zip64_extra);
        std::fs::write(&path, &bytes).expect("write patched zip");

        let archive = BundleArchive::open(&path).expect("open patched bundle");
        assert_eq!(archive.read("blob.bin"), Some(&b"payload"[..]));
    }
}
