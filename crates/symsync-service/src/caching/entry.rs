use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use super::fs::{catch_not_found, marker_mtime};

/// Name of the file whose modification time records the last access of an entry.
pub const MARKER_FILE: &str = "PDBTimeStamp.txt";

/// One gigabyte, the unit cache sizes are accounted in.
pub const BYTES_PER_GB: u64 = 1 << 30;

/// Rounds a byte count up to whole gigabytes.
pub fn size_in_gb(bytes: u64) -> u64 {
    bytes.div_ceil(BYTES_PER_GB)
}

/// The artifacts of one label stored in the cache.
///
/// Entries are never updated in place apart from their last access time. Re-caching a label
/// replaces its entry entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    label: String,
    directory: PathBuf,
    files: Vec<PathBuf>,
    size_gb: u64,
    last_access: SystemTime,
}

impl CacheEntry {
    /// The cleaned label, which is also the name of the entry directory.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// All files of the entry except the marker file, sorted by path.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// The size of the entry directory, rounded up to whole gigabytes.
    pub fn size_gb(&self) -> u64 {
        self.size_gb
    }

    pub fn last_access(&self) -> SystemTime {
        self.last_access
    }

    pub fn marker_path(&self) -> PathBuf {
        self.directory.join(MARKER_FILE)
    }

    pub(super) fn set_last_access(&mut self, last_access: SystemTime) {
        self.last_access = last_access;
    }
}

/// Reconstructs the entry for `label` by scanning its directory below `root`.
///
/// An entry without a marker file is treated as never accessed.
pub(super) fn read_entry(root: &Path, label: &str) -> io::Result<CacheEntry> {
    let directory = root.join(label);
    let marker = directory.join(MARKER_FILE);

    let last_access = match catch_not_found(|| marker_mtime(&marker))? {
        Some(mtime) => mtime,
        None => {
            tracing::warn!("PDB cache entry `{}` has no timestamp file", label);
            SystemTime::UNIX_EPOCH
        }
    };

    let mut files = Vec::new();
    let mut total_bytes = 0;
    for entry in WalkDir::new(&directory).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        total_bytes += entry.metadata()?.len();
        if entry.path() != marker {
            files.push(entry.into_path());
        }
    }

    Ok(CacheEntry {
        label: label.to_owned(),
        directory,
        files,
        size_gb: size_in_gb(total_bytes),
        last_access,
    })
}
