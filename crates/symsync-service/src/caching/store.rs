use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use rayon::prelude::*;

use crate::config::PdbCacheConfig;

use super::entry::{BYTES_PER_GB, CacheEntry, MARKER_FILE, read_entry};
use super::fs::{FreeSpace, SystemFreeSpace, catch_not_found, touch_marker, write_marker};
use super::{CacheError, clean_label};

/// The on-disk PDB cache.
///
/// All operations on a disabled cache are no-ops: lookups miss, and nothing is written. The store
/// is not synchronized. Callers that share it across threads wrap it in a lock.
#[derive(Debug)]
pub struct CacheStore {
    config: PdbCacheConfig,
    /// The cache root, `None` if the cache is disabled.
    root: Option<PathBuf>,
    entries: HashMap<String, CacheEntry>,
    /// Cleaned labels in ascending order of last access.
    order: Vec<String>,
}

impl CacheStore {
    /// Creates a cache that never stores anything.
    pub fn disabled(config: PdbCacheConfig) -> Self {
        Self {
            config,
            root: None,
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Loads the cache from its root directory and enforces the configured limits.
    ///
    /// Any failure to set up the cache disables it. This never fails.
    pub fn init(config: PdbCacheConfig) -> Self {
        Self::init_with_probe(config, &SystemFreeSpace)
    }

    /// Like [`init`](Self::init), but measures free disk space with `probe`.
    pub fn init_with_probe(config: PdbCacheConfig, probe: &dyn FreeSpace) -> Self {
        if !config.enabled {
            tracing::info!("PDB cache is disabled");
            return Self::disabled(config);
        }

        let Some(path) = config.path.clone() else {
            tracing::warn!("PDB cache is enabled but has no path, disabling it");
            return Self::disabled(config);
        };

        if let Err(err) = fs::create_dir_all(&path) {
            tracing::error!(
                error = &err as &dyn std::error::Error,
                "Failed to create PDB cache directory `{}`, disabling it",
                path.display()
            );
            return Self::disabled(config);
        }

        let root = std::path::absolute(&path).unwrap_or(path);
        tracing::info!("PDB cache is enabled at `{}`", root.display());

        let mut store = Self {
            config,
            root: Some(root),
            entries: HashMap::new(),
            order: Vec::new(),
        };
        store.load_entries();
        store.enforce_limits(probe);
        store
    }

    /// Scans every subdirectory of the root into an entry.
    fn load_entries(&mut self) {
        let Some(root) = self.root.clone() else {
            return;
        };
        let start = Instant::now();

        let dirs = match fs::read_dir(&root) {
            Ok(dirs) => dirs,
            Err(err) => {
                tracing::error!(
                    error = &err as &dyn std::error::Error,
                    "Failed to read PDB cache directory"
                );
                return;
            }
        };

        for dir in dirs {
            let dir = match dir {
                Ok(dir) => dir,
                Err(err) => {
                    tracing::warn!(error = &err as &dyn std::error::Error, "Skipping cache entry");
                    continue;
                }
            };
            if !dir.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let Some(label) = dir.file_name().to_str().map(str::to_owned) else {
                tracing::warn!("Skipping cache entry with invalid name {:?}", dir.file_name());
                continue;
            };

            match read_entry(&root, &label) {
                Ok(entry) => {
                    self.entries.insert(label, entry);
                }
                Err(err) => tracing::error!(
                    error = &err as &dyn std::error::Error,
                    "Failed to read PDB cache entry `{}`",
                    label
                ),
            }
        }

        self.sort();
        tracing::info!(
            "PDB cache loaded in {:.2} ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        tracing::info!(
            "Found {} PDB cache entries occupying {} GB",
            self.entries.len(),
            self.total_size_gb()
        );
        self.report_size();
    }

    /// Makes room for the configured minimum of free space and trims the cache to its maximum size.
    fn enforce_limits(&mut self, probe: &dyn FreeSpace) {
        let Some(root) = self.root.clone() else {
            return;
        };

        let total_gb = self.total_size_gb();
        let free_gb = match probe.available_bytes(&root) {
            Ok(bytes) => bytes / BYTES_PER_GB,
            Err(err) => {
                tracing::warn!(
                    error = &err as &dyn std::error::Error,
                    "Could not determine free disk space, skipping the free space check"
                );
                u64::MAX
            }
        };
        let shortfall_gb = self.config.min_free_space_gb.saturating_sub(free_gb);

        if shortfall_gb > total_gb {
            tracing::error!("There is not enough free disk space, PDB cache disabled");
            tracing::error!("Current free disk space is {} GB", free_gb);
            tracing::error!(
                "To enable the PDB cache you need to free {} GB of space",
                shortfall_gb - total_gb
            );
            self.clear();
            self.root = None;
            return;
        }

        let excess_gb = total_gb.saturating_sub(self.config.max_size_gb);
        let target_gb = shortfall_gb.max(excess_gb);
        self.cleanup(self.config.max_age_days, target_gb);
    }

    /// Whether the cache is in use.
    pub fn is_enabled(&self) -> bool {
        self.root.is_some()
    }

    /// The cache root, if the cache is enabled.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Looks up the entry for `label`, which is cleaned first.
    ///
    /// This does not update the last access time, see [`touch`](Self::touch).
    pub fn lookup(&self, label: &str) -> Option<&CacheEntry> {
        self.entries.get(&clean_label(label))
    }

    /// Records an access to the entry for `label`.
    ///
    /// # Panics
    ///
    /// Panics if the cache is enabled and has no entry for `label`. Only touch labels returned
    /// by [`lookup`](Self::lookup).
    pub fn touch(&mut self, label: &str) {
        if !self.is_enabled() {
            return;
        }

        let cleaned = clean_label(label);
        let Some(entry) = self.entries.get_mut(&cleaned) else {
            panic!("touched PDB cache entry `{cleaned}` which is not cached");
        };

        let now = SystemTime::now();
        let marker = entry.marker_path();
        match touch_marker(&marker, now) {
            Ok(mtime) => entry.set_last_access(mtime),
            Err(err) => {
                tracing::error!(
                    error = &err as &dyn std::error::Error,
                    "Failed to update timestamp of PDB cache entry `{}`",
                    cleaned
                );
                entry.set_last_access(now);
            }
        }

        self.sort();
        tracing::debug!("Touched PDB cache entry `{}`", cleaned);
    }

    /// Stores the given files as the entry for `original_label`.
    ///
    /// Each file keeps its path relative to `staging_root`. Files outside of `staging_root` are
    /// stored by their file name. An existing entry for the label is replaced. Files that fail to
    /// copy are logged and left out, so the entry may be partial.
    pub fn create_entry(
        &mut self,
        original_label: &str,
        staging_root: &Path,
        files: &[PathBuf],
    ) -> Result<CacheEntry, CacheError> {
        let root = self.root.clone().ok_or(CacheError::Disabled)?;
        if original_label.is_empty() {
            return Err(CacheError::InvalidLabel(original_label.to_owned()));
        }
        let cleaned = clean_label(original_label);
        let directory = root.join(&cleaned);
        let start = Instant::now();

        if self.entries.remove(&cleaned).is_some() {
            self.order.retain(|label| label != &cleaned);
        }
        catch_not_found(|| fs::remove_dir_all(&directory))?;

        fs::create_dir_all(&directory)?;
        write_marker(&directory.join(MARKER_FILE))?;

        tracing::info!(
            "Copying {} files of `{}` into PDB cache entry `{}`",
            files.len(),
            original_label,
            cleaned
        );
        let copied = files
            .par_iter()
            .filter(|source| match copy_into_entry(staging_root, source, &directory) {
                Ok(()) => true,
                Err(err) => {
                    tracing::error!(
                        error = &err as &dyn std::error::Error,
                        "Failed to copy `{}` into the PDB cache",
                        source.display()
                    );
                    false
                }
            })
            .count();

        let entry = read_entry(&root, &cleaned)?;
        tracing::info!(
            "PDB cache entry `{}` with {} of {} files ({} GB) created in {:.2} s",
            cleaned,
            copied,
            files.len(),
            entry.size_gb(),
            start.elapsed().as_secs_f64()
        );

        self.entries.insert(cleaned, entry.clone());
        self.sort();

        metric!(counter("pdb_cache.entry.created") += 1);
        self.report_size();

        Ok(entry)
    }

    /// Removes the entry for `label` from memory and disk.
    ///
    /// Returns the removed entry, or `None` if the label was not cached.
    pub fn remove(&mut self, label: &str) -> Option<CacheEntry> {
        if !self.is_enabled() {
            return None;
        }

        self.remove_entry(&clean_label(label))
    }

    /// Removes the entry stored under `cleaned`, which is used as is.
    ///
    /// Entries loaded from disk are keyed by their directory name, which need not be a cleaned
    /// label.
    pub(super) fn remove_entry(&mut self, cleaned: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(cleaned)?;
        self.order.retain(|label| label != cleaned);

        let start = Instant::now();
        if let Err(err) = catch_not_found(|| fs::remove_dir_all(entry.directory())) {
            tracing::error!(
                error = &err as &dyn std::error::Error,
                "Failed to delete PDB cache entry `{}`",
                cleaned
            );
        }
        tracing::info!(
            "PDB cache entry `{}` removed in {:.2} ms, reclaimed {} GB",
            cleaned,
            start.elapsed().as_secs_f64() * 1000.0,
            entry.size_gb()
        );

        metric!(counter("pdb_cache.entry.removed") += 1);
        Some(entry)
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        for label in std::mem::take(&mut self.order) {
            self.remove_entry(&label);
        }
        self.report_size();
    }

    /// All entries, least recently used first.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.order.iter().filter_map(|label| self.entries.get(label))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The combined size of all entries in gigabytes.
    pub fn total_size_gb(&self) -> u64 {
        self.entries.values().map(CacheEntry::size_gb).sum()
    }

    pub(super) fn report_size(&self) {
        metric!(gauge("pdb_cache.size_gb") = self.total_size_gb());
        metric!(gauge("pdb_cache.entries") = self.entries.len() as u64);
    }

    fn sort(&mut self) {
        let mut order: Vec<_> = self
            .entries
            .values()
            .map(|entry| (entry.last_access(), entry.label()))
            .collect();
        order.sort();
        self.order = order.into_iter().map(|(_, label)| label.to_owned()).collect();
    }
}

fn copy_into_entry(staging_root: &Path, source: &Path, directory: &Path) -> io::Result<()> {
    let relative = match source.strip_prefix(staging_root) {
        Ok(relative) => relative,
        Err(_) => Path::new(source.file_name().ok_or(io::ErrorKind::InvalidInput)?),
    };
    if relative == Path::new(MARKER_FILE) {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "file collides with the cache timestamp file",
        ));
    }

    let destination = directory.join(relative);
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, &destination)?;
    Ok(())
}
