use std::collections::HashSet;
use std::time::{Duration, Instant, SystemTime};

use super::entry::CacheEntry;
use super::fs::{catch_not_found, marker_mtime};
use super::store::CacheStore;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Summary of a [`CacheStore::cleanup`] run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStats {
    /// The number of entries deleted.
    pub removed_entries: usize,
    /// The gigabytes reclaimed by the deleted entries.
    pub reclaimed_gb: u64,
    /// The number of entries still cached.
    pub retained_entries: usize,
    /// The size of all entries still cached.
    pub retained_gb: u64,
}

impl CacheStore {
    /// Removes stale entries and, if needed, more entries until `target_gb` are reclaimed.
    ///
    /// Entries whose last access is more than `max_age_days` in the past are always removed.
    /// If that reclaims less than `target_gb`, the least recently used of the remaining entries
    /// are removed until at least `target_gb` are reclaimed or the cache is empty. A target of
    /// `0` only removes stale entries.
    pub fn cleanup(&mut self, max_age_days: u64, target_gb: u64) -> CleanupStats {
        if !self.is_enabled() {
            return CleanupStats::default();
        }

        let start = Instant::now();
        let mut stats = CleanupStats::default();

        for label in self.plan_eviction(max_age_days, target_gb) {
            if let Some(entry) = self.remove_entry(&label) {
                stats.removed_entries += 1;
                stats.reclaimed_gb += entry.size_gb();
            }
        }

        stats.retained_entries = self.len();
        stats.retained_gb = self.total_size_gb();

        metric!(timer("pdb_cache.cleanup.duration") = start.elapsed());
        tracing::info!(
            "PDB cache cleaned in {:.2} ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        tracing::info!(
            "Removed {} entries ({} GB), {} entries ({} GB) remain",
            stats.removed_entries,
            stats.reclaimed_gb,
            stats.retained_entries,
            stats.retained_gb
        );
        self.report_size();

        stats
    }

    /// Selects the labels to evict, in the order they are removed.
    pub(super) fn plan_eviction(&self, max_age_days: u64, target_gb: u64) -> Vec<String> {
        let max_age_secs = max_age_days.saturating_mul(SECONDS_PER_DAY);
        let now = SystemTime::now();

        let mut evicted = Vec::new();
        let mut seen = HashSet::new();
        let mut reclaimed_gb = 0;

        for entry in self.entries() {
            let age = entry_age(entry, now);
            if age.as_secs() > max_age_secs {
                tracing::debug!(
                    "PDB cache entry `{}` was last used {} ago",
                    entry.label(),
                    humantime::format_duration(Duration::from_secs(age.as_secs()))
                );
                evicted.push(entry.label().to_owned());
                seen.insert(entry.label());
                reclaimed_gb += entry.size_gb();
            }
        }

        for entry in self.entries() {
            if reclaimed_gb >= target_gb {
                break;
            }
            if seen.contains(entry.label()) {
                continue;
            }
            evicted.push(entry.label().to_owned());
            reclaimed_gb += entry.size_gb();
        }

        evicted
    }
}

/// The time since the entry was last used, according to its marker file.
///
/// Falls back to the last known access time if the marker cannot be read.
fn entry_age(entry: &CacheEntry, now: SystemTime) -> Duration {
    let last_access = match catch_not_found(|| marker_mtime(&entry.marker_path())) {
        Ok(Some(mtime)) => mtime,
        Ok(None) | Err(_) => entry.last_access(),
    };
    now.duration_since(last_access).unwrap_or_default()
}
