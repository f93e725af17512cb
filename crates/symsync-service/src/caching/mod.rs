//! # PDB cache
//!
//! Syncing the binaries and debug symbols of a labeled build takes a long time and moves
//! gigabytes of data. The PDB cache keeps the artifacts of recently used labels on disk so that
//! repeated crash analysis of the same build does not have to fetch them again.
//!
//! ## Layout
//!
//! The cache root contains one directory per label, named after the [cleaned](clean_label)
//! label:
//!
//! ```text
//! <cache root>/
//!   __depot_UE4-Releases_4.2_Rocket-CL-2082666/
//!     PDBTimeStamp.txt
//!     Engine/Binaries/Win64/UE4Editor-Core.dll
//!     Engine/Binaries/Win64/UE4Editor-Core.pdb
//! ```
//!
//! The directory tree is the source of truth. There is no separate index: on startup every
//! subdirectory of the root is scanned into a [`CacheEntry`], and its size is recomputed from
//! the files found.
//!
//! ## Last access
//!
//! The modification time of the marker file ([`MARKER_FILE`]) records when an entry was last
//! used. Its contents are irrelevant. A cache hit [touches](CacheStore::touch) the marker, and
//! the in-memory timestamp is re-read from disk afterwards, so that another process scanning the
//! same root sees the same order.
//!
//! ## Eviction
//!
//! Entries are ordered by last access, oldest first. [`CacheStore::cleanup`] removes entries in
//! two passes:
//!
//! 1. Every entry unused for more than `max_age_days` is removed.
//! 2. If a target amount of gigabytes to reclaim is given and the first pass did not reach it,
//!    further entries are removed oldest first until it is reached.
//!
//! On [`CacheStore::init`] the target is derived from the free disk space shortfall and from the
//! amount the cache exceeds its maximum size. If even removing every entry could not free
//! enough space, the cache is wiped and disabled.
//!
//! Free space is only checked on startup, so a cache that grows while running may dip below
//! the configured minimum until the next start.

use std::io;

use thiserror::Error;

mod cleanup;
mod entry;
mod fs;
mod label;
mod store;


pub use cleanup::CleanupStats;
pub use entry::{BYTES_PER_GB, CacheEntry, MARKER_FILE, size_in_gb};
pub use fs::{FreeSpace, SystemFreeSpace};
pub use label::clean_label;
pub use store::CacheStore;

/// An error modifying the PDB cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache is disabled by configuration or for lack of disk space.
    #[error("the PDB cache is disabled")]
    Disabled,
    /// The label is empty.
    #[error("invalid cache label `{0}`")]
    InvalidLabel(String),
    /// Writing the entry to disk failed.
    #[error("failed to write cache entry")]
    Io(#[from] io::Error),
}
