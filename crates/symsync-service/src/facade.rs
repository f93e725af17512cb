//! Making the artifacts of a crashed build available locally.
//!
//! [`CrashSyncFacade`] ties label resolution, the PDB cache and artifact syncing together. A sync
//! request first resolves its label, then consults the cache. On a hit, the entry is touched and
//! returned. On a miss, the artifacts are synced from source control and stored as a new entry.
//! Failures are returned to the caller, nothing is retried.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::caching::{CacheEntry, CacheStore};
use crate::config::{Config, SourceControlConfig};
use crate::sync::{ArtifactSyncer, LabelResolver, StagedFiles, SyncError};
use crate::types::{CrashInfo, SyncRequest};
use crate::vcs::SourceControl;

/// The result of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The label was cached already.
    Cached(CacheEntry),
    /// The artifacts were synced and a new cache entry was created.
    Fresh(CacheEntry),
    /// The artifacts were synced, but the cache is disabled.
    Uncached(StagedFiles),
}

impl SyncOutcome {
    /// The local artifact files.
    pub fn files(&self) -> &[PathBuf] {
        match self {
            Self::Cached(entry) | Self::Fresh(entry) => entry.files(),
            Self::Uncached(staged) => &staged.files,
        }
    }

    /// The directory mirroring the depot layout of the artifacts.
    pub fn root(&self) -> &Path {
        match self {
            Self::Cached(entry) | Self::Fresh(entry) => entry.directory(),
            Self::Uncached(staged) => &staged.root,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached(_))
    }
}

/// Syncs the debug artifacts of crashes through the PDB cache.
#[derive(Debug)]
pub struct CrashSyncFacade {
    source_control: Arc<dyn SourceControl>,
    resolver: LabelResolver,
    syncer: ArtifactSyncer,
    cache: Mutex<CacheStore>,
}

impl CrashSyncFacade {
    /// Creates the facade and initializes the PDB cache, which runs its cleanup.
    pub fn new(config: &Config, source_control: Arc<dyn SourceControl>) -> Self {
        let cache = CacheStore::init(config.pdb_cache.clone());
        Self::with_cache(config.source_control.clone(), source_control, cache)
    }

    pub fn with_cache(
        config: SourceControlConfig,
        source_control: Arc<dyn SourceControl>,
        cache: CacheStore,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            resolver: LabelResolver::new(config.clone(), source_control.clone()),
            syncer: ArtifactSyncer::new(config, source_control.clone()),
            source_control,
            cache: Mutex::new(cache),
        }
    }

    /// Locks the PDB cache.
    pub fn cache(&self) -> MutexGuard<'_, CacheStore> {
        self.cache.lock()
    }

    /// Checks that source control can serve requests.
    pub fn ensure_source_control(&self) -> Result<(), SyncError> {
        if self.source_control.is_available() {
            Ok(())
        } else {
            tracing::error!("Source control is unavailable");
            Err(SyncError::Unavailable)
        }
    }

    /// Returns the label of the request, resolving it from its identifiers if needed.
    pub fn resolve_label(&self, request: &SyncRequest) -> Result<String, SyncError> {
        if let Some(label) = request.label.as_deref().filter(|label| !label.is_empty()) {
            return Ok(label.to_owned());
        }
        self.resolver
            .resolve(request.engine_version, request.changelist)
            .ok_or(SyncError::NoLabel)
    }

    /// Makes the artifacts of the requested build available locally.
    pub fn sync(&self, request: &SyncRequest) -> Result<SyncOutcome, SyncError> {
        self.ensure_source_control()?;
        let label = self.resolve_label(request)?;

        metric!(counter("pdb_cache.access") += 1);
        {
            let mut cache = self.cache.lock();
            if cache.lookup(&label).is_some() {
                cache.touch(&label);
            }
            if let Some(entry) = cache.lookup(&label) {
                tracing::info!("Using cached artifacts of label `{}`", label);
                metric!(counter("pdb_cache.hit") += 1);
                return Ok(SyncOutcome::Cached(entry.clone()));
            }
        }
        metric!(counter("pdb_cache.miss") += 1);

        let staged = if request.modules.is_empty() {
            self.syncer.fetch_by_label(&label, &request.platform)?
        } else {
            self.syncer
                .fetch_modules_for_label(&label, &request.modules)?
        };
        if staged.files.is_empty() {
            return Err(SyncError::NoFiles(label));
        }

        let mut cache = self.cache.lock();
        if !cache.is_enabled() {
            return Ok(SyncOutcome::Uncached(staged));
        }
        let entry = cache.create_entry(&label, &staged.root, &staged.files)?;
        Ok(SyncOutcome::Fresh(entry))
    }

    /// Resolves the label of a changelist and syncs its artifacts.
    pub fn sync_from_changelist(
        &self,
        changelist: u32,
        platform: &str,
    ) -> Result<SyncOutcome, SyncError> {
        self.sync(&SyncRequest::for_changelist(changelist, platform))
    }

    /// Syncs the artifacts of the build a crash happened in.
    pub fn sync_crash(&self, crash: &CrashInfo) -> Result<SyncOutcome, SyncError> {
        self.sync(&SyncRequest::from(crash))
    }

    /// Syncs a source file at `label` into the client workspace and returns its local path.
    pub fn sync_source_file(&self, label: &str, source_file: &str) -> Result<PathBuf, SyncError> {
        self.ensure_source_control()?;
        self.syncer.sync_source_file(label, source_file)
    }
}
