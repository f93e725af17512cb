use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::caching::clean_label;
use crate::config::SourceControlConfig;
use crate::vcs::{Label, Revision, SourceControl, VcsError};

use super::{SyncError, depot_path};

/// File kinds synced for every install root.
const ARTIFACT_KINDS: &[&str] = &["pdb", "exe", "dll"];

/// Extensions of module binaries that carry a separate symbol file.
const SYMBOLIZED_EXTENSIONS: &[&str] = &["dll", "exe"];

const SYMBOL_EXTENSION: &str = "pdb";

/// Artifacts synced from source control, ready to be cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFiles {
    /// The label the files were synced from.
    pub label: String,
    /// The directory whose layout is mirrored into the cache entry.
    pub root: PathBuf,
    /// Every file that was synced successfully.
    pub files: Vec<PathBuf>,
}

/// Syncs binaries and debug symbols of labeled builds.
#[derive(Debug, Clone)]
pub struct ArtifactSyncer {
    config: Arc<SourceControlConfig>,
    source_control: Arc<dyn SourceControl>,
}

impl ArtifactSyncer {
    pub fn new(config: Arc<SourceControlConfig>, source_control: Arc<dyn SourceControl>) -> Self {
        Self {
            config,
            source_control,
        }
    }

    /// Syncs all binaries and symbols of `platform` at `label` into the local symbol store.
    ///
    /// Files that fail to sync are logged and left out of the result. If the label matches
    /// several labels, files are taken from the first one.
    pub fn fetch_by_label(&self, label: &str, platform: &str) -> Result<StagedFiles, SyncError> {
        let store = self
            .config
            .local_symbol_store
            .as_deref()
            .ok_or(SyncError::NotConfigured("local symbol store"))?;
        if label.is_empty() {
            return Err(SyncError::InvalidArgument("empty label"));
        }
        if platform.is_empty() {
            return Err(SyncError::InvalidArgument("empty platform"));
        }
        if !self.source_control.is_available() {
            return Err(SyncError::Unavailable);
        }

        let start = Instant::now();
        let first = self.first_label(label)?;
        let depot_root = self.config.depot_root();
        let staging_root = store.join(clean_label(label));

        let mut seen = BTreeSet::new();
        let mut revisions = Vec::new();
        for pattern in self.platform_patterns(&depot_root, platform) {
            match first.file_revisions(&pattern) {
                Ok(found) => {
                    tracing::debug!("{} revisions match `{}`", found.len(), pattern);
                    revisions.extend(
                        found
                            .into_iter()
                            .filter(|revision| seen.insert(revision.filename().to_owned())),
                    );
                }
                Err(VcsError::Unavailable) => return Err(SyncError::Unavailable),
                Err(err) => tracing::error!(
                    error = &err as &dyn std::error::Error,
                    "Failed to list revisions matching `{}`",
                    pattern
                ),
            }
        }

        let files: Vec<_> = revisions
            .par_iter()
            .filter_map(|revision| get_revision(revision.as_ref(), &depot_root, &staging_root))
            .collect();

        tracing::info!(
            "Synced {} of {} files of label `{}` in {:.2} s",
            files.len(),
            revisions.len(),
            first.name(),
            start.elapsed().as_secs_f64()
        );
        if files.is_empty() {
            return Err(SyncError::NoFiles(label.to_owned()));
        }
        metric!(counter("sync.files.staged") += files.len() as i64);
        metric!(timer("sync.duration") = start.elapsed());

        Ok(StagedFiles {
            label: first.name().to_owned(),
            root: staging_root,
            files,
        })
    }

    /// Syncs the binaries and symbols of the given modules at `label` into the client workspace.
    ///
    /// Module names are paths relative to the depot root. Every configured module layout is
    /// tried. Missing modules are not an error, so the result may be empty. Labels containing the
    /// excluded marker are skipped.
    pub fn fetch_modules_for_label(
        &self,
        label: &str,
        modules: &[String],
    ) -> Result<StagedFiles, SyncError> {
        if label.is_empty() {
            return Err(SyncError::InvalidArgument("empty label"));
        }
        if !self.source_control.is_available() {
            return Err(SyncError::Unavailable);
        }

        let start = Instant::now();
        let depot_root = self.config.depot_root();
        let staging_root = self
            .source_control
            .local_path(&depot_root)
            .ok_or_else(|| SyncError::Unmapped(depot_root.clone()))?;

        let labels = self.source_control.labels(label)?;
        if labels.is_empty() {
            tracing::warn!("No label matches `{}`", label);
            return Err(SyncError::LabelNotFound(label.to_owned()));
        }

        let included: Vec<_> = labels
            .iter()
            .filter(|candidate| !self.is_excluded(candidate.name()))
            .collect();
        for candidate in &included {
            tracing::info!("Syncing modules of label `{}`", candidate.name());
        }

        // File content always comes from the first matching label, even if it is excluded.
        let first = &labels[0];
        let mut synced = Vec::new();
        if included.is_empty() {
            tracing::warn!("All labels matching `{}` are excluded", label);
        } else {
            for pattern in self.module_patterns(&depot_root, modules) {
                match first.sync(&pattern) {
                    Ok(true) => synced.push(pattern),
                    Ok(false) => tracing::debug!("Nothing matches `{}`", pattern),
                    Err(VcsError::Unavailable) => return Err(SyncError::Unavailable),
                    Err(err) => tracing::error!(
                        error = &err as &dyn std::error::Error,
                        "Failed to sync `{}`",
                        pattern
                    ),
                }
            }
        }

        let files = self.local_files(&synced);
        tracing::info!(
            "Synced {} files for {} modules of label `{}` in {:.2} s",
            files.len(),
            modules.len(),
            first.name(),
            start.elapsed().as_secs_f64()
        );
        metric!(counter("sync.files.staged") += files.len() as i64);
        metric!(timer("sync.duration") = start.elapsed());

        Ok(StagedFiles {
            label: first.name().to_owned(),
            root: staging_root,
            files,
        })
    }

    /// Syncs one source file at `label` and returns its location in the client workspace.
    ///
    /// `source_file` is either a depot path or a path relative to the depot root.
    pub fn sync_source_file(&self, label: &str, source_file: &str) -> Result<PathBuf, SyncError> {
        if label.is_empty() {
            return Err(SyncError::InvalidArgument("empty label"));
        }
        if source_file.is_empty() {
            return Err(SyncError::InvalidArgument("empty source file"));
        }
        if !self.source_control.is_available() {
            return Err(SyncError::Unavailable);
        }

        let source_file = source_file.replace('\\', "/");
        let depot_file = if source_file.starts_with("//") {
            source_file
        } else {
            depot_path([self.config.depot_root().as_str(), source_file.as_str()])
        };

        let first = self.first_label(label)?;
        if !first.sync(&depot_file)? {
            return Err(SyncError::NoFiles(first.name().to_owned()));
        }

        let local = self
            .source_control
            .local_path(&depot_file)
            .ok_or(SyncError::Unmapped(depot_file))?;
        tracing::info!("Synced source file `{}`", local.display());
        Ok(local)
    }

    fn first_label(&self, label: &str) -> Result<Arc<dyn Label>, SyncError> {
        let mut labels = self.source_control.labels(label)?;
        if labels.is_empty() {
            tracing::warn!("No label matches `{}`", label);
            return Err(SyncError::LabelNotFound(label.to_owned()));
        }
        if labels.len() > 1 {
            for candidate in &labels {
                tracing::debug!("Label `{}` matches `{}`", candidate.name(), label);
            }
            tracing::warn!(
                "{} labels match `{}`, using `{}`",
                labels.len(),
                label,
                labels[0].name()
            );
        }
        Ok(labels.swap_remove(0))
    }

    fn is_excluded(&self, label: &str) -> bool {
        let excluded = self
            .config
            .excluded_label_marker
            .as_deref()
            .is_some_and(|marker| !marker.is_empty() && label.contains(marker));
        if excluded {
            tracing::info!("Skipping excluded label `{}`", label);
        }
        excluded
    }

    /// One recursive pattern per install root and artifact kind.
    fn platform_patterns(&self, depot_root: &str, platform: &str) -> Vec<String> {
        let mut patterns = Vec::new();
        for install_root in &self.config.install_roots {
            let binaries = depot_path([depot_root, install_root, "Binaries", platform]);
            for kind in ARTIFACT_KINDS {
                patterns.push(format!("{binaries}/...{kind}..."));
            }
        }
        patterns
    }

    /// Binary and symbol patterns for every module in every layout.
    fn module_patterns(&self, depot_root: &str, modules: &[String]) -> Vec<String> {
        let mut patterns = Vec::new();
        for module in modules {
            let module = module.replace('\\', "/");
            let (binary, symbol) = decorate_module(module.trim_start_matches('/'));
            for layout in &self.config.module_layouts {
                patterns.push(depot_path([depot_root, &layout.binaries, &binary]));
                if let Some(symbol) = &symbol {
                    patterns.push(depot_path([depot_root, &layout.symbols, symbol]));
                }
            }
        }
        patterns
    }

    /// Finds the files synced into the client workspace for the given patterns.
    fn local_files(&self, patterns: &[String]) -> Vec<PathBuf> {
        let mut files = BTreeSet::new();
        for pattern in patterns {
            let Some(local) = self.source_control.local_path(pattern) else {
                tracing::warn!("`{}` is not mapped into the client workspace", pattern);
                continue;
            };
            let local = local.to_string_lossy().into_owned();
            let paths = match glob::glob(&local) {
                Ok(paths) => paths,
                Err(err) => {
                    tracing::warn!("Invalid local pattern `{}`: {}", local, err);
                    continue;
                }
            };
            files.extend(paths.filter_map(Result::ok).filter(|path| path.is_file()));
        }
        files.into_iter().collect()
    }
}

/// Wildcard-decorates a module name to match configuration-decorated file names.
///
/// `Core.dll` becomes `Core*.dll` with the symbol file `Core*.pdb`. Modules other than DLLs and
/// executables are synced as-is and have no symbol file.
fn decorate_module(module: &str) -> (String, Option<String>) {
    let Some((stem, extension)) = module.rsplit_once('.') else {
        return (module.to_owned(), None);
    };
    let is_symbolized = SYMBOLIZED_EXTENSIONS
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(extension));
    if !is_symbolized || stem.ends_with('/') {
        return (module.to_owned(), None);
    }
    (
        format!("{stem}*.{extension}"),
        Some(format!("{stem}*.{SYMBOL_EXTENSION}")),
    )
}

/// Fetches one revision below `staging_root`, mirroring its path below the depot root.
fn get_revision(revision: &dyn Revision, depot_root: &str, staging_root: &Path) -> Option<PathBuf> {
    let filename = revision.filename();
    let relative = match filename.strip_prefix(depot_root) {
        Some(rest) if rest.starts_with('/') => rest,
        _ => filename,
    };
    let destination = staging_root.join(relative.trim_start_matches('/'));

    match revision.get(&destination) {
        Ok(()) => Some(destination),
        Err(err) => {
            tracing::error!(
                error = &err as &dyn std::error::Error,
                "Failed to sync `{}`",
                filename
            );
            None
        }
    }
}
