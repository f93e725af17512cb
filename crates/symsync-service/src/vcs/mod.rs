//! Access to the version control system that holds labeled builds.
//!
//! Only the capabilities needed for syncing debug artifacts are modeled: querying labels by
//! name, listing the file revisions a label pins, and syncing them. The concrete provider is
//! injected as a [`SourceControl`] trait object so that callers never depend on one backend.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::config::SourceControlBackendConfig;

mod filesystem;
mod pattern;

pub use filesystem::{FilesystemSourceControl, FilesystemSourceControlConfig};
pub use pattern::DepotPattern;

/// An error talking to source control.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The provider cannot be reached.
    #[error("source control is unavailable")]
    Unavailable,
    /// A label or file pattern could not be interpreted.
    #[error("invalid pattern `{0}`")]
    InvalidPattern(String),
    /// Reading or writing files failed.
    #[error("source control I/O failed")]
    Io(#[from] io::Error),
}

/// Creates the provider for the configured backend.
pub fn create_source_control(config: &SourceControlBackendConfig) -> Arc<dyn SourceControl> {
    match config {
        SourceControlBackendConfig::Filesystem(config) => {
            Arc::new(FilesystemSourceControl::new(config.clone()))
        }
    }
}

/// A version control provider.
pub trait SourceControl: fmt::Debug + Send + Sync {
    /// Whether the provider can currently serve requests.
    fn is_available(&self) -> bool;

    /// Returns all labels matching `name`, sorted by name.
    ///
    /// Several labels can share a name pattern, in which case all of them are returned.
    fn labels(&self, name: &str) -> Result<Vec<Arc<dyn Label>>, VcsError>;

    /// Returns where `depot_path` lives in the local client workspace.
    ///
    /// The depot path may contain wildcards, which are carried over into the local path.
    fn local_path(&self, depot_path: &str) -> Option<PathBuf>;
}

/// An immutable named snapshot pinning a set of file revisions.
pub trait Label: fmt::Debug + Send + Sync {
    /// The full name of the label.
    fn name(&self) -> &str;

    /// Syncs all files matching `pattern` at this label into the client workspace.
    ///
    /// Returns `true` if at least one file was synced.
    fn sync(&self, pattern: &str) -> Result<bool, VcsError>;

    /// Lists the file revisions matching `pattern` at this label.
    fn file_revisions(&self, pattern: &str) -> Result<Vec<Box<dyn Revision>>, VcsError>;
}

/// One revision of a file in the depot.
pub trait Revision: fmt::Debug + Send + Sync {
    /// The depot path of the file.
    fn filename(&self) -> &str;

    /// Writes the contents of this revision to `destination`, creating parent directories.
    fn get(&self, destination: &Path) -> Result<(), VcsError>;
}
