//! Resolving build labels and syncing their artifacts from source control.

use thiserror::Error;

use crate::caching::CacheError;
use crate::vcs::VcsError;

mod resolver;
mod syncer;

pub use resolver::LabelResolver;
pub use syncer::{ArtifactSyncer, StagedFiles};

/// An error syncing the artifacts of a crash.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A required setting is missing.
    #[error("syncing is not configured: {0}")]
    NotConfigured(&'static str),
    /// The request lacks what is needed to identify the build.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The source control provider cannot be reached.
    #[error("source control is unavailable")]
    Unavailable,
    /// No label could be resolved for the crash.
    #[error("no build label found")]
    NoLabel,
    /// Source control has no label of the given name.
    #[error("label `{0}` not found")]
    LabelNotFound(String),
    /// The label exists, but none of its artifacts could be synced.
    #[error("no files synced for label `{0}`")]
    NoFiles(String),
    /// A depot path has no location in the client workspace.
    #[error("depot path `{0}` is not mapped into the client workspace")]
    Unmapped(String),
    #[error(transparent)]
    Vcs(VcsError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<VcsError> for SyncError {
    fn from(err: VcsError) -> Self {
        match err {
            VcsError::Unavailable => Self::Unavailable,
            err => Self::Vcs(err),
        }
    }
}

/// Builds a depot path from segments, skipping empty ones.
///
/// Slashes around segments are normalized, so the result always starts with `//`.
pub(crate) fn depot_path<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    let mut path = String::from("/");
    for segment in segments {
        let segment = segment.trim_matches('/');
        if !segment.is_empty() {
            path.push('/');
            path.push_str(segment);
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depot_path() {
        assert_eq!(
            depot_path(["//depot/UE4", "", "Engine/Core.dll"]),
            "//depot/UE4/Engine/Core.dll"
        );
        assert_eq!(
            depot_path(["depot/UE4/", "/Rocket/Symbols", "a.pdb"]),
            "//depot/UE4/Rocket/Symbols/a.pdb"
        );
    }
}
