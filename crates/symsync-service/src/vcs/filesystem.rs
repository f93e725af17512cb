//! A source control provider backed by plain directories.
//!
//! The server root contains one directory per label, each holding the depot tree as it looked
//! at that label: the depot path `//depot/UE4/Engine/a.dll` of label `UE4_CL-1` lives at
//! `<path>/UE4_CL-1/depot/UE4/Engine/a.dll`. Syncing copies files into the client root using the
//! same mapping.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::{DepotPattern, Label, Revision, SourceControl, VcsError};

/// Configuration for reading labels from the local file system.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FilesystemSourceControlConfig {
    /// Directory holding one subdirectory per label.
    pub path: PathBuf,

    /// The client workspace that labels are synced into.
    pub client_root: PathBuf,
}

/// Source control provider reading labels from [`FilesystemSourceControlConfig::path`].
#[derive(Debug, Clone)]
pub struct FilesystemSourceControl {
    config: Arc<FilesystemSourceControlConfig>,
}

impl FilesystemSourceControl {
    pub fn new(config: FilesystemSourceControlConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl SourceControl for FilesystemSourceControl {
    fn is_available(&self) -> bool {
        self.config.path.is_dir()
    }

    fn labels(&self, name: &str) -> Result<Vec<Arc<dyn Label>>, VcsError> {
        if !self.is_available() {
            return Err(VcsError::Unavailable);
        }
        let matcher =
            glob::Pattern::new(name).map_err(|_| VcsError::InvalidPattern(name.to_owned()))?;

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.config.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(label) = entry.file_name().to_str() {
                if matcher.matches(label) {
                    names.push(label.to_owned());
                }
            }
        }
        names.sort();

        Ok(names
            .into_iter()
            .map(|name| {
                let dir = self.config.path.join(&name);
                Arc::new(FilesystemLabel {
                    name,
                    dir,
                    config: self.config.clone(),
                }) as Arc<dyn Label>
            })
            .collect())
    }

    fn local_path(&self, depot_path: &str) -> Option<PathBuf> {
        Some(self.config.client_root.join(depot_relative(depot_path)))
    }
}

#[derive(Debug)]
struct FilesystemLabel {
    name: String,
    dir: PathBuf,
    config: Arc<FilesystemSourceControlConfig>,
}

impl FilesystemLabel {
    /// Returns `(depot_path, file)` for every file in this label matching `pattern`.
    fn matching_files(&self, pattern: &str) -> Result<Vec<(String, PathBuf)>, VcsError> {
        let pattern = DepotPattern::new(pattern)?;
        let scan_root = self.dir.join(depot_relative(pattern.literal_dir()));
        if !scan_root.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&scan_root).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.dir) else {
                continue;
            };
            let depot_path = to_depot_path(relative);
            if pattern.is_match(&depot_path) {
                files.push((depot_path, entry.into_path()));
            }
        }
        tracing::trace!(
            "Label `{}` has {} files matching `{}`",
            self.name,
            files.len(),
            pattern.as_str()
        );
        Ok(files)
    }
}

impl Label for FilesystemLabel {
    fn name(&self) -> &str {
        &self.name
    }

    fn sync(&self, pattern: &str) -> Result<bool, VcsError> {
        let files = self.matching_files(pattern)?;
        for (depot_path, source) in &files {
            let destination = self.config.client_root.join(depot_relative(depot_path));
            copy_file(source, &destination)?;
        }
        Ok(!files.is_empty())
    }

    fn file_revisions(&self, pattern: &str) -> Result<Vec<Box<dyn Revision>>, VcsError> {
        Ok(self
            .matching_files(pattern)?
            .into_iter()
            .map(|(depot_path, source)| {
                Box::new(FilesystemRevision { depot_path, source }) as Box<dyn Revision>
            })
            .collect())
    }
}

#[derive(Debug)]
struct FilesystemRevision {
    depot_path: String,
    source: PathBuf,
}

impl Revision for FilesystemRevision {
    fn filename(&self) -> &str {
        &self.depot_path
    }

    fn get(&self, destination: &Path) -> Result<(), VcsError> {
        copy_file(&self.source, destination)
    }
}

fn copy_file(source: &Path, destination: &Path) -> Result<(), VcsError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, destination)?;
    Ok(())
}

/// Strips the leading `//` of a depot path.
fn depot_relative(depot_path: &str) -> &str {
    depot_path.trim_start_matches('/')
}

fn to_depot_path(relative: &Path) -> String {
    let mut depot_path = String::from("/");
    for component in relative.components() {
        depot_path.push('/');
        depot_path.push_str(&component.as_os_str().to_string_lossy());
    }
    depot_path
}

#[cfg(test)]
mod tests {
    use symsync_test::{self as test};

    use super::*;

    fn source_control(root: &Path) -> FilesystemSourceControl {
        FilesystemSourceControl::new(FilesystemSourceControlConfig {
            path: root.join("server"),
            client_root: root.join("client"),
        })
    }

    #[test]
    fn test_unavailable() {
        test::setup();
        let tempdir = test::tempdir();
        let sc = source_control(tempdir.path());

        assert!(!sc.is_available());
        assert!(matches!(sc.labels("UE4_CL-1"), Err(VcsError::Unavailable)));
    }

    #[test]
    fn test_labels() {
        test::setup();
        let tempdir = test::tempdir();
        let server = tempdir.path().join("server");
        test::depot_file(&server, "UE4_CL-2", "//depot/UE4/a.txt", b"a");
        test::depot_file(&server, "UE4_CL-1", "//depot/UE4/a.txt", b"a");
        test::depot_file(&server, "Other", "//depot/UE4/a.txt", b"a");
        let sc = source_control(tempdir.path());

        let names: Vec<_> = sc
            .labels("UE4_CL-*")
            .unwrap()
            .iter()
            .map(|label| label.name().to_owned())
            .collect();
        assert_eq!(names, ["UE4_CL-1", "UE4_CL-2"]);

        assert_eq!(sc.labels("UE4_CL-2").unwrap().len(), 1);
        assert!(sc.labels("UE4_CL-3").unwrap().is_empty());
    }

    #[test]
    fn test_file_revisions() {
        test::setup();
        let tempdir = test::tempdir();
        let server = tempdir.path().join("server");
        test::depot_file(&server, "L", "//depot/UE4/Engine/Binaries/Win64/Core.dll", b"dll");
        test::depot_file(&server, "L", "//depot/UE4/Engine/Binaries/Win64/Core.pdb", b"pdb");
        test::depot_file(&server, "L", "//depot/UE4/Engine/Binaries/Linux/Core.pdb", b"pdb");
        let sc = source_control(tempdir.path());
        let label = sc.labels("L").unwrap().remove(0);

        let revisions = label
            .file_revisions("//depot/UE4/Engine/Binaries/Win64/...pdb...")
            .unwrap();
        assert_eq!(revisions.len(), 1);
        assert_eq!(
            revisions[0].filename(),
            "//depot/UE4/Engine/Binaries/Win64/Core.pdb"
        );

        let destination = tempdir.path().join("out/Core.pdb");
        revisions[0].get(&destination).unwrap();
        assert_eq!(fs::read(destination).unwrap(), b"pdb");

        // a pattern below a directory that does not exist matches nothing
        let revisions = label.file_revisions("//depot/UE4/Engine/Binaries/Mac/...").unwrap();
        assert!(revisions.is_empty());
    }

    #[test]
    fn test_sync() {
        test::setup();
        let tempdir = test::tempdir();
        let server = tempdir.path().join("server");
        test::depot_file(&server, "L", "//depot/UE4/Engine/Core-Win64-Debug.dll", b"dll");
        let sc = source_control(tempdir.path());
        let label = sc.labels("L").unwrap().remove(0);

        assert!(label.sync("//depot/UE4/Engine/Core*.dll").unwrap());
        let local = sc
            .local_path("//depot/UE4/Engine/Core-Win64-Debug.dll")
            .unwrap();
        assert_eq!(local, tempdir.path().join("client/depot/UE4/Engine/Core-Win64-Debug.dll"));
        assert_eq!(fs::read(local).unwrap(), b"dll");

        assert!(!label.sync("//depot/UE4/Engine/Missing*.dll").unwrap());
    }
}
