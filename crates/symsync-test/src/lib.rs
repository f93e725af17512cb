//! Helpers for testing the cache and the sync pipeline.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using [`tempdir`], make sure that the handle to the temp directory is held for the
//!    entire lifetime of the test. When dropped too early, the directory is deleted while the
//!    cache still points into it. To avoid this, assign it to a variable in the test function
//!    (e.g. `let tempdir = test::tempdir()`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

pub use tempfile::TempDir;

/// One gigabyte, the unit cache sizes are accounted in.
pub const GB: u64 = 1 << 30;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `symsync` crates and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("symsync_service=trace,symsync=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped, unless
/// [`into_path`](TempDir::into_path) is called. Use it as a guard to automatically clean up after
/// tests.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

/// Writes `contents` to `path`, creating all parent directories.
pub fn write_file(path: impl AsRef<Path>, contents: &[u8]) -> PathBuf {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
    path.to_path_buf()
}

/// Creates a sparse file of `len` bytes.
///
/// This reports the full length in its metadata without occupying the disk space, which allows
/// simulating multi-gigabyte cache entries.
pub fn sparse_file(path: impl AsRef<Path>, len: u64) -> PathBuf {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let file = fs::File::create(path).unwrap();
    file.set_len(len).unwrap();
    path.to_path_buf()
}

/// Sets the modification time of `path` to `age` in the past.
pub fn set_age(path: impl AsRef<Path>, age: Duration) {
    let mtime = SystemTime::now() - age;
    filetime::set_file_mtime(path, FileTime::from_system_time(mtime)).unwrap();
}

/// A duration of `days` days.
pub fn days(days: u64) -> Duration {
    Duration::from_secs(days * 24 * 3600)
}

/// Adds a file to `label` of a filesystem source control server rooted at `server`.
///
/// `depot_path` is the full depot path, e.g. `//depot/UE4/Engine/Binaries/Win64/Core.dll`.
pub fn depot_file(server: &Path, label: &str, depot_path: &str, contents: &[u8]) -> PathBuf {
    let path = server
        .join(label)
        .join(depot_path.trim_start_matches('/'));
    write_file(path, contents)
}
