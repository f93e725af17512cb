use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use filetime::FileTime;

/// Reports the free space of the volume holding the cache.
pub trait FreeSpace {
    /// The number of bytes available to this process on the volume containing `path`.
    fn available_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// Queries the operating system for free disk space.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFreeSpace;

impl FreeSpace for SystemFreeSpace {
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }
}

impl<F> FreeSpace for F
where
    F: Fn(&Path) -> io::Result<u64>,
{
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        self(path)
    }
}

/// Creates the marker file at `path` and returns its modification time.
pub(super) fn write_marker(path: &Path) -> io::Result<SystemTime> {
    fs::write(path, path.display().to_string())?;
    marker_mtime(path)
}

pub(super) fn marker_mtime(path: &Path) -> io::Result<SystemTime> {
    path.metadata()?.modified()
}

/// Sets the modification time of the marker file, recreating the marker if it vanished.
///
/// Returns the modification time as stored by the file system, which may be coarser than `time`.
pub(super) fn touch_marker(path: &Path, time: SystemTime) -> io::Result<SystemTime> {
    let mtime = FileTime::from_system_time(time);
    if catch_not_found(|| filetime::set_file_mtime(path, mtime))?.is_none() {
        tracing::warn!("Recreating missing timestamp file `{}`", path.display());
        write_marker(path)?;
        filetime::set_file_mtime(path, mtime)?;
    }
    marker_mtime(path)
}

pub(super) fn catch_not_found<F, R>(f: F) -> io::Result<Option<R>>
where
    F: FnOnce() -> io::Result<R>,
{
    match f() {
        Ok(x) => Ok(Some(x)),
        Err(e) => match e.kind() {
            io::ErrorKind::NotFound => Ok(None),
            _ => Err(e),
        },
    }
}
