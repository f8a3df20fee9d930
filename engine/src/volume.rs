//! Destination volume queries.
//!
//! `VolumeProbe` answers the two questions the engine asks about the
//! destination volume: how much space is free and which filesystem it uses.
//! `SystemVolumes` asks the operating system; tests plug in fixed answers.

use std::io;
use std::path::{Path, PathBuf};
use sysinfo::Disks;

/// Source of free-space and filesystem information for a path.
pub trait VolumeProbe: Send + Sync {
    /// Bytes available to unprivileged writers on the volume holding `path`.
    fn available_space(&self, path: &Path) -> io::Result<u64>;

    /// Filesystem type name (`ext4`, `ntfs`, `vfat`, ...) of that volume.
    fn filesystem_name(&self, path: &Path) -> Option<String>;
}

/// Probe backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemVolumes;

impl VolumeProbe for SystemVolumes {
    #[cfg(unix)]
    fn available_space(&self, path: &Path) -> io::Result<u64> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let existing = existing_ancestor(path);
        let c_path = CString::new(existing.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        // SAFETY: c_path is NUL-terminated and stat is a valid out pointer.
        if unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
    }

    #[cfg(not(unix))]
    fn available_space(&self, path: &Path) -> io::Result<u64> {
        let existing = existing_ancestor(path);
        let disks = Disks::new_with_refreshed_list();
        mounted_disk(&disks, &existing)
            .map(|disk| disk.available_space())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no volume information for {}", path.display()),
                )
            })
    }

    fn filesystem_name(&self, path: &Path) -> Option<String> {
        let existing = existing_ancestor(path);
        let disks = Disks::new_with_refreshed_list();
        mounted_disk(&disks, &existing).map(|disk| disk.file_system().to_string_lossy().into_owned())
    }
}

/// Closest ancestor of `path` that exists, canonicalized when possible.
///
/// The destination root is often created only after planning, so its own
/// metadata cannot be queried yet.
fn existing_ancestor(path: &Path) -> PathBuf {
    let mut check = path.to_path_buf();
    while !check.exists() {
        match check.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => check = parent.to_path_buf(),
            _ => {
                check = PathBuf::from(".");
                break;
            }
        }
    }
    std::fs::canonicalize(&check).unwrap_or(check)
}

/// Disk with the deepest mount point containing `path`.
fn mounted_disk<'a>(disks: &'a Disks, path: &Path) -> Option<&'a sysinfo::Disk> {
    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().components().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_ancestor_walks_up() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let missing = temp_dir.path().join("a").join("b").join("c");
        let found = existing_ancestor(&missing);
        let expected = std::fs::canonicalize(temp_dir.path()).expect("Failed to canonicalize");
        assert_eq!(found, expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_available_space_for_missing_destination() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let missing = temp_dir.path().join("not").join("yet");
        let available = SystemVolumes
            .available_space(&missing)
            .expect("Failed to query free space");
        let direct = SystemVolumes
            .available_space(temp_dir.path())
            .expect("Failed to query free space");
        // Same volume; allow for other processes writing in between
        let delta = available.abs_diff(direct);
        assert!(delta < 64 * 1024 * 1024, "unexpected difference {}", delta);
    }
}
