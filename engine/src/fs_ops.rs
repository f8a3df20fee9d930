//! Filesystem operations module.
//!
//! This module provides the low-level operations the worker needs besides
//! byte copying:
//! - Creating parent directories
//! - Recreating symbolic links without following them
//! - Copying modification times (of files, directories and links)
//! - Removing emptied source directories after a move

use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::control::JobControl;
use crate::error::EngineError;

/// Whether anything exists at `path`, without following symlinks.
pub fn exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Whether `path` is a directory itself (not a link to one).
pub fn is_real_directory(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_dir())
        .unwrap_or(false)
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns EngineError if the parent exists but is not a directory, or if
/// creating it fails
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    // Skip if parent is empty path (relative root)
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Parent path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(parent).map_err(|e| EngineError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        }),
    }
}

/// Replace `dest` with a link pointing where `src` points.
///
/// Anything already at `dest` is removed first; the caller has ruled out
/// real directories.
pub fn copy_symlink(src: &Path, dest: &Path) -> io::Result<()> {
    let target = fs::read_link(src)?;

    if exists_no_follow(dest) {
        fs::remove_file(dest)?;
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(&target, dest)?;

    #[cfg(windows)]
    {
        let points_to_dir = src
            .parent()
            .map(|p| p.join(&target).is_dir())
            .unwrap_or(false);
        if points_to_dir {
            std::os::windows::fs::symlink_dir(&target, dest)?;
        } else {
            std::os::windows::fs::symlink_file(&target, dest)?;
        }
    }

    Ok(())
}

/// Copy the access and modification times of the link `src` itself.
pub fn copy_link_times(src: &Path, dest: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(src)?;
    let atime = FileTime::from_last_access_time(&metadata);
    let mtime = FileTime::from_last_modification_time(&metadata);
    filetime::set_symlink_file_times(dest, atime, mtime)
}

/// Copy the modification time of `src` to `dest`.
pub fn copy_mtime(src: &Path, dest: &Path) -> io::Result<()> {
    let metadata = fs::metadata(src)?;
    let mtime = FileTime::from_last_modification_time(&metadata);
    filetime::set_file_mtime(dest, mtime)
}

/// Re-apply directory modification times, deepest first.
///
/// Writing entries into a directory bumps its mtime, so this runs after all
/// of a job's tasks. Failures are logged and ignored.
pub fn restore_directory_times(pairs: &[(PathBuf, PathBuf)]) {
    let mut ordered: Vec<&(PathBuf, PathBuf)> = pairs.iter().collect();
    ordered.sort_by_key(|(_, dest)| std::cmp::Reverse(dest.components().count()));

    for (src, dest) in ordered {
        if let Err(e) = copy_mtime(src, dest) {
            warn!(directory = %dest.display(), error = %e, "failed to restore directory time");
        }
    }
}

/// Remove every directory in `dirs` that is empty, deepest first.
///
/// Non-empty directories are left alone. Stops early when the job is
/// cancelled after the cleanup started. Returns how many were removed.
pub fn remove_empty_dirs(dirs: &[PathBuf], control: &JobControl) -> usize {
    let cancelled_before = control.is_cancelled();
    let mut ordered: Vec<&PathBuf> = dirs.iter().collect();
    ordered.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));

    let mut removed = 0;
    for dir in ordered {
        if !cancelled_before && control.is_cancelled() {
            break;
        }
        let is_empty = match fs::read_dir(dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => false,
        };
        if is_empty {
            match fs::remove_dir(dir) {
                Ok(()) => {
                    debug!(directory = %dir.display(), "removed empty source directory");
                    removed += 1;
                }
                Err(e) => warn!(directory = %dir.display(), error = %e, "failed to remove directory"),
            }
        }
    }
    removed
}
