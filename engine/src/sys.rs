//! Operating system I/O hints.
//!
//! Thin wrappers over the Linux calls the pipeline uses to keep large
//! transfers from trashing the page cache and to make verification read
//! what is actually on disk. On other platforms the hints are no-ops, the
//! range flush degrades to a plain data sync and cache bypassing reports
//! `Unsupported`.

use std::fs::File;
use std::io;

#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

#[cfg(target_os = "linux")]
fn check(ret: libc::c_int) -> io::Result<()> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn fadvise(file: &File, advice: libc::c_int) -> io::Result<()> {
    // SAFETY: plain syscall on an fd owned by `file`.
    let ret = unsafe { libc::posix_fadvise(file.as_raw_fd(), 0, 0, advice) };
    // posix_fadvise returns the error number instead of setting errno.
    if ret != 0 {
        return Err(io::Error::from_raw_os_error(ret));
    }
    Ok(())
}

/// Announce a single sequential pass over `file` whose pages won't be reused.
pub fn advise_sequential_once(file: &File) {
    #[cfg(target_os = "linux")]
    {
        let _ = fadvise(file, libc::POSIX_FADV_SEQUENTIAL);
        let _ = fadvise(file, libc::POSIX_FADV_NOREUSE);
    }
    #[cfg(not(target_os = "linux"))]
    let _ = file;
}

/// Drop cached pages of `file`. Dirty pages are unaffected.
pub fn drop_cached_pages(file: &File) {
    #[cfg(target_os = "linux")]
    {
        let _ = fadvise(file, libc::POSIX_FADV_DONTNEED);
    }
    #[cfg(not(target_os = "linux"))]
    let _ = file;
}

/// Toggle cache-bypassing I/O on an open file.
///
/// Reads issued while enabled must use aligned offsets, lengths and buffers.
pub fn set_direct_io(file: &File, enabled: bool) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        let fd = file.as_raw_fd();
        // SAFETY: F_GETFL/F_SETFL on an fd owned by `file`.
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        check(flags)?;
        let flags = if enabled {
            flags | libc::O_DIRECT
        } else {
            flags & !libc::O_DIRECT
        };
        check(unsafe { libc::fcntl(fd, libc::F_SETFL, flags) })
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = (file, enabled);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "direct I/O is not available on this platform",
        ))
    }
}

/// Start asynchronous writeback of all dirty pages of `file`.
pub fn start_range_flush(file: &File) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: plain syscall on an fd owned by `file`.
        check(unsafe {
            libc::sync_file_range(file.as_raw_fd(), 0, 0, libc::SYNC_FILE_RANGE_WRITE)
        })
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = file;
        Ok(())
    }
}

/// Write back every dirty page of `file` and wait for completion.
///
/// This does not flush file metadata or the device's volatile cache.
pub fn wait_range_flush(file: &File) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        let flags = libc::SYNC_FILE_RANGE_WAIT_BEFORE
            | libc::SYNC_FILE_RANGE_WRITE
            | libc::SYNC_FILE_RANGE_WAIT_AFTER;
        // SAFETY: plain syscall on an fd owned by `file`.
        check(unsafe { libc::sync_file_range(file.as_raw_fd(), 0, 0, flags) })
    }
    #[cfg(not(target_os = "linux"))]
    {
        file.sync_data()
    }
}
