//! Free-space guard.
//!
//! Two checks keep a job from filling the destination:
//! - the pre-flight check compares the whole plan against free space and
//!   refuses to start the job;
//! - the per-file check runs before each regular file and stops the job
//!   when another writer has eaten the space in the meantime.
//!
//! Both keep a safety margin free on top of the requested bytes.

use std::path::Path;
use tracing::{debug, warn};

use crate::error::{ErrorKind, TransferError};
use crate::volume::VolumeProbe;

pub struct SpaceGuard<'a> {
    probe: &'a dyn VolumeProbe,
    destination: &'a Path,
    margin: u64,
}

impl<'a> SpaceGuard<'a> {
    pub fn new(probe: &'a dyn VolumeProbe, destination: &'a Path, margin: u64) -> Self {
        SpaceGuard {
            probe,
            destination,
            margin,
        }
    }

    /// Check that the planned total fits.
    ///
    /// # Errors
    /// `DiskFull` (context `"<required>|<available>"` in GiB) when it does not
    /// fit, `DriveCheckFailed` when free space cannot be queried.
    pub fn preflight(&self, planned_bytes: u64) -> Result<(), TransferError> {
        let available = self.probe.available_space(self.destination).map_err(|e| {
            warn!(destination = %self.destination.display(), error = %e, "free space query failed");
            TransferError::new(ErrorKind::DriveCheckFailed).with_context(e.to_string())
        })?;

        debug!(planned_bytes, available, margin = self.margin, "pre-flight space check");
        if available < planned_bytes.saturating_add(self.margin) {
            return Err(TransferError::insufficient_space(planned_bytes, available));
        }
        Ok(())
    }

    /// Check that one file still fits. A failed query is ignored.
    ///
    /// # Errors
    /// `DiskFull` carrying `source` as its path.
    pub fn check_file(&self, source: &Path, size: u64) -> Result<(), TransferError> {
        match self.probe.available_space(self.destination) {
            Ok(available) if available < size.saturating_add(self.margin) => {
                warn!(file = %source.display(), size, available, "destination out of space");
                Err(TransferError::at(ErrorKind::DiskFull, source))
            }
            Ok(_) => Ok(()),
            Err(e) => {
                debug!(error = %e, "per-file space query failed, continuing");
                Ok(())
            }
        }
    }
}
