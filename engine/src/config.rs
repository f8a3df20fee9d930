//! Engine configuration.
//!
//! Every policy value the worker uses lives in `EngineConfig`. Defaults
//! match the values the transfer engine ships with; front-ends may load
//! overrides from a file since the struct is `Deserialize` with
//! `#[serde(default)]`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::checksums::ChecksumAlgorithm;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

/// Alignment required for cache-bypassing I/O.
pub const DIRECT_IO_ALIGNMENT: usize = 4096;

/// Name of the synthetic file a dry run writes.
pub const DRY_RUN_FILE_NAME: &str = "DRY_RUN.dat";

/// Source label used for the synthetic dry-run task.
pub const DRY_RUN_SOURCE: &str = "DRY_RUN_SOURCE";

/// Tunables and behaviour toggles for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size of the reusable transfer buffer in bytes
    pub buffer_size: usize,

    /// Minimum spacing between progress events, in milliseconds
    pub progress_interval_ms: u64,

    /// Free space that must remain on the destination, in bytes
    pub disk_space_safety_margin: u64,

    /// Files at least this large are verified with cache-bypassing reads
    pub direct_io_threshold: u64,

    /// Unflushed bytes after which the destination is forced to disk
    pub flush_threshold: u64,

    /// Size of the synthetic dry-run file
    pub dry_run_size: u64,

    /// Artificial delay per generated dry-run chunk, in milliseconds
    pub dry_run_chunk_delay_ms: u64,

    /// Hash source data and verify the destination after writing
    pub verify: bool,

    pub checksum_algorithm: ChecksumAlgorithm,

    /// Copy modification times to the destination
    pub preserve_times: bool,

    /// Rewrite names the destination filesystem cannot store
    pub sanitize_filenames: bool,

    /// Replace the planned work with one synthetic file
    pub dry_run: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            buffer_size: (8 * MIB) as usize,
            progress_interval_ms: 50,
            disk_space_safety_margin: 50 * MIB,
            direct_io_threshold: 4 * MIB,
            flush_threshold: 64 * MIB,
            dry_run_size: 4 * GIB,
            dry_run_chunk_delay_ms: 10,
            verify: true,
            checksum_algorithm: ChecksumAlgorithm::Xxh64,
            preserve_times: true,
            sanitize_filenames: true,
            dry_run: false,
        }
    }
}

impl EngineConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn dry_run_chunk_delay(&self) -> Duration {
        Duration::from_millis(self.dry_run_chunk_delay_ms)
    }

    /// Bytes of work each planned byte costs: written once, re-read once
    /// more when verification is on.
    pub fn work_factor(&self) -> u64 {
        if self.verify {
            2
        } else {
            1
        }
    }

    /// Buffer size rounded up to the direct I/O alignment, never zero.
    pub fn aligned_buffer_size(&self) -> usize {
        let align = DIRECT_IO_ALIGNMENT;
        let size = self.buffer_size.max(align);
        size.div_ceil(align) * align
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.buffer_size, 8 * 1024 * 1024);
        assert_eq!(config.progress_interval(), Duration::from_millis(50));
        assert_eq!(config.disk_space_safety_margin, 50 * MIB);
        assert_eq!(config.direct_io_threshold, 4 * MIB);
        assert_eq!(config.flush_threshold, 64 * MIB);
        assert_eq!(config.dry_run_size, 4 * GIB);
        assert!(config.verify);
        assert!(config.preserve_times);
        assert!(config.sanitize_filenames);
        assert!(!config.dry_run);
        assert_eq!(config.checksum_algorithm, ChecksumAlgorithm::Xxh64);
    }

    #[test]
    fn test_work_factor() {
        let mut config = EngineConfig::default();
        assert_eq!(config.work_factor(), 2);
        config.verify = false;
        assert_eq!(config.work_factor(), 1);
    }

    #[test]
    fn test_aligned_buffer_size() {
        let mut config = EngineConfig::default();
        config.buffer_size = 5000;
        assert_eq!(config.aligned_buffer_size(), 8192);
        config.buffer_size = 0;
        assert_eq!(config.aligned_buffer_size(), 4096);
        config.buffer_size = 8192;
        assert_eq!(config.aligned_buffer_size(), 8192);
    }
}
