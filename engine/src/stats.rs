//! Shared job counters.
//!
//! The worker is the only writer. Readers on other threads (the job handle,
//! the presentation layer) get consistent-enough snapshots through atomics
//! without taking any lock.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct JobStatistics {
    /// Sum of planned regular-file sizes, minus skipped files
    total_size: AtomicU64,
    /// Bytes of work: total size, doubled when verifying. Never below 1.
    work_bytes: AtomicU64,
    /// Bytes read, written or re-read so far. Monotonic.
    processed_bytes: AtomicU64,
    /// Bytes written and not rolled back
    committed_bytes: AtomicU64,
    /// Sizes of files fully moved
    completed_size: AtomicU64,
    files_processed: AtomicUsize,
    files_total: AtomicUsize,
}

/// Point-in-time copy of `JobStatistics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub total_size: u64,
    pub work_bytes: u64,
    pub processed_bytes: u64,
    pub committed_bytes: u64,
    pub completed_size: u64,
    pub files_processed: usize,
    pub files_total: usize,
}

impl JobStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new job over `total_size` bytes in `files_total` tasks.
    pub fn reset(&self, total_size: u64, files_total: usize, work_factor: u64) {
        self.total_size.store(total_size, Ordering::SeqCst);
        self.work_bytes
            .store(total_size.saturating_mul(work_factor).max(1), Ordering::SeqCst);
        self.processed_bytes.store(0, Ordering::SeqCst);
        self.committed_bytes.store(0, Ordering::SeqCst);
        self.completed_size.store(0, Ordering::SeqCst);
        self.files_processed.store(0, Ordering::SeqCst);
        self.files_total.store(files_total, Ordering::SeqCst);
    }

    pub fn add_processed(&self, bytes: u64) -> u64 {
        self.processed_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes
    }

    pub fn add_committed(&self, bytes: u64) {
        self.committed_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Undo bytes of a file that was removed again.
    pub fn rollback_committed(&self, bytes: u64) {
        let _ = self
            .committed_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(bytes))
            });
    }

    pub fn add_completed_size(&self, bytes: u64) {
        self.completed_size.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Count one more task as handled and return the new count.
    pub fn file_processed(&self) -> usize {
        self.files_processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Take a skipped file out of the totals. Work stays at least 1.
    pub fn remove_skipped(&self, size: u64, work_factor: u64) {
        let _ = self
            .total_size
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_sub(size))
            });
        let _ = self
            .work_bytes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_sub(size.saturating_mul(work_factor)).max(1))
            });
    }

    pub fn processed_bytes(&self) -> u64 {
        self.processed_bytes.load(Ordering::Relaxed)
    }

    pub fn work_bytes(&self) -> u64 {
        self.work_bytes.load(Ordering::SeqCst)
    }

    pub fn files_total(&self) -> usize {
        self.files_total.load(Ordering::SeqCst)
    }

    /// Whole-job completion in percent, clamped to 100.
    pub fn total_percent(&self) -> u32 {
        let work = self.work_bytes().max(1);
        let percent = self.processed_bytes().saturating_mul(100) / work;
        percent.min(100) as u32
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_size: self.total_size.load(Ordering::SeqCst),
            work_bytes: self.work_bytes.load(Ordering::SeqCst),
            processed_bytes: self.processed_bytes.load(Ordering::Relaxed),
            committed_bytes: self.committed_bytes.load(Ordering::Relaxed),
            completed_size: self.completed_size.load(Ordering::Relaxed),
            files_processed: self.files_processed.load(Ordering::SeqCst),
            files_total: self.files_total.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_doubles_work_when_verifying() {
        let stats = JobStatistics::new();
        stats.reset(1000, 3, 2);
        let snap = stats.snapshot();
        assert_eq!(snap.total_size, 1000);
        assert_eq!(snap.work_bytes, 2000);
        assert_eq!(snap.files_total, 3);
    }

    #[test]
    fn test_empty_job_work_is_clamped() {
        let stats = JobStatistics::new();
        stats.reset(0, 0, 2);
        assert_eq!(stats.work_bytes(), 1);
        assert_eq!(stats.total_percent(), 0);
    }

    #[test]
    fn test_remove_skipped_keeps_work_positive() {
        let stats = JobStatistics::new();
        stats.reset(100, 2, 2);
        stats.remove_skipped(40, 2);
        assert_eq!(stats.snapshot().total_size, 60);
        assert_eq!(stats.work_bytes(), 120);

        stats.remove_skipped(60, 2);
        assert_eq!(stats.snapshot().total_size, 0);
        assert_eq!(stats.work_bytes(), 1);
    }

    #[test]
    fn test_total_percent_clamped() {
        let stats = JobStatistics::new();
        stats.reset(100, 1, 1);
        stats.add_processed(50);
        assert_eq!(stats.total_percent(), 50);
        stats.add_processed(500);
        assert_eq!(stats.total_percent(), 100);
    }

    #[test]
    fn test_rollback_saturates() {
        let stats = JobStatistics::new();
        stats.reset(100, 1, 1);
        stats.add_committed(30);
        stats.rollback_committed(50);
        assert_eq!(stats.snapshot().committed_bytes, 0);
    }

    #[test]
    fn test_file_counter() {
        let stats = JobStatistics::new();
        stats.reset(0, 2, 1);
        assert_eq!(stats.file_processed(), 1);
        assert_eq!(stats.file_processed(), 2);
    }
}
