//! Progress sampling.
//!
//! `ProgressReporter` turns the raw job counters into rate-limited
//! `ProgressSnapshot`s: percentages, instantaneous and average throughput,
//! and an ETA. Time spent paused is excluded from the average. Smoothing
//! for display is left to the presentation layer.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::config::MIB;
use crate::events::ProgressSnapshot;
use crate::stats::JobStatistics;

/// Below this average throughput (bytes/s) the ETA is reported as unknown.
pub const MIN_ETA_THROUGHPUT: f64 = 0.01 * MIB as f64;

/// Position within the file currently being transferred.
#[derive(Debug, Clone, Copy)]
pub struct FileProgress<'a> {
    pub source: &'a Path,
    pub destination: &'a Path,
    /// Bytes done in the current pass (copy or verify)
    pub done: u64,
    pub size: u64,
}

impl FileProgress<'_> {
    fn percent(&self) -> u32 {
        if self.size == 0 {
            return 100;
        }
        (self.done.saturating_mul(100) / self.size).min(100) as u32
    }
}

#[derive(Debug)]
pub struct ProgressReporter {
    interval: Duration,
    started: Instant,
    paused: Duration,
    last_sample: Instant,
    last_processed: u64,
}

impl ProgressReporter {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    fn starting_at(interval: Duration, now: Instant) -> Self {
        ProgressReporter {
            interval,
            started: now,
            paused: Duration::ZERO,
            last_sample: now,
            last_processed: 0,
        }
    }

    /// Account for a pause that just ended. The next instantaneous sample
    /// starts from the resume point.
    pub fn record_pause(&mut self, paused_for: Duration, processed: u64) {
        self.record_pause_at(paused_for, processed, Instant::now());
    }

    fn record_pause_at(&mut self, paused_for: Duration, processed: u64, now: Instant) {
        self.paused += paused_for;
        self.last_sample = now;
        self.last_processed = processed;
    }

    /// Total time spent paused so far.
    pub fn paused(&self) -> Duration {
        self.paused
    }

    /// Produce a snapshot if the sampling interval has passed, or always
    /// when `force` is set.
    pub fn sample(
        &mut self,
        stats: &JobStatistics,
        file: FileProgress<'_>,
        force: bool,
    ) -> Option<ProgressSnapshot> {
        self.sample_at(stats, file, force, Instant::now())
    }

    fn sample_at(
        &mut self,
        stats: &JobStatistics,
        file: FileProgress<'_>,
        force: bool,
        now: Instant,
    ) -> Option<ProgressSnapshot> {
        let since_last = now.saturating_duration_since(self.last_sample);
        if !force && since_last < self.interval {
            return None;
        }

        let processed = stats.processed_bytes();
        let work = stats.work_bytes();

        let active = now
            .saturating_duration_since(self.started)
            .saturating_sub(self.paused)
            .as_secs_f64();
        let average_speed = if active > 0.0 {
            processed as f64 / active
        } else {
            0.0
        };

        let eta_seconds = if average_speed > MIN_ETA_THROUGHPUT {
            let left = work.saturating_sub(processed) as f64;
            Some((left / average_speed) as u64)
        } else {
            None
        };

        let since_last_secs = since_last.as_secs_f64();
        let current_speed = if since_last_secs > 0.0 {
            processed.saturating_sub(self.last_processed) as f64 / since_last_secs
        } else {
            0.0
        };

        self.last_sample = now;
        self.last_processed = processed;

        Some(ProgressSnapshot {
            source: file.source.to_path_buf(),
            destination: file.destination.to_path_buf(),
            file_percent: file.percent(),
            total_percent: stats.total_percent(),
            current_speed,
            average_speed,
            eta_seconds,
        })
    }
}
