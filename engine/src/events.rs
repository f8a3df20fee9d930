//! Events emitted by the worker.
//!
//! The worker never touches presentation state. Everything it has to say
//! goes through an `EventSink`; the usual sink is the sending half of a
//! crossbeam channel whose receiver lives on the presentation thread.

use chrono::Utc;
use crossbeam_channel::Sender;
use serde::Serialize;
use std::path::PathBuf;

use crate::error::TransferError;
use crate::model::{HistoryEntry, JobOutcome, Status};

/// Periodic progress sample for the file being transferred.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub source: PathBuf,
    pub destination: PathBuf,

    /// 0..=100 for the current pass over the current file
    pub file_percent: u32,

    /// 0..=100 for the whole job
    pub total_percent: u32,

    /// Bytes per second since the previous sample
    pub current_speed: f64,

    /// Bytes per second over the active (non-paused) time of the job
    pub average_speed: f64,

    /// Seconds left, `None` while the average is too low to extrapolate
    pub eta_seconds: Option<u64>,
}

/// Posted when the destination of a task already exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictRequest {
    pub source: PathBuf,
    pub destination: PathBuf,

    /// Non-colliding file name offered as the default for a rename
    pub suggested_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TransferEvent {
    Status(Status),
    Progress(ProgressSnapshot),
    /// Task counter, emitted at most once per progress interval and always
    /// for the last task
    TotalProgress {
        processed: usize,
        total: usize,
    },
    /// A copy phase completed. Hashes are empty for directories, symlinks
    /// and when checksumming is off.
    FileCompleted {
        destination: PathBuf,
        source_hash: String,
        destination_hash: String,
        top_level: bool,
    },
    Error(TransferError),
    /// The worker is blocked until the conflict is resolved or the job is
    /// cancelled
    ConflictNeeded(ConflictRequest),
    /// Emitted exactly once, last
    Finished(JobOutcome),
}

impl TransferEvent {
    /// History record for completions and path-bound errors.
    pub fn history_entry(&self) -> Option<HistoryEntry> {
        match self {
            TransferEvent::FileCompleted {
                destination,
                source_hash,
                destination_hash,
                ..
            } => Some(HistoryEntry {
                timestamp: Utc::now(),
                path: destination.clone(),
                error: String::new(),
                source_hash: source_hash.clone(),
                destination_hash: destination_hash.clone(),
            }),
            TransferEvent::Error(err) => err.path.as_ref().map(|path| HistoryEntry {
                timestamp: Utc::now(),
                path: path.clone(),
                error: err.message(),
                source_hash: String::new(),
                destination_hash: String::new(),
            }),
            _ => None,
        }
    }
}

/// Receiver of worker events.
///
/// Implementations must not block for long: the worker calls `emit` inline.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TransferEvent);
}

impl EventSink for Sender<TransferEvent> {
    fn emit(&self, event: TransferEvent) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.send(event);
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: TransferEvent) {}
}
