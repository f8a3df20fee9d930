//! Core data model for transfer jobs.
//!
//! This module defines the data structures shared by the planner, the
//! execution loop and the presentation layer:
//! - CopyTask: one unit of work (file, directory or symlink)
//! - Mode, EntryKind, Status, JobOutcome: enums describing the job
//! - ConflictAction, ConflictDecision: the answer to a destination collision
//! - HistoryEntry: one record for the external history log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::ErrorKind;

/// Operation mode for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Copy files (leave source intact)
    Copy,

    /// Move files (delete source after a successful transfer)
    Move,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Copy => write!(f, "Copy"),
            Mode::Move => write!(f, "Move"),
        }
    }
}

/// What kind of filesystem entry a task transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Regular file, copied byte for byte
    File,

    /// Directory, recreated at the destination
    Directory,

    /// Symbolic link, recreated as a link and never followed
    Symlink,
}

/// A single planned unit of work.
///
/// Tasks are produced by the planner in traversal order and consumed in that
/// order by the worker. `destination` is already sanitized for the target
/// filesystem; a conflict rename may replace it during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTask {
    /// Absolute or caller-relative source path
    pub source: PathBuf,

    /// Final destination path
    pub destination: PathBuf,

    /// File, directory or symlink
    pub kind: EntryKind,

    /// Size in bytes at planning time (0 for directories and symlinks)
    pub size: u64,

    /// True when the path was one of the user's selected items
    pub top_level: bool,
}

impl CopyTask {
    /// Whether this task copies file contents.
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// A user's answer to a destination collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictAction {
    /// Overwrite the existing destination
    Replace,

    /// Leave the destination alone and drop the task
    Skip,

    /// Write to a different, non-colliding name
    Rename,

    /// Stop the whole job
    Cancel,
}

impl fmt::Display for ConflictAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace => write!(f, "replace"),
            Self::Skip => write!(f, "skip"),
            Self::Rename => write!(f, "rename"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

/// The full response delivered to a waiting worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictDecision {
    /// What to do with the colliding task
    pub action: ConflictAction,

    /// Reuse `action` for every later conflict of this job without asking
    pub apply_to_all: bool,

    /// User-chosen file name for `Rename` (ignored when `apply_to_all` is set)
    pub new_name: Option<String>,
}

impl ConflictDecision {
    /// Decision for a single conflict.
    pub fn once(action: ConflictAction) -> Self {
        ConflictDecision {
            action,
            apply_to_all: false,
            new_name: None,
        }
    }

    /// Decision that is remembered for the rest of the job.
    pub fn for_all(action: ConflictAction) -> Self {
        ConflictDecision {
            action,
            apply_to_all: true,
            new_name: None,
        }
    }

    /// Rename to a specific file name.
    pub fn rename_to(name: impl Into<String>) -> Self {
        ConflictDecision {
            action: ConflictAction::Rename,
            apply_to_all: false,
            new_name: Some(name.into()),
        }
    }
}

/// Coarse phase of the worker, shown next to the progress bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Scanning,
    DryRunGenerating,
    Copying,
    GeneratingHash,
    Verifying,
    RemovingEmptyFolders,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Scanning => "Scanning",
            Status::DryRunGenerating => "Generating dry-run data",
            Status::Copying => "Copying",
            Status::GeneratingHash => "Generating hash",
            Status::Verifying => "Verifying",
            Status::RemovingEmptyFolders => "Removing empty folders",
        };
        f.write_str(label)
    }
}

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    /// Every task was attempted (individual tasks may still have failed)
    Completed,

    /// The user cancelled, directly or through a conflict answer
    Cancelled,

    /// A job-fatal condition stopped the run
    Aborted(ErrorKind),
}

/// One line of the transfer history, fed to the external history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the event was observed
    pub timestamp: DateTime<Utc>,

    /// Destination path for completions, offending path for errors
    pub path: PathBuf,

    /// Empty for successful completions
    pub error: String,

    pub source_hash: String,
    pub destination_hash: String,
}
