//! Error types for the transfer engine.
//!
//! Two layers of errors exist:
//! - `TransferError` is what the worker reports through the event stream.
//!   Per-file failures never stop the job; a few kinds (`DiskFull`,
//!   `DriveCheckFailed`) are job-fatal.
//! - `EngineError` covers failures of the engine API itself (bad job input,
//!   worker thread problems) and is returned as a normal `Result`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Category of a failure reported by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Not enough free space on the destination volume
    DiskFull,
    /// Free space on the destination could not be queried
    DriveCheckFailed,
    /// Source missing or could not be opened
    SourceOpenFailed,
    /// Destination could not be created or opened
    FileOpenFailed,
    ReadError,
    /// Source ended before its recorded size was read
    UnexpectedEof,
    WriteError,
    /// Re-read destination does not match what was written
    ChecksumMismatch,
    /// A symlink would replace a real directory
    DestinationIsDirectory,
}

impl ErrorKind {
    /// Whether this error stops the whole job.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::DiskFull | ErrorKind::DriveCheckFailed)
    }
}

/// A failure reported by the worker through `TransferEvent::Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferError {
    pub kind: ErrorKind,

    /// Offending path, when the failure is tied to one
    pub path: Option<PathBuf>,

    /// Extra detail. For the pre-flight `DiskFull` this is
    /// `"<required GiB>|<available GiB>"`.
    pub context: Option<String>,
}

impl TransferError {
    pub fn new(kind: ErrorKind) -> Self {
        TransferError {
            kind,
            path: None,
            context: None,
        }
    }

    pub fn at(kind: ErrorKind, path: impl AsRef<Path>) -> Self {
        TransferError {
            kind,
            path: Some(path.as_ref().to_path_buf()),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Pre-flight space failure, sizes in bytes.
    pub fn insufficient_space(required: u64, available: u64) -> Self {
        TransferError::new(ErrorKind::DiskFull).with_context(format!(
            "{}|{}",
            format_gib(required),
            format_gib(available)
        ))
    }

    /// User-facing message, without the path.
    pub fn message(&self) -> String {
        match self.kind {
            ErrorKind::DiskFull => match (&self.path, self.context.as_deref()) {
                (None, Some(context)) => match context.split_once('|') {
                    Some((required, available)) => format!(
                        "Not enough space. Required: {} GiB, Available: {} GiB",
                        required, available
                    ),
                    None => "Not enough disk space".to_string(),
                },
                _ => "Not enough disk space".to_string(),
            },
            ErrorKind::DriveCheckFailed => {
                "Could not determine available space on destination".to_string()
            }
            ErrorKind::SourceOpenFailed => "Failed to open source".to_string(),
            ErrorKind::FileOpenFailed => "Failed to open file".to_string(),
            ErrorKind::ReadError => "Read error".to_string(),
            ErrorKind::UnexpectedEof => "Unexpected end of file".to_string(),
            ErrorKind::WriteError => "Write error".to_string(),
            ErrorKind::ChecksumMismatch => "Checksum mismatch".to_string(),
            ErrorKind::DestinationIsDirectory => {
                "Collision: destination is a directory, not a link".to_string()
            }
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}", self.message(), path.display())?,
            None => write!(f, "{}", self.message())?,
        }
        // The pre-flight context is already part of the message.
        match (&self.context, self.kind) {
            (Some(_), ErrorKind::DiskFull) if self.path.is_none() => Ok(()),
            (Some(context), _) => write!(f, " ({})", context),
            (None, _) => Ok(()),
        }
    }
}

impl std::error::Error for TransferError {}

/// Bytes as GiB with two decimals.
pub fn format_gib(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
}

/// Errors returned by the engine API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A job needs at least one source
    #[error("No source paths given")]
    NoSources,

    /// Destination path is empty
    #[error("Destination path is empty")]
    EmptyDestination,

    /// The aligned transfer buffer could not be allocated
    #[error("Failed to allocate a {size} byte transfer buffer")]
    BufferAllocation { size: usize },

    /// Failed to create a directory
    #[error("Failed to create directory: {}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The worker thread could not be started
    #[error("Failed to start worker thread")]
    WorkerSpawn(#[source] io::Error),

    /// The worker thread panicked
    #[error("Worker thread panicked")]
    WorkerPanicked,
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::DirectoryCreationFailed { source, .. } | Self::WorkerSpawn(source) => {
                source.raw_os_error()
            }
            _ => None,
        }
    }
}
