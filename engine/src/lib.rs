//! # VCopy Engine - Background File Transfer Library
//!
//! A headless copy/move engine with end-to-end verification.
//! Designed as the foundation for multiple front ends (CLI, GUI, automation).
//!
//! ## Overview
//!
//! A job runs on its own worker thread and talks to the front end only
//! through events and a small control surface. It features:
//! - Recursive planning with filename sanitization for the destination filesystem
//! - Free-space checks before and during the transfer
//! - Streaming hashes, forced flushes and cache-bypassing re-reads for verification
//! - Blocking conflict prompts with "apply to all"
//! - Pause, resume and cancellation at chunk granularity
//! - Throttled progress with speeds and ETA
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{spawn_job, ConflictAction, ConflictDecision, EngineConfig, Mode, TransferEvent, TransferJob};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let job = TransferJob::new(
//!     vec!["/home/me/photos".into()],
//!     "/mnt/backup",
//!     Mode::Copy,
//!     EngineConfig::default(),
//! )?;
//!
//! let (tx, rx) = crossbeam_channel::unbounded();
//! let handle = spawn_job(job, tx)?;
//!
//! for event in rx {
//!     match event {
//!         TransferEvent::Progress(p) => println!("{}%", p.total_percent),
//!         TransferEvent::ConflictNeeded(_) => {
//!             handle.resolve_conflict(ConflictDecision::for_all(ConflictAction::Skip));
//!         }
//!         TransferEvent::Error(e) => eprintln!("{}", e),
//!         TransferEvent::Finished(outcome) => {
//!             println!("{:?}", outcome);
//!             break;
//!         }
//!         _ => {}
//!     }
//! }
//! handle.join()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **job**: Job orchestration (create, run, spawn, control)
//! - **planner**: Source enumeration into copy tasks
//! - **pipeline**: Per-file copy, flush and verification
//! - **conflict** / **control**: Conflict prompts, pause and cancellation
//! - **progress** / **stats**: Progress sampling and job counters
//! - **space** / **volume** / **fs_type** / **sanitize**: Destination volume handling
//! - **checksums**: Streaming hash algorithms
//! - **events**: Everything a job reports to its front end

pub mod buffer;
pub mod checksums;
pub mod config;
pub mod conflict;
pub mod control;
pub mod error;
pub mod events;
pub mod fs_ops;
pub mod fs_type;
pub mod job;
pub mod model;
mod pipeline;
pub mod planner;
pub mod progress;
pub mod sanitize;
pub mod source;
pub mod space;
pub mod stats;
mod sys;
pub mod volume;

// Re-export main types and functions
pub use checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
pub use config::EngineConfig;
pub use control::JobControl;
pub use error::{EngineError, ErrorKind, TransferError};
pub use events::{ConflictRequest, EventSink, NullSink, ProgressSnapshot, TransferEvent};
pub use fs_type::FileSystemType;
pub use job::{run_job, spawn_job, JobHandle, TransferJob};
pub use model::{ConflictAction, ConflictDecision, HistoryEntry, JobOutcome, Mode, Status};
pub use stats::{JobStatistics, StatsSnapshot};
pub use volume::{SystemVolumes, VolumeProbe};
