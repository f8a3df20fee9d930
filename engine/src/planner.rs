//! Task planning.
//!
//! Expands the user's selection into an ordered list of `CopyTask`s and
//! totals the bytes to transfer. A directory is listed before its contents
//! so parents exist before children are written. Symbolic links are planned
//! as links and never descended into.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{DRY_RUN_FILE_NAME, DRY_RUN_SOURCE};
use crate::control::JobControl;
use crate::error::{ErrorKind, TransferError};
use crate::events::{EventSink, TransferEvent};
use crate::fs_type::FileSystemType;
use crate::model::{CopyTask, EntryKind};
use crate::sanitize::sanitize_relative_path;

/// Ordered work for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub tasks: Vec<CopyTask>,

    /// Sum of regular file sizes
    pub total_bytes: u64,

    /// Source directories that may be removed after a move
    pub source_dirs: Vec<PathBuf>,
}

impl Plan {
    /// Index of the last regular-file task.
    pub fn last_file_index(&self) -> Option<usize> {
        self.tasks.iter().rposition(CopyTask::is_file)
    }

    pub fn file_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_file()).count()
    }
}

/// The single synthetic task of a dry run.
pub fn dry_run_plan(destination: &Path, size: u64) -> Plan {
    Plan {
        tasks: vec![CopyTask {
            source: PathBuf::from(DRY_RUN_SOURCE),
            destination: destination.join(DRY_RUN_FILE_NAME),
            kind: EntryKind::File,
            size,
            top_level: true,
        }],
        total_bytes: size,
        source_dirs: Vec::new(),
    }
}

pub struct Planner<'a> {
    destination: &'a Path,
    fs_type: FileSystemType,
    sanitize: bool,
    control: &'a JobControl,
    sink: &'a dyn EventSink,
}

impl<'a> Planner<'a> {
    pub fn new(
        destination: &'a Path,
        fs_type: FileSystemType,
        sanitize: bool,
        control: &'a JobControl,
        sink: &'a dyn EventSink,
    ) -> Self {
        Planner {
            destination,
            fs_type,
            sanitize,
            control,
            sink,
        }
    }

    /// Plan all `sources`. Missing sources are reported and skipped.
    ///
    /// Returns `None` when the job was cancelled while scanning.
    pub fn plan(&self, sources: &[PathBuf]) -> Option<Plan> {
        let mut plan = Plan::default();

        for source in sources {
            if self.control.is_cancelled() {
                return None;
            }
            if !self.add_source(source, &mut plan) {
                return None;
            }
        }

        info!(
            tasks = plan.tasks.len(),
            files = plan.file_count(),
            total_bytes = plan.total_bytes,
            "planning finished"
        );
        Some(plan)
    }

    /// Returns false on cancellation.
    fn add_source(&self, source: &Path, plan: &mut Plan) -> bool {
        // "." and ".." have no file name to carry over
        let source = if source.file_name().is_none() {
            fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf())
        } else {
            source.to_path_buf()
        };

        let metadata = match fs::symlink_metadata(&source) {
            Ok(m) => m,
            Err(e) => {
                self.report(TransferError::at(ErrorKind::SourceOpenFailed, &source).with_context(e.to_string()));
                return true;
            }
        };

        let base = source.parent().unwrap_or(Path::new("")).to_path_buf();
        let destination = self.destination_for(&source, &base);
        let file_type = metadata.file_type();

        if file_type.is_symlink() {
            plan.tasks.push(self.task(source, destination, EntryKind::Symlink, 0, true));
        } else if file_type.is_dir() {
            plan.tasks.push(self.task(source.clone(), destination, EntryKind::Directory, 0, true));
            plan.source_dirs.push(source.clone());
            return self.walk(&source, &base, plan);
        } else if file_type.is_file() {
            let size = metadata.len();
            plan.total_bytes += size;
            plan.tasks.push(self.task(source, destination, EntryKind::File, size, true));
        } else {
            self.report(
                TransferError::at(ErrorKind::SourceOpenFailed, &source)
                    .with_context("not a regular file, directory or symlink"),
            );
        }
        true
    }

    /// Returns false on cancellation.
    fn walk(&self, dir: &Path, base: &Path, plan: &mut Plan) -> bool {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                self.report(TransferError::at(ErrorKind::SourceOpenFailed, dir).with_context(e.to_string()));
                return true;
            }
        };

        let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        paths.sort();

        for path in paths {
            if self.control.is_cancelled() {
                return false;
            }

            let metadata = match fs::symlink_metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    self.report(TransferError::at(ErrorKind::SourceOpenFailed, &path).with_context(e.to_string()));
                    continue;
                }
            };
            let destination = self.destination_for(&path, base);
            let file_type = metadata.file_type();

            if file_type.is_symlink() {
                plan.tasks.push(self.task(path, destination, EntryKind::Symlink, 0, false));
            } else if file_type.is_dir() {
                plan.tasks.push(self.task(path.clone(), destination, EntryKind::Directory, 0, false));
                plan.source_dirs.push(path.clone());
                if !self.walk(&path, base, plan) {
                    return false;
                }
            } else if file_type.is_file() {
                let size = metadata.len();
                plan.total_bytes += size;
                plan.tasks.push(self.task(path, destination, EntryKind::File, size, false));
            } else {
                debug!(path = %path.display(), "skipping special file");
            }
        }
        true
    }

    fn destination_for(&self, entry: &Path, base: &Path) -> PathBuf {
        let relative = match entry.strip_prefix(base) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => entry.file_name().map(PathBuf::from).unwrap_or_default(),
        };
        if self.sanitize {
            self.destination.join(sanitize_relative_path(&relative, self.fs_type))
        } else {
            self.destination.join(relative)
        }
    }

    fn task(&self, source: PathBuf, destination: PathBuf, kind: EntryKind, size: u64, top_level: bool) -> CopyTask {
        CopyTask {
            source,
            destination,
            kind,
            size,
            top_level,
        }
    }

    fn report(&self, error: TransferError) {
        self.sink.emit(TransferEvent::Error(error));
    }
}
