//! Job orchestration module.
//!
//! This module provides the job lifecycle:
//! - Creating a job from source paths and a destination
//! - Running it on the calling thread (`run_job`) or on a dedicated worker
//!   thread (`spawn_job`), controlled through a `JobHandle`
//!
//! A run plans the work, checks free space, then executes the tasks in
//! order. Per-file failures are reported as events and never stop the job;
//! running out of space, cancellation and a "cancel" conflict answer do.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::conflict::{ConflictResolver, Resolution};
use crate::control::JobControl;
use crate::error::{EngineError, ErrorKind, TransferError};
use crate::events::{EventSink, TransferEvent};
use crate::fs_ops;
use crate::fs_type::FileSystemType;
use crate::model::{ConflictDecision, CopyTask, EntryKind, JobOutcome, Mode, Status};
use crate::pipeline::{FileOutcome, Pipeline};
use crate::planner::{dry_run_plan, Plan, Planner};
use crate::source::{ChunkSource, FileSource, SyntheticSource};
use crate::space::SpaceGuard;
use crate::stats::{JobStatistics, StatsSnapshot};
use crate::volume::{SystemVolumes, VolumeProbe};

/// A copy or move of one or more sources into a destination directory.
pub struct TransferJob {
    /// Unique identifier for this job
    pub id: Uuid,

    /// Files and directories selected by the user
    pub sources: Vec<PathBuf>,

    /// Directory the sources are placed into
    pub destination: PathBuf,

    pub mode: Mode,

    pub config: EngineConfig,

    volumes: Arc<dyn VolumeProbe>,
}

impl fmt::Debug for TransferJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferJob")
            .field("id", &self.id)
            .field("sources", &self.sources)
            .field("destination", &self.destination)
            .field("mode", &self.mode)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TransferJob {
    /// Create a new job.
    ///
    /// # Errors
    /// `NoSources` when `sources` is empty (allowed for dry runs, which
    /// ignore the sources), `EmptyDestination` when the destination is empty.
    pub fn new(
        sources: Vec<PathBuf>,
        destination: impl Into<PathBuf>,
        mode: Mode,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let destination = destination.into();
        if sources.is_empty() && !config.dry_run {
            return Err(EngineError::NoSources);
        }
        if destination.as_os_str().is_empty() {
            return Err(EngineError::EmptyDestination);
        }

        Ok(TransferJob {
            id: Uuid::new_v4(),
            sources,
            destination,
            mode,
            config,
            volumes: Arc::new(SystemVolumes),
        })
    }

    /// Use `probe` to query the destination volume.
    pub fn with_volume_probe(mut self, probe: Arc<dyn VolumeProbe>) -> Self {
        self.volumes = probe;
        self
    }
}

/// Control surface of a job running on its worker thread.
///
/// Dropping the handle of a running job cancels it and waits for the
/// worker to wind down.
pub struct JobHandle {
    id: Uuid,
    control: Arc<JobControl>,
    stats: Arc<JobStatistics>,
    worker: Option<JoinHandle<JobOutcome>>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    /// Answer the pending conflict. Returns false if none is pending.
    pub fn resolve_conflict(&self, decision: ConflictDecision) -> bool {
        self.control.resolve_conflict(decision)
    }

    /// Shared control, for answering from another thread.
    pub fn control(&self) -> Arc<JobControl> {
        Arc::clone(&self.control)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |w| w.is_finished())
    }

    /// Wait for the worker to end.
    ///
    /// # Errors
    /// `WorkerPanicked` if the worker thread panicked.
    pub fn join(mut self) -> Result<JobOutcome, EngineError> {
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| EngineError::WorkerPanicked),
            None => Err(EngineError::WorkerPanicked),
        }
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            if !worker.is_finished() {
                self.control.cancel();
            }
            let _ = worker.join();
        }
    }
}

/// Run `job` on a new worker thread, reporting to `sink`.
///
/// # Errors
/// `WorkerSpawn` if the thread cannot be created.
pub fn spawn_job<S>(job: TransferJob, sink: S) -> Result<JobHandle, EngineError>
where
    S: EventSink + 'static,
{
    let control = Arc::new(JobControl::new());
    let stats = Arc::new(JobStatistics::new());
    let id = job.id;

    let worker = {
        let control = Arc::clone(&control);
        let stats = Arc::clone(&stats);
        thread::Builder::new()
            .name("transfer-worker".to_string())
            .spawn(move || run_job(&job, &control, &stats, &sink))
            .map_err(EngineError::WorkerSpawn)?
    };

    Ok(JobHandle {
        id,
        control,
        stats,
        worker: Some(worker),
    })
}

/// Run a job on the calling thread. Always ends with a `Finished` event.
pub fn run_job(
    job: &TransferJob,
    control: &JobControl,
    stats: &JobStatistics,
    sink: &dyn EventSink,
) -> JobOutcome {
    let started = Instant::now();
    info!(
        job_id = %job.id,
        mode = %job.mode,
        sources = job.sources.len(),
        destination = %job.destination.display(),
        dry_run = job.config.dry_run,
        "transfer started"
    );

    let outcome = execute(job, control, stats, sink);

    let snapshot = stats.snapshot();
    info!(
        job_id = %job.id,
        ?outcome,
        files = snapshot.files_processed,
        bytes = snapshot.committed_bytes,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "transfer finished"
    );
    sink.emit(TransferEvent::Finished(outcome));
    outcome
}

fn execute(job: &TransferJob, control: &JobControl, stats: &JobStatistics, sink: &dyn EventSink) -> JobOutcome {
    let config = &job.config;
    let fs_type = FileSystemType::detect(job.volumes.as_ref(), &job.destination);
    debug!(%fs_type, "destination filesystem");

    // Plan
    let plan = if config.dry_run {
        sink.emit(TransferEvent::Status(Status::DryRunGenerating));
        dry_run_plan(&job.destination, config.dry_run_size)
    } else {
        sink.emit(TransferEvent::Status(Status::Scanning));
        let planner = Planner::new(&job.destination, fs_type, config.sanitize_filenames, control, sink);
        match planner.plan(&job.sources) {
            Some(plan) => plan,
            None => return JobOutcome::Cancelled,
        }
    };
    stats.reset(plan.total_bytes, plan.tasks.len(), config.work_factor());

    // Check space
    let guard = SpaceGuard::new(job.volumes.as_ref(), &job.destination, config.disk_space_safety_margin);
    if let Err(e) = guard.preflight(plan.total_bytes) {
        let kind = e.kind;
        sink.emit(TransferEvent::Error(e));
        return JobOutcome::Aborted(kind);
    }

    let pipeline = match Pipeline::new(config, job.mode, fs_type, control, stats, sink) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "transfer buffer unavailable");
            sink.emit(TransferEvent::Error(
                TransferError::new(ErrorKind::SourceOpenFailed).with_context(e.to_string()),
            ));
            return JobOutcome::Aborted(ErrorKind::SourceOpenFailed);
        }
    };

    let mut worker = Worker {
        job,
        control,
        stats,
        sink,
        guard,
        pipeline,
        conflicts: ConflictResolver::new(),
        last_total_progress: Instant::now(),
        directory_times: Vec::new(),
    };
    let mut outcome = worker.run_tasks(&plan);
    if control.is_cancelled() {
        outcome = JobOutcome::Cancelled;
    }

    if config.preserve_times {
        fs_ops::restore_directory_times(&worker.directory_times);
    }

    if job.mode == Mode::Move && !config.dry_run {
        sink.emit(TransferEvent::Status(Status::RemovingEmptyFolders));
        let removed = fs_ops::remove_empty_dirs(&plan.source_dirs, control);
        debug!(removed, "empty source directories removed");
    }

    outcome
}

enum Flow {
    Next,
    Stop(JobOutcome),
}

/// Executes the tasks of one job.
struct Worker<'a> {
    job: &'a TransferJob,
    control: &'a JobControl,
    stats: &'a JobStatistics,
    sink: &'a dyn EventSink,
    guard: SpaceGuard<'a>,
    pipeline: Pipeline<'a>,
    conflicts: ConflictResolver,
    last_total_progress: Instant,
    /// (source, destination) of created directories
    directory_times: Vec<(PathBuf, PathBuf)>,
}

impl Worker<'_> {
    fn run_tasks(&mut self, plan: &Plan) -> JobOutcome {
        let last_file = plan.last_file_index();

        for (index, task) in plan.tasks.iter().enumerate() {
            if self.control.is_cancelled() {
                return JobOutcome::Cancelled;
            }
            if let Flow::Stop(outcome) = self.run_task(task, Some(index) == last_file) {
                return outcome;
            }
        }
        JobOutcome::Completed
    }

    fn run_task(&mut self, task: &CopyTask, last_file: bool) -> Flow {
        if let Err(e) = fs_ops::ensure_parent_dir_exists(&task.destination) {
            self.report(TransferError::at(ErrorKind::FileOpenFailed, &task.destination).with_context(e.to_string()));
            self.task_done();
            return Flow::Next;
        }

        if task.kind == EntryKind::Directory {
            self.make_directory(task);
            self.task_done();
            return Flow::Next;
        }

        if task.is_file() {
            if let Err(e) = self.guard.check_file(&task.source, task.size) {
                let kind = e.kind;
                self.report(e);
                return Flow::Stop(JobOutcome::Aborted(kind));
            }
        }

        let mut destination = task.destination.clone();
        if fs_ops::exists_no_follow(&destination) {
            match self.conflicts.resolve(task, self.control, self.sink) {
                Resolution::Proceed(path) => destination = path,
                Resolution::Skip => {
                    debug!(file = %task.source.display(), "skipped on conflict");
                    self.stats.remove_skipped(task.size, self.job.config.work_factor());
                    self.task_done();
                    return Flow::Next;
                }
                Resolution::Cancel => return Flow::Stop(JobOutcome::Cancelled),
            }
        }

        let flow = match task.kind {
            EntryKind::Symlink => {
                self.relink(task, &destination);
                Flow::Next
            }
            _ => self.copy(task, &destination, last_file),
        };
        if let Flow::Next = flow {
            self.task_done();
        }
        flow
    }

    fn make_directory(&mut self, task: &CopyTask) {
        let dest = &task.destination;
        if !fs_ops::is_real_directory(dest) {
            if let Err(e) = fs::create_dir_all(dest) {
                self.report(TransferError::at(ErrorKind::FileOpenFailed, dest).with_context(e.to_string()));
                return;
            }
        }

        if task.top_level {
            self.completed(dest, true);
        }
        if self.job.config.preserve_times {
            self.directory_times.push((task.source.clone(), dest.clone()));
        }
    }

    fn relink(&mut self, task: &CopyTask, dest: &Path) {
        if fs_ops::is_real_directory(dest) {
            self.report(TransferError::at(ErrorKind::DestinationIsDirectory, dest));
            return;
        }

        if let Err(e) = fs_ops::copy_symlink(&task.source, dest) {
            self.report(TransferError::at(ErrorKind::WriteError, dest).with_context(e.to_string()));
            return;
        }
        if self.job.config.preserve_times {
            if let Err(e) = fs_ops::copy_link_times(&task.source, dest) {
                debug!(link = %dest.display(), error = %e, "link times not copied");
            }
        }
        if self.job.mode == Mode::Move {
            if let Err(e) = fs::remove_file(&task.source) {
                self.report(TransferError::at(ErrorKind::WriteError, &task.source).with_context(e.to_string()));
                return;
            }
        }

        if task.top_level {
            self.completed(dest, true);
        }
        self.pipeline.report_progress(&task.source, dest, 1, 1, true);
    }

    fn copy(&mut self, task: &CopyTask, dest: &Path, last_file: bool) -> Flow {
        let config = &self.job.config;
        let mut source: Box<dyn ChunkSource> = if config.dry_run {
            Box::new(SyntheticSource::new(task.size, config.dry_run_chunk_delay()))
        } else {
            match FileSource::open(&task.source) {
                Ok(source) => Box::new(source),
                Err(e) => {
                    self.report(TransferError::at(ErrorKind::SourceOpenFailed, &task.source).with_context(e.to_string()));
                    return Flow::Next;
                }
            }
        };
        let size = source.len();

        match self
            .pipeline
            .copy_file(source.as_mut(), &task.source, dest, task.top_level, last_file)
        {
            FileOutcome::Completed => {
                if self.job.mode == Mode::Move && !config.dry_run {
                    drop(source);
                    match fs::remove_file(&task.source) {
                        Ok(()) => self.stats.add_completed_size(size),
                        Err(e) => {
                            warn!(file = %task.source.display(), error = %e, "moved file's source not removed");
                            self.report(
                                TransferError::at(ErrorKind::WriteError, &task.source).with_context(e.to_string()),
                            );
                        }
                    }
                }
                Flow::Next
            }
            FileOutcome::Failed => Flow::Next,
            FileOutcome::Cancelled => Flow::Stop(JobOutcome::Cancelled),
        }
    }

    fn completed(&self, dest: &Path, top_level: bool) {
        self.sink.emit(TransferEvent::FileCompleted {
            destination: dest.to_path_buf(),
            source_hash: String::new(),
            destination_hash: String::new(),
            top_level,
        });
    }

    fn report(&self, error: TransferError) {
        warn!(error = %error, "transfer error");
        self.sink.emit(TransferEvent::Error(error));
    }

    /// Count a handled task and emit the task counter when due.
    fn task_done(&mut self) {
        let processed = self.stats.file_processed();
        let total = self.stats.files_total();
        if processed == total || self.last_total_progress.elapsed() >= self.job.config.progress_interval() {
            self.sink.emit(TransferEvent::TotalProgress { processed, total });
            self.last_total_progress = Instant::now();
        }
    }
}
