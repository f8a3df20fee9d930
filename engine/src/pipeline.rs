//! Copy-and-verify pipeline.
//!
//! Transfers one regular file through the job's aligned buffer:
//! 1. stream chunks from the source into the destination, hashing as it goes
//! 2. flush the destination when enough unflushed data accumulated (or it is
//!    the last file), so verification and moves see durable data
//! 3. re-read the destination, bypassing the page cache where possible, and
//!    compare digests
//!
//! Incomplete or unverifiable destinations are deleted; a failed file never
//! leaves a partial copy behind.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::buffer::AlignedBuffer;
use crate::checksums::{create_hasher, ChecksumHasher};
use crate::config::{EngineConfig, DIRECT_IO_ALIGNMENT};
use crate::control::JobControl;
use crate::error::{EngineError, ErrorKind, TransferError};
use crate::events::{EventSink, TransferEvent};
use crate::fs_ops;
use crate::fs_type::FileSystemType;
use crate::model::{Mode, Status};
use crate::progress::{FileProgress, ProgressReporter};
use crate::source::ChunkSource;
use crate::stats::JobStatistics;
use crate::sys;

/// Result of transferring one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileOutcome {
    /// Written (and verified when enabled); safe to delete the source
    Completed,
    /// Failed and cleaned up; an error event was emitted
    Failed,
    /// Stopped by cancellation and cleaned up
    Cancelled,
}

enum Verification {
    Finished { hex: String, complete: bool },
    Cancelled,
}

/// Per-job transfer state, reused for every file of the job.
pub(crate) struct Pipeline<'a> {
    config: &'a EngineConfig,
    mode: Mode,
    fs_type: FileSystemType,
    control: &'a JobControl,
    stats: &'a JobStatistics,
    sink: &'a dyn EventSink,
    reporter: ProgressReporter,
    buffer: AlignedBuffer,
    /// Bytes written since the destination was last forced to disk
    unflushed: u64,
}

impl<'a> Pipeline<'a> {
    pub(crate) fn new(
        config: &'a EngineConfig,
        mode: Mode,
        fs_type: FileSystemType,
        control: &'a JobControl,
        stats: &'a JobStatistics,
        sink: &'a dyn EventSink,
    ) -> Result<Self, EngineError> {
        let buffer = AlignedBuffer::new(config.aligned_buffer_size(), DIRECT_IO_ALIGNMENT)?;
        Ok(Pipeline {
            config,
            mode,
            fs_type,
            control,
            stats,
            sink,
            reporter: ProgressReporter::new(config.progress_interval()),
            buffer,
            unflushed: 0,
        })
    }

    fn emit(&self, event: TransferEvent) {
        self.sink.emit(event);
    }

    fn fail(&self, error: TransferError) {
        warn!(error = %error, "transfer error");
        self.emit(TransferEvent::Error(error));
    }

    pub(crate) fn report_progress(&mut self, src: &Path, dest: &Path, done: u64, size: u64, force: bool) {
        let file = FileProgress {
            source: src,
            destination: dest,
            done,
            size,
        };
        if let Some(snapshot) = self.reporter.sample(self.stats, file, force) {
            self.sink.emit(TransferEvent::Progress(snapshot));
        }
    }

    fn hold_if_paused(&mut self) {
        if let Some(paused) = self.control.wait_if_paused() {
            self.reporter.record_pause(paused, self.stats.processed_bytes());
        }
    }

    /// Transfer `source` to `dest`.
    ///
    /// `src` is only used for events and timestamp copying; the data comes
    /// from `source`.
    pub(crate) fn copy_file(
        &mut self,
        source: &mut dyn ChunkSource,
        src: &Path,
        dest: &Path,
        top_level: bool,
        last_file: bool,
    ) -> FileOutcome {
        self.emit(TransferEvent::Status(Status::Copying));

        let mut dest_file = match open_destination(dest) {
            Ok(file) => file,
            Err(e) => {
                self.fail(TransferError::at(ErrorKind::FileOpenFailed, dest).with_context(e.to_string()));
                return FileOutcome::Failed;
            }
        };

        let file_size = source.len();
        let mut hasher: Option<Box<dyn ChecksumHasher>> =
            self.config.verify.then(|| create_hasher(self.config.checksum_algorithm));
        let mut total_read: u64 = 0;
        let mut failed = false;

        // Copy
        while total_read < file_size {
            self.hold_if_paused();
            if self.control.is_cancelled() {
                break;
            }

            let to_read = (file_size - total_read).min(self.buffer.len() as u64) as usize;
            let n = match source.read_chunk(&mut self.buffer[..to_read]) {
                Ok(0) => {
                    self.fail(TransferError::at(ErrorKind::UnexpectedEof, src));
                    failed = true;
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    self.fail(TransferError::at(ErrorKind::ReadError, src).with_context(e.to_string()));
                    failed = true;
                    break;
                }
            };

            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&self.buffer[..n]);
            }
            if let Err(e) = dest_file.write_all(&self.buffer[..n]) {
                self.fail(TransferError::at(ErrorKind::WriteError, dest).with_context(e.to_string()));
                failed = true;
                break;
            }

            total_read += n as u64;
            self.stats.add_processed(n as u64);
            self.stats.add_committed(n as u64);
            self.unflushed += n as u64;
            self.report_progress(src, dest, total_read, file_size, false);
        }

        if failed || total_read < file_size {
            drop(dest_file);
            self.discard(dest, total_read);
            return if failed {
                FileOutcome::Failed
            } else {
                FileOutcome::Cancelled
            };
        }

        self.report_progress(src, dest, file_size, file_size, true);

        // Writeback runs while the source digest is finalized
        let flushed = self.flush_due(last_file);
        if flushed {
            self.start_flush(&dest_file);
        }

        let source_hash = match hasher {
            Some(hasher) => {
                self.emit(TransferEvent::Status(Status::GeneratingHash));
                hasher.finalize().into_hex()
            }
            None => String::new(),
        };

        if flushed {
            if let Err(e) = self.finish_flush(&dest_file) {
                self.fail(TransferError::at(ErrorKind::WriteError, dest).with_context(e.to_string()));
                drop(dest_file);
                self.discard(dest, total_read);
                return FileOutcome::Failed;
            }
        }

        if self.config.preserve_times {
            if let Err(e) = fs_ops::copy_mtime(src, dest) {
                debug!(file = %dest.display(), error = %e, "modification time not copied");
            }
        }

        if !self.config.verify {
            self.emit(TransferEvent::FileCompleted {
                destination: dest.to_path_buf(),
                source_hash,
                destination_hash: String::new(),
                top_level,
            });
            return FileOutcome::Completed;
        }

        if flushed {
            sys::drop_cached_pages(&dest_file);
        }

        self.emit(TransferEvent::Status(Status::Verifying));
        let verification = self.verify_destination(&mut dest_file, src, dest, file_size);
        drop(dest_file);

        match verification {
            Verification::Cancelled => {
                self.discard(dest, total_read);
                FileOutcome::Cancelled
            }
            Verification::Finished { hex, complete } => {
                let hex = if complete { hex } else { String::new() };
                self.conclude(dest, source_hash, hex, total_read, top_level)
            }
        }
    }

    /// Report the verified file and clean up after a mismatch.
    fn conclude(
        &mut self,
        dest: &Path,
        source_hash: String,
        destination_hash: String,
        written: u64,
        top_level: bool,
    ) -> FileOutcome {
        let mismatch = source_hash != destination_hash;
        if mismatch {
            warn!(file = %dest.display(), %source_hash, %destination_hash, "verification failed");
            self.discard(dest, written);
        }

        self.emit(TransferEvent::FileCompleted {
            destination: dest.to_path_buf(),
            source_hash: source_hash.clone(),
            destination_hash: destination_hash.clone(),
            top_level,
        });

        if mismatch {
            self.fail(TransferError::at(ErrorKind::ChecksumMismatch, dest).with_context(format!(
                "source {}, destination {}",
                source_hash,
                if destination_hash.is_empty() { "unreadable" } else { destination_hash.as_str() }
            )));
            return FileOutcome::Failed;
        }
        FileOutcome::Completed
    }

    /// Remove a destination that must not survive and undo its bytes.
    fn discard(&self, dest: &Path, written: u64) {
        match fs::remove_file(dest) {
            Ok(()) => info!(file = %dest.display(), "removed incomplete destination"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = %dest.display(), error = %e, "failed to remove incomplete destination"),
        }
        self.stats.rollback_committed(written);
    }

    /// Whether the destination must be forced to disk before moving on.
    ///
    /// Only verification and moves need durable data; plain copies leave
    /// writeback to the kernel.
    fn flush_due(&self, last_file: bool) -> bool {
        let due = self.unflushed >= self.config.flush_threshold || last_file;
        due && (self.config.verify || self.mode == Mode::Move)
    }

    fn start_flush(&self, file: &File) {
        if !self.fs_type.supports_range_flush() {
            return;
        }
        if let Err(e) = sys::start_range_flush(file) {
            debug!(error = %e, "early writeback not started");
        }
    }

    fn finish_flush(&mut self, file: &File) -> io::Result<()> {
        let range_flush = self.fs_type.supports_range_flush();
        debug!(unflushed = self.unflushed, range_flush, "flushing destination");
        if range_flush {
            if let Err(e) = sys::wait_range_flush(file) {
                debug!(error = %e, "range flush failed, syncing data instead");
                file.sync_data()?;
            }
        } else {
            file.sync_data()?;
        }
        self.unflushed = 0;
        Ok(())
    }

    fn verify_destination(&mut self, file: &mut File, src: &Path, dest: &Path, file_size: u64) -> Verification {
        let mut hasher = create_hasher(self.config.checksum_algorithm);
        if let Err(e) = file.seek(SeekFrom::Start(0)) {
            warn!(file = %dest.display(), error = %e, "cannot rewind destination");
            return Verification::Finished {
                hex: String::new(),
                complete: false,
            };
        }

        let align = DIRECT_IO_ALIGNMENT as u64;
        let wants_direct = file_size >= self.config.direct_io_threshold && file_size >= align;
        let mut direct = wants_direct && sys::set_direct_io(file, true).is_ok();
        debug!(file = %dest.display(), direct, "verifying destination");

        let mut total: u64 = 0;
        let mut complete = true;
        while total < file_size {
            self.hold_if_paused();
            if self.control.is_cancelled() {
                if direct {
                    let _ = sys::set_direct_io(file, false);
                }
                return Verification::Cancelled;
            }

            let to_read = (file_size - total).min(self.buffer.len() as u64);
            // Unaligned tail or offset: finish with buffered reads
            if direct && (to_read % align != 0 || total % align != 0) {
                let _ = sys::set_direct_io(file, false);
                direct = false;
            }

            match file.read(&mut self.buffer[..to_read as usize]) {
                Ok(0) => {
                    complete = false;
                    break;
                }
                Ok(n) => {
                    hasher.update(&self.buffer[..n]);
                    total += n as u64;
                    self.stats.add_processed(n as u64);
                    self.report_progress(src, dest, total, file_size, false);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if direct => {
                    debug!(error = %e, "direct read refused, falling back to buffered reads");
                    let _ = sys::set_direct_io(file, false);
                    direct = false;
                }
                Err(e) => {
                    warn!(file = %dest.display(), error = %e, "verification read failed");
                    complete = false;
                    break;
                }
            }
        }

        if direct {
            let _ = sys::set_direct_io(file, false);
        }
        self.report_progress(src, dest, file_size, file_size, true);

        Verification::Finished {
            hex: hasher.finalize().into_hex(),
            complete,
        }
    }
}

fn open_destination(dest: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksums::{compute_file_checksum, ChecksumAlgorithm};
    use crate::source::{FileSource, SyntheticSource};
    use crossbeam_channel::Receiver;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_config() -> EngineConfig {
        EngineConfig {
            buffer_size: 8192,
            progress_interval_ms: 0,
            direct_io_threshold: 4096,
            flush_threshold: 1024 * 1024,
            ..EngineConfig::default()
        }
    }

    fn events(rx: &Receiver<TransferEvent>) -> Vec<TransferEvent> {
        rx.try_iter().collect()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    struct Fixture {
        _temp: tempfile::TempDir,
        src: PathBuf,
        dest: PathBuf,
    }

    fn fixture(data: &[u8]) -> Fixture {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp.path().join("source.bin");
        fs::write(&src, data).expect("Failed to write source");
        let dest = temp.path().join("dest.bin");
        Fixture { _temp: temp, src, dest }
    }

    /// Source that fails or stops in configurable ways.
    struct ScriptedSource {
        len: u64,
        good_chunks: usize,
        after: io::Result<usize>,
        on_first_chunk: Option<Arc<JobControl>>,
    }

    impl ChunkSource for ScriptedSource {
        fn len(&self) -> u64 {
            self.len
        }

        fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if let Some(control) = self.on_first_chunk.take() {
                control.cancel();
            }
            if self.good_chunks > 0 {
                self.good_chunks -= 1;
                buf.fill(1);
                return Ok(buf.len());
            }
            match &self.after {
                Ok(n) => Ok(*n),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    /// Flips the first destination byte once verification starts.
    struct CorruptOnVerify {
        dest: PathBuf,
        inner: crossbeam_channel::Sender<TransferEvent>,
    }

    impl EventSink for CorruptOnVerify {
        fn emit(&self, event: TransferEvent) {
            if event == TransferEvent::Status(Status::Verifying) {
                let mut file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&self.dest)
                    .expect("Failed to open dest");
                let mut byte = [0u8; 1];
                file.read_exact(&mut byte).expect("Failed to read dest");
                byte[0] ^= 0xFF;
                file.seek(SeekFrom::Start(0)).expect("Failed to rewind dest");
                file.write_all(&byte).expect("Failed to corrupt dest");
            }
            let _ = self.inner.send(event);
        }
    }

    #[test]
    fn test_copy_and_verify() {
        let data = pattern(20_000);
        let fx = fixture(&data);
        let config = test_config();
        let control = JobControl::new();
        let stats = JobStatistics::new();
        stats.reset(data.len() as u64, 1, config.work_factor());
        let (tx, rx) = crossbeam_channel::unbounded();

        let mut pipeline = Pipeline::new(&config, Mode::Copy, FileSystemType::Generic, &control, &stats, &tx)
            .expect("Failed to create pipeline");
        let mut source = FileSource::open(&fx.src).expect("Failed to open source");
        let outcome = pipeline.copy_file(&mut source, &fx.src, &fx.dest, true, true);

        assert_eq!(outcome, FileOutcome::Completed);
        assert_eq!(fs::read(&fx.dest).expect("Failed to read dest"), data);

        let snap = stats.snapshot();
        assert_eq!(snap.processed_bytes, 40_000, "written once and re-read once");
        assert_eq!(snap.committed_bytes, 20_000);

        let events = events(&rx);
        let statuses: Vec<Status> = events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::Status(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![Status::Copying, Status::GeneratingHash, Status::Verifying]);

        let expected_hash = compute_file_checksum(&fx.src, ChecksumAlgorithm::Xxh64)
            .expect("Failed to hash source")
            .into_hex();
        let completed = events
            .iter()
            .find_map(|e| match e {
                TransferEvent::FileCompleted {
                    source_hash,
                    destination_hash,
                    top_level,
                    ..
                } => Some((source_hash.clone(), destination_hash.clone(), *top_level)),
                _ => None,
            })
            .expect("Expected a completion event");
        assert_eq!(completed, (expected_hash.clone(), expected_hash, true));

        // Both passes end with a forced 100% sample
        let full = events
            .iter()
            .filter(|e| matches!(e, TransferEvent::Progress(p) if p.file_percent == 100))
            .count();
        assert!(full >= 2);
    }

    #[test]
    fn test_copy_without_verification() {
        let data = pattern(5000);
        let fx = fixture(&data);
        let config = EngineConfig {
            verify: false,
            ..test_config()
        };
        let control = JobControl::new();
        let stats = JobStatistics::new();
        stats.reset(data.len() as u64, 1, config.work_factor());
        let (tx, rx) = crossbeam_channel::unbounded();

        let mut pipeline = Pipeline::new(&config, Mode::Copy, FileSystemType::Generic, &control, &stats, &tx)
            .expect("Failed to create pipeline");
        let mut source = FileSource::open(&fx.src).expect("Failed to open source");
        assert_eq!(
            pipeline.copy_file(&mut source, &fx.src, &fx.dest, false, true),
            FileOutcome::Completed
        );

        let events = events(&rx);
        assert!(!events.contains(&TransferEvent::Status(Status::Verifying)));
        assert!(!events.contains(&TransferEvent::Status(Status::GeneratingHash)));
        assert!(events.iter().any(|e| matches!(
            e,
            TransferEvent::FileCompleted { source_hash, destination_hash, .. }
                if source_hash.is_empty() && destination_hash.is_empty()
        )));
        assert_eq!(stats.snapshot().processed_bytes, 5000);
    }

    #[test]
    fn test_direct_io_tail_boundaries() {
        let align = DIRECT_IO_ALIGNMENT;
        let sizes = [
            0,
            1,
            align - 1,
            align,
            align + 1,
            2 * align - 1,
            8192,
            8192 + 1,
            3 * 8192 - 1,
            3 * 8192 + align,
        ];

        for size in sizes {
            let data = pattern(size);
            let fx = fixture(&data);
            let config = test_config();
            let control = JobControl::new();
            let stats = JobStatistics::new();
            let (tx, rx) = crossbeam_channel::unbounded();

            let mut pipeline =
                Pipeline::new(&config, Mode::Copy, FileSystemType::PosixExtended, &control, &stats, &tx)
                    .expect("Failed to create pipeline");
            let mut source = FileSource::open(&fx.src).expect("Failed to open source");
            let outcome = pipeline.copy_file(&mut source, &fx.src, &fx.dest, false, true);

            assert_eq!(outcome, FileOutcome::Completed, "size {}", size);
            assert_eq!(fs::read(&fx.dest).expect("Failed to read dest"), data, "size {}", size);
            assert!(
                !events(&rx).iter().any(|e| matches!(e, TransferEvent::Error(_))),
                "unexpected error for size {}",
                size
            );
        }
    }

    #[test]
    fn test_mismatch_deletes_destination() {
        let fx = fixture(b"payload");
        fs::write(&fx.dest, b"payload").expect("Failed to write dest");
        let config = test_config();
        let control = JobControl::new();
        let stats = JobStatistics::new();
        stats.reset(7, 1, 2);
        stats.add_committed(7);
        let (tx, rx) = crossbeam_channel::unbounded();

        let mut pipeline = Pipeline::new(&config, Mode::Move, FileSystemType::Generic, &control, &stats, &tx)
            .expect("Failed to create pipeline");
        let outcome = pipeline.conclude(&fx.dest, "aaaa".to_string(), "bbbb".to_string(), 7, true);

        assert_eq!(outcome, FileOutcome::Failed);
        assert!(!fx.dest.exists(), "mismatched destination must be removed");
        assert_eq!(stats.snapshot().committed_bytes, 0);

        let events = events(&rx);
        assert!(matches!(events[0], TransferEvent::FileCompleted { .. }));
        match &events[1] {
            TransferEvent::Error(err) => {
                assert_eq!(err.kind, ErrorKind::ChecksumMismatch);
                assert_eq!(err.path.as_deref(), Some(fx.dest.as_path()));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_corrupted_destination_fails_verification() {
        // Below the direct I/O threshold so the re-read goes through the page cache
        let data = pattern(3000);
        let fx = fixture(&data);
        let config = test_config();
        let control = JobControl::new();
        let stats = JobStatistics::new();
        stats.reset(data.len() as u64, 1, config.work_factor());
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = CorruptOnVerify {
            dest: fx.dest.clone(),
            inner: tx,
        };

        let mut pipeline = Pipeline::new(&config, Mode::Copy, FileSystemType::Generic, &control, &stats, &sink)
            .expect("Failed to create pipeline");
        let mut source = FileSource::open(&fx.src).expect("Failed to open source");
        let outcome = pipeline.copy_file(&mut source, &fx.src, &fx.dest, true, true);

        assert_eq!(outcome, FileOutcome::Failed);
        assert!(!fx.dest.exists(), "corrupted destination must be removed");
        assert!(fx.src.exists());
        assert_eq!(stats.snapshot().committed_bytes, 0);

        let events = events(&rx);
        let mismatch = events
            .iter()
            .find_map(|e| match e {
                TransferEvent::Error(err) => Some(err.clone()),
                _ => None,
            })
            .expect("Expected an error event");
        assert_eq!(mismatch.kind, ErrorKind::ChecksumMismatch);
        assert_eq!(mismatch.path.as_deref(), Some(fx.dest.as_path()));
        assert!(events.iter().any(|e| matches!(
            e,
            TransferEvent::FileCompleted { source_hash, destination_hash, .. }
                if !destination_hash.is_empty() && source_hash != destination_hash
        )));
    }

    #[test]
    fn test_cancel_mid_copy_leaves_no_partial_file() {
        let fx = fixture(b"");
        let config = test_config();
        let control = Arc::new(JobControl::new());
        let stats = JobStatistics::new();
        let (tx, rx) = crossbeam_channel::unbounded();

        let mut pipeline = Pipeline::new(&config, Mode::Copy, FileSystemType::Generic, &control, &stats, &tx)
            .expect("Failed to create pipeline");
        let mut source = ScriptedSource {
            len: 10 * 8192,
            good_chunks: 10,
            after: Ok(0),
            on_first_chunk: Some(Arc::clone(&control)),
        };
        let outcome = pipeline.copy_file(&mut source, &fx.src, &fx.dest, false, false);

        assert_eq!(outcome, FileOutcome::Cancelled);
        assert!(!fx.dest.exists());
        assert_eq!(stats.snapshot().committed_bytes, 0);
        assert!(!events(&rx).iter().any(|e| matches!(e, TransferEvent::FileCompleted { .. })));
    }

    #[test]
    fn test_read_error_and_unexpected_eof() {
        let cases = [
            (Err(io::Error::new(io::ErrorKind::Other, "bad sector")), ErrorKind::ReadError),
            (Ok(0), ErrorKind::UnexpectedEof),
        ];

        for (after, expected) in cases {
            let fx = fixture(b"");
            let config = test_config();
            let control = JobControl::new();
            let stats = JobStatistics::new();
            let (tx, rx) = crossbeam_channel::unbounded();

            let mut pipeline =
                Pipeline::new(&config, Mode::Copy, FileSystemType::Generic, &control, &stats, &tx)
                    .expect("Failed to create pipeline");
            let mut source = ScriptedSource {
                len: 3 * 8192,
                good_chunks: 1,
                after,
                on_first_chunk: None,
            };
            let outcome = pipeline.copy_file(&mut source, &fx.src, &fx.dest, false, false);

            assert_eq!(outcome, FileOutcome::Failed);
            assert!(!fx.dest.exists());
            let errors: Vec<ErrorKind> = events(&rx)
                .iter()
                .filter_map(|e| match e {
                    TransferEvent::Error(err) => Some(err.kind),
                    _ => None,
                })
                .collect();
            assert_eq!(errors, vec![expected]);
        }
    }

    #[test]
    fn test_destination_open_failure() {
        let fx = fixture(b"abc");
        let blocked = fx.dest.join("inside-a-missing-dir.bin");
        let config = test_config();
        let control = JobControl::new();
        let stats = JobStatistics::new();
        let (tx, rx) = crossbeam_channel::unbounded();

        let mut pipeline = Pipeline::new(&config, Mode::Copy, FileSystemType::Generic, &control, &stats, &tx)
            .expect("Failed to create pipeline");
        let mut source = FileSource::open(&fx.src).expect("Failed to open source");
        assert_eq!(
            pipeline.copy_file(&mut source, &fx.src, &blocked, false, false),
            FileOutcome::Failed
        );
        assert!(events(&rx).iter().any(
            |e| matches!(e, TransferEvent::Error(err) if err.kind == ErrorKind::FileOpenFailed)
        ));
    }

    #[test]
    fn test_flush_accounting() {
        let fx = fixture(&pattern(1000));
        let config = test_config();
        let control = JobControl::new();
        let stats = JobStatistics::new();

        let mut pipeline =
            Pipeline::new(&config, Mode::Copy, FileSystemType::Generic, &control, &stats, &crate::events::NullSink)
                .expect("Failed to create pipeline");

        let mut source = FileSource::open(&fx.src).expect("Failed to open source");
        pipeline.copy_file(&mut source, &fx.src, &fx.dest, false, false);
        assert_eq!(pipeline.unflushed, 1000, "below threshold and not last");

        let mut source = FileSource::open(&fx.src).expect("Failed to open source");
        pipeline.copy_file(&mut source, &fx.src, &fx.dest, false, true);
        assert_eq!(pipeline.unflushed, 0, "last file is always flushed");
    }

    #[test]
    fn test_plain_copy_without_verification_never_flushes() {
        let config = EngineConfig {
            verify: false,
            ..test_config()
        };
        let control = JobControl::new();
        let stats = JobStatistics::new();

        let mut copy =
            Pipeline::new(&config, Mode::Copy, FileSystemType::Generic, &control, &stats, &crate::events::NullSink)
                .expect("Failed to create pipeline");
        copy.unflushed = config.flush_threshold;
        assert!(!copy.flush_due(true));

        let mut mv =
            Pipeline::new(&config, Mode::Move, FileSystemType::Generic, &control, &stats, &crate::events::NullSink)
                .expect("Failed to create pipeline");
        assert!(mv.flush_due(true), "moves flush the last file");
        assert!(!mv.flush_due(false));
        mv.unflushed = config.flush_threshold;
        assert!(mv.flush_due(false), "moves flush once the threshold is reached");
    }

    #[test]
    fn test_synthetic_source_writes_zeros() {
        let fx = fixture(b"");
        let config = test_config();
        let control = JobControl::new();
        let stats = JobStatistics::new();

        let mut pipeline =
            Pipeline::new(&config, Mode::Copy, FileSystemType::Generic, &control, &stats, &crate::events::NullSink)
                .expect("Failed to create pipeline");
        let mut source = SyntheticSource::new(20_000, Duration::ZERO);
        let outcome = pipeline.copy_file(&mut source, Path::new("DRY_RUN_SOURCE"), &fx.dest, true, true);

        assert_eq!(outcome, FileOutcome::Completed);
        let written = fs::read(&fx.dest).expect("Failed to read dest");
        assert_eq!(written.len(), 20_000);
        assert!(written.iter().all(|&b| b == 0));
    }
}
