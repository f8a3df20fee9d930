//! Destination conflicts.
//!
//! When a task's destination already exists the worker posts a
//! `ConflictNeeded` event and blocks on the `ConflictMailbox` until the
//! presentation layer answers (or the job is cancelled). An answer flagged
//! "apply to all" is remembered by the worker's `ConflictResolver` and
//! reused for every later conflict of the same job without asking again.

use parking_lot::{Condvar, Mutex};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::control::JobControl;
use crate::events::{ConflictRequest, EventSink, TransferEvent};
use crate::model::{ConflictAction, ConflictDecision, CopyTask};

#[derive(Debug, Default)]
struct Slot {
    waiting: bool,
    decision: Option<ConflictDecision>,
}

/// Hand-off point between the blocked worker and whoever answers.
#[derive(Debug, Default)]
pub struct ConflictMailbox {
    slot: Mutex<Slot>,
    answered: Condvar,
}

impl ConflictMailbox {
    /// Mark a question as outstanding. Must happen before the question is
    /// published so an early answer is not lost.
    pub(crate) fn open(&self) {
        let mut slot = self.slot.lock();
        slot.waiting = true;
        slot.decision = None;
    }

    /// Block until an answer arrives. `None` when the job was cancelled.
    pub(crate) fn wait(&self, cancelled: &AtomicBool) -> Option<ConflictDecision> {
        let mut slot = self.slot.lock();
        while slot.decision.is_none() && !cancelled.load(Ordering::SeqCst) {
            self.answered.wait(&mut slot);
        }
        slot.waiting = false;
        if cancelled.load(Ordering::SeqCst) {
            slot.decision = None;
            return None;
        }
        slot.decision.take()
    }

    /// Deliver an answer. Returns false when no question is outstanding.
    pub fn resolve(&self, decision: ConflictDecision) -> bool {
        let mut slot = self.slot.lock();
        if !slot.waiting {
            debug!(?decision, "conflict answer without a pending question ignored");
            return false;
        }
        slot.decision = Some(decision);
        self.answered.notify_all();
        true
    }

    /// Whether the worker is waiting for an answer.
    pub fn is_waiting(&self) -> bool {
        self.slot.lock().waiting
    }

    /// Wake a waiting worker so it can observe cancellation.
    pub(crate) fn wake(&self) {
        let _slot = self.slot.lock();
        self.answered.notify_all();
    }
}

/// What the worker does with a conflicting task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// Transfer to this destination (the original one for Replace)
    Proceed(PathBuf),
    Skip,
    Cancel,
}

/// Worker-side conflict state for one job.
#[derive(Debug, Default)]
pub(crate) struct ConflictResolver {
    remembered: Option<ConflictAction>,
}

impl ConflictResolver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn resolve(
        &mut self,
        task: &CopyTask,
        control: &JobControl,
        sink: &dyn EventSink,
    ) -> Resolution {
        let destination = task.destination.as_path();

        let (action, apply_to_all, new_name) = match self.remembered {
            Some(action) => (action, true, None),
            None => {
                let suggested = suggest_rename(destination);
                let suggested_name = suggested
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();

                control.conflicts().open();
                sink.emit(TransferEvent::ConflictNeeded(ConflictRequest {
                    source: task.source.clone(),
                    destination: destination.to_path_buf(),
                    suggested_name,
                }));

                let Some(decision) = control.conflicts().wait(control.cancel_flag()) else {
                    return Resolution::Cancel;
                };
                if decision.apply_to_all {
                    self.remembered = Some(decision.action);
                }
                (decision.action, decision.apply_to_all, decision.new_name)
            }
        };

        debug!(destination = %destination.display(), %action, apply_to_all, "conflict resolved");
        match action {
            ConflictAction::Replace => Resolution::Proceed(destination.to_path_buf()),
            ConflictAction::Skip => Resolution::Skip,
            ConflictAction::Cancel => {
                info!("job cancelled from conflict prompt");
                control.cancel();
                Resolution::Cancel
            }
            ConflictAction::Rename => {
                let renamed = match new_name.filter(|name| !apply_to_all && !name.is_empty()) {
                    Some(name) => destination.with_file_name(name),
                    None => suggest_rename(destination),
                };
                Resolution::Proceed(renamed)
            }
        }
    }
}

/// Split a trailing `" (N)"` (one to three digits) off a file stem.
fn split_counter(stem: &str) -> Option<(&str, u32)> {
    let inner = stem.strip_suffix(')')?;
    let open = inner.rfind(" (")?;
    let digits = &inner[open + 2..];
    if !(1..=3).contains(&digits.len()) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n = digits.parse::<u32>().ok()?;
    Some((&inner[..open], n))
}

/// First free sibling of `path` named `"<base> (<n>)<.ext>"`.
///
/// A stem already ending in `" (N)"` continues counting from `N + 1`,
/// otherwise counting starts at 1. Dangling symlinks count as taken.
pub fn suggest_rename(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
    let extension = path.extension();

    let (base, mut counter) = match stem.to_str().and_then(split_counter) {
        Some((base, n)) => (OsString::from(base), n + 1),
        None => (stem, 1),
    };

    loop {
        let mut name = base.clone();
        name.push(format!(" ({})", counter));
        if let Some(ext) = extension {
            name.push(".");
            name.push(ext);
        }

        let candidate = path.with_file_name(&name);
        if fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
        counter = counter.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;
    use crate::model::EntryKind;
    use std::sync::Arc;
    use std::thread;

    fn touch(path: &Path) {
        fs::write(path, b"x").expect("Failed to create file");
    }

    fn task_for(dest: &Path) -> CopyTask {
        CopyTask {
            source: PathBuf::from("/src/file.txt"),
            destination: dest.to_path_buf(),
            kind: EntryKind::File,
            size: 10,
            top_level: false,
        }
    }

    #[test]
    fn test_split_counter() {
        assert_eq!(split_counter("report (2)"), Some(("report", 2)));
        assert_eq!(split_counter("a (b) (999)"), Some(("a (b)", 999)));
        assert_eq!(split_counter("report (1000)"), None);
        assert_eq!(split_counter("report ()"), None);
        assert_eq!(split_counter("report(2)"), None);
        assert_eq!(split_counter("report"), None);
    }

    #[test]
    fn test_suggest_rename_continues_counter() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let existing = temp_dir.path().join("report (2).txt");
        touch(&existing);

        let suggested = suggest_rename(&existing);
        assert_eq!(suggested, temp_dir.path().join("report (3).txt"));
    }

    #[test]
    fn test_suggest_rename_skips_taken_names() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let existing = temp_dir.path().join("photo.jpg");
        touch(&existing);
        touch(&temp_dir.path().join("photo (1).jpg"));
        touch(&temp_dir.path().join("photo (2).jpg"));

        assert_eq!(suggest_rename(&existing), temp_dir.path().join("photo (3).jpg"));
    }

    #[test]
    fn test_suggest_rename_without_extension() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let existing = temp_dir.path().join("Makefile");
        touch(&existing);
        assert_eq!(suggest_rename(&existing), temp_dir.path().join("Makefile (1)"));

        let dotfile = temp_dir.path().join(".bashrc");
        touch(&dotfile);
        assert_eq!(suggest_rename(&dotfile), temp_dir.path().join(".bashrc (1)"));
    }

    #[test]
    fn test_mailbox_ignores_unsolicited_answers() {
        let mailbox = ConflictMailbox::default();
        assert!(!mailbox.is_waiting());
        assert!(!mailbox.resolve(ConflictDecision::once(ConflictAction::Skip)));
    }

    #[test]
    fn test_mailbox_answer_before_wait_is_kept() {
        let mailbox = ConflictMailbox::default();
        let cancelled = AtomicBool::new(false);
        mailbox.open();
        assert!(mailbox.resolve(ConflictDecision::once(ConflictAction::Replace)));

        let decision = mailbox.wait(&cancelled).expect("Expected a decision");
        assert_eq!(decision.action, ConflictAction::Replace);
        assert!(!mailbox.is_waiting());
    }

    #[test]
    fn test_resolver_blocks_until_answered() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dest = temp_dir.path().join("file.txt");
        touch(&dest);

        let control = Arc::new(JobControl::new());
        let (tx, rx) = crossbeam_channel::unbounded();

        let answering = Arc::clone(&control);
        let answerer = thread::spawn(move || {
            let event = rx.recv().expect("Expected a conflict event");
            let TransferEvent::ConflictNeeded(request) = event else {
                panic!("unexpected event {:?}", event);
            };
            assert_eq!(request.suggested_name, "file (1).txt");
            assert!(answering.resolve_conflict(ConflictDecision::rename_to("chosen.txt")));
        });

        let mut resolver = ConflictResolver::new();
        let resolution = resolver.resolve(&task_for(&dest), &control, &tx);
        answerer.join().expect("Answer thread panicked");

        assert_eq!(resolution, Resolution::Proceed(temp_dir.path().join("chosen.txt")));
    }

    #[test]
    fn test_resolver_remembers_apply_to_all() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dest = temp_dir.path().join("file.txt");
        touch(&dest);

        let control = JobControl::new();
        let mut resolver = ConflictResolver::new();
        resolver.remembered = Some(ConflictAction::Rename);

        // No question is asked; a rename falls back to the suggestion
        let resolution = resolver.resolve(&task_for(&dest), &control, &NullSink);
        assert_eq!(resolution, Resolution::Proceed(temp_dir.path().join("file (1).txt")));
        assert!(!control.conflicts().is_waiting());
    }

    #[test]
    fn test_cancel_wakes_waiting_resolver() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dest = temp_dir.path().join("file.txt");
        touch(&dest);

        let control = Arc::new(JobControl::new());
        let (tx, rx) = crossbeam_channel::unbounded();

        let canceller = Arc::clone(&control);
        let cancel_thread = thread::spawn(move || {
            rx.recv().expect("Expected a conflict event");
            canceller.cancel();
        });

        let mut resolver = ConflictResolver::new();
        let resolution = resolver.resolve(&task_for(&dest), &control, &tx);
        cancel_thread.join().expect("Cancel thread panicked");

        assert_eq!(resolution, Resolution::Cancel);
    }

    #[test]
    fn test_cancel_answer_cancels_job() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dest = temp_dir.path().join("file.txt");
        touch(&dest);

        let control = JobControl::new();
        let mut resolver = ConflictResolver::new();
        resolver.remembered = Some(ConflictAction::Cancel);

        assert_eq!(resolver.resolve(&task_for(&dest), &control, &NullSink), Resolution::Cancel);
        assert!(control.is_cancelled());
    }
}
