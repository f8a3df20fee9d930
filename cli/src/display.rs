//! Terminal rendering of transfer events.
//!
//! Progress is redrawn in place on one stderr line; errors, completions
//! (with `--verbose`) and the final summary get lines of their own.

use engine::{JobOutcome, ProgressSnapshot, Status, TransferEvent};
use std::io::Write;
use std::time::{Duration, Instant};

/// Weight of the newest sample in the smoothed speed.
const SPEED_SMOOTHING: f64 = 0.15;

/// Minimum spacing between redraws of the progress line.
const REDRAW_INTERVAL: Duration = Duration::from_millis(200);

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec.max(0.0) as u64))
}

pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

pub fn progress_bar(percent: u32) -> String {
    let filled = (percent.min(100) / 5) as usize;
    let empty = 20 - filled;
    format!("[{}{}] {:3}%", "=".repeat(filled), " ".repeat(empty), percent.min(100))
}

/// Exponential moving average of the current speed.
#[derive(Debug, Default)]
pub struct SpeedSmoother {
    value: Option<f64>,
}

impl SpeedSmoother {
    /// Fold in a sample. Zero samples (stalls, pauses) leave the value alone.
    pub fn update(&mut self, sample: f64) -> f64 {
        if sample > 0.0 {
            self.value = Some(match self.value {
                Some(prev) => prev * (1.0 - SPEED_SMOOTHING) + sample * SPEED_SMOOTHING,
                None => sample,
            });
        }
        self.value.unwrap_or(0.0)
    }
}

/// Counters for the final summary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub completed: usize,
    pub verified: usize,
    pub errors: Vec<String>,
    pub outcome: Option<JobOutcome>,
}

pub struct Reporter {
    verbose: bool,
    start_time: Instant,
    last_redraw: Option<Instant>,
    line_open: bool,
    status: Option<Status>,
    speed: SpeedSmoother,
    summary: Summary,
}

impl Reporter {
    pub fn new(verbose: bool) -> Self {
        Reporter {
            verbose,
            start_time: Instant::now(),
            last_redraw: None,
            line_open: false,
            status: None,
            speed: SpeedSmoother::default(),
            summary: Summary::default(),
        }
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn handle<W: Write>(&mut self, event: &TransferEvent, out: &mut W) {
        match event {
            TransferEvent::Status(status) => {
                if self.status != Some(*status) && self.verbose {
                    self.end_line(out);
                    let _ = writeln!(out, "{}...", status);
                }
                self.status = Some(*status);
            }
            TransferEvent::Progress(snapshot) => self.render_progress(snapshot, out),
            TransferEvent::TotalProgress { .. } => {}
            TransferEvent::FileCompleted {
                destination,
                source_hash,
                destination_hash,
                ..
            } => {
                self.summary.completed += 1;
                if !source_hash.is_empty() && source_hash == destination_hash {
                    self.summary.verified += 1;
                }
                if self.verbose {
                    self.end_line(out);
                    if source_hash.is_empty() {
                        let _ = writeln!(out, "Done: {}", destination.display());
                    } else {
                        let _ = writeln!(out, "Done: {} ({})", destination.display(), destination_hash);
                    }
                }
            }
            TransferEvent::Error(error) => {
                self.end_line(out);
                let _ = writeln!(out, "Error: {}", error);
                self.summary.errors.push(error.to_string());
            }
            TransferEvent::ConflictNeeded(_) => self.end_line(out),
            TransferEvent::Finished(outcome) => {
                self.summary.outcome = Some(*outcome);
                self.end_line(out);
                self.print_summary(out);
            }
        }
        let _ = out.flush();
    }

    fn render_progress<W: Write>(&mut self, snapshot: &ProgressSnapshot, out: &mut W) {
        let smoothed = self.speed.update(snapshot.current_speed);

        let due = self.last_redraw.map_or(true, |t| t.elapsed() >= REDRAW_INTERVAL);
        if !due && snapshot.total_percent < 100 {
            return;
        }
        self.last_redraw = Some(Instant::now());

        let eta = match snapshot.eta_seconds {
            Some(secs) => format_duration(Duration::from_secs(secs)),
            None => "--".to_string(),
        };
        let label = self.status.map(|s| s.to_string()).unwrap_or_default();
        let _ = write!(
            out,
            "\r{:<22} {} | file {:3}% | {} (avg {}) | ETA {}   ",
            label,
            progress_bar(snapshot.total_percent),
            snapshot.file_percent,
            format_speed(smoothed),
            format_speed(snapshot.average_speed),
            eta
        );
        self.line_open = true;
    }

    fn end_line<W: Write>(&mut self, out: &mut W) {
        if self.line_open {
            let _ = writeln!(out);
            self.line_open = false;
        }
    }

    fn print_summary<W: Write>(&self, out: &mut W) {
        let headline = match self.summary.outcome {
            Some(JobOutcome::Completed) => "Transfer complete!",
            Some(JobOutcome::Cancelled) => "Transfer cancelled.",
            Some(JobOutcome::Aborted(_)) => "Transfer aborted.",
            None => "Transfer ended.",
        };
        let _ = writeln!(out, "{}", headline);
        let _ = writeln!(
            out,
            "Summary: {} done, {} verified, {} errors",
            self.summary.completed,
            self.summary.verified,
            self.summary.errors.len()
        );
        let _ = writeln!(out, "Elapsed: {}", format_duration(self.start_time.elapsed()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{ErrorKind, TransferError};
    use std::path::PathBuf;

    fn snapshot(total_percent: u32, current_speed: f64) -> ProgressSnapshot {
        ProgressSnapshot {
            source: PathBuf::from("/src/a"),
            destination: PathBuf::from("/dst/a"),
            file_percent: total_percent,
            total_percent,
            current_speed,
            average_speed: current_speed,
            eta_seconds: Some(75),
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.00 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(75)), "1m 15s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0), format!("[{}]   0%", " ".repeat(20)));
        assert_eq!(progress_bar(50), format!("[{}{}]  50%", "=".repeat(10), " ".repeat(10)));
        assert_eq!(progress_bar(100), format!("[{}] 100%", "=".repeat(20)));
    }

    #[test]
    fn test_speed_smoothing() {
        let mut smoother = SpeedSmoother::default();
        assert_eq!(smoother.update(0.0), 0.0);
        assert_eq!(smoother.update(100.0), 100.0);
        let next = smoother.update(200.0);
        assert!((next - 115.0).abs() < 1e-9);
        // Stalls keep the last value
        assert!((smoother.update(0.0) - 115.0).abs() < 1e-9);
    }

    #[test]
    fn test_reporter_counts_and_summary() {
        let mut reporter = Reporter::new(false);
        let mut out = Vec::new();

        reporter.handle(&TransferEvent::Progress(snapshot(40, 1024.0)), &mut out);
        reporter.handle(
            &TransferEvent::FileCompleted {
                destination: PathBuf::from("/dst/a"),
                source_hash: "abc".to_string(),
                destination_hash: "abc".to_string(),
                top_level: true,
            },
            &mut out,
        );
        reporter.handle(
            &TransferEvent::Error(TransferError::at(ErrorKind::ReadError, "/src/b")),
            &mut out,
        );
        reporter.handle(&TransferEvent::Finished(JobOutcome::Completed), &mut out);

        let summary = reporter.summary();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.verified, 1);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.outcome, Some(JobOutcome::Completed));

        let text = String::from_utf8(out).expect("Output is UTF-8");
        assert!(text.contains("40%"));
        assert!(text.contains("ETA 1m 15s"));
        assert!(text.contains("Error: "));
        assert!(text.contains("Transfer complete!"));
        assert!(text.contains("1 done, 1 verified, 1 errors"));
    }
}
