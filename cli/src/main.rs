//! VCopy - Command-line interface for the transfer engine.
//!
//! Drives one job on the engine's worker thread, renders its events on
//! stderr and answers destination conflicts according to `--on-conflict`.

mod display;
mod logging;
mod prompt;
mod settings;

use clap::Parser;
use engine::{
    spawn_job, ChecksumAlgorithm, EngineConfig, JobOutcome, Mode, TransferError, TransferEvent, TransferJob,
};
use std::io;
use std::path::PathBuf;
use tracing::debug;

use display::Reporter;
use prompt::ConflictPolicy;

/// VCopy - verified file copy and move
#[derive(Parser, Debug)]
#[command(name = "vcopy")]
#[command(version = "0.1.0")]
#[command(about = "Copy or move files and directories with end-to-end verification")]
struct Args {
    /// Files and directories to transfer
    #[arg(value_name = "SOURCE")]
    sources: Vec<PathBuf>,

    /// Destination directory
    #[arg(long, value_name = "PATH")]
    dst: PathBuf,

    /// Operation mode: copy or move
    #[arg(long, value_name = "MODE", default_value = "copy")]
    mode: String,

    /// What to do when a destination exists: ask, replace, skip, rename, or cancel
    #[arg(long, value_name = "POLICY", default_value = "ask")]
    on_conflict: String,

    /// Skip checksum verification
    #[arg(long)]
    no_verify: bool,

    /// Checksum algorithm: xxh64, blake3, sha256, or md5 (default from config)
    #[arg(long, value_name = "ALGORITHM")]
    hash: Option<String>,

    /// Keep file names as they are, even on restrictive filesystems
    #[arg(long)]
    no_sanitize: bool,

    /// Do not copy modification times
    #[arg(long)]
    no_times: bool,

    /// Write a synthetic file instead of the sources
    #[arg(long)]
    dry_run: bool,

    /// TOML file with engine settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

/// Parse and validate command-line arguments, then run the job
fn main() {
    let args = Args::parse();
    logging::init_tracing(args.verbose);

    // Exit code tracking
    let exit_code = match run_cli(&args) {
        Ok(()) => 0,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Settings file plus command-line overrides.
fn build_config(args: &Args) -> Result<EngineConfig, String> {
    let mut config = settings::load_config(args.config.as_deref())?;

    if args.no_verify {
        config.verify = false;
    }
    if let Some(hash) = &args.hash {
        config.checksum_algorithm = hash.parse::<ChecksumAlgorithm>()?;
    }
    if args.no_sanitize {
        config.sanitize_filenames = false;
    }
    if args.no_times {
        config.preserve_times = false;
    }
    if args.dry_run {
        config.dry_run = true;
    }
    Ok(config)
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> Result<(), String> {
    let mode = match args.mode.to_lowercase().as_str() {
        "copy" => Mode::Copy,
        "move" => Mode::Move,
        _ => {
            return Err(format!(
                "Invalid mode '{}'. Must be 'copy' or 'move'",
                args.mode
            ))
        }
    };
    let policy: ConflictPolicy = args.on_conflict.parse()?;
    let config = build_config(args)?;

    if !config.dry_run {
        if args.sources.is_empty() {
            return Err("No sources given".to_string());
        }
        for source in &args.sources {
            if std::fs::symlink_metadata(source).is_err() {
                return Err(format!("Source does not exist: {}", source.display()));
            }
        }
    }

    let job = TransferJob::new(args.sources.clone(), &args.dst, mode, config)
        .map_err(|e| format!("Job creation failed: {}", e))?;
    debug!(job_id = %job.id, "job created");

    if args.verbose {
        eprintln!("Preparing transfer...");
        eprintln!("  Sources: {}", args.sources.len());
        eprintln!("  Destination: {}", args.dst.display());
        eprintln!("  Mode: {}", mode);
        eprintln!();
    }

    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = spawn_job(job, tx).map_err(|e| format!("Job start failed: {}", e))?;

    let mut reporter = Reporter::new(args.verbose);
    let mut stderr = io::stderr();
    let mut outcome = None;

    for event in rx.iter() {
        reporter.handle(&event, &mut stderr);
        match event {
            TransferEvent::ConflictNeeded(request) => {
                let decision = match policy.standing_decision() {
                    Some(decision) => decision,
                    None => prompt::ask(&request, &mut io::stdin().lock(), &mut stderr),
                };
                if !handle.resolve_conflict(decision) {
                    debug!("conflict answered after the job moved on");
                }
            }
            TransferEvent::Finished(result) => {
                outcome = Some(result);
                break;
            }
            _ => {}
        }
    }

    let joined = handle.join().map_err(|e| format!("Job execution failed: {}", e))?;
    let outcome = outcome.unwrap_or(joined);

    let failures = reporter.summary().errors.len();
    match outcome {
        JobOutcome::Completed if failures == 0 => Ok(()),
        JobOutcome::Completed => Err(format!("{} error(s) during transfer", failures)),
        JobOutcome::Cancelled => Err("Transfer cancelled".to_string()),
        JobOutcome::Aborted(kind) => Err(format!(
            "Transfer aborted: {}",
            TransferError::new(kind).message()
        )),
    }
}
