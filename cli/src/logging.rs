//! Tracing setup for the command line.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "warn"
    }
}

/// Initialize the tracing subscriber with environment filter support.
///
/// Logs go to stderr at WARN and above (DEBUG with `--verbose`). The
/// `RUST_LOG` environment variable overrides either:
///
/// ```bash
/// RUST_LOG=engine=debug vcopy ...
/// RUST_LOG=engine::pipeline=trace vcopy ...
/// ```
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    // A second init (tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
