//! Structured logging init (C8).
//!
//! `RUST_LOG` drives the filter as usual; absent that, `verbose` picks
//! between `warn` (quiet default) and `info`. Writes to stderr so stdout
//! stays clean for piped NDJSON/JSON output.

use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
