//! Logging prelude module for convenient access to tracing macros.
//!
//! No component prints or logs as *user-visible* reporting — that is
//! exclusively the job of the event bus (`events`). The `tracing` calls
//! made from `queue`, `conflict` and `sync` are internal diagnostics
//! (span-level detail for operators running with `RUST_LOG` set), not a
//! substitute for the typed events those modules publish.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("queue compaction reclaimed {} bytes", reclaimed);
//! ```

pub use tracing::{debug, error, info, trace, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// Logs at INFO and above by default. Control with `RUST_LOG`:
///
/// ```bash
/// RUST_LOG=debug cargo run
/// RUST_LOG=aeon_sync=trace cargo run
/// RUST_LOG=aeon_sync::queue=debug,aeon_sync::sync=trace cargo run
/// ```
pub fn init_tracing() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();
}

// vim: ts=4
