//! Logging prelude and subscriber setup
//!
//! Diagnostics go through `tracing` to stderr. The operator-facing project
//! log and category files live in `journal` and are not affected by the
//! filter set here.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("Archived {}", name);
//! warn!("Cannot remove {}", path.display());
//! ```

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// Defaults to INFO; override with `RUST_LOG`:
///
/// ```bash
/// RUST_LOG=debug sanimove -t /srv/hot -p /srv/archive
/// RUST_LOG=sanimove::reconcile=debug sanimove -t /srv/hot -p /srv/archive
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
