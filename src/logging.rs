//! Logging prelude module for convenient access to tracing macros.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("inserted {}", child);
//! warn!("skipping container {}", container);
//! debug!("updating {}", item);
//! ```

pub use tracing::{debug, error, info, instrument, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// `default_level` applies when `RUST_LOG` is not set:
///
/// ```bash
/// RUST_LOG=debug broadcastr links check
/// RUST_LOG=broadcastr::taxonomy=debug broadcastr links show 1/5
/// ```
pub fn init_tracing(default_level: &str) {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
		)
		.with_writer(std::io::stderr)
		.init();
}

// vim: ts=4
