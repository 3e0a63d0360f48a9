//! # ctxsync-logging
//!
//! Subscriber setup for binaries and hosts embedding the engine, plus an
//! in-memory capture layer ([`test_utils`]) that tests use to assert on
//! logged fallbacks, timeouts, and conflict resolutions.
//!
//! Engine crates only emit `tracing` events; installing a subscriber is the
//! host's decision.

#![deny(unsafe_code)]

pub mod test_utils;

use ctxsync_settings::LoggingSettings;
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` wins, otherwise `level`.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install a compact stderr subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set. A second call is a
/// no-op.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

/// Install a JSON-lines stderr subscriber.
pub fn init_json_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .with_current_span(true);

    let _ = subscriber.try_init();
}

/// Install whichever subscriber `settings` asks for.
pub fn init_from_settings(settings: &LoggingSettings) {
    if settings.json {
        init_json_subscriber(&settings.level);
    } else {
        init_subscriber(&settings.level);
    }
}
