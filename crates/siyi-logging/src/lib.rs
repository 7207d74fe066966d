//! # siyi-logging
//!
//! Subscriber setup for Siyi binaries and a capture layer for asserting on
//! log output in tests.
//!
//! Levels used across the workspace: `info` for connects and disconnects,
//! `debug` for per-message traffic, `warn` for timeouts, unknown response
//! ids and unanswered requests, `error` for undecodable frames and handler
//! failures.

#![deny(unsafe_code)]

mod capture;

pub use capture::{CapturedEvent, CapturedLogs, capture_logs};

use tracing_subscriber::EnvFilter;

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install a compact human-readable subscriber writing to stderr.
///
/// `RUST_LOG` wins over `level` when set. Calling this more than once is a
/// no-op.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter_for(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();
    let _ = subscriber.try_init();
}

/// Install a newline-delimited JSON subscriber writing to stderr.
pub fn init_json_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter_for(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .flatten_event(true);
    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_subscriber("warn");
        init_subscriber("debug");
        init_json_subscriber("info");
    }

    #[test]
    fn invalid_level_falls_back_without_panicking() {
        let _ = filter_for("definitely[not a filter");
    }
}
