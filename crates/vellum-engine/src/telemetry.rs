//! Tracing subscriber setup for hosts that do not install their own.
//!
//! The engine only emits `tracing` events and `metrics` counters. Embedding
//! applications normally own the subscriber and the metrics exporter; this
//! helper exists for tools and tests that want readable output quickly.

use tracing_subscriber::EnvFilter;

/// Selects JSON output when set to `json`. Anything else is plain text.
pub const LOG_FORMAT: &str = "VELLUM_LOG_FORMAT";

/// Install a global `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let json = std::env::var(LOG_FORMAT)
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.with_target(false).try_init()
    };
    installed.is_ok()
}
