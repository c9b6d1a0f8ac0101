//! Shared tracing/logging initialization.
//!
//! The bot binary and the integration harnesses set up `tracing_subscriber`
//! the same way: an env-filter plus optional JSON output.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (e.g. `"citizenlink_bot=info,citizenlink_core=info"`).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Build the default filter string for a binary at the given level.
///
/// Core library spans are always included so verification outcomes show up
/// next to the binary's own logs.
pub fn default_filter(binary_target: &str, level: &str) -> String {
    format!("{binary_target}={level},citizenlink_core={level},tower_http=info")
}
