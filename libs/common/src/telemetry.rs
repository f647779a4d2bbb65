//! Telemetry and logging initialization.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize tracing for the core and its binaries.
///
/// Filtering is driven by `RUST_LOG` (falls back to `LOG_LEVEL`, then
/// `info`). Output format is driven by `LOG_FORMAT` ∈ {`json`, `console`,
/// `pretty`}; unset or unrecognized values fall back to `console`.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(std::env::var("LOG_LEVEL").unwrap_or_default()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Ok("pretty") => fmt::layer().pretty().with_target(true).boxed(),
        _ => fmt::layer().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
