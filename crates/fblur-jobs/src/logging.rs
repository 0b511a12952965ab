//! Tracing setup for binaries and long-running tests.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing with colored output for dev, JSON for production.
///
/// Controlled by `LOG_FORMAT=json` and the usual `RUST_LOG` filter.
/// Safe to call once per process; later calls are ignored.
pub fn init_logging() {
    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fblur=info"));

    let result = if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .try_init()
    };
    // Already initialized (tests set up their own subscriber)
    let _ = result;
}
