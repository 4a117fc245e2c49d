//! Shared tracing setup for the vigil binaries.

use std::env::var;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Initialize the subscriber with an `info` default.
pub fn init() {
    init_with_default(LevelFilter::INFO);
}

/// Initialize the subscriber with the given default level.
///
/// `RUST_LOG` overrides the default; `VIGIL_LOG_FORMAT=json` switches the
/// output layer to structured JSON lines.
pub fn init_with_default(level: LevelFilter) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_layer = match var("VIGIL_LOG_FORMAT").unwrap_or_default().as_str() {
        "json" => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        _ => tracing_subscriber::fmt::layer().compact().with_filter(env_filter).boxed(),
    };

    tracing_subscriber::registry().with(log_layer).init();
}
