//! provides logging helpers

use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

/// Environment variable overriding the default filter directives
pub const LOG_ENV_VAR: &str = "RUST_LOG";

fn env_filter() -> filter::EnvFilter {
    filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .with_env_var(LOG_ENV_VAR)
        .from_env_lossy()
}

fn fmt_layer() -> Box<dyn Layer<Registry> + Send + Sync> {
    layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter())
        .boxed()
}

/// initiate the global tracing subscriber
///
/// Returns `false` when a global subscriber was already installed, which is
/// the normal case when the host process set up its own logging first.
pub fn init() -> bool {
    registry().with(fmt_layer()).try_init().is_ok()
}
