use tracing_subscriber::{fmt, EnvFilter};

use crate::utils::consts::LOG_LEVEL;

/// Logging goes to stderr; stdout belongs to the chat transcript.
/// RUST_LOG overrides the built-in default level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(LOG_LEVEL));

    fmt()
        .compact()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
