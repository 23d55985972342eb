//! Structured logging init: env-filter with a CLI-supplied default level,
//! plain or JSON formatting depending on configuration.

/// Initializes the global `tracing` subscriber. Call once, at process
/// startup, before any other logging.
pub fn init(log_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
