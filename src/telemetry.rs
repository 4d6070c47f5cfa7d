use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Installs the global fmt subscriber
///
/// `RUST_LOG` wins over `default_filter`. Calling this again after a
/// subscriber is installed is a no-op, so tests can call it freely.
pub fn init_tracing(default_filter: &str) {
    let filter = build_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), default_filter);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Same as [`init_tracing`] with the configured `log_filter` as the default
pub fn init_tracing_from_config(config: &Config) {
    init_tracing(&config.log_filter);
}

fn build_filter(env_directives: Option<String>, default_filter: &str) -> EnvFilter {
    env_directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(default_filter).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
