use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "ENCLAVE_LOG";

/// Install a fmt subscriber filtered by `$ENCLAVE_LOG`, falling back to
/// `default_level`. Returns `false` if a global subscriber was already set.
pub fn init_logging(default_level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .try_init()
        .is_ok()
}
