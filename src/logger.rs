use tracing_subscriber::EnvFilter;

/// Installs the process-wide tracing subscriber.
///
/// Honors `RUST_LOG` first; falls back to `BROWSER_USE_LOGGING_LEVEL` (kept for
/// compatibility with the environment variable the original service read) and
/// finally to `info`.
pub fn init_logging() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if let Ok(level) = std::env::var("BROWSER_USE_LOGGING_LEVEL") {
        EnvFilter::new(level)
    } else {
        EnvFilter::new("info")
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
