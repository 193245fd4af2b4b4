use tracing_subscriber::EnvFilter;

/// Structured events go to stderr so stdout stays a clean report.
/// `EXDIGEST_LOG` takes the usual filter syntax; the default is `info`.
pub fn init() {
    let filter = EnvFilter::try_from_env("EXDIGEST_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
