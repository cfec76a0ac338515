use tracing_subscriber::EnvFilter;

/// Diagnostics go to stderr so they never interleave with the transcript on stdout.
/// Quiet by default; `RUST_LOG=nodeshift=debug` shows spawned commands and timings.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
