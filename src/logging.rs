use tracing_subscriber::EnvFilter;

/// Install the stderr `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `warn`, or `debug` for our crates
/// with `--verbose`.
pub fn init(verbose: bool) {
    let default = if verbose {
        "warn,scoped_rag=debug,scoped_rag_core=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Ignore an already-installed subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
