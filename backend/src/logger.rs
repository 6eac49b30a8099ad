use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Called once by the binary; the
/// library only emits events.
///
/// The filter is read from `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
