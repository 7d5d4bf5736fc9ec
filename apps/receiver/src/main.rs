//! Shadow Clone stream receiver.

mod app;
mod config;
mod input;
mod render;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr; the session log is printed to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting Shadow Clone receiver"
    );

    let config = config::Config::load()?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("receiver shut down cleanly");
    Ok(())
}
