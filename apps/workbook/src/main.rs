use anyhow::Context;
use clap::Parser;
use tracing::debug;
use workbook_client_core::telemetry::logging;
use workbook_client_core::terminal::{app, cli::Cli};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("❌ {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // A missing .env file is the normal case.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let log_config = cli.logging.to_config();
    logging::init(&log_config).context("logging initialization failed")?;
    debug!(log_level = ?log_config.level, log_file = ?log_config.file, "logging configured");

    app::run(cli).await?;
    Ok(())
}
