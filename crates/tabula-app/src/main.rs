//! Tabula - browse, filter and export record tables from the command line
//!
//! This is the main entry point for the `tabula` binary.

use anyhow::Result;
use clap::Parser;
use tabula_app::logging::{self, LoggingConfig};
use tabula_app::{Cli, Runner, open_preferences};
use tabula_settings::TabulaSettings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => TabulaSettings::load_from(path)?,
        None => TabulaSettings::load()?,
    };

    // Held until exit so buffered file logs are flushed
    let _log_guard = logging::init(LoggingConfig::from_settings(&settings.logging, cli.verbose))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        build_mode = if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
        "Starting Tabula"
    );

    let preferences = if cli.no_preferences {
        None
    } else {
        open_preferences()
    };
    let runner = Runner::new(settings, preferences);

    let mut stdout = std::io::stdout().lock();
    let result = runner.run(cli.command, &mut stdout).await;
    if let Err(e) = &result {
        tracing::error!(error = %format!("{:#}", e), "command failed");
    }
    result
}
