use std::process::ExitCode;

use ratify_core::config::{AppConfig, LoadOptions};

fn main() -> anyhow::Result<ExitCode> {
    // Commands report config errors themselves; logging falls back to defaults.
    let config = AppConfig::load(LoadOptions::default()).unwrap_or_default();
    ratify_cli::logging::init_logging(&config.logging)?;

    Ok(ratify_cli::run())
}
