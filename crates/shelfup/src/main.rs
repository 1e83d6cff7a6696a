mod cli;
mod commands;
mod console;
mod error;
mod logging;
mod settings;

use std::process::ExitCode;

use clap::Parser;
use shelfup_platform::AppPaths;

use crate::cli::Cli;
use crate::error::AppError;
use crate::settings::AppSettings;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            log::error!("{error}");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, AppError> {
    let paths = AppPaths::new()?;
    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(|| paths.settings_file());
    let mut settings = match &cli.settings {
        Some(path) => AppSettings::load_from(path).map_err(|source| AppError::Settings {
            path: path.clone(),
            source,
        })?,
        None => AppSettings::load(&paths),
    };
    settings.apply_overrides(cli.manifest_url, cli.install_root, cli.verbose);

    logging::init_logging(&paths, settings.debug_logging, settings.max_log_size_bytes);
    log::debug!("Using manifest {}", settings.manifest_url);

    commands::dispatch(cli.command, &settings, &settings_path, &paths).await
}
