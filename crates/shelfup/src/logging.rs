use std::fs::OpenOptions;
use std::io;
use std::path::Path;

#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use simplelog::{CombinedLogger, Config, ConfigBuilder, LevelFilter, SharedLogger, WriteLogger};

use shelfup_platform::AppPaths;

/// Once the log exceeds `max_bytes`, keep only the newest whole lines that
/// fit in half of it.
fn rotate_if_oversized(log_path: &Path, max_bytes: u64) -> io::Result<()> {
    let len = match std::fs::metadata(log_path) {
        Ok(metadata) => metadata.len(),
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(error),
    };
    if len <= max_bytes {
        return Ok(());
    }

    let contents = std::fs::read(log_path)?;
    let budget = usize::try_from(max_bytes / 2).unwrap_or(usize::MAX);
    let cut = contents.len().saturating_sub(budget);
    let start = contents[cut..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(contents.len(), |pos| cut + pos + 1);
    std::fs::write(log_path, &contents[start..])
}

fn file_logger(log_path: &Path, config: Config) -> io::Result<Box<WriteLogger<std::fs::File>>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    Ok(WriteLogger::new(LevelFilter::Debug, config, file))
}

pub fn init_logging(paths: &AppPaths, debug_enabled: bool, max_log_size: u64) {
    let _ = paths.ensure_dirs();
    let log_path = paths.log_file();
    let rotated = rotate_if_oversized(&log_path, max_log_size);

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("shelfup")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    #[cfg(debug_assertions)]
    loggers.push(TermLogger::new(
        LevelFilter::Debug,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ));
    let opened = file_logger(&log_path, config).map(|logger| loggers.push(logger));

    if !loggers.is_empty() {
        let _ = CombinedLogger::init(loggers);
    }
    apply_level(debug_enabled);

    if let Err(error) = rotated {
        log::warn!("Could not trim {}: {error}", log_path.display());
    }
    match opened {
        Ok(()) if debug_enabled => log::debug!("Logging to {}", log_path.display()),
        Ok(()) => {}
        Err(error) => log::warn!("Could not open {}: {error}", log_path.display()),
    }
}

/// Warnings and errors always reach the log; `debug_enabled` adds the rest.
pub fn apply_level(debug_enabled: bool) {
    log::set_max_level(if debug_enabled {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    });
}
