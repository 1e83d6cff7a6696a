use std::path::PathBuf;

use shelfup_core::{CacheError, CheckError, RecordError, VersionError};
use shelfup_platform::AppPathsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Paths(#[from] AppPathsError),
    #[error("failed to read settings from {}: {source}", path.display())]
    Settings {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write settings to {}: {source}", path.display())]
    SettingsWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings file {} already exists; pass --force to replace it", .0.display())]
    SettingsExist(PathBuf),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("could not check for updates: {0}")]
    Check(#[from] CheckError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Version(#[from] VersionError),
}
