use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::write_atomic;
use crate::manifest::{find_local_manifest, read_local_manifest};
use crate::version::Version;

/// The version currently installed on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledRecord {
    pub version: Version,
    pub installed_at: DateTime<Utc>,
    #[serde(default)]
    pub source_url: Option<String>,
}

impl InstalledRecord {
    #[must_use]
    pub fn new(version: Version, source_url: Option<String>) -> Self {
        Self {
            version,
            installed_at: Utc::now(),
            source_url,
        }
    }
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("{context} {path}: {source}")]
    Io {
        context: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("installed-version record at {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct InstalledRecordStore {
    path: PathBuf,
}

impl InstalledRecordStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record; `Ok(None)` when nothing has been installed yet.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Option<InstalledRecord>, RecordError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(RecordError::Io {
                    context: "failed to read installed-version record",
                    path: self.path.display().to_string(),
                    source,
                });
            }
        };

        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|source| RecordError::Corrupt {
                path: self.path.display().to_string(),
                source,
            })
    }

    /// Persist `record`, replacing any previous one.
    ///
    /// # Errors
    /// Returns an error when the record cannot be serialized or written.
    pub fn save(&self, record: &InstalledRecord) -> Result<(), RecordError> {
        let data = serde_json::to_vec_pretty(record).map_err(|source| RecordError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })?;
        write_atomic(&self.path, &data).map_err(|source| RecordError::Io {
            context: "failed to write installed-version record",
            path: self.path.display().to_string(),
            source,
        })?;
        debug!(
            "Recorded installed version {} in {}",
            record.version,
            self.path.display()
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalVersionSource {
    Record,
    BundledManifest(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVersion {
    pub version: Version,
    pub source: LocalVersionSource,
}

/// Determine the locally installed version: the record first, then a
/// `releases.json` in `package_dir` or `install_root`.
///
/// A bundled manifest naming a different tool than `expected_tool` is
/// ignored.
///
/// # Errors
/// Returns an error when the record file exists but is unreadable.
pub fn resolve_local_version(
    store: &InstalledRecordStore,
    package_dir: &Path,
    install_root: &Path,
    expected_tool: Option<&str>,
) -> Result<Option<LocalVersion>, RecordError> {
    if let Some(record) = store.load()? {
        return Ok(Some(LocalVersion {
            version: record.version,
            source: LocalVersionSource::Record,
        }));
    }

    if !package_dir.is_dir() {
        return Ok(None);
    }
    let Some(path) = find_local_manifest(package_dir, install_root) else {
        return Ok(None);
    };
    let manifest = match read_local_manifest(&path) {
        Ok(manifest) => manifest,
        Err(error) => {
            warn!("Ignoring bundled manifest {}: {error}", path.display());
            return Ok(None);
        }
    };
    if let Some(expected) = expected_tool
        && manifest.tool_name != expected
    {
        warn!(
            "Ignoring bundled manifest {}: it describes {}, not {expected}",
            path.display(),
            manifest.tool_name
        );
        return Ok(None);
    }
    match manifest.current() {
        Ok(version) => Ok(Some(LocalVersion {
            version,
            source: LocalVersionSource::BundledManifest(path),
        })),
        Err(error) => {
            warn!("Ignoring bundled manifest {}: {error}", path.display());
            Ok(None)
        }
    }
}
