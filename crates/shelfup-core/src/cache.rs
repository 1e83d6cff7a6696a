use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::manifest::Manifest;

/// On-disk envelope for the last manifest fetched from the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedManifest {
    pub manifest: Manifest,
    pub source_url: String,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInfo {
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no cached manifest at {0}")]
    Missing(String),
    #[error("{context} {path}: {source}")]
    Io {
        context: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cached manifest at {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("cached manifest at {path} is invalid: {reason}")]
    Invalid { path: String, reason: String },
}

impl CacheError {
    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.display().to_string(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManifestCache {
    path: PathBuf,
}

impl ManifestCache {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached manifest.
    ///
    /// # Errors
    /// Returns an error when the cache file is missing, unreadable, or does
    /// not hold a valid manifest.
    pub fn load(&self) -> Result<CachedManifest, CacheError> {
        let path = &self.path;
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(CacheError::Missing(path.display().to_string()));
            }
            Err(error) => return Err(CacheError::io("failed to read cache", path, error)),
        };

        let cached: CachedManifest =
            serde_json::from_slice(&data).map_err(|source| CacheError::Corrupt {
                path: path.display().to_string(),
                source,
            })?;
        cached
            .manifest
            .validate()
            .map_err(|error| CacheError::Invalid {
                path: path.display().to_string(),
                reason: error.to_string(),
            })?;

        Ok(cached)
    }

    /// Replace the cache with `manifest`.
    ///
    /// # Errors
    /// Returns an error when the cache directory or file cannot be written.
    pub fn store(&self, manifest: &Manifest, source_url: &str) -> Result<(), CacheError> {
        let cached = CachedManifest {
            manifest: manifest.clone(),
            source_url: source_url.to_string(),
            cached_at: Utc::now(),
        };
        let data = serde_json::to_vec_pretty(&cached).map_err(|source| CacheError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })?;

        write_atomic(&self.path, &data)
            .map_err(|error| CacheError::io("failed to write cache", &self.path, error))?;
        debug!("Manifest cache written to {}", self.path.display());
        Ok(())
    }

    #[must_use]
    pub fn info(&self) -> CacheInfo {
        let metadata = std::fs::metadata(&self.path).ok();
        CacheInfo {
            path: self.path.clone(),
            exists: metadata.is_some(),
            size_bytes: metadata.map(|m| m.len()),
        }
    }

    /// Delete the cache file. Returns whether a file was removed.
    ///
    /// # Errors
    /// Returns an error when an existing cache file cannot be removed.
    pub fn clear(&self) -> Result<bool, CacheError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(CacheError::io("failed to delete cache", &self.path, error)),
        }
    }
}

/// Write `data` to a sibling temp file and rename it over `path`.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
    })?;
    std::fs::create_dir_all(parent)?;

    let mut file = tempfile::NamedTempFile::new_in(parent)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}
