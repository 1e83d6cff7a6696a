use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{CacheError, ManifestCache};
use crate::version::{self, Version, VersionError};

pub const MANIFEST_FILENAME: &str = "releases.json";
const LOCAL_SEARCH_DEPTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub version: String,
    pub download_url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Release manifest published next to the package sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub current_version: String,
    pub tool_name: String,
    #[serde(default)]
    pub releases: Vec<Release>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInfo {
    pub tool_name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub repository: String,
    pub license: String,
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to request manifest from {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("manifest request to {url} failed with HTTP {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("invalid manifest JSON: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("manifest field '{0}' is missing or empty")]
    MissingField(&'static str),
    #[error("manifest has an invalid version: {0}")]
    InvalidVersion(#[from] VersionError),
    #[error("manifest has no download URL for version {version}")]
    MissingDownload { version: String },
    #[error("failed to read manifest file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest unavailable ({network}); cache fallback failed ({cache})")]
    Unavailable {
        network: Box<ManifestError>,
        cache: CacheError,
    },
}

impl Manifest {
    /// Parse and validate a manifest document.
    ///
    /// # Errors
    /// Returns an error when the JSON is malformed, a required field is
    /// missing, or `current_version` is not a valid version.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_slice(bytes).map_err(ManifestError::Parse)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check the fields every consumer relies on.
    ///
    /// # Errors
    /// Returns an error when `tool_name` is empty or `current_version` does
    /// not parse.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.tool_name.trim().is_empty() {
            return Err(ManifestError::MissingField("tool_name"));
        }
        if self.current_version.trim().is_empty() {
            return Err(ManifestError::MissingField("current_version"));
        }
        self.current()?;
        Ok(())
    }

    /// The advertised current version.
    ///
    /// # Errors
    /// Returns an error when `current_version` does not parse.
    pub fn current(&self) -> Result<Version, VersionError> {
        version::parse(&self.current_version)
    }

    /// Find the release entry for `version`, comparing by precedence so
    /// `"2.0.6"` and `" 2.0.6 "` match. Entries with unparseable versions
    /// are skipped.
    #[must_use]
    pub fn release(&self, version: &Version) -> Option<&Release> {
        self.releases.iter().find(|release| {
            version::parse(&release.version)
                .is_ok_and(|candidate| candidate.cmp_precedence(version).is_eq())
        })
    }

    /// The release to offer: the entry for `current_version`, or the highest
    /// listed release when `current_version` has no entry yet.
    #[must_use]
    pub fn latest_release(&self) -> Option<(Version, &Release)> {
        if let Ok(current) = self.current()
            && let Some(release) = self.release(&current)
        {
            return Some((current, release));
        }
        self.releases
            .iter()
            .filter_map(|release| {
                version::parse(&release.version)
                    .ok()
                    .map(|parsed| (parsed, release))
            })
            .max_by(|(a, _), (b, _)| a.cmp_precedence(b))
    }

    /// Download location for `version`: its release entry, falling back to
    /// the manifest-level `download_url`.
    ///
    /// # Errors
    /// Returns [`ManifestError::MissingDownload`] when neither is present.
    pub fn download_url_for(&self, version: &Version) -> Result<&str, ManifestError> {
        self.release(version)
            .map(|release| release.download_url.as_str())
            .or(self.download_url.as_deref())
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ManifestError::MissingDownload {
                version: version.to_string(),
            })
    }

    #[must_use]
    pub fn tool_info(&self) -> ToolInfo {
        ToolInfo {
            tool_name: self.tool_name.clone(),
            version: self.current_version.clone(),
            description: self.description.clone().unwrap_or_default(),
            author: self
                .author
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            repository: self.repository.clone().unwrap_or_default(),
            license: self.license.clone().unwrap_or_else(|| "MIT".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestOrigin {
    Network,
    Cache { cached_at: DateTime<Utc> },
}

#[derive(Debug, Clone)]
pub struct FetchedManifest {
    pub manifest: Manifest,
    pub origin: ManifestOrigin,
}

impl FetchedManifest {
    #[must_use]
    pub fn is_cached(&self) -> bool {
        matches!(self.origin, ManifestOrigin::Cache { .. })
    }
}

/// Fetch the manifest with a single GET request.
///
/// # Errors
/// Returns an error when the request fails or times out, the server responds
/// with a non-success status, or the body is not a valid manifest.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Manifest, ManifestError> {
    debug!("Fetching manifest from {url}");

    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|source| ManifestError::Request {
            url: url.to_string(),
            source,
        })?;

    if !response.status().is_success() {
        return Err(ManifestError::HttpStatus {
            url: url.to_string(),
            status: response.status(),
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|source| ManifestError::Request {
            url: url.to_string(),
            source,
        })?;

    Manifest::from_slice(&body)
}

/// Fetch the manifest, refreshing `cache` on success and reading it back
/// when the network is unavailable.
///
/// # Errors
/// Returns [`ManifestError::Unavailable`] when both the network fetch and the
/// cache read fail.
pub async fn fetch_with_cache_fallback(
    client: &reqwest::Client,
    url: &str,
    cache: &ManifestCache,
    timeout: Duration,
) -> Result<FetchedManifest, ManifestError> {
    match fetch(client, url, timeout).await {
        Ok(manifest) => {
            if let Err(error) = cache.store(&manifest, url) {
                warn!("Failed to update manifest cache: {error}");
            }
            Ok(FetchedManifest {
                manifest,
                origin: ManifestOrigin::Network,
            })
        }
        Err(network) => {
            warn!("Manifest fetch failed, trying cache: {network}");
            match cache.load() {
                Ok(cached) => {
                    info!(
                        "Using cached manifest from {}",
                        cached.cached_at.to_rfc3339()
                    );
                    Ok(FetchedManifest {
                        manifest: cached.manifest,
                        origin: ManifestOrigin::Cache {
                            cached_at: cached.cached_at,
                        },
                    })
                }
                Err(cache) => Err(ManifestError::Unavailable {
                    network: Box::new(network),
                    cache,
                }),
            }
        }
    }
}

/// Walk up from `start` looking for a bundled `releases.json`, never past
/// `stop_at`. When `start` is not inside `stop_at` only `start` is searched.
#[must_use]
pub fn find_local_manifest(start: &Path, stop_at: &Path) -> Option<PathBuf> {
    let bounded = start.starts_with(stop_at);
    for dir in start.ancestors().take(LOCAL_SEARCH_DEPTH) {
        let candidate = dir.join(MANIFEST_FILENAME);
        if candidate.is_file() {
            debug!("Found manifest file at {}", candidate.display());
            return Some(candidate);
        }
        if !bounded || dir == stop_at {
            break;
        }
    }
    None
}

/// Read a manifest from disk.
///
/// # Errors
/// Returns an error when the file cannot be read or is not a valid manifest.
pub fn read_local_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let bytes = std::fs::read(path).map_err(|source| ManifestError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Manifest::from_slice(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "current_version": "2.0.6",
        "tool_name": "FDMA2530-Modeling",
        "author": "Course Staff",
        "releases": [
            {"version": "2.0.6", "download_url": "https://example.com/2.0.6.zip", "description": "Checklist fixes"},
            {"version": "2.0.1", "download_url": "https://example.com/2.0.1.zip", "description": "Initial shelf"},
            {"version": "broken", "download_url": "https://example.com/broken.zip", "description": ""}
        ],
        "channel": "stable"
    }"#;

    #[test]
    fn from_slice_accepts_valid_manifest_and_keeps_unknown_fields() {
        let manifest = Manifest::from_slice(SAMPLE.as_bytes()).expect("manifest should parse");
        assert_eq!(manifest.tool_name, "FDMA2530-Modeling");
        assert_eq!(manifest.releases.len(), 3);
        assert_eq!(
            manifest.extra.get("channel").and_then(|v| v.as_str()),
            Some("stable")
        );

        let json = serde_json::to_vec(&manifest).expect("manifest should serialize");
        assert_eq!(Manifest::from_slice(&json).expect("manifest should parse"), manifest);
    }

    #[test]
    fn from_slice_rejects_missing_required_fields() {
        let missing_tool = r#"{"current_version": "1.0.0", "releases": []}"#;
        assert!(matches!(
            Manifest::from_slice(missing_tool.as_bytes()),
            Err(ManifestError::Parse(_))
        ));

        let missing_version = r#"{"tool_name": "x"}"#;
        assert!(matches!(
            Manifest::from_slice(missing_version.as_bytes()),
            Err(ManifestError::Parse(_))
        ));

        let blank_tool = r#"{"current_version": "1.0.0", "tool_name": "  "}"#;
        assert!(matches!(
            Manifest::from_slice(blank_tool.as_bytes()),
            Err(ManifestError::MissingField("tool_name"))
        ));
    }

    #[test]
    fn from_slice_rejects_invalid_current_version() {
        let manifest = r#"{"current_version": "2.0", "tool_name": "x"}"#;
        assert!(matches!(
            Manifest::from_slice(manifest.as_bytes()),
            Err(ManifestError::InvalidVersion(_))
        ));
    }

    #[test]
    fn release_lookup_skips_unparseable_entries() {
        let manifest = Manifest::from_slice(SAMPLE.as_bytes()).expect("manifest should parse");
        let (version, latest) = manifest.latest_release().expect("manifest should have a release");
        assert_eq!(version, Version::new(2, 0, 6));
        assert_eq!(latest.description, "Checklist fixes");
        assert!(manifest.release(&Version::new(9, 9, 9)).is_none());
    }

    #[test]
    fn latest_release_falls_back_to_highest_listed_entry() {
        let mut manifest = Manifest::from_slice(SAMPLE.as_bytes()).expect("manifest should parse");
        manifest.current_version = "2.0.7".to_string();

        let (version, latest) = manifest.latest_release().expect("manifest should have a release");

        assert_eq!(version, Version::new(2, 0, 6));
        assert_eq!(latest.download_url, "https://example.com/2.0.6.zip");

        manifest.releases.clear();
        assert!(manifest.latest_release().is_none());
    }

    #[test]
    fn download_url_falls_back_to_manifest_level_url() {
        let mut manifest = Manifest::from_slice(SAMPLE.as_bytes()).expect("manifest should parse");
        assert_eq!(
            manifest.download_url_for(&Version::new(2, 0, 1)).expect("download URL should resolve"),
            "https://example.com/2.0.1.zip"
        );

        assert!(matches!(
            manifest.download_url_for(&Version::new(3, 0, 0)),
            Err(ManifestError::MissingDownload { .. })
        ));

        manifest.download_url = Some("https://example.com/main.zip".to_string());
        assert_eq!(
            manifest.download_url_for(&Version::new(3, 0, 0)).expect("download URL should resolve"),
            "https://example.com/main.zip"
        );
    }

    #[test]
    fn tool_info_fills_defaults() {
        let manifest = Manifest::from_slice(SAMPLE.as_bytes()).expect("manifest should parse");
        let info = manifest.tool_info();
        assert_eq!(info.version, "2.0.6");
        assert_eq!(info.author, "Course Staff");
        assert_eq!(info.license, "MIT");
        assert_eq!(info.repository, "");
    }

    #[test]
    fn find_local_manifest_walks_up_parent_directories() {
        let temp = tempfile::tempdir().expect("temporary directory should be created");
        let nested = temp.path().join("pkg/shelf/utils");
        std::fs::create_dir_all(&nested).expect("fixture directory should be created");
        std::fs::write(temp.path().join("pkg").join(MANIFEST_FILENAME), SAMPLE)
            .expect("fixture file should be written");

        let found = find_local_manifest(&nested, temp.path())
            .expect("bundled manifest should be found");
        assert_eq!(found, temp.path().join("pkg").join(MANIFEST_FILENAME));

        let manifest = read_local_manifest(&found).expect("bundled manifest should parse");
        assert_eq!(manifest.current_version, "2.0.6");
    }

    #[test]
    fn find_local_manifest_stops_at_boundary() {
        let temp = tempfile::tempdir().expect("temporary directory should be created");
        let install_root = temp.path().join("a/b/scripts");
        let package_dir = install_root.join("pkg");
        std::fs::create_dir_all(&package_dir).expect("fixture directory should be created");
        std::fs::write(temp.path().join(MANIFEST_FILENAME), SAMPLE)
            .expect("fixture file should be written");

        assert_eq!(find_local_manifest(&package_dir, &install_root), None);
        assert_eq!(
            find_local_manifest(&package_dir, temp.path().join("elsewhere").as_path()),
            None
        );

        std::fs::write(install_root.join(MANIFEST_FILENAME), SAMPLE)
            .expect("fixture file should be written");
        assert_eq!(
            find_local_manifest(&package_dir, &install_root),
            Some(install_root.join(MANIFEST_FILENAME))
        );
    }

    #[test]
    fn read_local_manifest_reports_missing_file() {
        let temp = tempfile::tempdir().expect("temporary directory should be created");
        assert!(matches!(
            read_local_manifest(&temp.path().join(MANIFEST_FILENAME)),
            Err(ManifestError::Read { .. })
        ));
    }
}
