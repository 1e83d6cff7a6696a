use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
}

impl ArchiveError {
    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::Io {
            context,
            source: std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        }
    }

    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("no top-level directory matching {expected} in archive")]
    RootNotFound { expected: String },
    #[error("archive root {root} does not contain {package_path}")]
    PackageMissing { root: String, package_path: String },
    #[error("failed to inspect extracted archive {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

type RootPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A file copied from the archive root to a path relative to the install
/// root, alongside the package directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraFile {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Where the package lives inside a downloaded archive.
///
/// Source-hosting archives wrap everything in one top-level folder such as
/// `"<repo>-<ref>"`; the root predicate picks that folder and `package_path`
/// is resolved inside it.
#[derive(Clone)]
pub struct ArchiveLayout {
    root_label: String,
    root_matches: RootPredicate,
    package_path: PathBuf,
    package_name: String,
    extra_files: Vec<ExtraFile>,
}

impl fmt::Debug for ArchiveLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveLayout")
            .field("root", &self.root_label)
            .field("package_path", &self.package_path)
            .field("package_name", &self.package_name)
            .field("extra_files", &self.extra_files)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedPackage {
    pub root: PathBuf,
    pub package_dir: PathBuf,
}

impl ArchiveLayout {
    /// Layout accepting any top-level directory.
    #[must_use]
    pub fn new(package_path: impl Into<PathBuf>, package_name: impl Into<String>) -> Self {
        Self {
            root_label: "any directory".to_string(),
            root_matches: Arc::new(|_| true),
            package_path: package_path.into(),
            package_name: package_name.into(),
            extra_files: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_root_prefix(self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let label = format!("prefix '{prefix}'");
        self.with_root_matcher(label, move |name| name.starts_with(&prefix))
    }

    #[must_use]
    pub fn with_root_matcher(
        mut self,
        label: impl Into<String>,
        matches: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.root_label = label.into();
        self.root_matches = Arc::new(matches);
        self
    }

    #[must_use]
    pub fn with_extra_file(
        mut self,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        self.extra_files.push(ExtraFile {
            source: source.into(),
            destination: destination.into(),
        });
        self
    }

    #[must_use]
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    #[must_use]
    pub fn package_path(&self) -> &Path {
        &self.package_path
    }

    #[must_use]
    pub fn extra_files(&self) -> &[ExtraFile] {
        &self.extra_files
    }

    /// Find the package directory inside an extracted archive. Matching roots
    /// are tried in name order.
    ///
    /// # Errors
    /// Returns [`LayoutError`] when no top-level directory matches or none of
    /// the matches contains `package_path`.
    pub fn locate(&self, extract_dir: &Path) -> Result<LocatedPackage, LayoutError> {
        let entries = std::fs::read_dir(extract_dir).map_err(|source| LayoutError::Io {
            path: extract_dir.display().to_string(),
            source,
        })?;

        let mut roots: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter(|entry| (self.root_matches)(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.path())
            .collect();
        roots.sort();

        let Some(first_root) = roots.first().cloned() else {
            return Err(LayoutError::RootNotFound {
                expected: self.root_label.clone(),
            });
        };

        for root in roots {
            let package_dir = root.join(&self.package_path);
            if package_dir.is_dir() {
                debug!("Located package at {}", package_dir.display());
                return Ok(LocatedPackage { root, package_dir });
            }
        }

        Err(LayoutError::PackageMissing {
            root: first_root.display().to_string(),
            package_path: self.package_path.display().to_string(),
        })
    }
}

/// Extract a ZIP archive into `dest`, skipping entries that would escape it.
///
/// # Errors
/// Returns an error when the archive is corrupt or files cannot be written.
pub fn extract_zip(zip_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = std::fs::File::open(zip_path)
        .map_err(|error| ArchiveError::io_with_path("failed to open zip file", zip_path, &error))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| ArchiveError::zip("failed to read zip archive", error))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| ArchiveError::zip("failed to read zip entry", error))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path: {}", entry.name());
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                ArchiveError::io_with_path("failed to create extraction directory", &out_path, &error)
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                ArchiveError::io_with_path(
                    "failed to create extraction parent directory",
                    parent,
                    &error,
                )
            })?;
        }
        let mut outfile = std::fs::File::create(&out_path).map_err(|error| {
            ArchiveError::io_with_path("failed to create extracted file", &out_path, &error)
        })?;
        std::io::copy(&mut entry, &mut outfile).map_err(|error| {
            ArchiveError::io_with_path("failed to extract archive entry", &out_path, &error)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
            }
        }
    }

    debug!("Extraction complete to {}", dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    fn write_zip(path: &Path, entries: &[(&str, Option<&[u8]>)]) {
        let file = std::fs::File::create(path).expect("zip file should be created");
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
        for (name, contents) in entries {
            match contents {
                Some(bytes) => {
                    writer
                        .start_file(*name, options)
                        .expect("file entry should be started");
                    writer.write_all(bytes).expect("file entry should be written");
                }
                None => writer
                    .add_directory(*name, options)
                    .expect("directory entry should be written"),
            }
        }
        writer.finish().expect("zip archive should be finalized");
    }

    #[test]
    fn extract_zip_expands_files_and_directories() {
        let temp = tempfile::tempdir().expect("temporary directory should be created");
        let zip_path = temp.path().join("update.zip");
        let extract_dir = temp.path().join("extract");
        write_zip(
            &zip_path,
            &[
                ("repo-main/", None),
                ("repo-main/pkg/__init__.py", Some(b"VERSION = '2.0.6'")),
            ],
        );

        extract_zip(&zip_path, &extract_dir).expect("archive should extract");

        let extracted = std::fs::read(extract_dir.join("repo-main/pkg/__init__.py"))
            .expect("file should be readable");
        assert_eq!(extracted, b"VERSION = '2.0.6'");
    }

    #[test]
    fn extract_zip_skips_unsafe_paths() {
        let temp = tempfile::tempdir().expect("temporary directory should be created");
        let zip_path = temp.path().join("unsafe.zip");
        let extract_dir = temp.path().join("extract");
        write_zip(&zip_path, &[("../outside.txt", Some(b"nope"))]);

        extract_zip(&zip_path, &extract_dir).expect("archive should extract");

        assert!(!temp.path().join("outside.txt").exists());
    }

    #[test]
    fn extract_zip_rejects_corrupt_archive() {
        let temp = tempfile::tempdir().expect("temporary directory should be created");
        let zip_path = temp.path().join("broken.zip");
        std::fs::write(&zip_path, b"this is not a zip archive")
            .expect("fixture file should be written");

        let result = extract_zip(&zip_path, &temp.path().join("extract"));
        assert!(matches!(result, Err(ArchiveError::Zip { .. })));
    }

    #[test]
    fn locate_finds_package_under_matching_root() {
        let temp = tempfile::tempdir().expect("temporary directory should be created");
        std::fs::create_dir_all(temp.path().join("other/Student-Shelf/fdma_shelf"))
            .expect("fixture directory should be created");
        std::fs::create_dir_all(temp.path().join("NMSU_Scripts-master/Student-Shelf/fdma_shelf"))
            .expect("fixture directory should be created");

        let layout = ArchiveLayout::new("Student-Shelf/fdma_shelf", "fdma_shelf")
            .with_root_prefix("NMSU_Scripts-");
        let located = layout.locate(temp.path()).expect("package should be located");

        assert_eq!(located.root, temp.path().join("NMSU_Scripts-master"));
        assert!(located.package_dir.ends_with("Student-Shelf/fdma_shelf"));
    }

    #[test]
    fn locate_reports_missing_root_and_package() {
        let temp = tempfile::tempdir().expect("temporary directory should be created");
        std::fs::create_dir_all(temp.path().join("repo-main/docs"))
            .expect("fixture directory should be created");

        let wrong_root = ArchiveLayout::new("pkg", "pkg").with_root_prefix("other-");
        assert!(matches!(
            wrong_root.locate(temp.path()),
            Err(LayoutError::RootNotFound { ref expected }) if expected.contains("other-")
        ));

        let wrong_path = ArchiveLayout::new("pkg", "pkg");
        assert!(matches!(
            wrong_path.locate(temp.path()),
            Err(LayoutError::PackageMissing { .. })
        ));
    }

    #[test]
    fn custom_matcher_replaces_prefix_rule() {
        let temp = tempfile::tempdir().expect("temporary directory should be created");
        std::fs::create_dir_all(temp.path().join("tools-v2.0.6/pkg"))
            .expect("fixture directory should be created");

        let layout = ArchiveLayout::new("pkg", "pkg")
            .with_root_matcher("tagged release", |name| name.contains("-v"));
        assert!(layout.locate(temp.path()).is_ok());
        assert!(format!("{layout:?}").contains("tagged release"));
    }
}
