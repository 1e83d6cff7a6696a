use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("{context} {path}: {source}")]
    Io {
        context: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("install target {0} has no parent directory")]
    NoParent(String),
}

impl ApplyError {
    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.display().to_string(),
            source,
        }
    }
}

/// Replace `target` with a copy of `source`.
///
/// The copy is staged in a sibling directory and swapped in with renames, so
/// a failed copy leaves the previous install untouched. If the final swap
/// fails the previous directory is moved back.
///
/// # Errors
/// Returns an error when staging, copying, or swapping fails.
pub fn replace_dir(source: &Path, target: &Path) -> Result<(), ApplyError> {
    let parent = target
        .parent()
        .ok_or_else(|| ApplyError::NoParent(target.display().to_string()))?;
    std::fs::create_dir_all(parent)
        .map_err(|error| ApplyError::io("failed to create install root", parent, error))?;

    let staging = tempfile::Builder::new()
        .prefix(".shelfup-staging-")
        .tempdir_in(parent)
        .map_err(|error| ApplyError::io("failed to create staging directory", parent, error))?;
    let staged = staging.path().join("package");
    copy_dir_recursive(source, &staged)?;

    let backup = staging.path().join("previous");
    let had_previous = target.exists();
    if had_previous {
        std::fs::rename(target, &backup).map_err(|error| {
            ApplyError::io("failed to move current package aside", target, error)
        })?;
    }

    if let Err(error) = std::fs::rename(&staged, target) {
        if had_previous {
            warn!("Swap failed, restoring previous package: {error}");
            if let Err(restore) = std::fs::rename(&backup, target) {
                warn!(
                    "Failed to restore previous package to {}: {restore}",
                    target.display()
                );
            }
        }
        return Err(ApplyError::io("failed to move new package into place", target, error));
    }

    let staging_path = staging.path().to_path_buf();
    if let Err(error) = staging.close() {
        warn!(
            "Failed to remove staging directory {}: {error}",
            staging_path.display()
        );
    }

    info!("Replaced {} with {}", target.display(), source.display());
    Ok(())
}

/// Copy a single file, creating parent directories of `dest` as needed.
///
/// # Errors
/// Returns an error when the parent cannot be created or the copy fails.
pub fn copy_file(src: &Path, dest: &Path) -> Result<(), ApplyError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|error| ApplyError::io("failed to create directory", parent, error))?;
    }
    std::fs::copy(src, dest)
        .map_err(|error| ApplyError::io("failed to copy file", src, error))?;
    debug!("Copied {} -> {}", src.display(), dest.display());
    Ok(())
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), ApplyError> {
    std::fs::create_dir_all(dest)
        .map_err(|error| ApplyError::io("failed to create directory", dest, error))?;

    let entries = std::fs::read_dir(src)
        .map_err(|error| ApplyError::io("failed to read directory", src, error))?;
    for entry in entries {
        let entry =
            entry.map_err(|error| ApplyError::io("failed to read directory entry", src, error))?;
        let src_path: PathBuf = entry.path();
        let dest_path = dest.join(entry.file_name());

        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dest_path)?;
        } else {
            std::fs::copy(&src_path, &dest_path).map_err(|error| {
                ApplyError::io("failed to copy file during update apply", &src_path, error)
            })?;
        }
    }
    Ok(())
}
