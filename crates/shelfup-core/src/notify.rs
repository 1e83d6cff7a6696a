//! Seams between the updater and whatever front end hosts it.

use std::path::Path;

/// Where user-facing update messages go. A console and a GUI front end both
/// implement this.
pub trait NotificationSink {
    fn show(&self, message: &str);
    fn show_error(&self, message: &str);
    /// Ask the user a yes/no question.
    fn confirm(&self, question: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallProgress {
    Downloading { downloaded: u64, total: Option<u64> },
    Verifying,
    Extracting,
    Applying,
}

/// Callbacks run by an install.
pub trait InstallHooks {
    fn progress(&mut self, _progress: InstallProgress) {}

    /// Drop any in-process state loaded from the replaced package.
    fn invalidate_package(&mut self, _package_name: &str, _package_dir: &Path) {}

    /// Rebuild whatever the host derives from the package. Failures are
    /// reported but do not undo the install.
    ///
    /// # Errors
    /// Returns a human-readable reason when the rebuild fails.
    fn rebuild(&mut self) -> Result<(), String>;
}

impl<F> InstallHooks for F
where
    F: FnMut() -> Result<(), String>,
{
    fn rebuild(&mut self) -> Result<(), String> {
        self()
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl InstallHooks for NoopHooks {
    fn rebuild(&mut self) -> Result<(), String> {
        Ok(())
    }
}
