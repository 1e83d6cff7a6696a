use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::apply::{self, ApplyError};
use crate::archive::{self, ArchiveError, ArchiveLayout, LayoutError};
use crate::cache::ManifestCache;
use crate::download::{self, DownloadError};
use crate::manifest::{self, FetchedManifest, Manifest, ManifestError};
use crate::notify::{InstallHooks, InstallProgress, NotificationSink};
use crate::record::{
    InstalledRecord, InstalledRecordStore, LocalVersion, RecordError, resolve_local_version,
};
use crate::version::Version;

pub const DEFAULT_MANIFEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the HTTP client used for manifest and archive requests.
///
/// # Errors
/// Returns an error when the TLS backend cannot be initialised.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(format!("shelfup/{}", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Everything a check or install needs, passed explicitly.
#[derive(Debug, Clone)]
pub struct UpdateContext {
    pub manifest_url: String,
    pub cache: ManifestCache,
    pub record: InstalledRecordStore,
    pub install_root: PathBuf,
    /// Parent directory for per-install temp directories.
    pub work_dir: PathBuf,
    pub layout: ArchiveLayout,
    pub manifest_timeout: Duration,
    pub download_timeout: Duration,
    pub client: reqwest::Client,
}

impl UpdateContext {
    /// Context with default timeouts and file locations derived from
    /// `paths`.
    #[must_use]
    pub fn new(
        manifest_url: impl Into<String>,
        paths: &shelfup_platform::AppPaths,
        layout: ArchiveLayout,
        client: reqwest::Client,
    ) -> Self {
        Self {
            manifest_url: manifest_url.into(),
            cache: ManifestCache::new(paths.manifest_cache_file()),
            record: InstalledRecordStore::new(paths.installed_record_file()),
            install_root: paths.default_install_root(),
            work_dir: paths.cache_dir.clone(),
            layout,
            manifest_timeout: DEFAULT_MANIFEST_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            client,
        }
    }

    #[must_use]
    pub fn with_install_root(mut self, install_root: impl Into<PathBuf>) -> Self {
        self.install_root = install_root.into();
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, manifest: Duration, download: Duration) -> Self {
        self.manifest_timeout = manifest;
        self.download_timeout = download;
        self
    }

    #[must_use]
    pub fn package_dir(&self) -> PathBuf {
        self.install_root.join(self.layout.package_name())
    }

    /// Fetch the manifest, falling back to the on-disk cache.
    ///
    /// # Errors
    /// Returns an error when neither the network nor the cache yields a
    /// manifest.
    pub async fn fetch_manifest(&self) -> Result<FetchedManifest, ManifestError> {
        manifest::fetch_with_cache_fallback(
            &self.client,
            &self.manifest_url,
            &self.cache,
            self.manifest_timeout,
        )
        .await
    }

    /// The installed version, from the record or a manifest bundled in the
    /// package or install root. Pass the remote `tool_name` when known so a
    /// manifest for another tool is not mistaken for this one.
    ///
    /// # Errors
    /// Returns an error when the record exists but is unreadable.
    pub fn local_version(
        &self,
        expected_tool: Option<&str>,
    ) -> Result<Option<LocalVersion>, RecordError> {
        resolve_local_version(
            &self.record,
            &self.package_dir(),
            &self.install_root,
            expected_tool,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableUpdate {
    pub current_version: Version,
    pub latest_version: Version,
    pub download_url: String,
    pub description: Option<String>,
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDecision {
    UpToDate { current: Version },
    UpdateAvailable(AvailableUpdate),
}

/// Decide whether `manifest` advertises something newer than `local`.
///
/// The offered release is the entry for `current_version`, or the highest
/// listed entry when that one is missing.
///
/// # Errors
/// Returns an error when the manifest version is invalid or a newer release
/// has no download URL.
pub fn check(local: &Version, manifest: &Manifest) -> Result<UpdateDecision, ManifestError> {
    let current = manifest.current()?;
    let remote = match manifest.latest_release() {
        Some((version, _)) => version,
        None => current.clone(),
    };
    if remote != current {
        warn!(
            "Manifest has no release entry for {current}; offering {remote} instead"
        );
    }
    if !remote.cmp_precedence(local).is_gt() {
        return Ok(UpdateDecision::UpToDate {
            current: local.clone(),
        });
    }

    let download_url = manifest.download_url_for(&remote)?.to_string();
    let release = manifest.release(&remote);
    Ok(UpdateDecision::UpdateAvailable(AvailableUpdate {
        current_version: local.clone(),
        latest_version: remote,
        download_url,
        description: release
            .map(|r| r.description.clone())
            .filter(|d| !d.is_empty()),
        sha256: release.and_then(|r| r.sha256.clone()),
    }))
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("no update is ready to install (state: {0})")]
    NotReady(&'static str),
    #[error("failed to prepare update workspace: {0}")]
    Workspace(#[source] std::io::Error),
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),
    #[error("extraction failed: {0}")]
    Extraction(#[from] ArchiveError),
    #[error("unexpected archive layout: {0}")]
    Layout(#[from] LayoutError),
    #[error("failed to replace installed package: {0}")]
    Apply(#[from] ApplyError),
    #[error("failed to record installed version: {0}")]
    Record(#[from] RecordError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledUpdate {
    pub version: Version,
    pub package_dir: PathBuf,
    pub rebuild_warning: Option<String>,
}

#[derive(Debug)]
pub enum InstallResult {
    Installed(InstalledUpdate),
    Failed(InstallError),
}

impl InstallResult {
    #[must_use]
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed(_))
    }

    #[must_use]
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Installed(_) => None,
            Self::Failed(error) => Some(error.to_string()),
        }
    }
}

/// Download, extract, and install `update`, then record the new version and
/// run `hooks`.
///
/// Temp files live under `context.work_dir` and are removed whatever the
/// outcome. Nothing is rolled back after the package swap: a failure to write
/// the record leaves the new package in place with the old record.
pub async fn install(
    context: &UpdateContext,
    update: &AvailableUpdate,
    hooks: &mut dyn InstallHooks,
) -> InstallResult {
    let workspace = std::fs::create_dir_all(&context.work_dir).and_then(|()| {
        tempfile::Builder::new()
            .prefix(".shelfup-update-")
            .tempdir_in(&context.work_dir)
    });
    let workspace = match workspace {
        Ok(workspace) => workspace,
        Err(error) => return InstallResult::Failed(InstallError::Workspace(error)),
    };

    let result = run_install(context, update, workspace.path(), hooks).await;

    let workspace_path = workspace.path().to_path_buf();
    if let Err(error) = workspace.close() {
        warn!(
            "Failed to clean up update workspace {}: {error}",
            workspace_path.display()
        );
    }

    match result {
        Ok(installed) => {
            info!("Installed version {}", installed.version);
            InstallResult::Installed(installed)
        }
        Err(failure) => {
            error!("Update to {} failed: {failure}", update.latest_version);
            InstallResult::Failed(failure)
        }
    }
}

async fn run_install(
    context: &UpdateContext,
    update: &AvailableUpdate,
    workspace: &Path,
    hooks: &mut dyn InstallHooks,
) -> Result<InstalledUpdate, InstallError> {
    let url = update.download_url.as_str();
    let archive_path = workspace.join(download::archive_file_name(url));

    info!("Downloading update {} from {url}", update.latest_version);
    download::download_file(
        &context.client,
        url,
        &archive_path,
        context.download_timeout,
        &mut |downloaded, total| hooks.progress(InstallProgress::Downloading { downloaded, total }),
    )
    .await?;

    if let Some(expected) = update.sha256.as_deref() {
        hooks.progress(InstallProgress::Verifying);
        download::verify_sha256(&archive_path, expected)?;
        debug!("Archive checksum verified");
    }

    hooks.progress(InstallProgress::Extracting);
    let extract_dir = workspace.join("extracted");
    std::fs::create_dir_all(&extract_dir).map_err(InstallError::Workspace)?;
    archive::extract_zip(&archive_path, &extract_dir)?;
    let located = context.layout.locate(&extract_dir)?;

    hooks.progress(InstallProgress::Applying);
    let package_dir = context.package_dir();
    apply::replace_dir(&located.package_dir, &package_dir)?;
    for extra in context.layout.extra_files() {
        let source = located.root.join(&extra.source);
        if source.is_file() {
            apply::copy_file(&source, &context.install_root.join(&extra.destination))?;
        } else {
            warn!("Archive has no {}; skipping", extra.source.display());
        }
    }

    context.record.save(&InstalledRecord::new(
        update.latest_version.clone(),
        Some(update.download_url.clone()),
    ))?;

    hooks.invalidate_package(context.layout.package_name(), &package_dir);
    let rebuild_warning = match hooks.rebuild() {
        Ok(()) => None,
        Err(reason) => {
            warn!("Rebuild after update failed: {reason}");
            Some(reason)
        }
    };

    Ok(InstalledUpdate {
        version: update.latest_version.clone(),
        package_dir,
        rebuild_warning,
    })
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Checking,
    UpToDate { current: Version },
    UpdateAvailable(AvailableUpdate),
    Installing { version: Version },
    Installed(InstalledUpdate),
    Failed(String),
}

impl UpdateState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::UpToDate { .. } => "up to date",
            Self::UpdateAvailable(_) => "update available",
            Self::Installing { .. } => "installing",
            Self::Installed(_) => "installed",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    UpToDate(Version),
    Declined(AvailableUpdate),
    Installed(InstalledUpdate),
    Failed(String),
}

/// Stateful driver for one check/install flow at a time.
#[derive(Debug)]
pub struct Orchestrator {
    context: UpdateContext,
    state: UpdateState,
    manifest: Option<FetchedManifest>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(context: UpdateContext) -> Self {
        Self {
            context,
            state: UpdateState::Idle,
            manifest: None,
        }
    }

    #[must_use]
    pub fn context(&self) -> &UpdateContext {
        &self.context
    }

    #[must_use]
    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    /// Manifest seen by the most recent check, cleared after an install.
    #[must_use]
    pub fn last_manifest(&self) -> Option<&FetchedManifest> {
        self.manifest.as_ref()
    }

    pub fn reset(&mut self) {
        self.state = UpdateState::Idle;
    }

    /// Compare the installed version against the manifest. With nothing
    /// installed every release counts as an update.
    ///
    /// # Errors
    /// Returns an error when the record is unreadable, the manifest is
    /// unavailable, or the manifest is unusable. The state returns to idle.
    pub async fn check_for_updates(&mut self) -> Result<UpdateDecision, CheckError> {
        self.state = UpdateState::Checking;
        match self.run_check().await {
            Ok(decision) => {
                self.state = match &decision {
                    UpdateDecision::UpToDate { current } => UpdateState::UpToDate {
                        current: current.clone(),
                    },
                    UpdateDecision::UpdateAvailable(update) => {
                        UpdateState::UpdateAvailable(update.clone())
                    }
                };
                Ok(decision)
            }
            Err(error) => {
                self.state = UpdateState::Idle;
                Err(error)
            }
        }
    }

    async fn run_check(&mut self) -> Result<UpdateDecision, CheckError> {
        let fetched = self.context.fetch_manifest().await?;
        let local = match self
            .context
            .local_version(Some(&fetched.manifest.tool_name))?
        {
            Some(local) => local.version,
            None => {
                info!("No installed version found; any release is an update");
                Version::new(0, 0, 0)
            }
        };

        let decision = check(&local, &fetched.manifest)?;
        self.manifest = Some(fetched);
        Ok(decision)
    }

    /// Install the update found by the last check.
    pub async fn install_available(&mut self, hooks: &mut dyn InstallHooks) -> InstallResult {
        let UpdateState::UpdateAvailable(update) = &self.state else {
            return InstallResult::Failed(InstallError::NotReady(self.state.name()));
        };
        let update = update.clone();

        self.state = UpdateState::Installing {
            version: update.latest_version.clone(),
        };
        let result = install(&self.context, &update, hooks).await;

        self.state = match &result {
            InstallResult::Installed(installed) => {
                self.manifest = None;
                UpdateState::Installed(installed.clone())
            }
            InstallResult::Failed(error) => UpdateState::Failed(error.to_string()),
        };
        result
    }

    /// Full interactive flow: check, ask for confirmation, install, report.
    /// Leaves the orchestrator idle.
    pub async fn run(
        &mut self,
        sink: &dyn NotificationSink,
        hooks: &mut dyn InstallHooks,
    ) -> RunOutcome {
        let outcome = self.run_inner(sink, hooks).await;
        self.reset();
        outcome
    }

    async fn run_inner(
        &mut self,
        sink: &dyn NotificationSink,
        hooks: &mut dyn InstallHooks,
    ) -> RunOutcome {
        let update = match self.check_for_updates().await {
            Ok(UpdateDecision::UpToDate { current }) => {
                sink.show(&format!("You have the latest version: {current}"));
                return RunOutcome::UpToDate(current);
            }
            Ok(UpdateDecision::UpdateAvailable(update)) => update,
            Err(error) => {
                let reason = format!("Could not check for updates: {error}");
                sink.show_error(&reason);
                return RunOutcome::Failed(reason);
            }
        };

        let tool = self
            .manifest
            .as_ref()
            .map_or_else(String::new, |m| format!("{} ", m.manifest.tool_name));
        let mut question = format!(
            "Update {tool}from {} to {}?",
            update.current_version, update.latest_version
        );
        if let Some(description) = &update.description {
            question.push_str("\n\n");
            question.push_str(description);
        }
        if !sink.confirm(&question) {
            info!("Update to {} declined", update.latest_version);
            return RunOutcome::Declined(update);
        }

        match self.install_available(hooks).await {
            InstallResult::Installed(installed) => {
                sink.show(&format!("{tool}updated to {}", installed.version));
                if let Some(warning) = &installed.rebuild_warning {
                    sink.show_error(&format!("Rebuild failed: {warning}"));
                }
                RunOutcome::Installed(installed)
            }
            InstallResult::Failed(error) => {
                let reason = format!("Update failed: {error}");
                sink.show_error(&reason);
                RunOutcome::Failed(reason)
            }
        }
    }
}
