//! Release-manifest driven package updater.
//!
//! This crate holds the logic that is independent of any front end:
//! - Version parsing and precedence ([`version`]).
//! - Manifest fetching with an on-disk cache fallback.
//! - The installed-version record.
//! - Archive download, extraction, and in-place package replacement.
//! - The update orchestrator and the traits a host implements to drive it.

pub mod apply;
pub mod archive;
pub mod cache;
pub mod download;
pub mod manifest;
pub mod notify;
pub mod orchestrator;
pub mod record;
pub mod version;

/// Archive layout lookup and extraction.
pub use archive::{ArchiveError, ArchiveLayout, LayoutError};
/// Manifest cache on disk.
pub use cache::{CacheError, CacheInfo, CachedManifest, ManifestCache};
/// Manifest model and fetchers.
pub use manifest::{
    FetchedManifest, Manifest, ManifestError, ManifestOrigin, Release, ToolInfo, fetch,
    fetch_with_cache_fallback,
};
/// Host-provided callbacks.
pub use notify::{InstallHooks, InstallProgress, NoopHooks, NotificationSink};
/// Update decision, install flow, and state machine.
pub use orchestrator::{
    AvailableUpdate, CheckError, InstallError, InstallResult, InstalledUpdate, Orchestrator,
    RunOutcome, UpdateContext, UpdateDecision, UpdateState, build_client, check, install,
};
/// Installed-version record.
pub use record::{
    InstalledRecord, InstalledRecordStore, LocalVersion, LocalVersionSource, RecordError,
};
/// Version type and comparison helpers.
pub use version::{Prerelease, Version, VersionError};
