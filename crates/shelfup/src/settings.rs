use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use shelfup_core::{ArchiveLayout, UpdateContext};
use shelfup_platform::AppPaths;

const DEFAULT_MANIFEST_URL: &str = "https://raw.githubusercontent.com/Atsantiago/NMSU_Scripts/master/cmi-tools/FDMA2530-Modeling/releases.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_manifest_url")]
    pub manifest_url: String,

    #[serde(default = "default_manifest_timeout")]
    pub manifest_timeout_secs: u64,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// Defaults to the `packages` directory under the data dir.
    #[serde(default)]
    pub install_root: Option<PathBuf>,

    #[serde(default = "default_package_path")]
    pub package_path: PathBuf,

    #[serde(default = "default_package_name")]
    pub package_name: String,

    #[serde(default = "default_archive_root_prefix")]
    pub archive_root_prefix: String,

    #[serde(default = "default_extra_files")]
    pub extra_files: Vec<ExtraFileSetting>,

    /// Program and arguments run after a successful install.
    #[serde(default)]
    pub rebuild_command: Option<Vec<String>>,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraFileSetting {
    /// Relative to the archive root.
    pub source: PathBuf,
    /// Relative to the install root.
    pub destination: PathBuf,
}

fn default_manifest_url() -> String {
    DEFAULT_MANIFEST_URL.to_string()
}

fn default_manifest_timeout() -> u64 {
    10
}

fn default_download_timeout() -> u64 {
    60
}

fn default_package_path() -> PathBuf {
    PathBuf::from("cmi-tools/FDMA2530-Modeling/Student-Shelf/fdma_shelf")
}

fn default_package_name() -> String {
    "fdma_shelf".to_string()
}

fn default_archive_root_prefix() -> String {
    "NMSU_Scripts-".to_string()
}

fn default_extra_files() -> Vec<ExtraFileSetting> {
    vec![
        ExtraFileSetting {
            source: PathBuf::from("cmi-tools/FDMA2530-Modeling/Student-Shelf/shelf_config.json"),
            destination: PathBuf::from("shelf_config.json"),
        },
        ExtraFileSetting {
            source: PathBuf::from("cmi-tools/FDMA2530-Modeling/releases.json"),
            destination: PathBuf::from("releases.json"),
        },
    ]
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            manifest_url: default_manifest_url(),
            manifest_timeout_secs: default_manifest_timeout(),
            download_timeout_secs: default_download_timeout(),
            install_root: None,
            package_path: default_package_path(),
            package_name: default_package_name(),
            archive_root_prefix: default_archive_root_prefix(),
            extra_files: default_extra_files(),
            rebuild_command: None,
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl AppSettings {
    /// Settings from the default location. A missing or unreadable file
    /// yields the defaults.
    pub fn load(paths: &AppPaths) -> Self {
        let settings_path = paths.settings_file();
        if !settings_path.exists() {
            return Self::default();
        }
        Self::load_from(&settings_path).unwrap_or_else(|error| {
            warn!(
                "Ignoring settings at {}: {error}",
                settings_path.display()
            );
            Self::default()
        })
    }

    /// Settings from an explicit file, which must exist and parse.
    pub fn load_from(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn apply_overrides(
        &mut self,
        manifest_url: Option<String>,
        install_root: Option<PathBuf>,
        verbose: bool,
    ) {
        if let Some(url) = manifest_url {
            self.manifest_url = url;
        }
        if let Some(root) = install_root {
            self.install_root = Some(root);
        }
        self.debug_logging |= verbose;
    }

    pub fn layout(&self) -> ArchiveLayout {
        let layout = ArchiveLayout::new(&self.package_path, &self.package_name);
        let layout = if self.archive_root_prefix.is_empty() {
            layout
        } else {
            layout.with_root_prefix(&self.archive_root_prefix)
        };
        self.extra_files.iter().fold(layout, |layout, extra| {
            layout.with_extra_file(&extra.source, &extra.destination)
        })
    }

    pub fn update_context(&self, paths: &AppPaths, client: reqwest::Client) -> UpdateContext {
        let context = UpdateContext::new(&self.manifest_url, paths, self.layout(), client)
            .with_timeouts(
                Duration::from_secs(self.manifest_timeout_secs),
                Duration::from_secs(self.download_timeout_secs),
            );
        match &self.install_root {
            Some(root) => context.with_install_root(root),
            None => context,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::time::Duration;

    use super::{AppSettings, ExtraFileSetting};
    use shelfup_platform::AppPaths;

    #[test]
    fn app_settings_defaults_match_expected_values() {
        let settings = AppSettings::default();

        assert_eq!(settings.manifest_timeout_secs, 10);
        assert_eq!(settings.download_timeout_secs, 60);
        assert_eq!(settings.package_name, "fdma_shelf");
        assert_eq!(settings.archive_root_prefix, "NMSU_Scripts-");
        assert_eq!(settings.extra_files.len(), 2);
        assert_eq!(settings.max_log_size_bytes, 5 * 1024 * 1024);
        assert!(settings.install_root.is_none());
        assert!(settings.rebuild_command.is_none());
        assert!(!settings.debug_logging);
    }

    #[test]
    fn partial_settings_fill_in_defaults() {
        let value = json!({
            "manifest_url": "http://localhost/releases.json",
            "download_timeout_secs": 5,
            "rebuild_command": ["mayapy", "-c", "import fdma_shelf"]
        });

        let settings: AppSettings =
            serde_json::from_value(value).expect("settings JSON should deserialize");

        assert_eq!(settings.manifest_url, "http://localhost/releases.json");
        assert_eq!(settings.download_timeout_secs, 5);
        assert_eq!(settings.manifest_timeout_secs, 10);
        assert_eq!(settings.package_name, "fdma_shelf");
        assert_eq!(
            settings.rebuild_command.as_deref(),
            Some(
                &[
                    "mayapy".to_string(),
                    "-c".to_string(),
                    "import fdma_shelf".to_string()
                ][..]
            )
        );
    }

    #[test]
    fn load_falls_back_to_defaults_for_corrupt_file() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let paths = AppPaths::rooted_at(temp_dir.path());
        std::fs::create_dir_all(&paths.config_dir).expect("config dir should be created");
        std::fs::write(paths.settings_file(), "{ not json").expect("settings should be written");

        let settings = AppSettings::load(&paths);

        assert_eq!(settings.manifest_url, AppSettings::default().manifest_url);
        assert!(AppSettings::load_from(&paths.settings_file()).is_err());
    }

    #[test]
    fn saved_settings_load_back() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("nested/settings.json");
        let mut settings = AppSettings::default();
        settings.package_name = "tools".to_string();
        settings.extra_files = vec![ExtraFileSetting {
            source: "a/b.json".into(),
            destination: "b.json".into(),
        }];

        settings.save(&path).expect("settings should save");
        let loaded = AppSettings::load_from(&path).expect("settings should load");

        assert_eq!(loaded.package_name, "tools");
        assert_eq!(loaded.extra_files, settings.extra_files);
    }

    #[test]
    fn overrides_replace_only_given_values() {
        let mut settings = AppSettings::default();
        settings.debug_logging = true;

        settings.apply_overrides(None, Some("/opt/scripts".into()), false);

        assert_eq!(settings.manifest_url, AppSettings::default().manifest_url);
        assert_eq!(settings.install_root, Some("/opt/scripts".into()));
        assert!(settings.debug_logging);
    }

    #[test]
    fn update_context_uses_configured_locations() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let paths = AppPaths::rooted_at(temp_dir.path());
        let mut settings = AppSettings::default();
        settings.manifest_timeout_secs = 3;

        let context = settings.update_context(&paths, reqwest::Client::new());
        assert_eq!(context.install_root, paths.default_install_root());
        assert_eq!(context.manifest_timeout, Duration::from_secs(3));
        assert_eq!(
            context.package_dir(),
            paths.default_install_root().join("fdma_shelf")
        );

        settings.install_root = Some(temp_dir.path().join("scripts"));
        let context = settings.update_context(&paths, reqwest::Client::new());
        assert_eq!(context.package_dir(), temp_dir.path().join("scripts/fdma_shelf"));
    }

    #[test]
    fn layout_carries_extra_files() {
        let layout = AppSettings::default().layout();

        assert_eq!(layout.package_name(), "fdma_shelf");
        assert_eq!(layout.extra_files().len(), 2);
        assert_eq!(
            layout.extra_files()[1].destination,
            std::path::PathBuf::from("releases.json")
        );
    }
}
