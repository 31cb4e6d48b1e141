use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::merge::ImportPolicy;
use crate::model::AddressMode;
use crate::project::{read_json, write_json, ProjectError};

// ── Import history ───────────────────────────────────────────────

/// The most recent successful import, for "import again" in the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LastImport {
    pub path: PathBuf,
    pub policy: ImportPolicy,
}

// ── App settings ─────────────────────────────────────────────────

/// Application-level settings stored in the OS config directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppSettings {
    pub version: u32,
    pub data_dir: PathBuf,
    /// How addresses are displayed.
    #[serde(default)]
    pub address_mode: AddressMode,
    /// Show the `1:` prefix on universe-1 addresses in universe mode.
    #[serde(default)]
    pub show_universe1: bool,
    #[serde(default)]
    pub default_policy: ImportPolicy,
    #[serde(default)]
    pub last_import: Option<LastImport>,
}

const SETTINGS_VERSION: u32 = 1;

impl AppSettings {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            version: SETTINGS_VERSION,
            data_dir,
            address_mode: AddressMode::default(),
            show_universe1: false,
            default_policy: ImportPolicy::default(),
            last_import: None,
        }
    }
}

/// Load settings from the app config directory. Returns None if no settings
/// file exists or it cannot be read.
pub fn load_settings(app_config_dir: &Path) -> Option<AppSettings> {
    let path = crate::paths::settings_path(app_config_dir);
    if !path.exists() {
        return None;
    }
    match read_json::<AppSettings>(&path) {
        Ok(settings) => Some(settings),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable settings, ignoring");
            None
        }
    }
}

/// Save settings to the app config directory.
pub fn save_settings(app_config_dir: &Path, settings: &AppSettings) -> Result<(), ProjectError> {
    std::fs::create_dir_all(app_config_dir)?;
    write_json(&crate::paths::settings_path(app_config_dir), settings)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();

        let mut settings = AppSettings::new(PathBuf::from("/some/data/dir"));
        settings.address_mode = AddressMode::Absolute;
        settings.last_import = Some(LastImport {
            path: PathBuf::from("/shows/hamlet.csv"),
            policy: ImportPolicy::Replace,
        });
        save_settings(dir.path(), &settings).unwrap();

        let loaded = load_settings(dir.path()).expect("should load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn older_files_get_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let old_json = serde_json::json!({
            "version": 1,
            "data_dir": "/some/dir"
        });
        std::fs::write(
            crate::paths::settings_path(dir.path()),
            serde_json::to_string_pretty(&old_json).unwrap(),
        )
        .unwrap();

        let loaded = load_settings(dir.path()).expect("should load");
        assert_eq!(loaded.address_mode, AddressMode::Universe);
        assert_eq!(loaded.default_policy, ImportPolicy::Merge);
        assert!(!loaded.show_universe1);
        assert_eq!(loaded.last_import, None);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_settings(&dir.path().join("nowhere")).is_none());
    }
}
