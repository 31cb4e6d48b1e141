//! Centralized path definitions for all data files and directories.
//!
//! This module is the single source of truth for leaf filenames, directory names,
//! and path-building functions. No other module should hard-code these strings.

use std::path::{Path, PathBuf};

// ── Application identity ─────────────────────────────────────────

pub const APP_ID: &str = "com.patchbook.app";

// ── Leaf filenames ───────────────────────────────────────────────

pub const SETTINGS_FILE: &str = "settings.json";
pub const SHOW_FILE: &str = "show.json";
pub const LIBRARY_FILE: &str = "library.json";
pub const PACKAGE_EXTENSION: &str = "gdtf";

// ── Directory names ──────────────────────────────────────────────

pub const LIBRARY_DIR: &str = "fixture-library";
pub const PACKAGES_DIR: &str = "packages";

// ── Config-dir functions (take app_config_dir) ───────────────────

pub fn settings_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(SETTINGS_FILE)
}

// ── Data-dir functions ───────────────────────────────────────────

pub fn show_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SHOW_FILE)
}

pub fn library_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(LIBRARY_DIR)
}

// ── Library-dir functions (take library_dir) ─────────────────────

pub fn library_file(library_dir: &Path) -> PathBuf {
    library_dir.join(LIBRARY_FILE)
}

pub fn packages_dir(library_dir: &Path) -> PathBuf {
    library_dir.join(PACKAGES_DIR)
}

pub fn package_file(library_dir: &Path, stem: &str) -> PathBuf {
    packages_dir(library_dir).join(format!("{stem}.{PACKAGE_EXTENSION}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_layout() {
        let lib = library_dir(Path::new("/data"));
        assert_eq!(lib, PathBuf::from("/data/fixture-library"));
        assert_eq!(library_file(&lib), PathBuf::from("/data/fixture-library/library.json"));
        assert_eq!(
            package_file(&lib, "robe-spiider"),
            PathBuf::from("/data/fixture-library/packages/robe-spiider.gdtf")
        );
    }
}
