use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::model::show::{ShowSnapshot, SNAPSHOT_VERSION};

// ── Error type ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

// ── Helpers ─────────────────────────────────────────────────────────

/// One lock per target path so concurrent writers never share a `.tmp` file.
static FILE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.file_name().unwrap_or_default());
    name.push(suffix);
    path.with_file_name(name)
}

/// Write `data` to `path` so that a crash leaves either the old contents or
/// the new ones: write and fsync `<file>.tmp`, move the old file to
/// `<file>.bak`, then rename the temp file into place.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ProjectError> {
    let lock = Arc::clone(FILE_LOCKS.lock().entry(path.to_path_buf()).or_default());
    let _guard = lock.lock();

    let tmp_path = sibling(path, ".tmp");
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    if path.exists() {
        if let Err(e) = fs::rename(path, sibling(path, ".bak")) {
            tracing::debug!(path = %path.display(), error = %e, "no backup written");
        }
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ProjectError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, json.as_bytes())
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ProjectError> {
    let data = fs::read_to_string(path)?;
    let value = serde_json::from_str(&data)?;
    Ok(value)
}

// ── Save / Load ─────────────────────────────────────────────────────

/// Write a show snapshot, stamping it with the current version and time.
pub fn save_snapshot(path: &Path, snapshot: &ShowSnapshot) -> Result<(), ProjectError> {
    let mut stamped = snapshot.clone();
    stamped.version = SNAPSHOT_VERSION;
    stamped.exported_at = Utc::now();
    write_json(path, &stamped)
}

/// Read a show snapshot. Snapshots written by a newer version are rejected.
pub fn load_snapshot(path: &Path) -> Result<ShowSnapshot, ProjectError> {
    let snapshot: ShowSnapshot = read_json(path)?;
    if snapshot.version > SNAPSHOT_VERSION {
        return Err(ProjectError::InvalidSnapshot(format!(
            "Snapshot version {} is newer than supported version {}",
            snapshot.version, SNAPSHOT_VERSION
        )));
    }
    Ok(snapshot)
}
