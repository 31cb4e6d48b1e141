//! Fixture library: GDTF-derived fixture types keyed by `fixture_type_id`.
//!
//! On disk the library is a directory holding `library.json` (every
//! definition, in insertion order) and `packages/<hex id>.gdtf` (the
//! original package blobs). Instruments refer to library entries by id only; see
//! [`populate_instrument`] for the one place the two meet.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ts_rs::TS;

use crate::import::gdtf::GdtfPackage;
use crate::model::{FixtureTypeDefinition, PartialInstrument};
use crate::paths;
use crate::project::{self, read_json, write_json, ProjectError};

const LIBRARY_VERSION: u32 = 1;

/// What `upsert` did with a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Serialize, Deserialize)]
struct LibraryFile {
    version: u32,
    #[serde(default)]
    fixtures: Vec<FixtureTypeDefinition>,
}

#[derive(Debug)]
pub struct FixtureLibrary {
    dir: PathBuf,
    entries: IndexMap<String, FixtureTypeDefinition>,
}

impl FixtureLibrary {
    /// Open the library rooted at `dir`. A missing directory is an empty library.
    pub fn open(dir: &Path) -> Result<Self, ProjectError> {
        let file = paths::library_file(dir);
        let entries = if file.exists() {
            let stored: LibraryFile = read_json(&file)?;
            if stored.version > LIBRARY_VERSION {
                return Err(ProjectError::InvalidSnapshot(format!(
                    "Library version {} is newer than supported version {LIBRARY_VERSION}",
                    stored.version
                )));
            }
            stored
                .fixtures
                .into_iter()
                .map(|def| (def.fixture_type_id.clone(), def))
                .collect()
        } else {
            debug!(dir = %dir.display(), "no fixture library yet");
            IndexMap::new()
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            entries,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, fixture_type_id: &str) -> Option<&FixtureTypeDefinition> {
        self.entries.get(fixture_type_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FixtureTypeDefinition> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Where the original package for `fixture_type_id` is kept.
    pub fn package_path(&self, fixture_type_id: &str) -> PathBuf {
        paths::package_file(&self.dir, &package_stem(fixture_type_id))
    }

    /// Insert a parsed package, or overwrite the entry with the same id.
    /// The blob is written first, then the index; the in-memory map changes
    /// only once both are on disk.
    pub fn upsert(&mut self, package: GdtfPackage) -> Result<UpsertOutcome, ProjectError> {
        let GdtfPackage {
            definition,
            package,
        } = package;
        let id = definition.fixture_type_id.clone();

        let blob = self.package_path(&id);
        if let Some(parent) = blob.parent() {
            fs::create_dir_all(parent)?;
        }
        project::atomic_write(&blob, &package)?;

        let mut entries = self.entries.clone();
        let outcome = match entries.insert(id.clone(), definition) {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        };
        self.save(&entries)?;
        self.entries = entries;

        info!(fixture_type_id = %id, ?outcome, "fixture library upsert");
        Ok(outcome)
    }

    /// Drop an entry and its package blob. Returns the removed definition.
    pub fn remove(
        &mut self,
        fixture_type_id: &str,
    ) -> Result<Option<FixtureTypeDefinition>, ProjectError> {
        let mut entries = self.entries.clone();
        let Some(removed) = entries.shift_remove(fixture_type_id) else {
            return Ok(None);
        };
        self.save(&entries)?;
        self.entries = entries;

        let blob = self.package_path(fixture_type_id);
        if let Err(e) = fs::remove_file(&blob) {
            debug!(path = %blob.display(), error = %e, "package blob not removed");
        }
        info!(fixture_type_id, "fixture library remove");
        Ok(Some(removed))
    }

    fn save(&self, entries: &IndexMap<String, FixtureTypeDefinition>) -> Result<(), ProjectError> {
        let file = LibraryFile {
            version: LIBRARY_VERSION,
            fixtures: entries.values().cloned().collect(),
        };
        write_json(&paths::library_file(&self.dir), &file)
    }
}

/// Lowercase hex of the id's bytes. Distinct ids never share a file, even on
/// case-insensitive file systems.
fn package_stem(fixture_type_id: &str) -> String {
    fixture_type_id
        .bytes()
        .fold(String::with_capacity(fixture_type_id.len() * 2), |mut stem, byte| {
            let _ = write!(stem, "{byte:02x}");
            stem
        })
}

fn format_quantity(value: f64) -> Option<String> {
    (value > 0.0).then(|| value.to_string())
}

/// Fill the library-derived fields of an instrument from a definition:
/// type, watt, weight, fixture type id and, from `mode_name` (or the first
/// mode), the DMX footprint. Unknown values are left untouched.
pub fn populate_instrument(
    definition: &FixtureTypeDefinition,
    mode_name: Option<&str>,
    instrument: &mut PartialInstrument,
) {
    let name = definition.display_name();
    if !name.is_empty() {
        instrument.instrument_type = Some(name.to_string());
    }
    if let Some(watt) = format_quantity(definition.wattage) {
        instrument.watt = Some(watt);
    }
    if let Some(weight) = format_quantity(definition.weight) {
        instrument.weight = Some(weight);
    }
    instrument.fixture_type_id = Some(definition.fixture_type_id.clone());
    if let Some(mode) = definition.mode_or_first(mode_name) {
        if mode.footprint > 0 {
            instrument.dmx_footprint = Some(mode.footprint);
        }
    }
}
