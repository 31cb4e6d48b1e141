use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::AppError;
use crate::import::service::{self, ImportReport};
use crate::import::{ImportOptions, SourceFormat};
use crate::library::{populate_instrument, FixtureLibrary};
use crate::merge::ImportPolicy;
use crate::model::{format_address_text, Instrument, PartialInstrument};
use crate::paths;
use crate::settings::{self, AppSettings, LastImport};
use crate::store::{FileStore, PatchOp, PatchStore};

// ── Application State ──────────────────────────────────────────────

/// State shared by the host and the CLI: one open show and the fixture
/// library, each behind its own lock.
pub struct AppState {
    pub app_config_dir: PathBuf,
    /// Directory the show and library were opened from. Differs from
    /// `settings.data_dir` when a caller overrides it for one session.
    pub data_dir: PathBuf,
    pub settings: Mutex<AppSettings>,
    pub store: Mutex<FileStore>,
    pub library: Mutex<FixtureLibrary>,
}

impl AppState {
    /// Open the show and library under `settings.data_dir`.
    pub fn open(app_config_dir: PathBuf, settings: AppSettings) -> Result<Self, AppError> {
        let data_dir = settings.data_dir.clone();
        Self::open_in(app_config_dir, settings, data_dir)
    }

    /// Open the show and library under `data_dir`. The saved settings keep
    /// their own `data_dir`.
    pub fn open_in(
        app_config_dir: PathBuf,
        settings: AppSettings,
        data_dir: PathBuf,
    ) -> Result<Self, AppError> {
        let store = FileStore::open(&paths::show_path(&data_dir))?;
        let library = FixtureLibrary::open(&paths::library_dir(&data_dir))?;
        Ok(Self {
            app_config_dir,
            data_dir,
            settings: Mutex::new(settings),
            store: Mutex::new(store),
            library: Mutex::new(library),
        })
    }

    pub fn settings(&self) -> AppSettings {
        self.settings.lock().clone()
    }

    /// Persist `updated` and make it current.
    pub fn update_settings(&self, updated: AppSettings) -> Result<(), AppError> {
        let mut current = self.settings.lock();
        settings::save_settings(&self.app_config_dir, &updated)?;
        *current = updated;
        Ok(())
    }

    /// Read-only access to the show store. Locks the mutex for the duration of `f`.
    pub fn with_store<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&FileStore) -> R,
    {
        let guard = self.store.lock();
        f(&guard)
    }

    /// Mutating access to the show store. Locks the mutex for the duration of `f`.
    pub fn with_store_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut FileStore) -> R,
    {
        let mut guard = self.store.lock();
        f(&mut guard)
    }

    /// Read-only access to the fixture library.
    pub fn with_library<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&FixtureLibrary) -> R,
    {
        let guard = self.library.lock();
        f(&guard)
    }

    /// Mutating access to the fixture library.
    pub fn with_library_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut FixtureLibrary) -> R,
    {
        let mut guard = self.library.lock();
        f(&mut guard)
    }

    /// Render a stored address the way the user asked addresses to look.
    pub fn display_address(&self, address: &str) -> String {
        let settings = self.settings.lock();
        format_address_text(address, settings.address_mode, settings.show_universe1)
    }

    /// Import a patch file. The file is read before the store lock is taken.
    pub async fn import_patch(
        &self,
        path: &Path,
        format: Option<SourceFormat>,
        options: &ImportOptions,
        policy: Option<ImportPolicy>,
    ) -> ImportReport {
        let policy = policy.unwrap_or_else(|| self.settings.lock().default_policy);
        let parsed = service::read_patch_file(path, format, options).await;
        let report = self
            .with_store_mut(|store| service::finish_patch_import(store, path, format, parsed, policy));
        if report.ok {
            self.record_last_import(path, policy);
        }
        report
    }

    /// Import a GDTF package into the library. Decompression happens before
    /// the library lock is taken.
    pub async fn import_gdtf(&self, path: &Path) -> ImportReport {
        let package = service::read_gdtf_file(path).await;
        self.with_library_mut(|library| service::finish_gdtf_import(library, path, package))
    }

    /// Copy library data (type, watt, weight, footprint, fixture type id) onto
    /// the instrument at `channel`/`part`. Returns the updated instrument.
    pub fn populate_from_library(
        &self,
        channel: &str,
        part: u32,
        fixture_type_id: &str,
        mode: Option<&str>,
    ) -> Result<Instrument, AppError> {
        let definition = self
            .with_library(|library| library.get(fixture_type_id).cloned())
            .ok_or_else(|| AppError::NotFound {
                what: format!("Fixture type {fixture_type_id}"),
            })?;
        let mut changes = PartialInstrument::default();
        populate_instrument(&definition, mode, &mut changes);

        self.with_store_mut(|store| {
            let not_found = || AppError::NotFound {
                what: format!("Instrument {channel}.{part}"),
            };
            let id = store
                .instruments()?
                .into_iter()
                .find(|i| i.channel == channel && i.part == part)
                .ok_or_else(not_found)?
                .id;
            store.transact(vec![PatchOp::UpdateByKey { id, changes }])?;
            store
                .instruments()?
                .into_iter()
                .find(|i| i.id == id)
                .ok_or_else(not_found)
        })
    }

    fn record_last_import(&self, path: &Path, policy: ImportPolicy) {
        let mut settings = self.settings.lock();
        settings.last_import = Some(LastImport {
            path: path.to_path_buf(),
            policy,
        });
        if let Err(e) = settings::save_settings(&self.app_config_dir, &settings) {
            tracing::warn!(error = %e, "could not record last import");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::import::gdtf::GdtfPackage;
    use crate::model::{AddressMode, DmxMode, FixtureTypeDefinition};

    fn open(dir: &Path) -> AppState {
        let settings = AppSettings::new(dir.join("data"));
        AppState::open(dir.join("config"), settings).unwrap()
    }

    #[tokio::test]
    async fn import_records_last_import() {
        let dir = tempfile::tempdir().unwrap();
        let state = open(dir.path());
        let file = dir.path().join("lw.txt");
        std::fs::write(&file, "Channel\tDimmer\n1\t1:1\n2\t1:2\n").unwrap();

        let report = state
            .import_patch(&file, None, &ImportOptions::default(), None)
            .await;
        assert!(report.ok, "{}", report.message);
        assert_eq!(state.with_store(|s| s.instruments().unwrap().len()), 2);

        let saved = settings::load_settings(&dir.path().join("config")).unwrap();
        assert_eq!(
            saved.last_import,
            Some(LastImport {
                path: file,
                policy: ImportPolicy::Merge,
            })
        );
    }

    #[tokio::test]
    async fn data_dir_override_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config");
        let saved_dir = dir.path().join("data");
        let session_dir = dir.path().join("elsewhere");
        let state =
            AppState::open_in(config.clone(), AppSettings::new(saved_dir.clone()), session_dir.clone())
                .unwrap();
        assert_eq!(state.data_dir, session_dir);

        let file = dir.path().join("lw.txt");
        std::fs::write(&file, "Channel\tDimmer\n1\t1:1\n").unwrap();
        let report = state
            .import_patch(&file, None, &ImportOptions::default(), None)
            .await;
        assert!(report.ok, "{}", report.message);
        assert!(paths::show_path(&session_dir).exists());
        assert!(!paths::show_path(&saved_dir).exists());

        let mut changed = state.settings();
        changed.show_universe1 = true;
        state.update_settings(changed).unwrap();

        let saved = settings::load_settings(&config).unwrap();
        assert_eq!(saved.data_dir, saved_dir);
        assert!(saved.show_universe1);
        assert!(saved.last_import.is_some());
    }

    #[tokio::test]
    async fn failed_import_leaves_settings_alone() {
        let dir = tempfile::tempdir().unwrap();
        let state = open(dir.path());
        let file = dir.path().join("lw.txt");
        std::fs::write(&file, "Dimmer\n1\n").unwrap();

        let report = state
            .import_patch(&file, None, &ImportOptions::default(), Some(ImportPolicy::Replace))
            .await;
        assert!(!report.ok);
        assert!(settings::load_settings(&dir.path().join("config")).is_none());
    }

    #[test]
    fn addresses_follow_display_settings() {
        let dir = tempfile::tempdir().unwrap();
        let state = open(dir.path());
        assert_eq!(state.display_address("1:20"), "20");
        assert_eq!(state.display_address("2/1"), "2:1");

        state.settings.lock().address_mode = AddressMode::Absolute;
        assert_eq!(state.display_address("2:1"), "513");
        assert_eq!(state.display_address("Dimmer A"), "Dimmer A");
    }

    #[tokio::test]
    async fn populate_copies_library_fields() {
        let dir = tempfile::tempdir().unwrap();
        let state = open(dir.path());
        let file = dir.path().join("lw.txt");
        std::fs::write(&file, "Channel\tDimmer\tWattage\n101\t1:1\t750\n").unwrap();
        assert!(state.import_patch(&file, None, &ImportOptions::default(), None).await.ok);

        let package = GdtfPackage {
            definition: FixtureTypeDefinition {
                fixture_type_id: "F-1".into(),
                name: "Spiider".into(),
                short_name: String::new(),
                manufacturer: "Robe".into(),
                description: String::new(),
                thumbnail: None,
                wattage: 660.0,
                weight: 17.5,
                dmx_modes: vec![DmxMode {
                    name: "Standard".into(),
                    footprint: 24,
                    channel_count: 20,
                    channels: Vec::new(),
                }],
                wheels: Vec::new(),
            },
            package: Vec::new(),
        };
        state.with_library_mut(|lib| lib.upsert(package)).unwrap();

        let inst = state.populate_from_library("101", 1, "F-1", None).unwrap();
        assert_eq!(inst.instrument_type, "Spiider");
        assert_eq!(inst.watt, "660");
        assert_eq!(inst.dmx_footprint, 24);
        assert_eq!(inst.fixture_type_id.as_deref(), Some("F-1"));
        assert_eq!(inst.address, "1:1");

        let missing = state.populate_from_library("999", 1, "F-1", None).unwrap_err();
        assert!(matches!(missing, AppError::NotFound { .. }));
        let missing = state.populate_from_library("101", 1, "F-2", None).unwrap_err();
        assert!(matches!(missing, AppError::NotFound { .. }));
    }
}
