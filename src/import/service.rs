//! File-level import orchestration: read at the I/O boundary, pick the
//! adapter, apply the result, and report back in terms a user can act on.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};
use ts_rs::TS;

use crate::error::AppError;
use crate::library::{FixtureLibrary, UpsertOutcome};
use crate::merge::{self, ApplySummary, ImportPolicy};
use crate::store::PatchStore;
use crate::validation;

use super::gdtf::{self, GdtfPackage};
use super::{eos_csv, fixture_layer, tab_delimited, ImportError, ImportOptions, ParseOutput, SourceFormat};

/// Outcome of one file import, success or not.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct ImportReport {
    pub ok: bool,
    pub message: String,
    pub path: PathBuf,
    pub format: Option<SourceFormat>,
    pub summary: Option<ApplySummary>,
    /// Number of instrument pairs whose DMX ranges collide after the import.
    pub overlap_count: usize,
    pub library_outcome: Option<UpsertOutcome>,
    pub fixture_type_id: Option<String>,
    pub error: Option<AppError>,
}

impl ImportReport {
    fn new(path: &Path, format: Option<SourceFormat>) -> Self {
        Self {
            ok: false,
            message: String::new(),
            path: path.to_path_buf(),
            format,
            summary: None,
            overlap_count: 0,
            library_outcome: None,
            fixture_type_id: None,
            error: None,
        }
    }

    fn failed(mut self, error: AppError) -> Self {
        warn!(path = %self.path.display(), %error, "import failed");
        self.ok = false;
        self.message = error.to_string();
        self.error = Some(error);
        self
    }
}

/// Resolve the adapter for `path`: an explicit format wins over the extension.
pub fn detect_format(path: &Path, format: Option<SourceFormat>) -> Result<SourceFormat, ImportError> {
    format
        .or_else(|| SourceFormat::from_path(path))
        .ok_or_else(|| {
            ImportError::format(format!(
                "cannot tell the format of {}; name it explicitly",
                path.display()
            ))
        })
}

/// Run the text adapter for `format`.
pub fn parse_text(
    format: SourceFormat,
    text: &str,
    options: &ImportOptions,
) -> Result<ParseOutput, ImportError> {
    match format {
        SourceFormat::EosCsv => eos_csv::parse(text, options),
        SourceFormat::TabDelimited => tab_delimited::parse(text, options),
        SourceFormat::FixtureLayerXml => fixture_layer::parse(text, options),
        SourceFormat::Gdtf => Err(ImportError::format(
            "GDTF packages describe fixture types; import them into the fixture library",
        )),
    }
}

/// Read and parse a patch file without touching any store.
pub async fn read_patch_file(
    path: &Path,
    format: Option<SourceFormat>,
    options: &ImportOptions,
) -> Result<ParseOutput, ImportError> {
    let format = detect_format(path, format)?;
    let bytes = tokio::fs::read(path).await?;
    let text = decode_text(path, &bytes);
    parse_text(format, text.trim_start_matches('\u{feff}'), options)
}

/// Decode file bytes as UTF-8, replacing invalid sequences with U+FFFD.
fn decode_text<'a>(path: &Path, bytes: &'a [u8]) -> Cow<'a, str> {
    let text = String::from_utf8_lossy(bytes);
    if let Cow::Owned(_) = text {
        warn!(
            path = %path.display(),
            "file is not valid UTF-8, invalid bytes replaced with U+FFFD"
        );
    }
    text
}

/// Import a patch file into `store` under `policy`.
pub async fn import_patch_file(
    store: &mut dyn PatchStore,
    path: &Path,
    format: Option<SourceFormat>,
    options: &ImportOptions,
    policy: ImportPolicy,
) -> ImportReport {
    let parsed = read_patch_file(path, format, options).await;
    finish_patch_import(store, path, format, parsed, policy)
}

/// The synchronous half of [`import_patch_file`]: apply an already-read file.
/// Hosts that guard the store with a lock read first, then call this under it.
pub fn finish_patch_import(
    store: &mut dyn PatchStore,
    path: &Path,
    format: Option<SourceFormat>,
    parsed: Result<ParseOutput, ImportError>,
    policy: ImportPolicy,
) -> ImportReport {
    let detected = format.or_else(|| SourceFormat::from_path(path));
    let report = ImportReport::new(path, detected);

    let output = match parsed {
        Ok(output) => output,
        Err(e) => return report.failed(e.into()),
    };
    let format = output.format;

    let summary = match merge::apply(store, output, policy) {
        Ok(summary) => summary,
        Err(e) => return report.failed(e.into()),
    };

    let overlap_count = match store.instruments() {
        Ok(instruments) => validation::all_overlaps(&instruments).len(),
        Err(e) => {
            warn!(error = %e, "could not reload patch for overlap check");
            0
        }
    };

    info!(
        path = %path.display(),
        ?format,
        %policy,
        inserted = summary.inserted,
        updated = summary.updated,
        overlap_count,
        "patch file imported"
    );
    ImportReport {
        ok: true,
        message: describe(&summary, overlap_count),
        format: Some(format),
        summary: Some(summary),
        overlap_count,
        ..report
    }
}

fn describe(summary: &ApplySummary, overlap_count: usize) -> String {
    let mut message = format!(
        "Imported {} new, updated {}",
        summary.inserted, summary.updated
    );
    if summary.removed > 0 {
        message.push_str(&format!(", removed {}", summary.removed));
    }
    if summary.targets_replaced {
        message.push_str(", replaced targets");
    }
    if !summary.custom_fields_registered.is_empty() {
        message.push_str(&format!(
            ", new custom fields: {}",
            summary.custom_fields_registered.join(", ")
        ));
    }
    if overlap_count > 0 {
        message.push_str(&format!(" ({overlap_count} address overlaps)"));
    }
    message
}

/// Read and parse a GDTF package. Decompression runs on the blocking pool.
pub async fn read_gdtf_file(path: &Path) -> Result<GdtfPackage, ImportError> {
    let bytes = tokio::fs::read(path).await?;
    tokio::task::spawn_blocking(move || gdtf::parse_package(bytes))
        .await
        .map_err(|e| ImportError::Io(std::io::Error::other(e.to_string())))?
}

/// Import a GDTF package into the fixture library.
pub async fn import_gdtf_file(library: &mut FixtureLibrary, path: &Path) -> ImportReport {
    let package = read_gdtf_file(path).await;
    finish_gdtf_import(library, path, package)
}

/// The synchronous half of [`import_gdtf_file`].
pub fn finish_gdtf_import(
    library: &mut FixtureLibrary,
    path: &Path,
    package: Result<GdtfPackage, ImportError>,
) -> ImportReport {
    let report = ImportReport::new(path, Some(SourceFormat::Gdtf));

    let package = match package {
        Ok(package) => package,
        Err(e) => return report.failed(e.into()),
    };
    let id = package.definition.fixture_type_id.clone();
    let name = package.definition.display_name().to_string();

    let outcome = match library.upsert(package) {
        Ok(outcome) => outcome,
        Err(e) => return report.failed(e.into()),
    };

    let verb = match outcome {
        UpsertOutcome::Inserted => "Added",
        UpsertOutcome::Updated => "Updated",
    };
    ImportReport {
        ok: true,
        message: format!("{verb} fixture type {name}"),
        library_outcome: Some(outcome),
        fixture_type_id: Some(id),
        ..report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use std::io::{Cursor, Write};

    use super::*;
    use crate::store::{FileStore, MemoryStore};

    const EOS: &str = "START_CHANNELS\n\
        CHANNEL,PART,ADDRESS,FIXTURE_TYPE\n\
        1,1,1:1,Source Four\n\
        2,1,1:1,Source Four\n\
        END_CHANNELS\n";

    fn write(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[tokio::test]
    async fn csv_file_lands_in_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "export.csv", EOS.as_bytes());
        let mut store = MemoryStore::new();

        let report = import_patch_file(
            &mut store,
            &path,
            None,
            &ImportOptions::default(),
            ImportPolicy::Merge,
        )
        .await;

        assert!(report.ok, "{}", report.message);
        assert_eq!(report.format, Some(SourceFormat::EosCsv));
        assert_eq!(report.summary.as_ref().unwrap().inserted, 2);
        assert_eq!(report.overlap_count, 1);
        assert!(report.message.contains("1 address overlaps"), "{}", report.message);
        assert_eq!(store.instruments().unwrap().len(), 2);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let path = Path::new("lw.txt");
        assert!(matches!(decode_text(path, "Caf\u{e9}".as_bytes()), Cow::Borrowed("Caf\u{e9}")));
        assert_eq!(decode_text(path, b"Caf\xe9"), "Caf\u{fffd}");
    }

    #[tokio::test]
    async fn latin1_file_still_imports() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "lw.txt", b"Channel\tDimmer\tMyCol\n1\t1:1\tCaf\xe9\n");
        let mut store = MemoryStore::new();

        let report = import_patch_file(
            &mut store,
            &path,
            None,
            &ImportOptions::default(),
            ImportPolicy::Merge,
        )
        .await;
        assert!(report.ok, "{}", report.message);
        let inst = &store.instruments().unwrap()[0];
        assert_eq!(inst.custom_fields.get("MyCol").map(String::as_str), Some("Caf\u{fffd}"));
    }

    #[tokio::test]
    async fn explicit_format_beats_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "paperwork.dat", b"Channel\tDimmer\n4\t2:1\n");
        let mut store = MemoryStore::new();

        let report = import_patch_file(
            &mut store,
            &path,
            Some(SourceFormat::TabDelimited),
            &ImportOptions::default(),
            ImportPolicy::Replace,
        )
        .await;
        assert!(report.ok, "{}", report.message);
        assert_eq!(store.instruments().unwrap()[0].address, "2:1");
    }

    #[tokio::test]
    async fn unknown_extension_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "paperwork.dat", b"whatever");
        let mut store = MemoryStore::new();

        let report = import_patch_file(
            &mut store,
            &path,
            None,
            &ImportOptions::default(),
            ImportPolicy::Merge,
        )
        .await;
        assert!(!report.ok);
        assert!(matches!(report.error, Some(AppError::FormatError { .. })));
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::new();
        let report = import_patch_file(
            &mut store,
            &dir.path().join("gone.csv"),
            None,
            &ImportOptions::default(),
            ImportPolicy::Merge,
        )
        .await;
        assert!(!report.ok);
        assert!(matches!(report.error, Some(AppError::IoError { .. })));
    }

    #[tokio::test]
    async fn file_store_commit_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "export.csv", EOS.as_bytes());
        let show = dir.path().join("show.json");

        let mut store = FileStore::open(&show).unwrap();
        let options = ImportOptions {
            show_name: Some("Hamlet".into()),
            ..ImportOptions::default()
        };
        let report =
            import_patch_file(&mut store, &path, None, &options, ImportPolicy::Replace).await;
        assert!(report.ok, "{}", report.message);

        let reopened = FileStore::open(&show).unwrap();
        assert_eq!(reopened.instruments().unwrap().len(), 2);
        assert_eq!(reopened.metadata().unwrap().name, "Hamlet");
    }

    #[tokio::test]
    async fn gdtf_goes_to_library_not_patch() {
        let dir = tempfile::tempdir().unwrap();
        let xml = r#"<GDTF><FixtureType FixtureTypeID="F-1" Name="Par"></FixtureType></GDTF>"#;
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file(gdtf::DESCRIPTION_FILE, zip::write::FileOptions::<()>::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        let path = write(dir.path(), "par.gdtf", &bytes);

        let mut store = MemoryStore::new();
        let report = import_patch_file(
            &mut store,
            &path,
            None,
            &ImportOptions::default(),
            ImportPolicy::Merge,
        )
        .await;
        assert!(!report.ok);

        let mut library = FixtureLibrary::open(&dir.path().join("lib")).unwrap();
        let report = import_gdtf_file(&mut library, &path).await;
        assert!(report.ok, "{}", report.message);
        assert_eq!(report.library_outcome, Some(UpsertOutcome::Inserted));
        assert_eq!(report.fixture_type_id.as_deref(), Some("F-1"));
        assert_eq!(report.message, "Added fixture type Par");

        let again = import_gdtf_file(&mut library, &path).await;
        assert_eq!(again.library_outcome, Some(UpsertOutcome::Updated));
        assert_eq!(library.len(), 1);
    }

    #[tokio::test]
    async fn broken_gdtf_reports_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "broken.gdtf", b"not a zip");
        let mut library = FixtureLibrary::open(dir.path()).unwrap();

        let report = import_gdtf_file(&mut library, &path).await;
        assert!(!report.ok);
        assert!(matches!(report.error, Some(AppError::FormatError { .. })));
        assert!(library.is_empty());
    }
}
