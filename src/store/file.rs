use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::model::{Instrument, InstrumentNote, ShowMetadata, ShowSnapshot, TargetReference};
use crate::project;

use super::{apply_ops, PatchOp, PatchStore, StoreError};

/// A store backed by one JSON snapshot file. Every commit rewrites the file
/// atomically; the in-memory copy is replaced only after the write succeeds.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    show: ShowSnapshot,
}

impl FileStore {
    /// Open the snapshot at `path`, starting from an empty show if the file
    /// does not exist yet.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let show = if path.exists() {
            project::load_snapshot(path)?
        } else {
            debug!(path = %path.display(), "no snapshot yet, starting empty");
            ShowSnapshot::empty()
        };
        Ok(Self {
            path: path.to_path_buf(),
            show,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> &ShowSnapshot {
        &self.show
    }
}

impl PatchStore for FileStore {
    fn instruments(&self) -> Result<Vec<Instrument>, StoreError> {
        Ok(self.show.instruments.clone())
    }

    fn targets(&self) -> Result<Vec<TargetReference>, StoreError> {
        Ok(self.show.targets.clone())
    }

    fn notes(&self) -> Result<Vec<InstrumentNote>, StoreError> {
        Ok(self.show.notes.clone())
    }

    fn metadata(&self) -> Result<ShowMetadata, StoreError> {
        Ok(self.show.metadata.clone())
    }

    fn save_metadata(&mut self, metadata: &ShowMetadata) -> Result<(), StoreError> {
        let mut working = self.show.clone();
        working.metadata = metadata.clone();
        project::save_snapshot(&self.path, &working)?;
        self.show = working;
        Ok(())
    }

    fn transact(&mut self, ops: Vec<PatchOp>) -> Result<(), StoreError> {
        let op_count = ops.len();
        let mut working = self.show.clone();
        apply_ops(&mut working, ops)?;
        project::save_snapshot(&self.path, &working)?;
        self.show = working;
        info!(
            path = %self.path.display(),
            ops = op_count,
            instruments = self.show.instruments.len(),
            "committed patch"
        );
        Ok(())
    }
}
