use crate::model::{InstrumentNote, Instrument, ShowMetadata, ShowSnapshot, TargetReference};

use super::{apply_ops, PatchOp, PatchStore, StoreError};

/// In-memory store. Transactions apply to a clone that replaces the live show
/// only on success.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    show: ShowSnapshot,
    reject_commits: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::from_snapshot(ShowSnapshot::empty())
    }

    pub fn from_snapshot(show: ShowSnapshot) -> Self {
        Self {
            show,
            reject_commits: false,
        }
    }

    /// Make every subsequent `transact` fail without applying anything.
    pub fn reject_commits(&mut self, reject: bool) {
        self.reject_commits = reject;
    }

    pub fn snapshot(&self) -> &ShowSnapshot {
        &self.show
    }
}

impl PatchStore for MemoryStore {
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
        self.show.metadata = metadata.clone();
        Ok(())
    }

    fn transact(&mut self, ops: Vec<PatchOp>) -> Result<(), StoreError> {
        if self.reject_commits {
            return Err(StoreError::Rejected("store is rejecting commits".into()));
        }
        let mut working = self.show.clone();
        apply_ops(&mut working, ops)?;
        self.show = working;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::{InstrumentId, PartialInstrument};
    use crate::store::NewInstrument;

    #[test]
    fn failed_transaction_leaves_show_untouched() {
        let mut store = MemoryStore::new();
        store
            .transact(vec![PatchOp::BulkInsert(vec![NewInstrument {
                part: 1,
                fields: PartialInstrument::new("1", 1),
            }])])
            .unwrap();

        // The insert succeeds, the update after it does not: neither may land.
        let result = store.transact(vec![
            PatchOp::BulkInsert(vec![NewInstrument {
                part: 1,
                fields: PartialInstrument::new("2", 1),
            }]),
            PatchOp::UpdateByKey {
                id: InstrumentId(42),
                changes: PartialInstrument::default(),
            },
        ]);

        assert!(result.is_err());
        assert_eq!(store.instruments().unwrap().len(), 1);
    }

    #[test]
    fn rejecting_store_still_accepts_metadata() {
        let mut store = MemoryStore::new();
        store.reject_commits(true);

        assert!(store.transact(vec![PatchOp::ClearInstruments]).is_err());

        let mut meta = ShowMetadata::default();
        meta.name = "Tempest".into();
        store.save_metadata(&meta).unwrap();
        assert_eq!(store.metadata().unwrap().name, "Tempest");
    }
}
