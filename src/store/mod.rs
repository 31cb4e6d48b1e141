//! The persistence port the merge engine writes through.
//!
//! The engine never holds a global handle: it receives a `&mut dyn PatchStore`
//! and expresses every write as a list of [`PatchOp`]s committed by one
//! [`PatchStore::transact`] call. Implementations must apply the whole list
//! or none of it.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use thiserror::Error;

use crate::model::{
    Instrument, InstrumentId, InstrumentNote, PartialInstrument, ShowMetadata, ShowSnapshot,
    TargetReference,
};
use crate::project::ProjectError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error("instrument {0} not found")]
    UnknownInstrument(InstrumentId),
    #[error("commit rejected: {0}")]
    Rejected(String),
    #[error("no instrument ids left to assign")]
    IdsExhausted,
}

/// An instrument to insert. `part` is already resolved by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInstrument {
    pub part: u32,
    pub fields: PartialInstrument,
}

/// One write inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    /// Remove every instrument (and, with them, every note).
    ClearInstruments,
    BulkInsert(Vec<NewInstrument>),
    /// Field-level update of the instrument with this id.
    UpdateByKey {
        id: InstrumentId,
        changes: PartialInstrument,
    },
    /// Remove one instrument and its notes.
    DeleteInstrument(InstrumentId),
    AddNote(InstrumentNote),
    ReplaceTargets(Vec<TargetReference>),
}

pub trait PatchStore {
    fn instruments(&self) -> Result<Vec<Instrument>, StoreError>;
    fn targets(&self) -> Result<Vec<TargetReference>, StoreError>;
    fn notes(&self) -> Result<Vec<InstrumentNote>, StoreError>;
    fn metadata(&self) -> Result<ShowMetadata, StoreError>;

    /// Persist show metadata on its own, outside any transaction.
    fn save_metadata(&mut self, metadata: &ShowMetadata) -> Result<(), StoreError>;

    /// Apply `ops` atomically: either all of them become visible or none.
    fn transact(&mut self, ops: Vec<PatchOp>) -> Result<(), StoreError>;
}

/// Apply `ops` to a working copy of a show. Callers apply to a clone and
/// swap it in only when this returns `Ok`.
pub(crate) fn apply_ops(show: &mut ShowSnapshot, ops: Vec<PatchOp>) -> Result<(), StoreError> {
    for op in ops {
        match op {
            PatchOp::ClearInstruments => {
                show.instruments.clear();
                show.notes.clear();
            }
            PatchOp::BulkInsert(batch) => {
                for new in batch {
                    let id = show.next_instrument_id().ok_or(StoreError::IdsExhausted)?;
                    show.instruments
                        .push(Instrument::from_partial(InstrumentId(id), new.part, &new.fields));
                    show.next_id = id.saturating_add(1);
                }
            }
            PatchOp::UpdateByKey { id, changes } => {
                let instrument = show
                    .instruments
                    .iter_mut()
                    .find(|i| i.id == id)
                    .ok_or(StoreError::UnknownInstrument(id))?;
                instrument.apply(&changes);
            }
            PatchOp::DeleteInstrument(id) => {
                let before = show.instruments.len();
                show.instruments.retain(|i| i.id != id);
                if show.instruments.len() == before {
                    return Err(StoreError::UnknownInstrument(id));
                }
                show.notes.retain(|n| n.instrument_id != id);
            }
            PatchOp::AddNote(note) => {
                if !show.instruments.iter().any(|i| i.id == note.instrument_id) {
                    return Err(StoreError::UnknownInstrument(note.instrument_id));
                }
                show.notes.push(note);
            }
            PatchOp::ReplaceTargets(targets) => show.targets = targets,
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::NoteType;

    fn insert(channel: &str, part: u32) -> NewInstrument {
        NewInstrument {
            part,
            fields: PartialInstrument::new(channel, part),
        }
    }

    #[test]
    fn bulk_insert_assigns_increasing_ids() {
        let mut show = ShowSnapshot::empty();
        apply_ops(&mut show, vec![PatchOp::BulkInsert(vec![insert("1", 1), insert("2", 1)])])
            .unwrap();
        apply_ops(&mut show, vec![PatchOp::BulkInsert(vec![insert("3", 1)])]).unwrap();

        let ids: Vec<_> = show.instruments.iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn cleared_ids_are_never_handed_out_again() {
        let mut show = ShowSnapshot::empty();
        apply_ops(&mut show, vec![PatchOp::BulkInsert(vec![insert("1", 1), insert("2", 1)])])
            .unwrap();
        apply_ops(
            &mut show,
            vec![PatchOp::ClearInstruments, PatchOp::BulkInsert(vec![insert("3", 1)])],
        )
        .unwrap();

        let ids: Vec<_> = show.instruments.iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec![3]);
        assert_eq!(show.next_id, 4);
    }

    #[test]
    fn deleting_an_instrument_drops_its_notes() {
        let mut show = ShowSnapshot::empty();
        apply_ops(
            &mut show,
            vec![
                PatchOp::BulkInsert(vec![insert("1", 1), insert("2", 1)]),
                PatchOp::AddNote(InstrumentNote::new(InstrumentId(1), "hung", NoteType::User)),
                PatchOp::AddNote(InstrumentNote::new(InstrumentId(2), "focused", NoteType::System)),
                PatchOp::DeleteInstrument(InstrumentId(1)),
            ],
        )
        .unwrap();

        assert_eq!(show.instruments.len(), 1);
        assert_eq!(show.notes.len(), 1);
        assert_eq!(show.notes[0].instrument_id, InstrumentId(2));
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let mut show = ShowSnapshot::empty();
        let err = apply_ops(
            &mut show,
            vec![PatchOp::UpdateByKey {
                id: InstrumentId(9),
                changes: PartialInstrument::default(),
            }],
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::UnknownInstrument(InstrumentId(9))));

        let err = apply_ops(
            &mut show,
            vec![PatchOp::AddNote(InstrumentNote::new(InstrumentId(4), "x", NoteType::User))],
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::UnknownInstrument(InstrumentId(4))));
    }
}
