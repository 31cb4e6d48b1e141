use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::instrument::{Instrument, InstrumentId};

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

// ── Show metadata ───────────────────────────────────────────────────

/// Singleton show record. `custom_field_definitions` is the ordered registry
/// of names that `Instrument::custom_fields` may use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(default)]
#[ts(export)]
pub struct ShowMetadata {
    pub name: String,
    pub venue: String,
    pub designer: String,
    pub date: String,
    #[ts(type = "Array<string>")]
    pub custom_field_definitions: IndexSet<String>,
}

impl ShowMetadata {
    /// Append custom-field names not yet declared. Returns the names added.
    pub fn register_custom_fields<'a, I>(&mut self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        names
            .into_iter()
            .filter(|name| !name.is_empty())
            .filter(|name| self.custom_field_definitions.insert((*name).clone()))
            .cloned()
            .collect()
    }
}

// ── EOS targets ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum TargetType {
    Group,
    Preset,
    Sub,
}

impl TargetType {
    /// EOS numeric type code paired with its literal name.
    pub fn from_code(code: &str, name: &str) -> Option<Self> {
        match (code.trim(), name.trim()) {
            ("2", "Sub") => Some(TargetType::Sub),
            ("4", "Preset") => Some(TargetType::Preset),
            ("5", "Group") => Some(TargetType::Group),
            _ => None,
        }
    }
}

/// A console target (group, preset, or sub) read from an EOS export.
/// Never merged: the whole set is replaced on import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TargetReference {
    pub target_type: TargetType,
    pub target_id: String,
    pub label: String,
    pub channels: Vec<String>,
}

// ── Notes ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum NoteType {
    User,
    System,
}

/// Append-only audit entry attached to an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InstrumentNote {
    pub instrument_id: InstrumentId,
    pub text: String,
    pub note_type: NoteType,
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
}

impl InstrumentNote {
    pub fn new(instrument_id: InstrumentId, text: impl Into<String>, note_type: NoteType) -> Self {
        Self {
            instrument_id,
            text: text.into(),
            note_type,
            timestamp: Utc::now(),
        }
    }
}

// ── Snapshot ────────────────────────────────────────────────────────

/// The canonical persisted show document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ShowSnapshot {
    pub version: u32,
    #[ts(type = "string")]
    pub exported_at: DateTime<Utc>,
    pub metadata: ShowMetadata,
    pub instruments: Vec<Instrument>,
    #[serde(default)]
    pub targets: Vec<TargetReference>,
    #[serde(default)]
    pub notes: Vec<InstrumentNote>,
    /// Lowest id never handed out. Ids are not reused, even after a clear.
    #[serde(default)]
    pub next_id: u32,
}

impl ShowSnapshot {
    pub fn empty() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            exported_at: Utc::now(),
            metadata: ShowMetadata::default(),
            instruments: Vec::new(),
            targets: Vec::new(),
            notes: Vec::new(),
            next_id: 1,
        }
    }

    /// The id the next inserted instrument receives: `next_id`, raised to one
    /// past the highest live id for snapshots written before it was tracked.
    /// `None` once the id space is used up.
    pub fn next_instrument_id(&self) -> Option<u32> {
        let past_live = match self.instruments.iter().map(|i| i.id.0).max() {
            Some(max) => max.checked_add(1)?,
            None => 1,
        };
        Some(self.next_id.max(past_live))
    }
}
