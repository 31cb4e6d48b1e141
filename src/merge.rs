//! Applies adapter output to a show through a [`PatchStore`].
//!
//! Metadata side effects (custom-field registrations, the show name) are saved
//! first and stay saved whatever happens next. Everything else goes into one
//! `transact` call, so a failed import leaves the instruments and targets
//! exactly as they were.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use ts_rs::TS;

use crate::import::{ImportError, ParseOutput, SideEffects, SourceFormat};
use crate::model::{Instrument, InstrumentId, PartialInstrument, DEFAULT_PART};
use crate::store::{NewInstrument, PatchOp, PatchStore};

/// How an import combines with what the show already holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ImportPolicy {
    /// Drop every existing instrument, then insert the batch.
    Replace,
    /// Update matching instruments field by field and insert the rest.
    #[default]
    Merge,
}

impl FromStr for ImportPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(ImportPolicy::Replace),
            "merge" => Ok(ImportPolicy::Merge),
            other => Err(format!("unknown import policy '{other}'")),
        }
    }
}

impl fmt::Display for ImportPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImportPolicy::Replace => "replace",
            ImportPolicy::Merge => "merge",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct ApplySummary {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    pub targets_replaced: bool,
    pub custom_fields_registered: Vec<String>,
}

// ── Part allocation ─────────────────────────────────────────────────

/// Tracks which `(channel, part)` keys are taken so inserts stay unique.
#[derive(Debug, Default)]
struct PartAllocator {
    taken: HashSet<(String, u32)>,
    highest: HashMap<String, u32>,
}

impl PartAllocator {
    fn seeded(existing: &[Instrument]) -> Self {
        let mut alloc = Self::default();
        for inst in existing {
            alloc.take(&inst.channel, inst.part);
        }
        alloc
    }

    fn take(&mut self, channel: &str, part: u32) {
        self.taken.insert((channel.to_string(), part));
        let highest = self.highest.entry(channel.to_string()).or_insert(0);
        *highest = (*highest).max(part);
    }

    /// The stated part if it is free, otherwise one past the highest part
    /// already used on this channel.
    fn allocate(&mut self, channel: &str, stated: Option<u32>) -> u32 {
        let part = match stated.filter(|p| *p > 0) {
            Some(p) if !self.taken.contains(&(channel.to_string(), p)) => p,
            _ => self
                .highest
                .get(channel)
                .map_or(DEFAULT_PART, |highest| highest.saturating_add(1)),
        };
        self.take(channel, part);
        part
    }
}

fn channel_of(record: &PartialInstrument) -> Option<&str> {
    record.channel.as_deref().map(str::trim).filter(|c| !c.is_empty())
}

// ── Engine ──────────────────────────────────────────────────────────

/// Save metadata side effects. Returns the custom-field names newly registered.
fn apply_metadata(
    store: &mut dyn PatchStore,
    side_effects: &SideEffects,
) -> Result<Vec<String>, ImportError> {
    let mut metadata = store.metadata()?;
    let registered = metadata.register_custom_fields(&side_effects.custom_fields);

    let mut renamed = false;
    if let Some(name) = side_effects.show_name.as_deref().map(str::trim) {
        if !name.is_empty() && metadata.name.trim().is_empty() {
            metadata.name = name.to_string();
            renamed = true;
        }
    }

    if !registered.is_empty() || renamed {
        store.save_metadata(&metadata)?;
    }
    Ok(registered)
}

fn stage_insert(
    alloc: &mut PartAllocator,
    inserts: &mut Vec<NewInstrument>,
    channel: &str,
    mut fields: PartialInstrument,
) {
    let part = alloc.allocate(channel, fields.part);
    fields.part = Some(part);
    inserts.push(NewInstrument { part, fields });
}

fn find_match<'a>(
    existing: &'a [Instrument],
    channel: &str,
    part: Option<u32>,
) -> Option<&'a Instrument> {
    match part {
        Some(part) => existing
            .iter()
            .find(|i| i.channel == channel && i.part == part),
        None => existing.iter().find(|i| i.channel == channel),
    }
}

/// Apply one parsed import to the show behind `store` under `policy`.
pub fn apply(
    store: &mut dyn PatchStore,
    output: ParseOutput,
    policy: ImportPolicy,
) -> Result<ApplySummary, ImportError> {
    let ParseOutput {
        format,
        instruments,
        side_effects,
    } = output;

    let custom_fields_registered = apply_metadata(store, &side_effects)?;
    let existing = store.instruments()?;

    let mut summary = ApplySummary {
        custom_fields_registered,
        ..ApplySummary::default()
    };
    let mut ops = Vec::new();
    let mut inserts = Vec::new();

    match policy {
        ImportPolicy::Replace => {
            summary.removed = existing.len();
            ops.push(PatchOp::ClearInstruments);

            let mut alloc = PartAllocator::default();
            for record in instruments {
                let Some(channel) = channel_of(&record).map(str::to_string) else {
                    warn!("skipping record without a channel");
                    continue;
                };
                stage_insert(&mut alloc, &mut inserts, &channel, record);
            }
        }
        ImportPolicy::Merge => {
            let mut alloc = PartAllocator::seeded(&existing);
            let mut updated: HashSet<InstrumentId> = HashSet::new();
            for record in instruments {
                let Some(channel) = channel_of(&record).map(str::to_string) else {
                    warn!("skipping record without a channel");
                    continue;
                };
                if let Some(found) = find_match(&existing, &channel, record.part) {
                    updated.insert(found.id);
                    ops.push(PatchOp::UpdateByKey {
                        id: found.id,
                        changes: record,
                    });
                } else {
                    stage_insert(&mut alloc, &mut inserts, &channel, record);
                }
            }
            summary.updated = updated.len();
        }
    }

    summary.inserted = inserts.len();
    if !inserts.is_empty() {
        ops.push(PatchOp::BulkInsert(inserts));
    }

    let replace_targets = match policy {
        ImportPolicy::Replace => format == SourceFormat::EosCsv,
        ImportPolicy::Merge => !side_effects.targets.is_empty(),
    };
    if replace_targets {
        ops.push(PatchOp::ReplaceTargets(side_effects.targets));
        summary.targets_replaced = true;
    }

    if !ops.is_empty() {
        store.transact(ops)?;
    }

    info!(
        ?format,
        %policy,
        inserted = summary.inserted,
        updated = summary.updated,
        removed = summary.removed,
        targets_replaced = summary.targets_replaced,
        "import applied"
    );
    Ok(summary)
}
