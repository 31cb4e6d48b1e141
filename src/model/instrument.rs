use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::address::footprint_range;

/// Newtype for instrument identity. Assigned by the store, never by adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct InstrumentId(pub u32);

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Part number used when a record does not state one.
pub const DEFAULT_PART: u32 = 1;

/// Footprint used when a record does not state one.
pub const DEFAULT_FOOTPRINT: u32 = 1;

// ── Canonical fields ────────────────────────────────────────────────

/// The canonical instrument fields an adapter can map a source column onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentField {
    Channel,
    Address,
    Type,
    Watt,
    Weight,
    Purpose,
    Position,
    Unit,
    Color,
    Gobo,
    Accessory,
    GelFrameSize,
    DmxFootprint,
    FixtureTypeId,
}

// ── Persisted instrument ────────────────────────────────────────────

/// One lighting unit, or one part of a multi-part unit. `(channel, part)` is
/// unique within a show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Instrument {
    pub id: InstrumentId,
    pub channel: String,
    pub part: u32,
    pub address: String,
    pub dmx_footprint: u32,
    #[serde(rename = "type")]
    pub instrument_type: String,
    pub watt: String,
    pub weight: String,
    pub purpose: String,
    pub position: String,
    pub unit: String,
    pub color: String,
    pub gobo: String,
    pub accessory: String,
    pub gel_frame_size: String,
    /// Weak reference into the fixture library.
    #[serde(default)]
    pub fixture_type_id: Option<String>,
    #[serde(default)]
    #[ts(type = "Record<string, string>")]
    pub custom_fields: IndexMap<String, String>,
}

impl Instrument {
    /// Build a persisted instrument from adapter output, resolving every
    /// absent field to its default. `part` is decided by the caller so that
    /// it can keep `(channel, part)` unique.
    pub fn from_partial(id: InstrumentId, part: u32, partial: &PartialInstrument) -> Self {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        Self {
            id,
            channel: text(&partial.channel),
            part,
            address: text(&partial.address),
            dmx_footprint: partial
                .dmx_footprint
                .filter(|f| *f > 0)
                .unwrap_or(DEFAULT_FOOTPRINT),
            instrument_type: text(&partial.instrument_type),
            watt: text(&partial.watt),
            weight: text(&partial.weight),
            purpose: text(&partial.purpose),
            position: text(&partial.position),
            unit: text(&partial.unit),
            color: text(&partial.color),
            gobo: text(&partial.gobo),
            accessory: text(&partial.accessory),
            gel_frame_size: text(&partial.gel_frame_size),
            fixture_type_id: partial.fixture_type_id.clone(),
            custom_fields: partial.custom_fields.clone(),
        }
    }

    /// Field-level merge: every field present in `changes` overwrites this
    /// record, absent fields are left alone. Custom fields merge per key.
    pub fn apply(&mut self, changes: &PartialInstrument) {
        fn overwrite(dst: &mut String, src: &Option<String>) {
            if let Some(value) = src {
                dst.clone_from(value);
            }
        }

        overwrite(&mut self.channel, &changes.channel);
        if let Some(part) = changes.part {
            self.part = part;
        }
        overwrite(&mut self.address, &changes.address);
        if let Some(footprint) = changes.dmx_footprint.filter(|f| *f > 0) {
            self.dmx_footprint = footprint;
        }
        overwrite(&mut self.instrument_type, &changes.instrument_type);
        overwrite(&mut self.watt, &changes.watt);
        overwrite(&mut self.weight, &changes.weight);
        overwrite(&mut self.purpose, &changes.purpose);
        overwrite(&mut self.position, &changes.position);
        overwrite(&mut self.unit, &changes.unit);
        overwrite(&mut self.color, &changes.color);
        overwrite(&mut self.gobo, &changes.gobo);
        overwrite(&mut self.accessory, &changes.accessory);
        overwrite(&mut self.gel_frame_size, &changes.gel_frame_size);
        if changes.fixture_type_id.is_some() {
            self.fixture_type_id.clone_from(&changes.fixture_type_id);
        }
        for (key, value) in &changes.custom_fields {
            self.custom_fields.insert(key.clone(), value.clone());
        }
    }

    /// The `(universe, offsets)` this instrument occupies, if it is patched.
    pub fn dmx_range(&self) -> Option<(u32, std::ops::RangeInclusive<u32>)> {
        footprint_range(&self.address, self.dmx_footprint)
    }
}

// ── Adapter output ──────────────────────────────────────────────────

/// An instrument as produced by a format adapter. Every canonical field is
/// optional; `None` means "the source did not say", which merge treats as
/// "leave the existing value alone".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(default)]
#[ts(export)]
pub struct PartialInstrument {
    pub channel: Option<String>,
    pub part: Option<u32>,
    pub address: Option<String>,
    pub dmx_footprint: Option<u32>,
    #[serde(rename = "type")]
    pub instrument_type: Option<String>,
    pub watt: Option<String>,
    pub weight: Option<String>,
    pub purpose: Option<String>,
    pub position: Option<String>,
    pub unit: Option<String>,
    pub color: Option<String>,
    pub gobo: Option<String>,
    pub accessory: Option<String>,
    pub gel_frame_size: Option<String>,
    pub fixture_type_id: Option<String>,
    #[ts(type = "Record<string, string>")]
    pub custom_fields: IndexMap<String, String>,
}

impl PartialInstrument {
    pub fn new(channel: impl Into<String>, part: u32) -> Self {
        Self {
            channel: Some(channel.into()),
            part: Some(part),
            ..Self::default()
        }
    }

    /// Set a canonical field from a raw cell. Empty cells stay absent, and a
    /// footprint that is not a positive integer is dropped.
    pub fn set(&mut self, field: InstrumentField, raw: &str) {
        let value = raw.trim();
        if value.is_empty() {
            return;
        }
        let value = value.to_string();
        match field {
            InstrumentField::Channel => self.channel = Some(value),
            InstrumentField::Address => self.address = Some(value),
            InstrumentField::Type => self.instrument_type = Some(value),
            InstrumentField::Watt => self.watt = Some(value),
            InstrumentField::Weight => self.weight = Some(value),
            InstrumentField::Purpose => self.purpose = Some(value),
            InstrumentField::Position => self.position = Some(value),
            InstrumentField::Unit => self.unit = Some(value),
            InstrumentField::Color => self.color = Some(value),
            InstrumentField::Gobo => self.gobo = Some(value),
            InstrumentField::Accessory => self.accessory = Some(value),
            InstrumentField::GelFrameSize => self.gel_frame_size = Some(value),
            InstrumentField::FixtureTypeId => self.fixture_type_id = Some(value),
            InstrumentField::DmxFootprint => match value.parse::<u32>() {
                Ok(footprint) if footprint > 0 => self.dmx_footprint = Some(footprint),
                _ => tracing::debug!(value = %value, "ignoring unusable DMX footprint"),
            },
        }
    }

    /// Set a custom field from a raw cell. Empty cells stay absent.
    pub fn set_custom(&mut self, name: &str, raw: &str) {
        let value = raw.trim();
        if !value.is_empty() {
            self.custom_fields.insert(name.to_string(), value.to_string());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn sample() -> PartialInstrument {
        let mut p = PartialInstrument::new("7", 2);
        p.set(InstrumentField::Address, "1:20");
        p.set(InstrumentField::Type, "Source Four 26");
        p.set(InstrumentField::Color, "R02");
        p.set_custom("Circuit", "A12");
        p
    }

    #[test]
    fn from_partial_resolves_defaults() {
        let inst = Instrument::from_partial(InstrumentId(1), 2, &sample());
        assert_eq!(inst.channel, "7");
        assert_eq!(inst.part, 2);
        assert_eq!(inst.address, "1:20");
        assert_eq!(inst.dmx_footprint, DEFAULT_FOOTPRINT);
        assert_eq!(inst.watt, "");
        assert_eq!(inst.fixture_type_id, None);
        assert_eq!(inst.custom_fields.get("Circuit").map(String::as_str), Some("A12"));
    }

    #[test]
    fn apply_leaves_absent_fields_untouched() {
        let mut inst = Instrument::from_partial(InstrumentId(1), 2, &sample());
        let mut changes = PartialInstrument::default();
        changes.set(InstrumentField::Color, "L201");
        changes.set_custom("Dimmer Rack", "3");

        inst.apply(&changes);

        assert_eq!(inst.color, "L201");
        assert_eq!(inst.instrument_type, "Source Four 26");
        assert_eq!(inst.address, "1:20");
        assert_eq!(inst.custom_fields.get("Circuit").map(String::as_str), Some("A12"));
        assert_eq!(inst.custom_fields.get("Dimmer Rack").map(String::as_str), Some("3"));
    }

    #[test]
    fn empty_cells_and_bad_footprints_stay_absent() {
        let mut p = PartialInstrument::default();
        p.set(InstrumentField::Watt, "   ");
        p.set(InstrumentField::DmxFootprint, "lots");
        p.set(InstrumentField::DmxFootprint, "0");
        p.set_custom("Notes", "");
        assert_eq!(p, PartialInstrument::default());

        p.set(InstrumentField::DmxFootprint, " 16 ");
        assert_eq!(p.dmx_footprint, Some(16));
    }

    #[test]
    fn type_field_serializes_as_type() {
        let inst = Instrument::from_partial(InstrumentId(3), 1, &sample());
        let json = serde_json::to_value(&inst).unwrap();
        assert_eq!(json["type"], "Source Four 26");
        assert!(json.get("instrument_type").is_none());
    }
}
