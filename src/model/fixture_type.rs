use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Which byte of a multi-byte DMX channel a channel-map row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum Resolution {
    /// Single-byte channel.
    #[default]
    #[serde(rename = "")]
    Single,
    Coarse,
    Fine,
}

/// One row of a DMX mode's channel map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ModeChannel {
    /// 1-indexed address relative to the fixture's start address.
    pub dmx_address: u32,
    pub attribute: String,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DmxMode {
    pub name: String,
    pub footprint: u32,
    /// Number of DMX channel definitions in the mode (not the footprint).
    pub channel_count: u32,
    /// Sorted by `dmx_address`.
    pub channels: Vec<ModeChannel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WheelSlot {
    pub name: String,
    /// Color as written in the package (CIE `x,y,Y`).
    pub color: String,
    /// `#rrggbb` derived from `color` when it is a valid CIE triple.
    #[serde(default)]
    pub rgb: Option<String>,
    /// Inline `data:` URI of the slot's media file.
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Wheel {
    pub name: String,
    pub slots: Vec<WheelSlot>,
}

/// A fixture-library entry: one manufacturer fixture model.
///
/// Keyed by `fixture_type_id`, an opaque manufacturer-issued string.
/// Re-importing a package with the same id overwrites the entry in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FixtureTypeDefinition {
    pub fixture_type_id: String,
    pub name: String,
    pub short_name: String,
    pub manufacturer: String,
    pub description: String,
    /// Inline `data:` URI of the package thumbnail.
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Watts. 0 when the package does not say.
    pub wattage: f64,
    /// Kilograms. 0 when the package does not say.
    pub weight: f64,
    pub dmx_modes: Vec<DmxMode>,
    pub wheels: Vec<Wheel>,
}

impl FixtureTypeDefinition {
    /// Look up a mode by name, falling back to the first mode.
    pub fn mode_or_first(&self, name: Option<&str>) -> Option<&DmxMode> {
        name.and_then(|n| self.dmx_modes.iter().find(|m| m.name == n))
            .or_else(|| self.dmx_modes.first())
    }

    /// Name shown in the patch `type` column.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.short_name
        } else {
            &self.name
        }
    }
}
