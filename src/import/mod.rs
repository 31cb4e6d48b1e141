pub mod eos_csv;
pub mod fixture_layer;
pub mod gdtf;
pub mod service;
pub mod tab_delimited;

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::model::{PartialInstrument, TargetReference};
use crate::store::StoreError;

// ── Error type (shared across all adapters) ─────────────────────────

#[derive(Debug, Error)]
pub enum ImportError {
    /// The input is not the format it claims to be, or carries no usable data.
    #[error("Format error: {0}")]
    Format(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The batch could not be committed. Nothing was written.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl ImportError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        ImportError::Format(msg.into())
    }
}

impl From<quick_xml::Error> for ImportError {
    fn from(e: quick_xml::Error) -> Self {
        ImportError::Format(format!("malformed XML: {e}"))
    }
}

impl From<csv::Error> for ImportError {
    fn from(e: csv::Error) -> Self {
        ImportError::Format(format!("unreadable delimited text: {e}"))
    }
}

impl From<zip::result::ZipError> for ImportError {
    fn from(e: zip::result::ZipError) -> Self {
        ImportError::Format(format!("unreadable package: {e}"))
    }
}

// ── Source formats ──────────────────────────────────────────────────

/// The external formats the engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum SourceFormat {
    EosCsv,
    TabDelimited,
    FixtureLayerXml,
    Gdtf,
}

impl SourceFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(SourceFormat::EosCsv),
            "txt" | "tsv" => Some(SourceFormat::TabDelimited),
            "xml" => Some(SourceFormat::FixtureLayerXml),
            "gdtf" => Some(SourceFormat::Gdtf),
            _ => None,
        }
    }
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eos" | "eos-csv" | "csv" => Ok(SourceFormat::EosCsv),
            "tab" | "tsv" | "lightwright" => Ok(SourceFormat::TabDelimited),
            "xml" | "layers" => Ok(SourceFormat::FixtureLayerXml),
            "gdtf" => Ok(SourceFormat::Gdtf),
            other => Err(format!("unknown format '{other}'")),
        }
    }
}

// ── Adapter contract ────────────────────────────────────────────────

/// Caller-supplied knobs shared by the patch adapters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(default)]
#[ts(export)]
pub struct ImportOptions {
    /// Source header names to materialize. `None` keeps every column.
    /// Only the tab-delimited adapter honours it.
    pub field_allow_list: Option<Vec<String>>,
    /// Show name to record if the show does not have one yet.
    pub show_name: Option<String>,
}

/// Everything an adapter produces besides the instruments themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct SideEffects {
    pub targets: Vec<TargetReference>,
    /// Custom-field names encountered in the source, in column order.
    pub custom_fields: Vec<String>,
    pub show_name: Option<String>,
}

/// Adapter output, ready for the merge engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct ParseOutput {
    pub format: SourceFormat,
    pub instruments: Vec<PartialInstrument>,
    pub side_effects: SideEffects,
}

// ── XML helpers (shared) ────────────────────────────────────────────

/// Element name as an owned string.
pub(crate) fn tag_name(name: quick_xml::name::QName<'_>) -> String {
    String::from_utf8_lossy(name.as_ref()).to_string()
}

/// One attribute by name, entity-decoded. Values that fail to decode fall back
/// to their raw text.
pub(crate) fn xml_attr(e: &quick_xml::events::BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key.as_bytes())
        .map(|attr| match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).to_string(),
        })
}

// ── Part numbering (shared) ─────────────────────────────────────────

/// Per-channel running counter: the first row for a channel is part 1, each
/// repeat of that channel takes the next number.
#[derive(Debug, Default)]
pub struct PartCounter {
    seen: HashMap<String, u32>,
}

impl PartCounter {
    pub fn next(&mut self, channel: &str) -> u32 {
        let count = self.seen.entry(channel.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

// ── CIE XYZ → sRGB conversion (shared) ─────────────────────────────

/// Convert CIE XYZ (D65, 0-100 scale) to 8-bit sRGB.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn xyz_to_srgb(x: f64, y: f64, z: f64) -> [u8; 3] {
    // Apply sRGB gamma
    fn gamma(c: f64) -> f64 {
        let c = c.clamp(0.0, 1.0);
        if c <= 0.003_130_8 {
            c * 12.92
        } else {
            1.055 * c.powf(1.0 / 2.4) - 0.055
        }
    }

    // Normalize from 0-100 to 0-1
    let x = x / 100.0;
    let y = y / 100.0;
    let z = z / 100.0;

    // XYZ to linear sRGB (D65 reference, sRGB primaries)
    let r_lin = x * 3.240_454_2 + y * -1.537_138_5 + z * -0.498_531_4;
    let g_lin = x * -0.969_266_0 + y * 1.876_010_8 + z * 0.041_556_0;
    let b_lin = x * 0.055_643_4 + y * -0.204_025_9 + z * 1.057_225_2;

    [
        (gamma(r_lin) * 255.0).round() as u8,
        (gamma(g_lin) * 255.0).round() as u8,
        (gamma(b_lin) * 255.0).round() as u8,
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn part_counter_runs_per_channel() {
        let mut parts = PartCounter::default();
        assert_eq!(parts.next("1"), 1);
        assert_eq!(parts.next("2"), 1);
        assert_eq!(parts.next("1"), 2);
        assert_eq!(parts.next("1"), 3);
        assert_eq!(parts.next("2"), 2);
    }

    #[test]
    fn detects_format_from_extension() {
        assert_eq!(
            SourceFormat::from_path(Path::new("show/Export.CSV")),
            Some(SourceFormat::EosCsv)
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("lw.txt")),
            Some(SourceFormat::TabDelimited)
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("layers.xml")),
            Some(SourceFormat::FixtureLayerXml)
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("Robe@Spiider.gdtf")),
            Some(SourceFormat::Gdtf)
        );
        assert_eq!(SourceFormat::from_path(Path::new("notes")), None);
    }

    #[test]
    fn test_xyz_to_srgb_white() {
        let [r, g, b] = xyz_to_srgb(95.047, 100.0, 108.883);
        assert!(r >= 254, "r={r}");
        assert!(g >= 254, "g={g}");
        assert!(b >= 254, "b={b}");
    }

    #[test]
    fn test_xyz_to_srgb_black() {
        assert_eq!(xyz_to_srgb(0.0, 0.0, 0.0), [0, 0, 0]);
    }
}
