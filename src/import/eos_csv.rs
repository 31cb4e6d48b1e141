//! EOS console CSV exports.
//!
//! A file carries two independent, optional sections:
//!
//! ```text
//! START_CHANNELS
//! CHANNEL,ADDRESS,FIXTURE_TYPE,LABEL,GEL,WATT,...
//! 1,1/1,Source Four,SL Front,R02,750
//! END_CHANNELS
//! 5,Group,1,12,6d1f9c1e-...,1,Front Wash,1 2 3
//! ```
//!
//! Target rows are recognised by shape alone (type code, type name, UUID in
//! column 4), wherever they appear outside the channel section. The check is
//! positional: a reordered export can hide targets, and such rows are skipped
//! rather than reported.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::{InstrumentField, PartialInstrument, TargetReference, TargetType};

use super::{ImportError, ImportOptions, ParseOutput, PartCounter, SideEffects, SourceFormat};

pub const START_CHANNELS: &str = "START_CHANNELS";
pub const END_CHANNELS: &str = "END_CHANNELS";

/// Highest `TEXTn` column EOS exports.
const MAX_TEXT_COLUMN: u8 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Column {
    Field(InstrumentField),
    Custom(String),
    Ignored,
}

fn column_for(header: &str) -> Column {
    match header {
        "CHANNEL" => Column::Field(InstrumentField::Channel),
        "ADDRESS" => Column::Field(InstrumentField::Address),
        "FIXTURE_TYPE" => Column::Field(InstrumentField::Type),
        "LABEL" => Column::Field(InstrumentField::Purpose),
        "GEL" => Column::Field(InstrumentField::Color),
        "WATT" => Column::Field(InstrumentField::Watt),
        "PROPORTION" | "CURVE" | "NOTES" => Column::Custom(header.to_string()),
        _ if is_text_column(header) => Column::Custom(header.to_string()),
        _ => Column::Ignored,
    }
}

fn is_text_column(header: &str) -> bool {
    header
        .strip_prefix("TEXT")
        .and_then(|n| n.parse::<u8>().ok())
        .is_some_and(|n| (1..=MAX_TEXT_COLUMN).contains(&n))
}

enum Section {
    Outside,
    AwaitingHeader,
    Channels {
        columns: Vec<Column>,
        channel_index: usize,
    },
}

/// Parse an EOS CSV export.
pub fn parse(text: &str, options: &ImportOptions) -> Result<ParseOutput, ImportError> {
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut section = Section::Outside;
    let mut parts = PartCounter::default();
    let mut instruments = Vec::new();
    let mut custom_fields = Vec::new();
    let mut targets: Vec<TargetReference> = Vec::new();

    for record in reader.records() {
        let record = record?;
        let first = record.get(0).map_or("", str::trim);

        let next = match &section {
            Section::Outside => {
                if first == START_CHANNELS {
                    Some(Section::AwaitingHeader)
                } else {
                    if let Some(target) = target_from_row(&record) {
                        add_target(&mut targets, target);
                    }
                    None
                }
            }
            Section::AwaitingHeader => {
                if first == END_CHANNELS {
                    return Err(ImportError::format("channel section has no header row"));
                }
                if let Some(target) = target_from_row(&record) {
                    add_target(&mut targets, target);
                    continue;
                }
                let columns: Vec<Column> =
                    record.iter().map(|h| column_for(h.trim())).collect();
                let channel_index = columns
                    .iter()
                    .position(|c| *c == Column::Field(InstrumentField::Channel))
                    .ok_or_else(|| {
                        ImportError::format("channel section header has no CHANNEL column")
                    })?;
                for column in &columns {
                    if let Column::Custom(name) = column {
                        custom_fields.push(name.clone());
                    }
                }
                Some(Section::Channels {
                    columns,
                    channel_index,
                })
            }
            Section::Channels {
                columns,
                channel_index,
            } => {
                if first == END_CHANNELS {
                    Some(Section::Outside)
                } else {
                    if let Some(target) = target_from_row(&record) {
                        add_target(&mut targets, target);
                    } else if let Some(instrument) =
                        channel_row(&record, columns, *channel_index, &mut parts)
                    {
                        instruments.push(instrument);
                    }
                    None
                }
            }
        };
        if let Some(next) = next {
            section = next;
        }
    }

    match section {
        Section::AwaitingHeader => {
            return Err(ImportError::format("channel section has no header row"));
        }
        Section::Channels { .. } => warn!("{END_CHANNELS} missing, channel section ends at end of file"),
        Section::Outside => {}
    }

    if instruments.is_empty() && targets.is_empty() {
        return Err(ImportError::format(
            "no channel or target data found in EOS CSV",
        ));
    }

    Ok(ParseOutput {
        format: SourceFormat::EosCsv,
        instruments,
        side_effects: SideEffects {
            targets,
            custom_fields,
            show_name: options.show_name.clone(),
        },
    })
}

fn channel_row(
    record: &csv::StringRecord,
    columns: &[Column],
    channel_index: usize,
    parts: &mut PartCounter,
) -> Option<PartialInstrument> {
    let channel = record.get(channel_index).map_or("", str::trim);
    if channel.is_empty() {
        debug!(line = ?record.position().map(csv::Position::line), "skipping row without a channel");
        return None;
    }
    let mut instrument = PartialInstrument::new(channel, parts.next(channel));
    for (index, column) in columns.iter().enumerate() {
        let cell = record.get(index).unwrap_or("");
        match column {
            Column::Field(InstrumentField::Channel) | Column::Ignored => {}
            Column::Field(field) => instrument.set(*field, cell),
            Column::Custom(name) => instrument.set_custom(name, cell),
        }
    }
    Some(instrument)
}

// ── Targets ─────────────────────────────────────────────────────────

fn is_canonical_uuid(text: &str) -> bool {
    // Only the hyphenated form is exactly 36 characters long.
    text.len() == 36 && Uuid::try_parse(text).is_ok()
}

/// Recognise a target row: `type code, type name, _, id, uuid, _, label, channels`.
fn target_from_row(record: &csv::StringRecord) -> Option<TargetReference> {
    let target_type = TargetType::from_code(record.get(0)?, record.get(1)?)?;
    if !is_canonical_uuid(record.get(4)?.trim()) {
        return None;
    }
    let target_id = record.get(3).map_or("", str::trim).to_string();
    if target_id.is_empty() {
        return None;
    }
    let channels = record
        .get(7)
        .map(|cell| {
            cell.split([' ', ',', ';'])
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(TargetReference {
        target_type,
        target_id,
        label: record.get(6).map_or("", str::trim).to_string(),
        channels,
    })
}

/// Rows repeating a `(type, id)` pair extend the same target.
fn add_target(targets: &mut Vec<TargetReference>, target: TargetReference) {
    if let Some(existing) = targets
        .iter_mut()
        .find(|t| t.target_type == target.target_type && t.target_id == target.target_id)
    {
        if existing.label.is_empty() {
            existing.label = target.label;
        }
        for channel in target.channels {
            if !existing.channels.contains(&channel) {
                existing.channels.push(channel);
            }
        }
    } else {
        targets.push(target);
    }
}
