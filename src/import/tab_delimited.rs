//! Tab-delimited paperwork exports (Lightwright and friends).
//!
//! The first line names the columns. Known headers map onto canonical fields
//! through [`HEADER_ALIASES`]; everything else becomes a custom field.

use tracing::debug;

use crate::model::{InstrumentField, PartialInstrument};

use super::{ImportError, ImportOptions, ParseOutput, PartCounter, SideEffects, SourceFormat};

/// The one column every file must have.
pub const CHANNEL_HEADER: &str = "Channel";

/// Source header → canonical field. Matching is case-sensitive; several
/// headers may alias the same field.
pub const HEADER_ALIASES: &[(&str, InstrumentField)] = &[
    ("Dimmer", InstrumentField::Address),
    ("Address", InstrumentField::Address),
    ("Instrument Type", InstrumentField::Type),
    ("Type", InstrumentField::Type),
    ("Wattage", InstrumentField::Watt),
    ("Load", InstrumentField::Watt),
    ("Weight", InstrumentField::Weight),
    ("Purpose", InstrumentField::Purpose),
    ("Use", InstrumentField::Purpose),
    ("Position", InstrumentField::Position),
    ("Unit#", InstrumentField::Unit),
    ("Unit Number", InstrumentField::Unit),
    ("Unit", InstrumentField::Unit),
    ("Color", InstrumentField::Color),
    ("Gobo", InstrumentField::Gobo),
    ("Gobo 1", InstrumentField::Gobo),
    ("Accessory", InstrumentField::Accessory),
    ("Accessories", InstrumentField::Accessory),
    ("Frame Size", InstrumentField::GelFrameSize),
    ("DMX Footprint", InstrumentField::DmxFootprint),
    ("Footprint", InstrumentField::DmxFootprint),
];

fn alias(header: &str) -> Option<InstrumentField> {
    HEADER_ALIASES
        .iter()
        .find(|(name, _)| *name == header)
        .map(|(_, field)| *field)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Column {
    Channel,
    Field(InstrumentField),
    Custom(String),
    Ignored,
}

fn build_columns(headers: &csv::StringRecord, allow_list: Option<&[String]>) -> Vec<Column> {
    let mut have_channel = false;
    headers
        .iter()
        .map(|raw| {
            let header = raw.trim();
            if header == CHANNEL_HEADER && !have_channel {
                have_channel = true;
                return Column::Channel;
            }
            if header.is_empty() || header == CHANNEL_HEADER {
                return Column::Ignored;
            }
            if allow_list.is_some_and(|allowed| !allowed.iter().any(|a| a == header)) {
                debug!(header, "column not in allow-list, dropping");
                return Column::Ignored;
            }
            alias(header).map_or_else(|| Column::Custom(header.to_string()), Column::Field)
        })
        .collect()
}

fn strip_parens(channel: &str) -> &str {
    channel
        .trim()
        .trim_matches(|c| c == '(' || c == ')')
        .trim()
}

/// Parse a tab-delimited export.
pub fn parse(text: &str, options: &ImportOptions) -> Result<ParseOutput, ImportError> {
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut records = reader.records();

    let headers = records
        .next()
        .transpose()?
        .ok_or_else(|| ImportError::format("tab-delimited file is empty"))?;
    let columns = build_columns(&headers, options.field_allow_list.as_deref());
    let channel_index = columns
        .iter()
        .position(|c| *c == Column::Channel)
        .ok_or_else(|| {
            ImportError::format(format!("header row has no '{CHANNEL_HEADER}' column"))
        })?;

    let custom_fields: Vec<String> = columns
        .iter()
        .filter_map(|c| match c {
            Column::Custom(name) => Some(name.clone()),
            _ => None,
        })
        .collect();

    let mut parts = PartCounter::default();
    let mut instruments = Vec::new();

    for record in records {
        let record = record?;
        let channel = strip_parens(record.get(channel_index).unwrap_or(""));
        if channel.is_empty() {
            continue;
        }
        let mut instrument = PartialInstrument::new(channel, parts.next(channel));
        for (index, column) in columns.iter().enumerate() {
            let cell = record.get(index).unwrap_or("");
            match column {
                Column::Channel | Column::Ignored => {}
                Column::Field(field) => instrument.set(*field, cell),
                Column::Custom(name) => instrument.set_custom(name, cell),
            }
        }
        instruments.push(instrument);
    }

    if instruments.is_empty() {
        return Err(ImportError::format(
            "no rows with a channel found in tab-delimited file",
        ));
    }

    Ok(ParseOutput {
        format: SourceFormat::TabDelimited,
        instruments,
        side_effects: SideEffects {
            targets: Vec::new(),
            custom_fields,
            show_name: options.show_name.clone(),
        },
    })
}
