//! GDTF fixture-type packages.
//!
//! A `.gdtf` file is a ZIP archive with a `description.xml` at its root plus
//! media (wheel slot images under `wheels/`, a thumbnail). We read the
//! description in one pass into raw records, then resolve media against the
//! archive and assemble a [`FixtureTypeDefinition`].

use std::io::{Cursor, Read};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, info, warn};

use crate::model::{
    DmxMode, FixtureTypeDefinition, ModeChannel, Resolution, Wheel, WheelSlot, UNIVERSE_SIZE,
};

use super::{tag_name, xml_attr, xyz_to_srgb, ImportError};

/// Name of the description document inside every package.
pub const DESCRIPTION_FILE: &str = "description.xml";

const MAX_OFFSET: u32 = UNIVERSE_SIZE - 1;

/// A parsed package plus its original bytes, kept so the library can store
/// the blob alongside the definition.
#[derive(Debug, Clone)]
pub struct GdtfPackage {
    pub definition: FixtureTypeDefinition,
    pub package: Vec<u8>,
}

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

/// Parse a GDTF package from its raw bytes.
pub fn parse_package(bytes: Vec<u8>) -> Result<GdtfPackage, ImportError> {
    let definition = {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice()))?;
        let xml = read_entry(&mut archive, DESCRIPTION_FILE).ok_or_else(|| {
            ImportError::format(format!("package has no {DESCRIPTION_FILE}"))
        })?;
        let raw = parse_description(&xml)?;
        build_definition(raw, &mut archive)
    };

    info!(
        fixture_type_id = %definition.fixture_type_id,
        name = %definition.name,
        modes = definition.dmx_modes.len(),
        wheels = definition.wheels.len(),
        "parsed GDTF package"
    );
    Ok(GdtfPackage {
        definition,
        package: bytes,
    })
}

/// Read a whole archive entry, or `None` if it is absent or unreadable.
fn read_entry(archive: &mut Archive<'_>, name: &str) -> Option<Vec<u8>> {
    let mut file = archive.by_name(name).ok()?;
    let mut data = Vec::new();
    match file.read_to_end(&mut data) {
        Ok(_) => Some(data),
        Err(e) => {
            warn!(entry = name, error = %e, "unreadable package entry");
            None
        }
    }
}

// ── description.xml ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RawChannel {
    offsets: Vec<u32>,
    initial_function: String,
    attribute: Option<String>,
}

#[derive(Debug, Default)]
struct RawMode {
    name: String,
    channels: Vec<RawChannel>,
}

#[derive(Debug, Default)]
struct RawSlot {
    name: String,
    color: String,
    media: Option<String>,
}

#[derive(Debug, Default)]
struct RawWheel {
    name: String,
    slots: Vec<RawSlot>,
}

#[derive(Debug, Default)]
struct RawDescription {
    seen_fixture_type: bool,
    fixture_type_id: String,
    name: String,
    short_name: String,
    manufacturer: String,
    description: String,
    thumbnail: String,
    power: Option<String>,
    power_fallback: Option<String>,
    weight: Option<String>,
    modes: Vec<RawMode>,
    wheels: Vec<RawWheel>,

    in_properties: bool,
    wheel: Option<RawWheel>,
    mode: Option<RawMode>,
    channel: Option<RawChannel>,
}

impl RawDescription {
    fn open(&mut self, e: &BytesStart<'_>) {
        let attr = |key: &str| xml_attr(e, key).unwrap_or_default();
        match tag_name(e.name()).as_str() {
            "FixtureType" if !self.seen_fixture_type => {
                self.seen_fixture_type = true;
                self.fixture_type_id = attr("FixtureTypeID");
                self.name = attr("Name");
                self.short_name = attr("ShortName");
                self.manufacturer = attr("Manufacturer");
                self.description = attr("Description");
                self.thumbnail = attr("Thumbnail");
            }
            "Properties" => self.in_properties = true,
            "PowerConsumption" if self.in_properties => {
                self.power = self.power.take().or_else(|| xml_attr(e, "Value"));
            }
            "OperatingTemperature" if self.in_properties => {
                self.power_fallback = xml_attr(e, "PowerConsumption").or_else(|| xml_attr(e, "Power"));
            }
            "Weight" if self.in_properties => self.weight = xml_attr(e, "Value"),
            "Wheel" => {
                self.wheel = Some(RawWheel {
                    name: attr("Name"),
                    slots: Vec::new(),
                });
            }
            "Slot" => {
                if let Some(wheel) = self.wheel.as_mut() {
                    wheel.slots.push(RawSlot {
                        name: attr("Name"),
                        color: attr("Color"),
                        media: xml_attr(e, "MediaFileName").filter(|m| !m.trim().is_empty()),
                    });
                }
            }
            "DMXMode" => {
                self.mode = Some(RawMode {
                    name: attr("Name"),
                    channels: Vec::new(),
                });
            }
            "DMXChannel" if self.mode.is_some() => {
                self.channel = Some(RawChannel {
                    offsets: parse_offsets(&attr("Offset")),
                    initial_function: attr("InitialFunction"),
                    attribute: None,
                });
            }
            "LogicalChannel" => {
                if let Some(channel) = self.channel.as_mut() {
                    if channel.attribute.is_none() {
                        channel.attribute = xml_attr(e, "Attribute").filter(|a| !a.is_empty());
                    }
                }
            }
            _ => {}
        }
    }

    fn close(&mut self, name: &str) {
        match name {
            "Properties" => self.in_properties = false,
            "Wheel" => {
                if let Some(wheel) = self.wheel.take() {
                    if wheel.slots.is_empty() {
                        debug!(wheel = %wheel.name, "wheel has no slots, dropping");
                    } else {
                        self.wheels.push(wheel);
                    }
                }
            }
            "DMXChannel" => {
                if let (Some(channel), Some(mode)) = (self.channel.take(), self.mode.as_mut()) {
                    mode.channels.push(channel);
                }
            }
            "DMXMode" => {
                if let Some(mode) = self.mode.take() {
                    self.modes.push(mode);
                }
            }
            _ => {}
        }
    }
}

/// Comma-separated 0-indexed offsets. `None`, junk, and offsets past the end
/// of one universe are skipped.
fn parse_offsets(text: &str) -> Vec<u32> {
    text.split(',')
        .filter_map(|part| part.trim().parse::<u32>().ok())
        .filter(|&offset| {
            let in_range = offset <= MAX_OFFSET;
            if !in_range {
                debug!(offset, "ignoring DMX offset outside one universe");
            }
            in_range
        })
        .collect()
}

fn parse_description(xml: &[u8]) -> Result<RawDescription, ImportError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut raw = RawDescription::default();
    let mut buf = Vec::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(ref e) => {
                depth += 1;
                raw.open(e);
            }
            Event::Empty(ref e) => {
                raw.open(e);
                raw.close(&tag_name(e.name()));
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                raw.close(&tag_name(e.name()));
            }
            _ => {}
        }
        buf.clear();
    }

    if depth > 0 {
        return Err(ImportError::format(format!(
            "{DESCRIPTION_FILE} ended inside an open element"
        )));
    }
    if !raw.seen_fixture_type {
        return Err(ImportError::format(format!(
            "{DESCRIPTION_FILE} has no FixtureType element"
        )));
    }
    if raw.fixture_type_id.trim().is_empty() {
        return Err(ImportError::format("FixtureType has no FixtureTypeID"));
    }
    Ok(raw)
}

// ── Assembly ────────────────────────────────────────────────────────

fn parse_number(value: Option<&str>, what: &str) -> Option<f64> {
    let value = value?.trim();
    match value.parse::<f64>() {
        Ok(n) if n.is_finite() => Some(n),
        _ => {
            debug!(value, what, "unparseable number, using 0");
            None
        }
    }
}

fn build_definition(raw: RawDescription, archive: &mut Archive<'_>) -> FixtureTypeDefinition {
    let wattage = parse_number(raw.power.as_deref(), "power consumption")
        .or_else(|| parse_number(raw.power_fallback.as_deref(), "power consumption"))
        .unwrap_or(0.0);
    let weight = parse_number(raw.weight.as_deref(), "weight").unwrap_or(0.0);

    let thumbnail = if raw.thumbnail.trim().is_empty() {
        None
    } else {
        let found = resolve_media(archive, &thumbnail_candidates(&raw.thumbnail));
        if found.is_none() {
            debug!(thumbnail = %raw.thumbnail, "thumbnail not found in package");
        }
        found
    };

    let wheels = raw
        .wheels
        .into_iter()
        .map(|wheel| Wheel {
            slots: wheel
                .slots
                .into_iter()
                .map(|slot| build_slot(slot, &wheel.name, archive))
                .collect(),
            name: wheel.name,
        })
        .collect();

    FixtureTypeDefinition {
        fixture_type_id: raw.fixture_type_id,
        name: raw.name,
        short_name: raw.short_name,
        manufacturer: raw.manufacturer,
        description: raw.description,
        thumbnail,
        wattage,
        weight,
        dmx_modes: raw.modes.into_iter().map(build_mode).collect(),
        wheels,
    }
}

fn build_slot(slot: RawSlot, wheel: &str, archive: &mut Archive<'_>) -> WheelSlot {
    let image = slot.media.as_deref().and_then(|media| {
        let found = resolve_media(archive, &image_candidates(media));
        if found.is_none() {
            warn!(wheel, slot = %slot.name, media, "wheel slot image not found in package");
        }
        found
    });
    WheelSlot {
        rgb: cie_to_hex(&slot.color),
        name: slot.name,
        color: slot.color,
        image,
    }
}

fn build_mode(raw: RawMode) -> DmxMode {
    let mut channels = Vec::new();
    let mut highest: Option<u32> = None;

    for channel in &raw.channels {
        let attribute = channel
            .attribute
            .clone()
            .unwrap_or_else(|| attribute_from_function(&channel.initial_function));
        let multi_byte = channel.offsets.len() > 1;
        for (index, &offset) in channel.offsets.iter().enumerate() {
            highest = Some(highest.map_or(offset, |h| h.max(offset)));
            let resolution = match (multi_byte, index) {
                (false, _) => Resolution::Single,
                (true, 0) => Resolution::Coarse,
                (true, _) => Resolution::Fine,
            };
            channels.push(ModeChannel {
                dmx_address: offset + 1,
                attribute: attribute.clone(),
                resolution,
            });
        }
    }
    channels.sort_by_key(|c| c.dmx_address);

    let channel_count = u32::try_from(raw.channels.len()).unwrap_or(u32::MAX);
    DmxMode {
        name: raw.name,
        footprint: highest.map_or(channel_count, |h| h + 1),
        channel_count,
        channels,
    }
}

/// `Beam_Dimmer.Dimmer.Dimmer` → `Dimmer`. A name without dots is used as is.
fn attribute_from_function(initial_function: &str) -> String {
    let mut segments = initial_function.split('.');
    let first = segments.next().unwrap_or_default();
    segments.next().unwrap_or(first).to_string()
}

// ── Media ───────────────────────────────────────────────────────────

fn image_candidates(name: &str) -> Vec<String> {
    vec![
        format!("wheels/{name}.png"),
        format!("wheels/{name}"),
        format!("{name}.png"),
        name.to_string(),
    ]
}

fn thumbnail_candidates(name: &str) -> Vec<String> {
    vec![
        format!("{name}.png"),
        format!("{name}.svg"),
        format!("{name}.jpg"),
        format!("{name}.jpeg"),
        name.to_string(),
    ]
}

fn mime_type(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Embed the first candidate present in the archive as a `data:` URI.
fn resolve_media(archive: &mut Archive<'_>, candidates: &[String]) -> Option<String> {
    candidates.iter().find_map(|path| {
        read_entry(archive, path)
            .map(|bytes| format!("data:{};base64,{}", mime_type(path), STANDARD.encode(bytes)))
    })
}

// ── Color ───────────────────────────────────────────────────────────

/// GDTF slot color `x,y,Y` (CIE 1931 xyY, `Y` on a 0-100 scale) → `#rrggbb`.
fn cie_to_hex(color: &str) -> Option<String> {
    let parts: Vec<f64> = color
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    let [x, y, big_y] = parts.as_slice() else {
        return None;
    };
    if *y <= 0.0 {
        return None;
    }
    let big_x = x * big_y / y;
    let big_z = (1.0 - x - y) * big_y / y;
    let [r, g, b] = xyz_to_srgb(big_x, *big_y, big_z);
    Some(format!("#{r:02x}{g:02x}{b:02x}"))
}
