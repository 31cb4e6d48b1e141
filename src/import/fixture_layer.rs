//! Layer-organized fixture XML, as written by GDTF-aware plotting tools:
//!
//! ```xml
//! <Layers>
//!   <Layer name="FOH Truss">
//!     <Fixture name="Key left" fixture_id="101">
//!       <FixtureType name="Source Four 26"/>
//!       <SubFixture><Patch><Address>1:5</Address></Patch></SubFixture>
//!     </Fixture>
//!   </Layer>
//! </Layers>
//! ```
//!
//! Every fixture with a channel becomes one part-1 instrument; the layer name
//! is its position.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::model::{PartialInstrument, DEFAULT_PART};

use super::{tag_name, xml_attr, ImportError, ImportOptions, ParseOutput, SideEffects, SourceFormat};

#[derive(Debug, Default)]
struct FixtureDraft {
    name: String,
    channel: String,
    fixture_type: Option<String>,
    address: Option<String>,
}

impl FixtureDraft {
    fn from_element(e: &BytesStart<'_>) -> Self {
        let channel = xml_attr(e, "fixture_id")
            .filter(|id| !id.trim().is_empty())
            .or_else(|| xml_attr(e, "channel_id"))
            .unwrap_or_default();
        Self {
            name: xml_attr(e, "name").unwrap_or_default(),
            channel: channel.trim().to_string(),
            fixture_type: None,
            address: None,
        }
    }

    fn into_instrument(self, layer: Option<&str>) -> Option<PartialInstrument> {
        if self.channel.is_empty() {
            debug!(fixture = %self.name, "fixture has no channel, skipping");
            return None;
        }
        let mut instrument = PartialInstrument::new(&self.channel, DEFAULT_PART);
        instrument.purpose = Some(self.name).filter(|s| !s.trim().is_empty());
        instrument.position = layer.map(str::to_string).filter(|s| !s.trim().is_empty());
        instrument.instrument_type = self.fixture_type.filter(|s| !s.trim().is_empty());
        instrument.address = self.address;
        Some(instrument)
    }
}

/// Parse a fixture-layer XML document.
pub fn parse(text: &str, options: &ImportOptions) -> Result<ParseOutput, ImportError> {
    let mut xml = Reader::from_reader(text.as_bytes());
    xml.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut fixtures_seen = 0usize;
    let mut layer: Option<String> = None;
    let mut current: Option<FixtureDraft> = None;
    let mut patch_depth = 0usize;
    let mut in_address = false;
    let mut instruments = Vec::new();

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(ref e) => {
                depth += 1;
                match tag_name(e.name()).as_str() {
                    "Layer" => layer = xml_attr(e, "name"),
                    "Fixture" => {
                        fixtures_seen += 1;
                        current = Some(FixtureDraft::from_element(e));
                    }
                    "FixtureType" => {
                        if let Some(draft) = current.as_mut() {
                            draft.fixture_type = xml_attr(e, "name");
                        }
                    }
                    "Patch" if current.is_some() => patch_depth += 1,
                    "Address" if patch_depth > 0 => in_address = true,
                    _ => {}
                }
            }
            Event::Empty(ref e) => match tag_name(e.name()).as_str() {
                "Fixture" => {
                    fixtures_seen += 1;
                    let draft = FixtureDraft::from_element(e);
                    instruments.extend(draft.into_instrument(layer.as_deref()));
                }
                "FixtureType" => {
                    if let Some(draft) = current.as_mut() {
                        draft.fixture_type = xml_attr(e, "name");
                    }
                }
                _ => {}
            },
            Event::Text(ref e) if in_address => {
                let text = e.unescape().unwrap_or_default().trim().to_string();
                if let Some(draft) = current.as_mut() {
                    if draft.address.is_none() && !text.is_empty() {
                        draft.address = Some(text);
                    }
                }
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                match tag_name(e.name()).as_str() {
                    "Layer" => layer = None,
                    "Fixture" => {
                        if let Some(draft) = current.take() {
                            instruments.extend(draft.into_instrument(layer.as_deref()));
                        }
                        patch_depth = 0;
                        in_address = false;
                    }
                    "Patch" => patch_depth = patch_depth.saturating_sub(1),
                    "Address" => in_address = false,
                    _ => {}
                }
            }
            _ => {}
        }
        buf.clear();
    }

    if depth > 0 {
        return Err(ImportError::format("XML document ended inside an open element"));
    }
    if fixtures_seen == 0 {
        return Err(ImportError::format("no Fixture elements found"));
    }
    if instruments.is_empty() {
        return Err(ImportError::format("no fixture carries a channel"));
    }

    Ok(ParseOutput {
        format: SourceFormat::FixtureLayerXml,
        instruments,
        side_effects: SideEffects {
            show_name: options.show_name.clone(),
            ..SideEffects::default()
        },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Layers>
  <Layer name="FOH Truss">
    <Fixture name="Key left" fixture_id="101">
      <FixtureType name="Source Four 26"/>
      <SubFixture>
        <Patch><Address>1:5</Address></Patch>
        <Patch><Address>1:9</Address></Patch>
      </SubFixture>
    </Fixture>
    <Fixture name="Key right" fixture_id="" channel_id="102">
      <FixtureType name="Source Four 26"></FixtureType>
    </Fixture>
  </Layer>
  <Layer name="Floor">
    <Fixture name="Cyc &amp; sky" channel_id="201"/>
    <Fixture name="Work light"/>
  </Layer>
</Layers>"#;

    #[test]
    fn fixtures_become_part_one_instruments() {
        let out = parse(SAMPLE, &ImportOptions::default()).unwrap();
        assert_eq!(out.format, SourceFormat::FixtureLayerXml);
        assert_eq!(out.instruments.len(), 3);

        let key = &out.instruments[0];
        assert_eq!(key.channel.as_deref(), Some("101"));
        assert_eq!(key.part, Some(1));
        assert_eq!(key.position.as_deref(), Some("FOH Truss"));
        assert_eq!(key.purpose.as_deref(), Some("Key left"));
        assert_eq!(key.instrument_type.as_deref(), Some("Source Four 26"));
        assert_eq!(key.address.as_deref(), Some("1:5"));
    }

    #[test]
    fn channel_id_used_when_fixture_id_is_blank() {
        let out = parse(SAMPLE, &ImportOptions::default()).unwrap();
        let right = &out.instruments[1];
        assert_eq!(right.channel.as_deref(), Some("102"));
        assert_eq!(right.address, None);
        assert_eq!(right.instrument_type.as_deref(), Some("Source Four 26"));
    }

    #[test]
    fn self_closing_fixtures_and_entities() {
        let out = parse(SAMPLE, &ImportOptions::default()).unwrap();
        let cyc = &out.instruments[2];
        assert_eq!(cyc.channel.as_deref(), Some("201"));
        assert_eq!(cyc.purpose.as_deref(), Some("Cyc & sky"));
        assert_eq!(cyc.position.as_deref(), Some("Floor"));
        assert_eq!(cyc.instrument_type, None);
    }

    #[test]
    fn no_targets_or_custom_fields() {
        let out = parse(SAMPLE, &ImportOptions::default()).unwrap();
        assert!(out.side_effects.targets.is_empty());
        assert!(out.side_effects.custom_fields.is_empty());
    }

    #[test]
    fn malformed_markup_is_a_format_error() {
        let err = parse(
            "<Layers><Layer name=\"A\"><Fixture fixture_id=\"1\"></Layer></Layers>",
            &ImportOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::Format(_)), "got {err}");

        let err = parse("<Layers><Layer name=\"A\">", &ImportOptions::default()).unwrap_err();
        assert!(matches!(err, ImportError::Format(_)), "got {err}");
    }

    #[test]
    fn zero_fixtures_is_a_format_error() {
        let err = parse("<Layers><Layer name=\"A\"/></Layers>", &ImportOptions::default())
            .unwrap_err();
        assert!(matches!(err, ImportError::Format(_)));
    }
}
