pub mod address;
pub mod fixture_type;
pub mod instrument;
pub mod show;

// Re-export commonly used types at the model level.
pub use address::{
    footprint_range, format_address, format_address_text, parse_address, AddressMode,
    DmxAddress, ParsedAddress, UNIVERSE_SIZE,
};
pub use fixture_type::{DmxMode, FixtureTypeDefinition, ModeChannel, Resolution, Wheel, WheelSlot};
pub use instrument::{
    Instrument, InstrumentField, InstrumentId, PartialInstrument, DEFAULT_FOOTPRINT, DEFAULT_PART,
};
pub use show::{
    InstrumentNote, NoteType, ShowMetadata, ShowSnapshot, TargetReference, TargetType,
};
