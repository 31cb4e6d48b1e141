//! DMX addressing: conversions between `universe:offset` text, `universe/offset`
//! text, and absolute linear addresses.
//!
//! Everything here is pure. Unparseable input is not an error: it comes back
//! as [`ParsedAddress::Verbatim`] so callers can still display it.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Offsets per DMX universe.
pub const UNIVERSE_SIZE: u32 = 512;

// ── Address types ───────────────────────────────────────────────────

/// A structured DMX address. Universe and offset are both 1-indexed; `0:0`
/// is the "unpatched" address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DmxAddress {
    pub universe: u32,
    pub offset: u32,
}

impl DmxAddress {
    pub const UNPATCHED: Self = Self {
        universe: 0,
        offset: 0,
    };

    pub const fn new(universe: u32, offset: u32) -> Self {
        Self { universe, offset }
    }

    /// Convert an absolute linear address (1-based) into universe/offset.
    /// Absolute 0 maps to the unpatched address.
    pub const fn from_absolute(absolute: u32) -> Self {
        if absolute == 0 {
            return Self::UNPATCHED;
        }
        Self {
            universe: (absolute - 1) / UNIVERSE_SIZE + 1,
            offset: (absolute - 1) % UNIVERSE_SIZE + 1,
        }
    }

    /// Absolute linear address. Unpatched addresses yield 0.
    pub const fn absolute(self) -> u32 {
        if self.universe == 0 {
            return self.offset;
        }
        (self.universe - 1)
            .saturating_mul(UNIVERSE_SIZE)
            .saturating_add(self.offset)
    }

    pub const fn is_patched(self) -> bool {
        self.universe > 0 && self.offset > 0
    }
}

impl fmt::Display for DmxAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.universe, self.offset)
    }
}

/// Result of parsing a free-text address cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedAddress {
    Dmx(DmxAddress),
    /// Not a recognizable address; kept as-is for display.
    Verbatim(String),
}

impl ParsedAddress {
    pub fn dmx(&self) -> Option<DmxAddress> {
        match self {
            ParsedAddress::Dmx(addr) => Some(*addr),
            ParsedAddress::Verbatim(_) => None,
        }
    }
}

/// How addresses are rendered for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum AddressMode {
    /// `universe:offset`, with universe 1 optionally abbreviated.
    #[default]
    Universe,
    /// A single linear number across all universes.
    Absolute,
}

// ── Conversions ─────────────────────────────────────────────────────

/// Parse `"<u>:<n>"`, `"<u>/<n>"`, or a bare absolute integer.
pub fn parse_address(text: &str) -> ParsedAddress {
    let trimmed = text.trim();

    if let Some((universe, offset)) = trimmed.split_once([':', '/']) {
        if let (Ok(universe), Ok(offset)) =
            (universe.trim().parse::<u32>(), offset.trim().parse::<u32>())
        {
            return ParsedAddress::Dmx(DmxAddress::new(universe, offset));
        }
    } else if let Ok(absolute) = trimmed.parse::<u32>() {
        return ParsedAddress::Dmx(DmxAddress::from_absolute(absolute));
    }

    ParsedAddress::Verbatim(text.to_string())
}

/// Render a structured address in the given display mode.
pub fn format_address(addr: DmxAddress, mode: AddressMode, show_universe1: bool) -> String {
    match mode {
        AddressMode::Absolute => addr.absolute().to_string(),
        AddressMode::Universe if addr.universe == 1 && !show_universe1 => addr.offset.to_string(),
        AddressMode::Universe => addr.to_string(),
    }
}

/// Re-render a stored address string in the given display mode. Verbatim and
/// unpatched addresses pass through unchanged.
pub fn format_address_text(text: &str, mode: AddressMode, show_universe1: bool) -> String {
    match parse_address(text) {
        ParsedAddress::Dmx(addr) if addr.is_patched() => {
            format_address(addr, mode, show_universe1)
        }
        _ => text.to_string(),
    }
}

/// The universe and inclusive offset range occupied by a fixture at `address`
/// with the given footprint. `None` for unpatched or unparseable addresses.
/// A footprint of 0 is treated as 1.
pub fn footprint_range(address: &str, footprint: u32) -> Option<(u32, RangeInclusive<u32>)> {
    let addr = parse_address(address).dmx()?;
    if !addr.is_patched() {
        return None;
    }
    let end = addr.offset.saturating_add(footprint.max(1) - 1);
    Some((addr.universe, addr.offset..=end))
}
