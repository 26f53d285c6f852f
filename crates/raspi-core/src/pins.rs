//! Static pin identity table for the Raspberry Pi 40-pin header.
//!
//! Users refer to pins by physical header position (`"11"`), by Broadcom
//! name (`"io17"`, `"gpio17"`) or by a function alias (`"sda"`). The native
//! controller only understands Broadcom line numbers, so every label is
//! resolved through [`PinTable`] before touching hardware.
//!
//! ```
//! use raspi_core::{LineId, PinTable};
//!
//! assert_eq!(PinTable::resolve("11"), Some(LineId::new(17)));
//! assert_eq!(PinTable::resolve("io17"), Some(LineId::new(17)));
//! assert_eq!(PinTable::resolve("GPIO17"), Some(LineId::new(17)));
//! assert_eq!(PinTable::resolve("1"), None); // 3.3V rail
//! ```

use crate::constants::MAX_HEADER_LINE;
use crate::error::{Error, Result};
use crate::types::LineId;

/// Physical header position to Broadcom line. Power and ground are absent.
const HEADER: [(u8, u32); 28] = [
    (3, 2),
    (5, 3),
    (7, 4),
    (8, 14),
    (10, 15),
    (11, 17),
    (12, 18),
    (13, 27),
    (15, 22),
    (16, 23),
    (18, 24),
    (19, 10),
    (21, 9),
    (22, 25),
    (23, 11),
    (24, 8),
    (26, 7),
    (27, 0),
    (28, 1),
    (29, 5),
    (31, 6),
    (32, 12),
    (33, 13),
    (35, 19),
    (36, 16),
    (37, 26),
    (38, 20),
    (40, 21),
];

/// Function aliases printed on most header diagrams.
const ALIASES: [(&str, u32); 14] = [
    ("sda", 2),
    ("scl", 3),
    ("gpclk0", 4),
    ("txd", 14),
    ("rxd", 15),
    ("pwm0", 18),
    ("pwm1", 19),
    ("mosi", 10),
    ("miso", 9),
    ("sclk", 11),
    ("ce0", 8),
    ("ce1", 7),
    ("id_sd", 0),
    ("id_sc", 1),
];

/// Lookup between user-facing pin labels and Broadcom lines.
///
/// Pure and stateless; all methods are associated functions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PinTable;

impl PinTable {
    /// Resolve a label to its hardware line.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    #[must_use]
    pub fn resolve(label: &str) -> Option<LineId> {
        let label = label.trim().to_ascii_lowercase();

        if let Ok(position) = label.parse::<u8>() {
            return HEADER
                .iter()
                .find(|(physical, _)| *physical == position)
                .map(|(_, line)| LineId::new(*line));
        }

        let broadcom = label
            .strip_prefix("gpio")
            .or_else(|| label.strip_prefix("io"))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(line) = broadcom {
            return (line <= MAX_HEADER_LINE).then_some(LineId::new(line));
        }

        ALIASES
            .iter()
            .find(|(alias, _)| *alias == label)
            .map(|(_, line)| LineId::new(*line))
    }

    /// Resolve a label, failing with [`Error::UnknownPin`].
    pub fn lookup(label: &str) -> Result<LineId> {
        Self::resolve(label).ok_or_else(|| Error::UnknownPin(label.to_string()))
    }

    /// Canonical physical header position for a line.
    #[must_use]
    pub fn physical_label(line: LineId) -> Option<String> {
        HEADER
            .iter()
            .find(|(_, l)| *l == line.as_u32())
            .map(|(physical, _)| physical.to_string())
    }

    /// Whether `label` resolves to exactly `line`.
    ///
    /// This is how the reconciliation engine recognises interrupts that were
    /// created on demand by hardware label.
    #[must_use]
    pub fn names_line(label: &str, line: LineId) -> bool {
        Self::resolve(label) == Some(line)
    }
}
