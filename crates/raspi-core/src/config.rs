//! Declarative board configuration.
//!
//! A board is configured with a list of pins. Each entry names a hardware
//! label, what the pin is used for, and optionally a debounce window and a
//! pull resistor mode. The JSON shape matches the host runtime's attributes:
//!
//! ```
//! use raspi_core::{BoardConfig, PinKind};
//!
//! let config = BoardConfig::from_json_str(r#"{
//!     "pins": [
//!         { "name": "i1", "pin": "11", "type": "interrupt", "debounce_ms": 5 },
//!         { "name": "led", "pin": "29", "type": "gpio", "pull": "down" }
//!     ]
//! }"#).unwrap();
//!
//! assert_eq!(config.pins.len(), 2);
//! assert_eq!(config.pins[0].kind, PinKind::Interrupt);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::constants::DEFAULT_DEBOUNCE_MS;
use crate::error::{Error, Result};
use crate::pins::PinTable;
use crate::types::LineId;

/// What a configured pin is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinKind {
    /// Plain digital input/output.
    #[default]
    Gpio,

    /// Edge-triggered digital interrupt.
    Interrupt,
}

/// Interrupt flavour for pins of kind [`PinKind::Interrupt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptType {
    /// Counts high edges and streams ticks to subscribers.
    #[default]
    Basic,

    /// Measures high pulse widths and reports their rolling average.
    Servo,
}

/// Pull resistor mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pull {
    /// Leave whatever the hardware currently has.
    #[default]
    #[serde(rename = "")]
    Unset,
    None,
    Up,
    Down,
}

/// Configuration of a single pin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinConfig {
    /// Logical name. Defaults to the hardware label when empty.
    #[serde(default)]
    pub name: String,

    /// Hardware label resolved through [`PinTable`].
    pub pin: String,

    #[serde(rename = "type", default)]
    pub kind: PinKind,

    /// Debounce window in milliseconds; 0 disables debouncing.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub debounce_ms: u64,

    #[serde(default, skip_serializing_if = "is_unset")]
    pub pull: Pull,

    #[serde(default, skip_serializing_if = "is_basic")]
    pub interrupt_type: InterruptType,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

fn is_unset(p: &Pull) -> bool {
    *p == Pull::Unset
}

fn is_basic(t: &InterruptType) -> bool {
    *t == InterruptType::Basic
}

impl PinConfig {
    /// Basic interrupt entry with no debounce.
    pub fn interrupt(name: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pin: pin.into(),
            kind: PinKind::Interrupt,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            pull: Pull::Unset,
            interrupt_type: InterruptType::Basic,
        }
    }

    /// Plain GPIO entry.
    pub fn gpio(name: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            kind: PinKind::Gpio,
            ..Self::interrupt(name, pin)
        }
    }

    /// Set the debounce window.
    #[must_use]
    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    /// Set the pull mode.
    #[must_use]
    pub fn with_pull(mut self, pull: Pull) -> Self {
        self.pull = pull;
        self
    }

    /// Set the interrupt flavour.
    #[must_use]
    pub fn with_interrupt_type(mut self, interrupt_type: InterruptType) -> Self {
        self.interrupt_type = interrupt_type;
        self
    }

    /// Debounce window as a duration.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Effective logical name.
    #[must_use]
    pub fn effective_name(&self) -> &str {
        if self.name.is_empty() { &self.pin } else { &self.name }
    }

    #[must_use]
    pub fn is_interrupt(&self) -> bool {
        self.kind == PinKind::Interrupt
    }

    /// Resolve the hardware label.
    pub fn line(&self) -> Result<LineId> {
        PinTable::lookup(&self.pin)
    }

    /// Check required fields and that the label resolves.
    pub fn validate(&self) -> Result<()> {
        if self.pin.trim().is_empty() {
            return Err(Error::MissingField("pin".to_string()));
        }
        self.line().map(|_| ())
    }
}

/// Full board configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default)]
    pub pins: Vec<PinConfig>,
}

impl BoardConfig {
    pub fn new(pins: Vec<PinConfig>) -> Self {
        Self { pins }
    }

    /// Parse from the JSON attribute form.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Copy with every empty name replaced by its hardware label.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let pins = self
            .pins
            .iter()
            .map(|p| PinConfig {
                name: p.effective_name().to_string(),
                ..p.clone()
            })
            .collect();
        Self { pins }
    }

    /// Interrupt entries only.
    pub fn interrupts(&self) -> impl Iterator<Item = &PinConfig> {
        self.pins.iter().filter(|p| p.is_interrupt())
    }

    /// Validate every entry and reject two interrupts sharing a hardware
    /// line or a logical name.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashMap<LineId, &str> = HashMap::new();
        let mut names: HashSet<&str> = HashSet::new();
        for pin in &self.pins {
            pin.validate()?;
            if !pin.is_interrupt() {
                continue;
            }
            if !names.insert(pin.effective_name()) {
                return Err(Error::DuplicateName(pin.effective_name().to_string()));
            }
            let line = pin.line()?;
            if let Some(first) = seen.insert(line, pin.effective_name()) {
                return Err(Error::DuplicatePin {
                    first: first.to_string(),
                    second: pin.effective_name().to_string(),
                    line: line.as_u32(),
                });
            }
        }
        Ok(())
    }
}
