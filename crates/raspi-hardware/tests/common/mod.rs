//! Common test utilities for integration tests.
//!
//! Every helper builds its own [`EdgeDispatcher`], so tests never share tick
//! clock state and can run in parallel.

#![allow(dead_code)]

use std::sync::Arc;

use raspi_core::{BoardConfig, LineId, PinConfig};
use raspi_hardware::{Board, EdgeDispatcher, Interrupt};
use raspi_hardware::mock::{MockGpio, MockGpioHandle};

/// Broadcom line behind physical pin 11.
pub const PIN_11: LineId = LineId::new(17);

/// Broadcom line behind physical pin 13.
pub const PIN_13: LineId = LineId::new(27);

/// Broadcom line behind physical pin 15.
pub const PIN_15: LineId = LineId::new(22);

/// A board on a private dispatcher, plus the handle of its mock backend.
pub struct TestBoard {
    pub board: Board<MockGpio>,
    pub gpio: MockGpioHandle,
    pub dispatcher: Arc<EdgeDispatcher>,
}

impl TestBoard {
    pub fn new(pins: Vec<PinConfig>) -> Self {
        let dispatcher = Arc::new(EdgeDispatcher::new());
        let (backend, gpio) = MockGpio::with_dispatcher(dispatcher.clone());
        let board = Board::with_dispatcher(&BoardConfig::new(pins), backend, dispatcher.clone())
            .expect("board construction");
        Self {
            board,
            gpio,
            dispatcher,
        }
    }

    pub fn reconfigure(&self, pins: Vec<PinConfig>) -> raspi_hardware::Result<()> {
        self.board.reconfigure(&BoardConfig::new(pins))
    }

    pub fn interrupt(&self, name: &str) -> Arc<Interrupt> {
        self.board
            .digital_interrupt_by_name(name)
            .expect("interrupt lookup")
    }

    /// Drive alternating low/high edges starting low, one microsecond apart.
    pub fn drive_alternating(&self, line: LineId, edges: u32, start_tick: u32) {
        for i in 0..edges {
            let level = if i % 2 == 0 {
                raspi_core::Level::Low
            } else {
                raspi_core::Level::High
            };
            self.gpio.drive(line, level, start_tick.wrapping_add(i));
        }
    }
}

/// Assert that no two tracked interrupts share a line and that the backend
/// holds exactly one callback per tracked interrupt.
pub fn assert_exclusive(test: &TestBoard) {
    let names = test.board.digital_interrupt_names();
    let mut lines: Vec<LineId> = names.iter().map(|n| test.interrupt(n).line()).collect();
    lines.sort();
    let before = lines.len();
    lines.dedup();
    assert_eq!(lines.len(), before, "two interrupts share a line");
    assert_eq!(test.gpio.registered_lines(), lines);
}
