//! Entry point for native edge callbacks.
//!
//! The GPIO daemon calls back on a thread of its own with a line number, a
//! level and a raw 32-bit microsecond tick, and gives no way to attach
//! per-call context. [`EdgeDispatcher`] is therefore a process-wide registry
//! of boards: every board attaches its [`InterruptTable`] on construction and
//! detaches it on close, and every edge is offered to every attached board
//! that tracks the line.
//!
//! The dispatcher also owns the tick clock. Counter wraparound is a property
//! of the hardware clock, not of any one line, so rollovers are tracked once
//! for all boards and lines.
//!
//! ```
//! use std::sync::Arc;
//! use raspi_core::{Level, LineId, PinConfig};
//! use raspi_hardware::bridge::EdgeDispatcher;
//! use raspi_hardware::mock::MockGpio;
//! use raspi_hardware::registry::{InterruptRegistry, InterruptTable};
//! use raspi_hardware::types::BoardId;
//! use tokio_util::sync::CancellationToken;
//!
//! let dispatcher = Arc::new(EdgeDispatcher::new());
//! let (gpio, handle) = MockGpio::with_dispatcher(dispatcher.clone());
//!
//! let table = Arc::new(InterruptTable::new(CancellationToken::new()));
//! dispatcher.attach(BoardId::next(), table.clone());
//!
//! let registry = InterruptRegistry::new(gpio, table);
//! registry.reconfigure(&[PinConfig::interrupt("i1", "11")]).unwrap();
//!
//! handle.drive(LineId::new(17), Level::High, 0);
//! assert_eq!(registry.lookup_or_create("i1").unwrap().value(), 1);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, RwLock};

use futures::executor::block_on;
use raspi_core::constants::{NANOS_PER_MICRO, TICK_ROLLOVER_PERIOD_US};
use raspi_core::{Level, LineId};
use tracing::{debug, trace, warn};

use crate::registry::InterruptTable;
use crate::sync::{lock, read, write};
use crate::types::BoardId;

static GLOBAL: LazyLock<Arc<EdgeDispatcher>> = LazyLock::new(|| Arc::new(EdgeDispatcher::new()));

/// Native callback entry point.
///
/// Forwards to the process-wide dispatcher. Never panics and never reports
/// errors; problems are logged and the edge is dropped.
pub fn interrupt_callback(gpio: u32, level: u32, tick: u32) {
    EdgeDispatcher::global().dispatch(gpio, level, tick);
}

/// Reconstructs a monotonic 64-bit microsecond clock from the wrapping
/// 32-bit hardware counter.
#[derive(Debug, Default)]
pub struct TickClock {
    state: Mutex<RolloverState>,
}

#[derive(Debug, Default, Clone, Copy)]
struct RolloverState {
    last_raw: u32,
    rollovers: u64,
}

impl TickClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute tick in microseconds for a raw counter value.
    ///
    /// A raw value below the previous one means the counter wrapped.
    pub fn reconstruct(&self, raw: u32) -> u64 {
        let mut state = lock(&self.state);
        if raw < state.last_raw {
            state.rollovers += 1;
            trace!(rollovers = state.rollovers, "tick counter wrapped");
        }
        state.last_raw = raw;
        state
            .rollovers
            .saturating_mul(TICK_ROLLOVER_PERIOD_US)
            .saturating_add(u64::from(raw))
    }

    /// Number of wraparounds observed.
    pub fn rollovers(&self) -> u64 {
        lock(&self.state).rollovers
    }
}

/// Process-wide registry of boards receiving edge callbacks.
#[derive(Debug, Default)]
pub struct EdgeDispatcher {
    clock: TickClock,
    boards: RwLock<HashMap<BoardId, Arc<InterruptTable>>>,
}

impl EdgeDispatcher {
    /// A standalone dispatcher with its own clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// The dispatcher native callbacks are routed to.
    pub fn global() -> Arc<Self> {
        GLOBAL.clone()
    }

    pub fn attach(&self, board: BoardId, table: Arc<InterruptTable>) {
        write(&self.boards).insert(board, table);
        debug!(%board, "board attached to edge dispatcher");
    }

    /// Stop routing edges to `board`. Returns whether it was attached.
    ///
    /// Once this returns no new delivery to the board begins. A dispatch
    /// that picked the board up before the detach still runs to completion
    /// outside the lock, so an interrupt count may move once more after this
    /// returns. Its sends end when the board's cancellation token fires.
    pub fn detach(&self, board: BoardId) -> bool {
        let removed = write(&self.boards).remove(&board).is_some();
        if removed {
            debug!(%board, "board detached from edge dispatcher");
        }
        removed
    }

    pub fn board_count(&self) -> usize {
        read(&self.boards).len()
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    /// Handle one native edge callback.
    ///
    /// Returns how many interrupts accepted the edge, for tests and
    /// benchmarks; the native side ignores it.
    pub fn dispatch(&self, gpio: u32, level: u32, raw_tick: u32) -> usize {
        let Some(level) = Level::from_raw(level) else {
            trace!(gpio, level, "ignoring non-edge callback");
            return 0;
        };
        let tick_us = self.clock.reconstruct(raw_tick);
        let line = LineId::new(gpio);

        // Collect targets, then deliver without holding the board lock.
        let targets: Vec<_> = read(&self.boards)
            .iter()
            .filter_map(|(board, table)| {
                table
                    .get(line)
                    .map(|interrupt| (*board, interrupt, table.cancel_token().clone()))
            })
            .collect();

        if targets.is_empty() {
            debug!(%line, "edge on untracked line");
            return 0;
        }

        let timestamp_nanos = tick_us.saturating_mul(NANOS_PER_MICRO);
        let mut accepted = 0;
        for (board, interrupt, cancel) in targets {
            if !interrupt.admit(tick_us) {
                trace!(%board, %line, tick_us, "edge debounced");
                continue;
            }
            accepted += 1;

            let delivery = interrupt.accept_edge(level, timestamp_nanos, &cancel);
            if let Err(e) = block_on(tokio::task::unconstrained(delivery)) {
                warn!(%board, %line, error = %e, "dropped edge");
            }
        }
        accepted
    }
}
