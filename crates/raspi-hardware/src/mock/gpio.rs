//! Mock native GPIO library.
//!
//! [`MockGpio`] stands in for the GPIO daemon bindings: it hands out callback
//! ids, remembers which line each one is armed on and records pull settings.
//! The paired [`MockGpioHandle`] inspects that state, injects failures and
//! simulates edges by calling the edge dispatcher the way the daemon would.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use raspi_core::{Level, LineId, Pull};

use crate::bridge::EdgeDispatcher;
use crate::sync::lock;
use crate::traits::GpioBackend;
use crate::types::CallbackHandle;
use crate::{HardwareError, Result};

#[derive(Debug, Default)]
struct MockState {
    next_id: u32,
    callbacks: HashMap<CallbackHandle, LineId>,
    pulls: HashMap<LineId, Pull>,
    fail_register: HashSet<LineId>,
    fail_unregister: HashSet<LineId>,
    register_calls: usize,
}

/// Mock GPIO backend.
///
/// # Examples
///
/// ```
/// use raspi_core::LineId;
/// use raspi_hardware::mock::MockGpio;
/// use raspi_hardware::traits::GpioBackend;
///
/// let (gpio, handle) = MockGpio::new();
/// handle.fail_register(LineId::new(4));
///
/// assert!(gpio.register(LineId::new(4)).is_err());
/// assert!(gpio.register(LineId::new(17)).is_ok());
/// assert_eq!(handle.registered_lines(), vec![LineId::new(17)]);
/// ```
#[derive(Debug, Clone)]
pub struct MockGpio {
    state: Arc<Mutex<MockState>>,
}

impl MockGpio {
    /// Create a mock wired to the process-wide dispatcher.
    ///
    /// Returns a tuple of (MockGpio, MockGpioHandle) where the handle can be
    /// used to inspect registrations and simulate edges.
    pub fn new() -> (Self, MockGpioHandle) {
        Self::with_dispatcher(EdgeDispatcher::global())
    }

    /// Create a mock whose simulated edges go to `dispatcher`.
    pub fn with_dispatcher(dispatcher: Arc<EdgeDispatcher>) -> (Self, MockGpioHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let gpio = Self {
            state: state.clone(),
        };
        let handle = MockGpioHandle { state, dispatcher };
        (gpio, handle)
    }
}

impl GpioBackend for MockGpio {
    fn register(&self, line: LineId) -> Result<CallbackHandle> {
        let mut state = lock(&self.state);
        state.register_calls += 1;

        if state.fail_register.contains(&line) {
            return Err(HardwareError::registration_failed(line, "PI_BAD_GPIO"));
        }
        if state.callbacks.values().any(|l| *l == line) {
            return Err(HardwareError::registration_failed(line, "line busy"));
        }

        state.next_id += 1;
        let handle = CallbackHandle::new(state.next_id);
        state.callbacks.insert(handle, line);
        Ok(handle)
    }

    fn unregister(&self, handle: CallbackHandle) -> Result<()> {
        let mut state = lock(&self.state);
        let Some(line) = state.callbacks.get(&handle).copied() else {
            return Err(HardwareError::callback_failed(handle, "PI_BAD_CALLBACK"));
        };
        if state.fail_unregister.contains(&line) {
            return Err(HardwareError::callback_failed(handle, "PI_BAD_CALLBACK"));
        }
        state.callbacks.remove(&handle);
        Ok(())
    }

    fn set_pull(&self, line: LineId, pull: Pull) -> Result<()> {
        if pull == Pull::Unset {
            return Ok(());
        }
        let mut state = lock(&self.state);
        if state.fail_register.contains(&line) {
            return Err(HardwareError::registration_failed(line, "PI_BAD_PUD"));
        }
        state.pulls.insert(line, pull);
        Ok(())
    }
}

/// Handle for inspecting and driving a [`MockGpio`].
///
/// Can be cloned and shared across tasks and threads.
#[derive(Debug, Clone)]
pub struct MockGpioHandle {
    state: Arc<Mutex<MockState>>,
    dispatcher: Arc<EdgeDispatcher>,
}

impl MockGpioHandle {
    /// Whether a callback is currently armed on `line`.
    pub fn is_registered(&self, line: LineId) -> bool {
        lock(&self.state).callbacks.values().any(|l| *l == line)
    }

    /// Lines holding a callback, in ascending order.
    pub fn registered_lines(&self) -> Vec<LineId> {
        let mut lines: Vec<LineId> = lock(&self.state).callbacks.values().copied().collect();
        lines.sort();
        lines
    }

    /// Number of armed callbacks.
    pub fn callback_count(&self) -> usize {
        lock(&self.state).callbacks.len()
    }

    /// Number of `register` calls made, failed ones included.
    pub fn register_calls(&self) -> usize {
        lock(&self.state).register_calls
    }

    /// Pull mode last applied to `line`.
    pub fn pull(&self, line: LineId) -> Option<Pull> {
        lock(&self.state).pulls.get(&line).copied()
    }

    /// Make `register` and `set_pull` fail for `line`.
    pub fn fail_register(&self, line: LineId) {
        lock(&self.state).fail_register.insert(line);
    }

    /// Make `unregister` fail for callbacks armed on `line`.
    pub fn fail_unregister(&self, line: LineId) {
        lock(&self.state).fail_unregister.insert(line);
    }

    pub fn clear_failures(&self) {
        let mut state = lock(&self.state);
        state.fail_register.clear();
        state.fail_unregister.clear();
    }

    /// Simulate the daemon reporting an edge on `line`.
    ///
    /// Only lines with an armed callback reach the dispatcher. Returns how
    /// many interrupts accepted the edge.
    pub fn drive(&self, line: LineId, level: Level, raw_tick: u32) -> usize {
        self.drive_raw(line, level.as_raw(), raw_tick)
    }

    /// Like [`drive`](Self::drive) with an undecoded level value, e.g. the
    /// watchdog marker.
    pub fn drive_raw(&self, line: LineId, level: u32, raw_tick: u32) -> usize {
        if !self.is_registered(line) {
            return 0;
        }
        self.dispatcher.dispatch(line.as_u32(), level, raw_tick)
    }
}
