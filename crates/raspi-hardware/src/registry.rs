//! Interrupt registry: which interrupt owns which hardware line.
//!
//! The registry keeps two things apart:
//!
//! - [`InterruptTable`] holds the *published* snapshot, an immutable
//!   `line -> interrupt` map behind an `Arc`. The callback bridge reads it
//!   without ever touching the registry mutex.
//! - [`InterruptRegistry`] serialises every mutation behind a single
//!   per-board mutex, builds the next snapshot off to the side and installs
//!   it in one swap once all hardware calls have succeeded.
//!
//! ```text
//!   lookup_or_create ┐                       ┌──> callback bridge
//!   reconfigure      ├─> [mutex] ─> install ─┤
//!   teardown_all     ┘              snapshot └──> names()
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use raspi_core::{LineId, PinConfig, PinTable};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::interrupt::Interrupt;
use crate::reconcile::reconcile;
use crate::sync::{lock, read, write};
use crate::traits::GpioBackend;
use crate::{HardwareError, Result};

/// Snapshot of tracked interrupts keyed by hardware line.
pub type InterruptMap = HashMap<LineId, Arc<Interrupt>>;

/// The published view of a board's interrupts, shared with the bridge.
#[derive(Debug, Default)]
pub struct InterruptTable {
    snapshot: RwLock<Arc<InterruptMap>>,
    cancel: CancellationToken,
}

impl InterruptTable {
    /// Empty table whose deliveries are bounded by `cancel`.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(InterruptMap::new())),
            cancel,
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<InterruptMap> {
        read(&self.snapshot).clone()
    }

    /// Interrupt armed on `line`, if any.
    pub fn get(&self, line: LineId) -> Option<Arc<Interrupt>> {
        read(&self.snapshot).get(&line).cloned()
    }

    /// Signal bounding every delivery made on behalf of this board.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn install(&self, map: InterruptMap) {
        *write(&self.snapshot) = Arc::new(map);
    }
}

/// State guarded by the registry's mutation lock.
#[derive(Debug, Default)]
struct RegistryState {
    /// Pin list of the last successful reconfigure.
    pins: Vec<PinConfig>,
    /// Set by `teardown_all`; no callback is armed afterwards.
    closed: bool,
}

/// Owner of a board's interrupts and their native callbacks.
#[derive(Debug)]
pub struct InterruptRegistry<B> {
    backend: B,
    table: Arc<InterruptTable>,
    /// Per-board mutation lock. Never acquired while the dispatcher's board
    /// lock is held.
    state: Mutex<RegistryState>,
}

impl<B: GpioBackend> InterruptRegistry<B> {
    pub fn new(backend: B, table: Arc<InterruptTable>) -> Self {
        Self {
            backend,
            table,
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn table(&self) -> &Arc<InterruptTable> {
        &self.table
    }

    /// Find an interrupt by logical name or hardware label, creating one on
    /// demand.
    ///
    /// A label that matches no logical name is resolved through the pin
    /// table. If no interrupt is armed on that line, a basic interrupt named
    /// after the label, without debouncing, is created and registered.
    ///
    /// # Errors
    ///
    /// - [`HardwareError::UnknownPin`] if the label does not resolve.
    /// - [`HardwareError::HardwareRegistrationFailed`] if arming the callback
    ///   fails; nothing is recorded in that case.
    /// - [`HardwareError::Closed`] after [`teardown_all`](Self::teardown_all).
    pub fn lookup_or_create(&self, label: &str) -> Result<Arc<Interrupt>> {
        let state = lock(&self.state);
        if state.closed {
            return Err(HardwareError::Closed);
        }
        let current = self.table.snapshot();

        if let Some(existing) = current.values().find(|i| i.name() == label) {
            return Ok(existing.clone());
        }

        let line = PinTable::resolve(label).ok_or_else(|| HardwareError::unknown_pin(label))?;
        if let Some(existing) = current.get(&line) {
            return Ok(existing.clone());
        }

        let interrupt = Arc::new(Interrupt::implicit(label, line));
        let handle = self.backend.register(line)?;
        interrupt.set_callback(Some(handle));

        let mut next = (*current).clone();
        if let Some(previous) = next.insert(line, interrupt.clone()) {
            warn!(
                "{}",
                HardwareError::already_tracked(line, previous.name())
            );
        }
        self.table.install(next);

        info!(%line, name = label, callback = %handle, "created digital interrupt");
        Ok(interrupt)
    }

    /// Logical names of every tracked interrupt, sorted.
    pub fn names(&self) -> Vec<String> {
        let _state = lock(&self.state);
        let mut names: Vec<String> = self.table.snapshot().values().map(|i| i.name()).collect();
        names.sort();
        names
    }

    /// Number of tracked interrupts.
    pub fn len(&self) -> usize {
        self.table.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pin list of the last successful [`reconfigure`](Self::reconfigure).
    pub fn pin_configs(&self) -> Vec<PinConfig> {
        lock(&self.state).pins.clone()
    }

    /// Bring the tracked interrupts in line with `wanted`.
    ///
    /// Only entries of kind interrupt are reconciled, but the whole list is
    /// recorded. On error the previously installed snapshot and pin list stay
    /// in place.
    ///
    /// # Errors
    ///
    /// [`HardwareError::Closed`] after [`teardown_all`](Self::teardown_all),
    /// otherwise any error from reconciliation.
    pub fn reconfigure(&self, wanted: &[PinConfig]) -> Result<()> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(HardwareError::Closed);
        }
        let current = self.table.snapshot();
        let next = reconcile(&self.backend, &current, wanted)?;
        debug!(before = current.len(), after = next.len(), "installing interrupt snapshot");
        self.table.install(next);
        state.pins = wanted.to_vec();
        Ok(())
    }

    /// Disarm every interrupt and forget them all.
    ///
    /// Keeps going past failures and reports all of them together. The
    /// registry refuses to arm anything afterwards.
    pub fn teardown_all(&self) -> Result<()> {
        let mut state = lock(&self.state);
        state.closed = true;
        let current = self.table.snapshot();

        let mut errors = Vec::new();
        for interrupt in current.values() {
            let Some(handle) = interrupt.take_callback() else {
                continue;
            };
            if let Err(e) = self.backend.unregister(handle) {
                warn!(line = %interrupt.line(), error = %e, "failed to tear down interrupt");
                errors.push(e);
            }
        }

        self.table.install(InterruptMap::new());
        HardwareError::combine(errors)
    }
}
