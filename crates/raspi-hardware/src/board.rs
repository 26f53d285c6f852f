//! Board facade.
//!
//! A [`Board`] ties one backend, one interrupt registry and one slot in the
//! edge dispatcher together and manages their lifetime:
//!
//! ```text
//!  new ──> attach ──> reconfigure ──> ... ──> close
//!                         │                    │ cancel token
//!                         ├─ interrupts        │ drain stream workers
//!                         └─ pulls             │ detach
//!                                              └ teardown_all
//! ```
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use raspi_core::{BoardConfig, Level, LineId, PinConfig};
//! use raspi_hardware::board::Board;
//! use raspi_hardware::bridge::EdgeDispatcher;
//! use raspi_hardware::mock::MockGpio;
//!
//! # #[tokio::main]
//! # async fn main() -> raspi_hardware::Result<()> {
//! let dispatcher = Arc::new(EdgeDispatcher::new());
//! let (gpio, handle) = MockGpio::with_dispatcher(dispatcher.clone());
//! let config = BoardConfig::new(vec![PinConfig::interrupt("button", "11")]);
//!
//! let board = Board::with_dispatcher(&config, gpio, dispatcher)?;
//! handle.drive(LineId::new(17), Level::High, 0);
//!
//! let button = board.digital_interrupt_by_name("button")?;
//! assert_eq!(button.value(), 1);
//!
//! board.close().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use raspi_core::{BoardConfig, PinConfig, Pull, Tick};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::EdgeDispatcher;
use crate::interrupt::Interrupt;
use crate::registry::{InterruptRegistry, InterruptTable};
use crate::sync::lock;
use crate::traits::GpioBackend;
use crate::types::BoardId;
use crate::{HardwareError, Result};

/// A configured Raspberry Pi board.
pub struct Board<B: GpioBackend> {
    id: BoardId,
    registry: InterruptRegistry<B>,
    dispatcher: Arc<EdgeDispatcher>,

    /// Fired on close; bounds every delivery and stream worker.
    cancel: CancellationToken,

    /// Running `stream_ticks` workers.
    workers: Mutex<JoinSet<()>>,

    closed: AtomicBool,
}

impl<B: GpioBackend> std::fmt::Debug for Board<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("id", &self.id)
            .field("interrupts", &self.registry.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<B: GpioBackend> Board<B> {
    /// Create a board routed through the process-wide dispatcher.
    pub fn new(config: &BoardConfig, backend: B) -> Result<Self> {
        Self::with_dispatcher(config, backend, EdgeDispatcher::global())
    }

    /// Create a board routed through `dispatcher`.
    ///
    /// # Errors
    ///
    /// Any error from [`reconfigure`](Self::reconfigure). The board is
    /// detached again before the error is returned.
    pub fn with_dispatcher(
        config: &BoardConfig,
        backend: B,
        dispatcher: Arc<EdgeDispatcher>,
    ) -> Result<Self> {
        let cancel = CancellationToken::new();
        let table = Arc::new(InterruptTable::new(cancel.clone()));
        let id = BoardId::next();

        let board = Self {
            id,
            registry: InterruptRegistry::new(backend, table.clone()),
            dispatcher,
            cancel,
            workers: Mutex::new(JoinSet::new()),
            closed: AtomicBool::new(false),
        };

        board.dispatcher.attach(id, table);
        if let Err(e) = board.reconfigure(config) {
            error!(board = %id, error = %e, "initial configuration failed");
            board.shutdown_now();
            return Err(e);
        }

        info!(board = %id, interrupts = board.registry.len(), "board ready");
        Ok(board)
    }

    pub fn id(&self) -> BoardId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Apply a new pin configuration.
    ///
    /// Empty names default to the hardware label. Interrupts are reconciled
    /// first; pull settings are applied afterwards and their failures are
    /// only logged.
    ///
    /// # Errors
    ///
    /// - [`HardwareError::Closed`] after [`close`](Self::close).
    /// - [`HardwareError::UnknownPin`] or [`HardwareError::Config`] for an
    ///   invalid configuration.
    /// - [`HardwareError::HardwareRegistrationFailed`] if reconciling the
    ///   interrupts fails. Nothing is changed in that case.
    pub fn reconfigure(&self, config: &BoardConfig) -> Result<()> {
        self.ensure_open()?;

        let config = config.normalized();
        config.validate()?;

        self.registry.reconfigure(&config.pins)?;
        self.apply_pulls(&config.pins);

        debug!(board = %self.id, pins = config.pins.len(), "configuration applied");
        Ok(())
    }

    fn apply_pulls(&self, pins: &[PinConfig]) {
        for pin in pins.iter().filter(|p| p.pull != Pull::Unset) {
            let result = pin
                .line()
                .map_err(HardwareError::from)
                .and_then(|line| self.registry.backend().set_pull(line, pin.pull));
            if let Err(e) = result {
                error!(board = %self.id, name = %pin.name, error = %e, "failed to set pull");
            }
        }
    }

    /// Last applied pin configuration, names filled in.
    pub fn pin_configs(&self) -> Vec<PinConfig> {
        self.registry.pin_configs()
    }

    /// Interrupt by logical name or hardware label, created on demand.
    pub fn digital_interrupt_by_name(&self, name: &str) -> Result<Arc<Interrupt>> {
        self.ensure_open()?;
        self.registry.lookup_or_create(name)
    }

    /// Logical names of every tracked interrupt, sorted.
    pub fn digital_interrupt_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn interrupt_count(&self) -> usize {
        self.registry.len()
    }

    /// Stream ticks of `interrupts` to `sender` until `cancel` fires, the
    /// receiver goes away or the board closes.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`HardwareError::Unsupported`] if an interrupt does not stream
    ///   ticks, or if no tokio runtime is running. No subscription is left
    ///   behind in that case.
    /// - [`HardwareError::Closed`] after [`close`](Self::close).
    pub fn stream_ticks(
        &self,
        interrupts: &[Arc<Interrupt>],
        sender: mpsc::Sender<Tick>,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.ensure_open()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| HardwareError::unsupported("stream_ticks outside a tokio runtime"))?;

        for (idx, interrupt) in interrupts.iter().enumerate() {
            if let Err(e) = interrupt.subscribe(sender.clone()) {
                for earlier in &interrupts[..idx] {
                    earlier.unsubscribe(&sender);
                }
                return Err(e);
            }
        }

        let interrupts = interrupts.to_vec();
        let board_cancel = self.cancel.clone();
        let board = self.id;
        lock(&self.workers).spawn_on(
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = board_cancel.cancelled() => {}
                    _ = sender.closed() => {}
                }
                for interrupt in &interrupts {
                    interrupt.unsubscribe(&sender);
                }
                debug!(%board, interrupts = interrupts.len(), "tick stream ended");
            },
            &runtime,
        );
        Ok(())
    }

    /// Shut the board down.
    ///
    /// Stops deliveries, waits for stream workers, detaches from the
    /// dispatcher and disarms every interrupt. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Every callback that could not be disarmed, aggregated.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!(board = %self.id, "Duplicate call to close");
            return Ok(());
        }

        self.cancel.cancel();

        let mut workers = std::mem::take(&mut *lock(&self.workers));
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                warn!(board = %self.id, error = %e, "tick stream worker failed");
            }
        }

        self.dispatcher.detach(self.id);
        let result = self.registry.teardown_all();
        info!(board = %self.id, "board closed");
        result
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(HardwareError::Closed);
        }
        Ok(())
    }

    /// Synchronous close, for failed construction and drop.
    fn shutdown_now(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        lock(&self.workers).abort_all();
        self.dispatcher.detach(self.id);
        if let Err(e) = self.registry.teardown_all() {
            warn!(board = %self.id, error = %e, "teardown failed");
        }
    }
}

impl<B: GpioBackend> Drop for Board<B> {
    fn drop(&mut self) {
        if !self.is_closed() {
            debug!(board = %self.id, "board dropped without close");
            self.shutdown_now();
        }
    }
}
