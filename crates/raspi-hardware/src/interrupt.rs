//! Live interrupt state.
//!
//! An [`Interrupt`] is shared through `Arc` between the board's registry,
//! the callback bridge and any consumer holding a reference. Its identity
//! survives reconfiguration: renaming it, changing its debounce window or
//! moving it to another line updates it in place, so counts and
//! subscriptions carry over.
//!
//! What an interrupt does with an accepted edge depends on its
//! [`InterruptKind`]:
//!
//! - [`InterruptKind::Basic`] counts high edges and streams ticks through an
//!   [`EdgeSink`].
//! - [`InterruptKind::Servo`] measures high pulse widths and reports their
//!   rolling average.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use raspi_core::constants::{DEFAULT_DEBOUNCE_MS, SERVO_ROLLING_AVERAGE_WINDOW};
use raspi_core::{InterruptType, Level, LineId, Tick};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::sink::EdgeSink;
use crate::sync::{lock, read, write};
use crate::types::CallbackHandle;
use crate::{HardwareError, Result};

/// Marker for "no edge accepted yet".
const NO_EDGE: u64 = u64::MAX;

/// Pulse-width tracker for servo feedback lines.
#[derive(Debug, Default)]
pub struct ServoPulse {
    state: Mutex<ServoState>,
}

#[derive(Debug, Default)]
struct ServoState {
    /// Timestamp of the last rising edge, in nanoseconds.
    rising: Option<u64>,

    /// Most recent pulse widths in microseconds.
    widths: VecDeque<u64>,
}

impl ServoPulse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edge. A falling edge closes the pulse opened by the last
    /// rising edge.
    pub fn record(&self, high: bool, timestamp_nanos: u64) {
        let mut state = lock(&self.state);
        if high {
            state.rising = Some(timestamp_nanos);
            return;
        }
        if let Some(rising) = state.rising.take() {
            let width_us = timestamp_nanos.saturating_sub(rising) / 1_000;
            state.widths.push_back(width_us);
            if state.widths.len() > SERVO_ROLLING_AVERAGE_WINDOW {
                state.widths.pop_front();
            }
        }
    }

    /// Rolling average pulse width in microseconds, 0 before the first pulse.
    pub fn average_us(&self) -> i64 {
        let state = lock(&self.state);
        if state.widths.is_empty() {
            return 0;
        }
        let sum: u64 = state.widths.iter().sum();
        i64::try_from(sum / state.widths.len() as u64).unwrap_or(i64::MAX)
    }
}

/// What an interrupt does with accepted edges.
#[derive(Debug)]
#[non_exhaustive]
pub enum InterruptKind {
    /// Edge counter with subscriber fan-out.
    Basic(EdgeSink),

    /// Servo pulse-width averaging.
    Servo(ServoPulse),
}

impl InterruptKind {
    /// Build the empty state for an interrupt type.
    pub fn for_type(interrupt_type: InterruptType) -> Self {
        match interrupt_type {
            InterruptType::Basic => Self::Basic(EdgeSink::new()),
            InterruptType::Servo => Self::Servo(ServoPulse::new()),
        }
    }

    pub fn interrupt_type(&self) -> InterruptType {
        match self {
            Self::Basic(_) => InterruptType::Basic,
            Self::Servo(_) => InterruptType::Servo,
        }
    }

    /// Handle an edge that already passed debouncing.
    pub async fn accept_edge(&self, tick: Tick, cancel: &CancellationToken) -> Result<()> {
        match self {
            Self::Basic(sink) => sink.deliver(tick, cancel).await,
            Self::Servo(servo) => {
                servo.record(tick.high, tick.timestamp_nanos);
                Ok(())
            }
        }
    }

    /// Current reading: edge count for basic, average pulse width for servo.
    pub fn value(&self) -> i64 {
        match self {
            Self::Basic(sink) => sink.current_count(),
            Self::Servo(servo) => servo.average_us(),
        }
    }
}

/// A digital interrupt bound to one hardware line.
#[derive(Debug)]
pub struct Interrupt {
    name: RwLock<String>,
    line: AtomicU32,
    debounce_us: AtomicU64,
    /// Reconstructed tick of the last accepted edge, in microseconds.
    last_accepted: AtomicU64,
    callback: Mutex<Option<CallbackHandle>>,
    kind: InterruptKind,
}

impl Interrupt {
    pub fn new(
        name: impl Into<String>,
        line: LineId,
        debounce: Duration,
        interrupt_type: InterruptType,
    ) -> Self {
        Self {
            name: RwLock::new(name.into()),
            line: AtomicU32::new(line.as_u32()),
            debounce_us: AtomicU64::new(duration_us(debounce)),
            last_accepted: AtomicU64::new(NO_EDGE),
            callback: Mutex::new(None),
            kind: InterruptKind::for_type(interrupt_type),
        }
    }

    /// Basic interrupt without debouncing, as created on lookup by label.
    pub fn implicit(label: impl Into<String>, line: LineId) -> Self {
        Self::new(
            label,
            line,
            Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            InterruptType::Basic,
        )
    }

    pub fn name(&self) -> String {
        read(&self.name).clone()
    }

    pub fn line(&self) -> LineId {
        LineId::new(self.line.load(Ordering::Acquire))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_micros(self.debounce_us.load(Ordering::Acquire))
    }

    pub fn kind(&self) -> &InterruptKind {
        &self.kind
    }

    pub fn interrupt_type(&self) -> InterruptType {
        self.kind.interrupt_type()
    }

    /// Edge count (basic) or average pulse width in microseconds (servo).
    pub fn value(&self) -> i64 {
        self.kind.value()
    }

    /// Native callback currently armed for this interrupt.
    pub fn callback_handle(&self) -> Option<CallbackHandle> {
        *lock(&self.callback)
    }

    /// The edge sink, for basic interrupts.
    pub fn sink(&self) -> Option<&EdgeSink> {
        match &self.kind {
            InterruptKind::Basic(sink) => Some(sink),
            InterruptKind::Servo(_) => None,
        }
    }

    /// Stream future ticks of this interrupt to `channel`.
    ///
    /// # Errors
    ///
    /// [`HardwareError::Unsupported`] for servo interrupts.
    pub fn subscribe(&self, channel: mpsc::Sender<Tick>) -> Result<()> {
        self.sink()
            .ok_or_else(|| HardwareError::unsupported("subscribe on servo interrupt"))?
            .subscribe(channel);
        Ok(())
    }

    /// Stop streaming to `channel`. No-op if it was never subscribed.
    pub fn unsubscribe(&self, channel: &mpsc::Sender<Tick>) -> bool {
        self.sink().is_some_and(|sink| sink.unsubscribe(channel))
    }

    /// Debounce check. Accepts the edge and records it as the latest accepted
    /// one unless it lands inside the window opened by the previous accepted
    /// edge.
    pub(crate) fn admit(&self, tick_us: u64) -> bool {
        let window = self.debounce_us.load(Ordering::Acquire);
        let mut last = self.last_accepted.load(Ordering::Acquire);
        loop {
            if window > 0 && last != NO_EDGE && tick_us.saturating_sub(last) < window {
                return false;
            }
            match self.last_accepted.compare_exchange_weak(
                last,
                tick_us,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(current) => last = current,
            }
        }
    }

    /// Forward an admitted edge to the kind-specific handler.
    pub(crate) async fn accept_edge(
        &self,
        level: Level,
        timestamp_nanos: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let tick = Tick {
            name: self.name(),
            high: level.is_high(),
            timestamp_nanos,
        };
        self.kind.accept_edge(tick, cancel).await
    }

    pub(crate) fn set_name(&self, name: impl Into<String>) {
        *write(&self.name) = name.into();
    }

    pub(crate) fn set_line(&self, line: LineId) {
        self.line.store(line.as_u32(), Ordering::Release);
    }

    pub(crate) fn set_debounce(&self, debounce: Duration) {
        self.debounce_us
            .store(duration_us(debounce), Ordering::Release);
    }

    /// Replace the armed callback, returning the previous one.
    pub(crate) fn set_callback(&self, handle: Option<CallbackHandle>) -> Option<CallbackHandle> {
        std::mem::replace(&mut *lock(&self.callback), handle)
    }

    pub(crate) fn take_callback(&self) -> Option<CallbackHandle> {
        lock(&self.callback).take()
    }
}

fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn test_first_edge_always_admitted() {
        let interrupt = Interrupt::new(
            "i1",
            LineId::new(17),
            Duration::from_millis(5),
            InterruptType::Basic,
        );
        assert!(interrupt.admit(0));
    }

    #[test]
    fn test_debounce_measures_from_last_accepted() {
        let interrupt = Interrupt::new(
            "i1",
            LineId::new(17),
            Duration::from_millis(5),
            InterruptType::Basic,
        );

        assert!(interrupt.admit(1_000));
        assert!(!interrupt.admit(3_000));
        // Rejected bounces do not restart the window
        assert!(interrupt.admit(6_500));
        assert!(!interrupt.admit(11_499));
        assert!(interrupt.admit(11_500));
    }

    #[test]
    fn test_zero_debounce_admits_everything() {
        let interrupt = Interrupt::implicit("13", LineId::new(27));
        assert!(interrupt.admit(5));
        assert!(interrupt.admit(5));
        assert!(interrupt.admit(6));
    }

    #[test]
    fn test_debounce_change_keeps_last_accepted() {
        let interrupt = Interrupt::implicit("13", LineId::new(27));
        assert!(interrupt.admit(100));

        interrupt.set_debounce(Duration::from_millis(1));
        assert!(!interrupt.admit(600));
        assert!(interrupt.admit(1_100));
    }

    #[test]
    fn test_servo_average() {
        let servo = ServoPulse::new();
        assert_eq!(servo.average_us(), 0);

        // 1500us and 1700us pulses
        servo.record(true, 0);
        servo.record(false, 1_500_000);
        servo.record(true, 20_000_000);
        servo.record(false, 21_700_000);

        assert_eq!(servo.average_us(), 1_600);
    }

    #[test]
    fn test_servo_ignores_falling_edge_without_rising() {
        let servo = ServoPulse::new();
        servo.record(false, 1_000_000);
        assert_eq!(servo.average_us(), 0);
    }

    #[test]
    fn test_servo_window_is_bounded() {
        let servo = ServoPulse::new();
        let mut t = 0;
        for _ in 0..SERVO_ROLLING_AVERAGE_WINDOW {
            servo.record(true, t);
            servo.record(false, t + 1_000_000);
            t += 20_000_000;
        }
        assert_eq!(servo.average_us(), 1_000);

        for _ in 0..SERVO_ROLLING_AVERAGE_WINDOW {
            servo.record(true, t);
            servo.record(false, t + 2_000_000);
            t += 20_000_000;
        }
        assert_eq!(servo.average_us(), 2_000);
    }

    #[test]
    fn test_servo_rejects_subscribers() {
        let interrupt = Interrupt::new(
            "servo-i",
            LineId::new(25),
            Duration::ZERO,
            InterruptType::Servo,
        );
        let (tx, _rx) = mpsc::channel(1);
        assert!(matches!(
            interrupt.subscribe(tx.clone()),
            Err(HardwareError::Unsupported { .. })
        ));
        assert!(!interrupt.unsubscribe(&tx));
    }

    #[test]
    fn test_accept_edge_uses_current_name() {
        let interrupt = Interrupt::implicit("x", LineId::new(17));
        let (tx, mut rx) = mpsc::channel(2);
        interrupt.subscribe(tx).unwrap();
        interrupt.set_name("y");

        block_on(interrupt.accept_edge(Level::High, 7_000, &CancellationToken::new())).unwrap();

        let tick = rx.try_recv().unwrap();
        assert_eq!(tick.name, "y");
        assert!(tick.high);
        assert_eq!(tick.timestamp_nanos, 7_000);
        assert_eq!(interrupt.value(), 1);
    }

    #[test]
    fn test_callback_replacement() {
        let interrupt = Interrupt::implicit("x", LineId::new(17));
        assert_eq!(interrupt.set_callback(Some(CallbackHandle::new(1))), None);
        assert_eq!(
            interrupt.set_callback(Some(CallbackHandle::new(2))),
            Some(CallbackHandle::new(1))
        );
        assert_eq!(interrupt.take_callback(), Some(CallbackHandle::new(2)));
        assert_eq!(interrupt.callback_handle(), None);
    }
}
