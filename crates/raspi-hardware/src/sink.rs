//! Per-interrupt edge counter and subscriber fan-out.
//!
//! An [`EdgeSink`] counts high edges and forwards every accepted edge to the
//! channels subscribed to it. Sends wait for channel capacity, but every wait
//! races the caller's [`CancellationToken`]: a consumer that stops reading can
//! delay delivery until the token fires and no longer.
//!
//! ```
//! use raspi_core::Tick;
//! use raspi_hardware::sink::EdgeSink;
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! let sink = EdgeSink::new();
//! let (tx, mut rx) = mpsc::channel(4);
//! sink.subscribe(tx);
//!
//! let tick = Tick { name: "i1".into(), high: true, timestamp_nanos: 1_000 };
//! futures::executor::block_on(sink.deliver(tick, &CancellationToken::new())).unwrap();
//!
//! assert_eq!(sink.current_count(), 1);
//! assert!(rx.try_recv().unwrap().high);
//! ```

use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use raspi_core::Tick;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::sync::{read, write};
use crate::{HardwareError, Result};

/// Edge counter plus subscriber set.
#[derive(Debug, Default)]
pub struct EdgeSink {
    /// Number of high edges accepted so far.
    count: AtomicI64,

    /// Subscribed channels, in subscription order.
    subscribers: RwLock<Vec<mpsc::Sender<Tick>>>,
}

impl EdgeSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel to receive future ticks.
    pub fn subscribe(&self, channel: mpsc::Sender<Tick>) {
        write(&self.subscribers).push(channel);
    }

    /// Remove a channel. Removing a channel that is not subscribed is a no-op.
    ///
    /// Returns whether a subscription was removed. A send already in flight
    /// to this channel is not interrupted.
    pub fn unsubscribe(&self, channel: &mpsc::Sender<Tick>) -> bool {
        let mut subscribers = write(&self.subscribers);
        match subscribers.iter().position(|c| c.same_channel(channel)) {
            Some(idx) => {
                subscribers.swap_remove(idx);
                true
            }
            None => false,
        }
    }

    /// Number of high edges seen.
    pub fn current_count(&self) -> i64 {
        self.count.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        read(&self.subscribers).len()
    }

    /// Count the edge and fan it out to every subscriber.
    ///
    /// Subscribers are served one after another in subscription order. The
    /// subscriber list is snapshotted first, so subscription changes made
    /// during delivery apply to the next edge.
    ///
    /// # Errors
    ///
    /// [`HardwareError::Cancelled`] if `cancel` fires before every subscriber
    /// has received the tick. Remaining subscribers are skipped.
    pub async fn deliver(&self, tick: Tick, cancel: &CancellationToken) -> Result<()> {
        if tick.high {
            self.count.fetch_add(1, Ordering::AcqRel);
        }

        let subscribers = read(&self.subscribers).clone();
        let mut closed = Vec::new();

        for channel in &subscribers {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(name = %tick.name, "delivery cancelled");
                    return Err(HardwareError::Cancelled);
                }
                sent = channel.send(tick.clone()) => {
                    if sent.is_err() {
                        closed.push(channel.clone());
                    }
                }
            }
        }

        if !closed.is_empty() {
            trace!(name = %tick.name, dropped = closed.len(), "pruning closed subscribers");
            for channel in &closed {
                self.unsubscribe(channel);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn tick(high: bool, timestamp_nanos: u64) -> Tick {
        Tick {
            name: "i1".to_string(),
            high,
            timestamp_nanos,
        }
    }

    #[test]
    fn test_counts_only_high_edges() {
        let sink = EdgeSink::new();
        let cancel = CancellationToken::new();

        for i in 0..10u64 {
            block_on(sink.deliver(tick(i % 2 == 1, i), &cancel)).unwrap();
        }

        assert_eq!(sink.current_count(), 5);
    }

    #[test]
    fn test_fan_out_to_every_subscriber() {
        let sink = EdgeSink::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        sink.subscribe(tx1);
        sink.subscribe(tx2);

        block_on(sink.deliver(tick(true, 42), &CancellationToken::new())).unwrap();

        assert_eq!(rx1.try_recv().unwrap(), tick(true, 42));
        assert_eq!(rx2.try_recv().unwrap(), tick(true, 42));
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let sink = EdgeSink::new();
        let (tx, mut rx) = mpsc::channel(4);
        sink.subscribe(tx.clone());

        assert!(sink.unsubscribe(&tx));
        assert!(!sink.unsubscribe(&tx));
        assert_eq!(sink.subscriber_count(), 0);

        block_on(sink.deliver(tick(true, 1), &CancellationToken::new())).unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(sink.current_count(), 1);
    }

    #[test]
    fn test_unsubscribe_unknown_channel_keeps_others() {
        let sink = EdgeSink::new();
        let (tx1, _rx1) = mpsc::channel::<Tick>(1);
        let (tx2, _rx2) = mpsc::channel::<Tick>(1);
        sink.subscribe(tx1);

        assert!(!sink.unsubscribe(&tx2));
        assert_eq!(sink.subscriber_count(), 1);
    }

    #[test]
    fn test_cancelled_delivery_on_full_channel() {
        let sink = EdgeSink::new();
        let (tx, mut rx) = mpsc::channel(1);
        sink.subscribe(tx);

        let cancel = CancellationToken::new();
        block_on(sink.deliver(tick(true, 1), &cancel)).unwrap();

        // Channel is full and nobody reads it
        cancel.cancel();
        let result = block_on(sink.deliver(tick(true, 2), &cancel));

        assert!(matches!(result, Err(HardwareError::Cancelled)));
        assert_eq!(sink.current_count(), 2);
        assert_eq!(rx.try_recv().unwrap().timestamp_nanos, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_subscriber_is_pruned() {
        let sink = EdgeSink::new();
        let (tx, rx) = mpsc::channel(1);
        sink.subscribe(tx);
        drop(rx);

        block_on(sink.deliver(tick(false, 1), &CancellationToken::new())).unwrap();
        assert_eq!(sink.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_blocked_send_completes_when_reader_drains() {
        let sink = std::sync::Arc::new(EdgeSink::new());
        let (tx, mut rx) = mpsc::channel(1);
        sink.subscribe(tx);
        let cancel = CancellationToken::new();

        sink.deliver(tick(true, 1), &cancel).await.unwrap();

        let sink2 = sink.clone();
        let cancel2 = cancel.clone();
        let pending = tokio::spawn(async move { sink2.deliver(tick(true, 2), &cancel2).await });

        assert_eq!(rx.recv().await.unwrap().timestamp_nanos, 1);
        assert_eq!(rx.recv().await.unwrap().timestamp_nanos, 2);
        pending.await.unwrap().unwrap();
    }
}
