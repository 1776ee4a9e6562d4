//! Multi-subscriber `EventBus` for repofetch events.
//!
//! Provides a broadcast-capable event bus that allows multiple subscribers
//! to receive events concurrently. Producers only ever see an [`EventSender`],
//! which is the fire-and-forget event sink handed to fetch operations.

use crate::event::{EventCategory, EventSource, RepofetchEvent};
use crate::metadata::correlation_id;
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};

/// Default channel capacity for the broadcast channel.
const DEFAULT_BROADCAST_CAPACITY: usize = 1000;

/// Multi-subscriber event bus.
///
/// Events sent to this bus are broadcast to all subscribers.
/// Uses tokio's broadcast channel for fan-out delivery.
#[derive(Debug)]
pub struct EventBus {
    /// Sender for submitting events (wrapped in Option for shutdown support).
    /// When `shutdown()` is called, this is set to None, which drops the sender
    /// and causes the forwarding task to exit.
    sender: Mutex<Option<mpsc::UnboundedSender<RepofetchEvent>>>,
    /// Broadcast sender for fan-out.
    broadcast_tx: broadcast::Sender<RepofetchEvent>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// Spawns a background task to forward events from the mpsc channel
    /// to the broadcast channel. Must be called from within a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
    }

    /// Create a new event bus with a specific broadcast capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<RepofetchEvent>();
        let (broadcast_tx, _) = broadcast::channel(capacity);

        let broadcast_tx_clone = broadcast_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                // No subscribers is not an error for a fire-and-forget sink
                let _ = broadcast_tx_clone.send(event);
            }
        });

        Self {
            sender: Mutex::new(Some(sender)),
            broadcast_tx,
        }
    }

    /// Get a sender for submitting events to the bus.
    ///
    /// Returns `None` if the bus has been shut down.
    #[must_use]
    pub fn sender(&self) -> Option<EventSender> {
        self.sender
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| EventSender { inner: s.clone() }))
    }

    /// Shut down the event bus.
    ///
    /// Drops the internal sender so the forwarding task exits once every
    /// outstanding [`EventSender`] clone is gone. Safe to call multiple times.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.sender.lock() {
            let _ = guard.take();
        }
    }

    /// Subscribe to events from this bus.
    ///
    /// Returns a receiver that will receive all events sent to the bus
    /// after this subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            inner: self.broadcast_tx.subscribe(),
        }
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.broadcast_tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Sender handle for submitting events to an `EventBus`.
///
/// This is the event sink fetch code reports through. Reporting never fails
/// from the caller's point of view: a closed bus simply drops the event.
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: mpsc::UnboundedSender<RepofetchEvent>,
}

impl EventSender {
    /// Create a sender paired with a raw receiver, without a bus.
    ///
    /// Useful for tests and for embedding repofetch in a host that consumes
    /// events itself.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RepofetchEvent>) {
        let (inner, receiver) = mpsc::unbounded_channel();
        (Self { inner }, receiver)
    }

    /// Create a sender whose events go nowhere.
    #[must_use]
    pub fn detached() -> Self {
        Self::channel().0
    }

    /// Send an event to the bus.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus has been dropped.
    pub fn send(&self, event: RepofetchEvent) -> Result<(), SendError> {
        self.inner.send(event).map_err(|_| SendError::Closed)
    }

    /// Report an event, stamping it with the session correlation id.
    ///
    /// Fire-and-forget: delivery failures are logged at trace level and
    /// otherwise ignored.
    pub fn report(&self, target: &str, category: EventCategory) {
        let event = RepofetchEvent::new(correlation_id(), EventSource::new(target), category);
        if self.send(event).is_err() {
            tracing::trace!(target, "Event sink closed, dropping event");
        }
    }

    /// Check if the bus is still open.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Receiver handle for receiving events from an `EventBus`.
#[derive(Debug)]
pub struct EventReceiver {
    inner: broadcast::Receiver<RepofetchEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the bus has been dropped.
    /// May skip events if the receiver falls behind.
    pub async fn recv(&mut self) -> Option<RepofetchEvent> {
        loop {
            match self.inner.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event receiver lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without waiting.
    ///
    /// Returns `None` if no event is immediately available or the bus is closed.
    pub fn try_recv(&mut self) -> Option<RepofetchEvent> {
        loop {
            match self.inner.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event receiver lagged, skipped events");
                }
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => {
                    return None;
                }
            }
        }
    }
}

/// Error returned when sending to a closed bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The event bus has been closed.
    Closed,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "event bus is closed"),
        }
    }
}

impl std::error::Error for SendError {}

#[cfg(test)]
#[allow(clippy::similar_names)]
mod tests {
    use super::*;
    use crate::event::{FetchEvent, OutputEvent};
    use uuid::Uuid;

    fn make_test_event() -> RepofetchEvent {
        RepofetchEvent::new(
            Uuid::new_v4(),
            EventSource::new("repofetch::test"),
            EventCategory::Output(OutputEvent::Stdout {
                content: "test".to_string(),
            }),
        )
    }

    #[tokio::test]
    async fn test_event_bus_send_receive() {
        let bus = EventBus::new();
        let sender = bus.sender().expect("sender should be available");
        let mut receiver = bus.subscribe();

        let event = make_test_event();
        let event_id = event.id;

        sender.send(event).unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.id, event_id);
    }

    #[tokio::test]
    async fn test_event_bus_multiple_subscribers() {
        let bus = EventBus::new();
        let sender = bus.sender().expect("sender should be available");
        let mut receiver1 = bus.subscribe();
        let mut receiver2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        let event = make_test_event();
        let event_id = event.id;

        sender.send(event).unwrap();

        let received1 = receiver1.recv().await.unwrap();
        let received2 = receiver2.recv().await.unwrap();

        assert_eq!(received1.id, event_id);
        assert_eq!(received2.id, event_id);
    }

    #[tokio::test]
    async fn test_report_stamps_correlation_id() {
        let bus = EventBus::new();
        let sender = bus.sender().expect("sender should be available");
        let mut receiver = bus.subscribe();

        sender.report(
            "repofetch::fetch",
            EventCategory::Fetch(FetchEvent::Started {
                repository: "png".into(),
                kind: "http_archive".into(),
            }),
        );

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.correlation_id, correlation_id());
        assert_eq!(received.source.target, "repofetch::fetch");
        assert_eq!(received.repository(), Some("png"));
    }

    #[tokio::test]
    async fn test_shutdown_disables_sender() {
        let bus = EventBus::new();
        assert!(bus.sender().is_some());
        bus.shutdown();
        assert!(bus.sender().is_none());
        bus.shutdown();
    }

    #[test]
    fn test_channel_sender_delivers() {
        let (sender, mut receiver) = EventSender::channel();
        sender.send(make_test_event()).unwrap();
        assert!(receiver.try_recv().is_ok());
    }

    #[test]
    fn test_detached_sender_swallows_reports() {
        let sender = EventSender::detached();
        assert!(sender.is_closed());
        // Must not panic or error
        sender.report(
            "repofetch::test",
            EventCategory::Output(OutputEvent::Stderr {
                content: "dropped".into(),
            }),
        );
        assert_eq!(sender.send(make_test_event()), Err(SendError::Closed));
    }

    #[tokio::test]
    async fn test_event_receiver_try_recv_empty() {
        let bus = EventBus::new();
        let _sender = bus.sender().expect("sender should be available");
        let mut receiver = bus.subscribe();

        assert!(receiver.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_multiple_events_in_order() {
        let bus = EventBus::new();
        let sender = bus.sender().expect("sender should be available");
        let mut receiver = bus.subscribe();

        let events = [make_test_event(), make_test_event(), make_test_event()];
        let ids: Vec<_> = events.iter().map(|e| e.id).collect();

        for event in events {
            sender.send(event).unwrap();
        }

        for id in ids {
            assert_eq!(receiver.recv().await.unwrap().id, id);
        }
    }

    #[test]
    fn test_send_error_display() {
        assert_eq!(SendError::Closed.to_string(), "event bus is closed");
    }
}
