//! Tokio broadcast event bus for cache change notifications.

use tokio::sync::broadcast;

use crate::models::{CacheEvent, ModuleName};

/// Default buffer capacity of a new bus.
pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 256;

/// Capability to subscribe to cache broadcasts.
///
/// Listeners take this at construction time instead of looking up a
/// process-wide bus.
pub trait CacheEventSource {
    /// Subscribes to all cache events published after this call.
    fn subscribe(&self) -> broadcast::Receiver<CacheEvent>;
}

/// Bus broadcasting [`CacheEvent`]s to every subscriber.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CacheEvent>,
}

/// Filtered receiver that yields events matching a predicate.
pub struct FilteredReceiver<F> {
    receiver: broadcast::Receiver<CacheEvent>,
    predicate: F,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUS_CAPACITY)
    }
}

impl EventBus {
    /// Creates a new event bus with the given buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers (best effort).
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, event: CacheEvent) -> usize {
        metrics::counter!("event_bus_publish_total").increment(1);
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("event_bus_receivers").set(self.sender.receiver_count() as f64);
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                metrics::counter!("event_bus_publish_failed_total").increment(1);
                tracing::debug!("Cache event published with no subscribers");
                0
            },
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Subscribes with a predicate to filter events by attributes.
    #[must_use]
    pub fn subscribe_filtered<F>(&self, predicate: F) -> FilteredReceiver<F>
    where
        F: Fn(&CacheEvent) -> bool,
    {
        metrics::counter!("event_bus_subscriptions_total").increment(1);
        FilteredReceiver {
            receiver: self.sender.subscribe(),
            predicate,
        }
    }

    /// Subscribes to events for one module.
    #[must_use]
    pub fn subscribe_module(
        &self,
        module: ModuleName,
    ) -> FilteredReceiver<impl Fn(&CacheEvent) -> bool> {
        self.subscribe_filtered(move |event| event.module == module)
    }
}

impl CacheEventSource for EventBus {
    fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        metrics::counter!("event_bus_subscriptions_total").increment(1);
        self.sender.subscribe()
    }
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&CacheEvent) -> bool,
{
    /// Receives the next event that matches the predicate.
    pub async fn recv(&mut self) -> Result<CacheEvent, broadcast::error::RecvError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if (self.predicate)(&event) {
                        return Ok(event);
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    metrics::counter!("event_bus_lagged_total").increment(skipped);
                },
                Err(err) => return Err(err),
            }
        }
    }
}
