use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, trace};

use super::InvalidationEvent;

pub type Handler = Arc<dyn Fn(&InvalidationEvent) + Send + Sync>;

struct Registration {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    topics: Mutex<HashMap<String, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl Registry {
    fn topics(&self) -> MutexGuard<'_, HashMap<String, Vec<Registration>>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, topic: &str, id: u64) {
        let mut topics = self.topics();
        if let Some(handlers) = topics.get_mut(topic) {
            handlers.retain(|r| r.id != id);
            if handlers.is_empty() {
                topics.remove(topic);
            }
        }
    }
}

/// Synchronous, in-process publish/subscribe keyed by resource type.
///
/// Delivery is at most once to each handler subscribed at the moment of
/// `publish`; nothing is queued for later subscribers. The bus does not
/// filter by origin; see [`InvalidationEvent::should_skip`].
#[derive(Clone, Default)]
pub struct InvalidationBus {
    registry: Arc<Registry>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events about `resource_type`. The handler
    /// stays registered until the returned `Subscription` is dropped or
    /// unsubscribed.
    pub fn subscribe<F>(&self, resource_type: &str, handler: F) -> Subscription
    where
        F: Fn(&InvalidationEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .topics()
            .entry(resource_type.to_string())
            .or_default()
            .push(Registration {
                id,
                handler: Arc::new(handler),
            });
        debug!(resource = resource_type, subscription = id, "Subscribed to invalidations");

        Subscription {
            registry: Arc::downgrade(&self.registry),
            topic: resource_type.to_string(),
            id,
            active: true,
        }
    }

    /// Deliver `event` to every current subscriber of its resource type.
    /// Returns the number of handlers invoked.
    ///
    /// Handlers run after the registry lock is released, so a handler may
    /// itself subscribe, unsubscribe or publish.
    pub fn publish(&self, event: &InvalidationEvent) -> usize {
        let handlers: Vec<Handler> = self
            .registry
            .topics()
            .get(&event.resource_type)
            .map(|regs| regs.iter().map(|r| Arc::clone(&r.handler)).collect())
            .unwrap_or_default();

        debug!(
            resource = %event.resource_type,
            action = event.action.label(),
            origin = %event.origin_id,
            subscribers = handlers.len(),
            "Publishing invalidation"
        );

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn subscriber_count(&self, resource_type: &str) -> usize {
        self.registry
            .topics()
            .get(resource_type)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Handle for one registered handler; unsubscribes on drop.
///
/// Holds only a weak reference to the bus, so an outstanding subscription
/// never keeps a dropped bus alive.
pub struct Subscription {
    registry: Weak<Registry>,
    topic: String,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.topic, self.id);
            trace!(resource = %self.topic, subscription = self.id, "Unsubscribed from invalidations");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
