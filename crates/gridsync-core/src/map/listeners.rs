//! Named-event listener registrations.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::MapEvent;

/// Callback invoked for each delivered event.
pub type Listener = Arc<dyn Fn(&MapEvent) + Send + Sync>;

struct Registration {
    id: u64,
    event: String,
    listener: Listener,
}

/// Ordered set of listener registrations keyed by event name.
///
/// Registering the same listener twice yields two independent registrations
/// and therefore two deliveries per event.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    registrations: Mutex<Vec<Registration>>,
}

impl ListenerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(ListenerRegistry::default())
    }

    /// Add a registration; it stays live until the subscription goes away.
    pub fn subscribe(self: &Arc<Self>, event: &str, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registrations.lock().push(Registration {
            id,
            event: event.to_string(),
            listener,
        });
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.registrations.lock().retain(|r| r.id != id);
    }

    /// Deliver `event` to every listener registered for its name, in
    /// registration order.
    ///
    /// Listeners run outside the registry lock, so they may write to the map
    /// or change registrations. A registration added during delivery sees
    /// the next event, not this one.
    pub fn emit(&self, event: &MapEvent) {
        let targets: Vec<Listener> = self
            .registrations
            .lock()
            .iter()
            .filter(|r| r.event == event.name)
            .map(|r| r.listener.clone())
            .collect();
        for listener in targets {
            listener(event);
        }
    }

    /// Number of live registrations for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.registrations
            .lock()
            .iter()
            .filter(|r| r.event == event)
            .count()
    }
}

/// Handle to one listener registration.
///
/// Dropping the handle removes the registration; [`Subscription::dispose`]
/// does the same explicitly.
#[must_use = "dropping a Subscription unregisters its listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    /// Remove the registration now.
    pub fn dispose(self) {
        drop(self);
    }

    /// Whether the registration is still attached to a live registry.
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|r| r.registrations.lock().iter().any(|reg| reg.id == self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
