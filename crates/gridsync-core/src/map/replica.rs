//! In-memory replicated map.
//!
//! A [`Network`] connects any number of [`Replica`]s. Each replica applies
//! its own writes immediately and queues them on the network; [`Network::flush`]
//! delivers queued writes to every other replica in FIFO order. Conflicting
//! writes to the same key converge on the one with the greatest
//! [`Stamp`] (Lamport clock, then replica id), so every replica ends up with
//! the same contents once the queue drains, whatever order writes were made in.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

use super::{CLEARED, Listener, ListenerRegistry, MapEvent, SharedMap, Subscription, Value};

pub type ReplicaId = u32;

/// Write version used for last-writer-wins resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp {
    pub lamport: u64,
    pub replica: ReplicaId,
}

/// A stamped value; `None` is a tombstone left by a delete.
#[derive(Clone, Debug)]
struct Entry {
    value: Option<Value>,
    stamp: Stamp,
}

#[derive(Clone, Debug)]
struct Op {
    origin: ReplicaId,
    key: String,
    entry: Entry,
}

/// Write `entry` into `entries` if it wins against what is there.
fn merge(entries: &mut HashMap<String, Entry>, key: &str, entry: &Entry) -> bool {
    match entries.get(key) {
        Some(current) if current.stamp >= entry.stamp => false,
        _ => {
            entries.insert(key.to_string(), entry.clone());
            true
        }
    }
}

#[derive(Default)]
struct NetworkState {
    replicas: Vec<Weak<Replica>>,
    pending: VecDeque<Op>,
    /// Every write that has been delivered; late joiners start from here.
    sequenced: HashMap<String, Entry>,
    next_id: ReplicaId,
}

/// Shared medium connecting replicas.
#[derive(Clone, Default)]
pub struct Network {
    state: Arc<Mutex<NetworkState>>,
}

impl Network {
    pub fn new() -> Self {
        Network::default()
    }

    /// Attach a new replica. It starts with every write delivered so far;
    /// writes still queued reach it on the next [`Network::flush`].
    pub fn join(&self) -> Arc<Replica> {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;

        let entries = state.sequenced.clone();
        let clock = entries.values().map(|e| e.stamp.lamport).max().unwrap_or(0);
        let replica = Arc::new(Replica {
            id,
            entries: Mutex::new(entries),
            clock: AtomicU64::new(clock),
            listeners: ListenerRegistry::new(),
            network: Arc::downgrade(&self.state),
        });
        state.replicas.push(Arc::downgrade(&replica));
        debug!(replica = id, keys = state.sequenced.len(), "replica joined");
        replica
    }

    /// Deliver every queued write to every other live replica, including
    /// writes made by listeners while this flush runs. Returns the number
    /// of writes delivered.
    pub fn flush(&self) -> usize {
        let mut delivered = 0;
        loop {
            let (op, targets) = {
                let mut state = self.state.lock();
                let Some(op) = state.pending.pop_front() else {
                    break;
                };
                merge(&mut state.sequenced, &op.key, &op.entry);
                state.replicas.retain(|r| r.strong_count() > 0);
                let targets: Vec<Arc<Replica>> = state
                    .replicas
                    .iter()
                    .filter_map(Weak::upgrade)
                    .filter(|r| r.id != op.origin)
                    .collect();
                (op, targets)
            };
            for replica in targets {
                replica.apply_remote(&op);
            }
            delivered += 1;
        }
        if delivered > 0 {
            trace!(delivered, "network flushed");
        }
        delivered
    }

    /// Number of writes waiting for delivery.
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of replicas still alive.
    pub fn replica_count(&self) -> usize {
        self.state
            .lock()
            .replicas
            .iter()
            .filter(|r| r.strong_count() > 0)
            .count()
    }
}

/// One participant's copy of the replicated map.
pub struct Replica {
    id: ReplicaId,
    entries: Mutex<HashMap<String, Entry>>,
    clock: AtomicU64,
    listeners: Arc<ListenerRegistry>,
    network: Weak<Mutex<NetworkState>>,
}

impl Replica {
    pub fn id(&self) -> ReplicaId {
        self.id
    }

    /// Version of the current value (or tombstone) for `key`.
    pub fn stamp(&self, key: &str) -> Option<Stamp> {
        self.entries.lock().get(key).map(|e| e.stamp)
    }

    fn write(&self, key: &str, value: Option<Value>) {
        let stamp = Stamp {
            lamport: self.clock.fetch_add(1, Ordering::SeqCst) + 1,
            replica: self.id,
        };
        let entry = Entry { value, stamp };
        self.entries.lock().insert(key.to_string(), entry.clone());

        if let Some(network) = self.network.upgrade() {
            network.lock().pending.push_back(Op {
                origin: self.id,
                key: key.to_string(),
                entry,
            });
        }
        self.listeners.emit(&MapEvent::value_changed(key, true));
    }

    fn apply_remote(&self, op: &Op) {
        self.clock.fetch_max(op.entry.stamp.lamport, Ordering::SeqCst);
        let applied = merge(&mut self.entries.lock(), &op.key, &op.entry);
        trace!(replica = self.id, key = %op.key, applied, "remote write");
        if applied {
            self.listeners
                .emit(&MapEvent::value_changed(&op.key, false));
        }
    }

    /// Delete every key, then fire a local `"clear"` event.
    pub fn clear(&self) {
        for key in self.keys() {
            self.write(&key, None);
        }
        self.emit(CLEARED, None);
    }

    /// Number of live listener registrations for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.listener_count(event)
    }

    /// Fire an arbitrary named event to this replica's listeners.
    pub fn emit(&self, name: &str, key: Option<&str>) {
        self.listeners.emit(&MapEvent {
            name: name.to_string(),
            key: key.map(str::to_string),
            local: true,
        });
    }
}

impl SharedMap for Replica {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).and_then(|e| e.value.clone())
    }

    fn set(&self, key: &str, value: Value) {
        self.write(key, Some(value));
    }

    fn delete(&self, key: &str) -> bool {
        if self.get(key).is_none() {
            return false;
        }
        self.write(key, None);
        true
    }

    fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, e)| e.value.is_some())
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn observe(&self, event: &str, listener: Listener) -> Subscription {
        self.listeners.subscribe(event, listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::VALUE_CHANGED;

    fn recorder(replica: &Replica) -> (Arc<Mutex<Vec<MapEvent>>>, Subscription) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let sub = replica.observe(
            VALUE_CHANGED,
            Arc::new(move |e: &MapEvent| sink.lock().push(e.clone())),
        );
        (events, sub)
    }

    #[test]
    fn test_local_write_is_visible_and_flagged_local() {
        let net = Network::new();
        let a = net.join();
        let (events, _sub) = recorder(&a);

        a.set("0,0", Value::from("x"));
        assert_eq!(a.get("0,0"), Some(Value::from("x")));
        assert_eq!(*events.lock(), vec![MapEvent::value_changed("0,0", true)]);
        assert_eq!(net.pending(), 1);
    }

    #[test]
    fn test_flush_delivers_to_peers_as_remote() {
        let net = Network::new();
        let a = net.join();
        let b = net.join();
        let (a_events, _sa) = recorder(&a);
        let (b_events, _sb) = recorder(&b);

        a.set("1,0", Value::from("hi"));
        assert_eq!(b.get("1,0"), None);
        assert_eq!(net.flush(), 1);

        assert_eq!(b.get("1,0"), Some(Value::from("hi")));
        assert_eq!(*b_events.lock(), vec![MapEvent::value_changed("1,0", false)]);
        assert_eq!(a_events.lock().len(), 1);
    }

    #[test]
    fn test_concurrent_writes_converge() {
        let net = Network::new();
        let a = net.join();
        let b = net.join();

        a.set("0,0", Value::from("from a"));
        b.set("0,0", Value::from("from b"));
        net.flush();

        assert_eq!(a.get("0,0"), b.get("0,0"));
        // Equal lamport times: the higher replica id wins.
        assert_eq!(a.get("0,0"), Some(Value::from("from b")));
    }

    #[test]
    fn test_later_causal_write_wins() {
        let net = Network::new();
        let a = net.join();
        let b = net.join();

        b.set("0,0", Value::from("first"));
        net.flush();
        a.set("0,0", Value::from("second"));
        net.flush();

        assert_eq!(b.get("0,0"), Some(Value::from("second")));
        assert!(a.stamp("0,0") > Some(Stamp { lamport: 1, replica: b.id() }));
    }

    #[test]
    fn test_late_joiner_sees_delivered_state() {
        let net = Network::new();
        let a = net.join();
        a.set("numRows", Value::Int(2));
        net.flush();

        let late = net.join();
        assert_eq!(late.get("numRows"), Some(Value::Int(2)));

        a.set("0,0", Value::from("queued"));
        let later = net.join();
        assert_eq!(later.get("0,0"), None);
        net.flush();
        assert_eq!(later.get("0,0"), Some(Value::from("queued")));
    }

    #[test]
    fn test_delete_replicates_as_tombstone() {
        let net = Network::new();
        let a = net.join();
        let b = net.join();
        a.set("0,0", Value::from("x"));
        net.flush();

        assert!(b.delete("0,0"));
        assert!(!b.delete("0,0"));
        net.flush();
        assert_eq!(a.get("0,0"), None);
        assert!(a.keys().is_empty());
    }

    #[test]
    fn test_clear_fires_named_event() {
        let net = Network::new();
        let a = net.join();
        a.set("0,0", Value::from("x"));
        a.set("0,1", Value::from("y"));

        let cleared = Arc::new(AtomicU64::new(0));
        let c = cleared.clone();
        let _sub = a.observe(
            CLEARED,
            Arc::new(move |_e: &MapEvent| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        a.clear();
        assert!(a.keys().is_empty());
        assert_eq!(cleared.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_replica_is_skipped() {
        let net = Network::new();
        let a = net.join();
        let b = net.join();
        drop(b);
        a.set("0,0", Value::from("x"));
        assert_eq!(net.flush(), 1);
        assert_eq!(net.replica_count(), 1);
    }
}
