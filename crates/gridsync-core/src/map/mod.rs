//! Replicated key-value map contract.
//!
//! The adapter only needs `get`, `set` and change notifications from the
//! store; convergence across participants is the store's business. An
//! in-memory last-writer-wins implementation lives in [`replica`].

mod listeners;
pub mod replica;

pub use listeners::{Listener, ListenerRegistry, Subscription};
pub use replica::{Network, Replica, ReplicaId};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event fired for every key whose value changed.
pub const VALUE_CHANGED: &str = "valueChanged";
/// Event fired when a participant clears the whole map.
pub const CLEARED: &str = "clear";

/// A scalar stored in the map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Cell text view of a value. Falsy values (`false`, `""`) read as empty.
    pub fn to_text(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Int(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::Bool(true) => "true".to_string(),
            Value::Bool(false) => String::new(),
        }
    }

    /// Non-negative integer view, used for dimension metadata.
    pub fn as_count(&self) -> Option<usize> {
        match self {
            Value::Int(n) => usize::try_from(*n).ok(),
            // `usize::MAX as f64` rounds up past the largest exact usize.
            Value::Float(n) if n.fract() == 0.0 && *n >= 0.0 && *n < usize::MAX as f64 => {
                Some(*n as usize)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        i64::try_from(n).map(Value::Int).unwrap_or(Value::Float(n as f64))
    }
}

/// Payload delivered to listeners.
#[derive(Clone, Debug, PartialEq)]
pub struct MapEvent {
    /// Event name, e.g. [`VALUE_CHANGED`].
    pub name: String,
    /// Key the event concerns, when there is one.
    pub key: Option<String>,
    /// True when this participant caused the change.
    pub local: bool,
}

impl MapEvent {
    pub fn value_changed(key: &str, local: bool) -> Self {
        MapEvent {
            name: VALUE_CHANGED.to_string(),
            key: Some(key.to_string()),
            local,
        }
    }
}

/// A shared mapping from string keys to scalars with change notification.
///
/// Reads and writes are synchronous from the caller's point of view. Local
/// writes notify listeners with `local = true` before returning.
pub trait SharedMap: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value);

    /// Remove a key. Returns whether it was present.
    fn delete(&self, key: &str) -> bool;

    /// Live keys, in no particular order.
    fn keys(&self) -> Vec<String>;

    /// Register `listener` for events named `event`. The registration lasts
    /// until the returned subscription is disposed or dropped.
    fn observe(&self, event: &str, listener: Listener) -> Subscription;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_text_view() {
        assert_eq!(Value::from("abc").to_text(), "abc");
        assert_eq!(Value::Int(7).to_text(), "7");
        assert_eq!(Value::Bool(false).to_text(), "");
    }

    #[test]
    fn test_value_count_view() {
        assert_eq!(Value::Int(3).as_count(), Some(3));
        assert_eq!(Value::Float(4.0).as_count(), Some(4));
        assert_eq!(Value::Int(-1).as_count(), None);
        assert_eq!(Value::Float(2.5).as_count(), None);
        assert_eq!(Value::Float(2f64.powi(64)).as_count(), None);
        assert_eq!(Value::from("3").as_count(), None);
    }

    #[test]
    fn test_usize_becomes_int() {
        assert_eq!(Value::from(2usize), Value::Int(2));
    }
}
