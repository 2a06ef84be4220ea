//! Per-connection event subscriptions and property observations.
//!
//! Each Thing has either a set of names or a wildcard. The wildcard is
//! all-or-nothing: once set, removing a single name does not reintroduce
//! filtering; only removing the whole Thing does.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

#[derive(Debug, Default)]
struct ThingEntry {
    all: bool,
    names: HashSet<String>,
}

/// Name filters keyed by Thing ID.
#[derive(Debug, Default)]
pub struct Subscriptions {
    things: RwLock<HashMap<String, ThingEntry>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, thing_id: &str, name: &str) {
        self.things
            .write()
            .entry(thing_id.to_string())
            .or_default()
            .names
            .insert(name.to_string());
    }

    pub fn subscribe_all(&self, thing_id: &str) {
        let mut things = self.things.write();
        let entry = things.entry(thing_id.to_string()).or_default();
        entry.all = true;
        entry.names.clear();
    }

    /// Removes one name. A no-op under a wildcard.
    pub fn unsubscribe(&self, thing_id: &str, name: &str) {
        let mut things = self.things.write();
        if let Some(entry) = things.get_mut(thing_id) {
            if entry.all {
                return;
            }
            entry.names.remove(name);
            if entry.names.is_empty() {
                things.remove(thing_id);
            }
        }
    }

    /// Removes everything for the Thing.
    pub fn unsubscribe_all(&self, thing_id: &str) {
        self.things.write().remove(thing_id);
    }

    /// Returns `true` if `(thing_id, name)` passes the filter.
    ///
    /// An empty `name` matches whenever anything is registered for the Thing.
    pub fn matches(&self, thing_id: &str, name: &str) -> bool {
        self.things
            .read()
            .get(thing_id)
            .is_some_and(|entry| entry.all || name.is_empty() || entry.names.contains(name))
    }

    /// Returns `true` if anything at all is registered for the Thing.
    pub fn has_thing(&self, thing_id: &str) -> bool {
        self.things.read().contains_key(thing_id)
    }

    pub fn clear(&self) {
        self.things.write().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.things.read().is_empty()
    }
}

/// Event subscriptions and property observations of one connection.
///
/// The two registries are structurally identical but independent.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    pub events: Subscriptions,
    pub properties: Subscriptions,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_event(&self, thing_id: &str, name: &str) {
        if name.is_empty() {
            self.events.subscribe_all(thing_id);
        } else {
            self.events.subscribe(thing_id, name);
        }
    }

    pub fn unsubscribe_event(&self, thing_id: &str, name: &str) {
        if name.is_empty() {
            self.events.unsubscribe_all(thing_id);
        } else {
            self.events.unsubscribe(thing_id, name);
        }
    }

    pub fn observe_property(&self, thing_id: &str, name: &str) {
        if name.is_empty() {
            self.properties.subscribe_all(thing_id);
        } else {
            self.properties.subscribe(thing_id, name);
        }
    }

    pub fn unobserve_property(&self, thing_id: &str, name: &str) {
        if name.is_empty() {
            self.properties.unsubscribe_all(thing_id);
        } else {
            self.properties.unsubscribe(thing_id, name);
        }
    }

    pub fn matches_event(&self, thing_id: &str, name: &str) -> bool {
        self.events.matches(thing_id, name)
    }

    pub fn matches_property(&self, thing_id: &str, name: &str) -> bool {
        self.properties.matches(thing_id, name)
    }

    pub fn clear(&self) {
        self.events.clear();
        self.properties.clear();
    }
}
