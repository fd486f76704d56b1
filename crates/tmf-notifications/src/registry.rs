//! Subscription registry keyed by `apiFamily`.
//!
//! Guarded with a `dashmap::DashMap` so publishers (many concurrent
//! readers during `matching`) never block behind an occasional
//! subscribe/unsubscribe writer, and the map is never held across the
//! I/O in delivery (see [`crate::notifier`]).

use dashmap::DashMap;
use uuid::Uuid;

use crate::types::Subscription;

#[derive(Default)]
pub struct SubscriptionRegistry {
    by_family: DashMap<String, Vec<Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, subscription: Subscription) {
        self.by_family
            .entry(subscription.api_family.clone())
            .or_default()
            .push(subscription);
    }

    /// Removes a subscription by id, regardless of family. Returns
    /// `true` if something was removed.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut removed = false;
        for mut family in self.by_family.iter_mut() {
            let before = family.len();
            family.retain(|s| s.id != id);
            if family.len() != before {
                removed = true;
            }
        }
        removed
    }

    pub fn get(&self, id: Uuid) -> Option<Subscription> {
        self.by_family
            .iter()
            .find_map(|family| family.iter().find(|s| s.id == id).cloned())
    }

    /// Subscriptions in `api_family` whose `eventTypes` accept `event_type`.
    pub fn matching(&self, api_family: &str, event_type: &str) -> Vec<Subscription> {
        self.by_family
            .get(api_family)
            .map(|family| {
                family
                    .iter()
                    .filter(|s| s.matches_event_type(event_type))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
