//! Subscription reference counts.

use crate::error::{Error, Result};
use crate::key::Namespace;
use std::collections::HashMap;

/// Per-namespace subscriber counts.
///
/// A key is present iff at least one collaborator is subscribed to it; the
/// registry never stores a zero count. No method blocks or performs I/O.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    collections: HashMap<String, usize>,
    entities: HashMap<String, usize>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn counts(&self, namespace: Namespace) -> &HashMap<String, usize> {
        match namespace {
            Namespace::Collection => &self.collections,
            Namespace::Entity => &self.entities,
        }
    }

    fn counts_mut(&mut self, namespace: Namespace) -> &mut HashMap<String, usize> {
        match namespace {
            Namespace::Collection => &mut self.collections,
            Namespace::Entity => &mut self.entities,
        }
    }

    /// Add a subscriber. Returns `true` if this is the first one.
    pub fn subscribe(&mut self, namespace: Namespace, key: &str) -> bool {
        let counts = self.counts_mut(namespace);
        match counts.get_mut(key) {
            Some(count) => {
                *count += 1;
                false
            }
            None => {
                counts.insert(key.to_string(), 1);
                true
            }
        }
    }

    /// Remove a subscriber. Returns `true` if it was the last one.
    ///
    /// # Errors
    ///
    /// Returns `Error::Underflow` if the key has no subscribers.
    pub fn unsubscribe(&mut self, namespace: Namespace, key: &str) -> Result<bool> {
        let counts = self.counts_mut(namespace);
        match counts.get_mut(key) {
            Some(count) if *count > 1 => {
                *count -= 1;
                Ok(false)
            }
            Some(_) => {
                counts.remove(key);
                Ok(true)
            }
            None => Err(Error::Underflow {
                namespace,
                key: key.to_string(),
            }),
        }
    }

    /// Current subscriber count (zero if absent).
    pub fn count(&self, namespace: Namespace, key: &str) -> usize {
        self.counts(namespace).get(key).copied().unwrap_or(0)
    }

    pub fn is_subscribed(&self, namespace: Namespace, key: &str) -> bool {
        self.counts(namespace).contains_key(key)
    }

    /// Keys with at least one subscriber.
    pub fn keys(&self, namespace: Namespace) -> Vec<String> {
        self.counts(namespace).keys().cloned().collect()
    }

    /// Number of subscribed keys in one namespace.
    pub fn len(&self, namespace: Namespace) -> usize {
        self.counts(namespace).len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty() && self.entities.is_empty()
    }
}
