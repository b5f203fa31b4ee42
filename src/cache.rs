//! In-memory result cache for both namespaces.
//!
//! Uses DashMap for lock-free reads with per-key sharding. The cache owns no
//! subscription logic: it is written by the fetch coordinator and emptied by
//! the service when a key loses its last subscriber.

use crate::error::Error;
use crate::key::Namespace;
use dashmap::DashMap;

/// Latest known result of a fetch.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<V> {
    /// No result and no error yet.
    Pending,
    /// The last fetch succeeded with this payload.
    Success(V),
    /// The last fetch failed with this error.
    Failure(Error),
}

impl<V> Outcome<V> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    /// Payload of a successful outcome.
    pub fn value(&self) -> Option<&V> {
        match self {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Error of a failed outcome.
    pub fn error(&self) -> Option<&Error> {
        match self {
            Outcome::Failure(error) => Some(error),
            _ => None,
        }
    }

    /// Consume the outcome, yielding the payload or a default value.
    pub fn into_value_or_default(self) -> V
    where
        V: Default,
    {
        match self {
            Outcome::Success(value) => value,
            _ => V::default(),
        }
    }
}

impl<V> From<crate::error::Result<V>> for Outcome<V> {
    fn from(result: crate::error::Result<V>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(error) => Outcome::Failure(error),
        }
    }
}

/// One cache slot: the outcome plus the fetch sequence that produced it.
struct CacheLine<V> {
    outcome: Outcome<V>,
    seq: u64,
}

/// Key → outcome mapping for the collection and entity namespaces.
pub struct ResultCache<V> {
    collections: DashMap<String, CacheLine<V>>,
    entities: DashMap<String, CacheLine<V>>,
}

impl<V: Clone> ResultCache<V> {
    /// Create an empty cache.
    pub fn new() -> Self {
        ResultCache {
            collections: DashMap::new(),
            entities: DashMap::new(),
        }
    }

    fn lines(&self, namespace: Namespace) -> &DashMap<String, CacheLine<V>> {
        match namespace {
            Namespace::Collection => &self.collections,
            Namespace::Entity => &self.entities,
        }
    }

    /// Read the outcome for a key. `None` means the key has no cache slot.
    pub fn get(&self, namespace: Namespace, key: &str) -> Option<Outcome<V>> {
        self.lines(namespace)
            .get(key)
            .map(|line| line.outcome.clone())
    }

    /// Overwrite the outcome for a key unconditionally.
    pub fn set(&self, namespace: Namespace, key: &str, outcome: Outcome<V>) {
        let lines = self.lines(namespace);
        let seq = lines.get(key).map(|line| line.seq).unwrap_or(0);
        lines.insert(key.to_string(), CacheLine { outcome, seq });
        debug!("✓ Cache SET {}:{}", namespace, key);
    }

    /// Write the outcome of fetch `seq`, unless a later fetch already wrote.
    ///
    /// Returns `true` if the write was applied.
    pub fn store(&self, namespace: Namespace, key: &str, outcome: Outcome<V>, seq: u64) -> bool {
        let lines = self.lines(namespace);
        let mut line = lines.entry(key.to_string()).or_insert(CacheLine {
            outcome: Outcome::Pending,
            seq: 0,
        });

        if seq < line.seq {
            debug!(
                "✗ Cache STORE {}:{} rejected (seq {} < {})",
                namespace, key, seq, line.seq
            );
            return false;
        }

        line.outcome = outcome;
        line.seq = seq;
        debug!("✓ Cache STORE {}:{} (seq {})", namespace, key, seq);
        true
    }

    /// Remove the slot for a key. Returns `true` if a slot existed.
    pub fn delete(&self, namespace: Namespace, key: &str) -> bool {
        let removed = self.lines(namespace).remove(key).is_some();
        debug!("✓ Cache DELETE {}:{} (present: {})", namespace, key, removed);
        removed
    }

    /// Whether a key has a cache slot.
    pub fn contains(&self, namespace: Namespace, key: &str) -> bool {
        self.lines(namespace).contains_key(key)
    }

    /// Keys that currently have a cache slot.
    pub fn keys(&self, namespace: Namespace) -> Vec<String> {
        self.lines(namespace)
            .iter()
            .map(|line| line.key().clone())
            .collect()
    }

    /// Number of slots in one namespace.
    pub fn len(&self, namespace: Namespace) -> usize {
        self.lines(namespace).len()
    }

    /// Whether both namespaces are empty.
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty() && self.entities.is_empty()
    }

    /// Slot counts by outcome.
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for namespace in Namespace::ALL {
            for line in self.lines(namespace).iter() {
                match line.outcome {
                    Outcome::Pending => stats.pending += 1,
                    Outcome::Success(_) => stats.successes += 1,
                    Outcome::Failure(_) => stats.failures += 1,
                }
            }
        }
        stats.collections = self.collections.len();
        stats.entities = self.entities.len();
        stats
    }
}

impl<V: Clone> Default for ResultCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub collections: usize,
    pub entities: usize,
    pub pending: usize,
    pub successes: usize,
    pub failures: usize,
}
