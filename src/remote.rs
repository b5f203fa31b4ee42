//! Remote service capability.
//!
//! The `RemoteService` trait decouples the cache from the transport that
//! talks to the backend (REST, websockets, an in-process fake). A
//! [`ServiceCache`](crate::ServiceCache) owns one implementation and calls it
//! from spawned Tokio tasks, so every returned future must be `Send`.
//!
//! # Implementing RemoteService
//!
//! ```ignore
//! use live_cache::{RemoteService, Result, key::Query};
//!
//! struct TodoApi { client: reqwest::Client }
//!
//! impl RemoteService for TodoApi {
//!     type Id = u64;
//!     type Value = serde_json::Value;
//!     type Payload = serde_json::Value;
//!
//!     async fn find(&self, params: Query) -> Result<Self::Value> { /* GET /todos?... */ }
//!     async fn get(&self, id: u64) -> Result<Self::Value> { /* GET /todos/{id} */ }
//!     // create, update, patch, remove ...
//! }
//! ```
//!
//! # Error Handling
//!
//! Return `Error::TransportError` for anything the backend or the network
//! rejects. Fetch errors are recorded in the cache; write errors are handed
//! back to the caller of the mutation.

use crate::error::{Error, Result};
use crate::key::Query;
use dashmap::DashMap;
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Asynchronous capability of one named remote service.
pub trait RemoteService: Send + Sync + 'static {
    /// Entity identifier. Entity cache keys are its `Display` form.
    type Id: Display + FromStr + Clone + Send + Sync + 'static;

    /// Response payload of every operation. Reads of missing or failed
    /// lines return `Value::default()`.
    type Value: Clone + Default + Send + Sync + 'static;

    /// Body of create/update/patch writes.
    type Payload: Send + 'static;

    /// Query a collection.
    fn find(&self, params: Query) -> impl Future<Output = Result<Self::Value>> + Send;

    /// Fetch one entity.
    fn get(&self, id: Self::Id) -> impl Future<Output = Result<Self::Value>> + Send;

    /// Create an entity.
    fn create(&self, data: Self::Payload) -> impl Future<Output = Result<Self::Value>> + Send;

    /// Replace an entity.
    fn update(
        &self,
        id: Self::Id,
        data: Self::Payload,
    ) -> impl Future<Output = Result<Self::Value>> + Send;

    /// Merge fields into an entity.
    fn patch(
        &self,
        id: Self::Id,
        data: Self::Payload,
    ) -> impl Future<Output = Result<Self::Value>> + Send;

    /// Delete an entity.
    fn remove(&self, id: Self::Id) -> impl Future<Output = Result<Self::Value>> + Send;
}

// ============================================================================
// In-Memory Test Service
// ============================================================================

/// In-memory JSON service for tests and demos.
///
/// Records are JSON objects stored under a string id, which is also written
/// into the record's `"id"` field. `find` returns an array of the records
/// whose fields equal every top-level field of the query, ordered by id.
///
/// # Testing Different Scenarios
///
/// - **Fetch failure**: `set_available(false)` makes every call fail
/// - **Slow network**: `with_latency()` delays every call
/// - **Fetch counting**: `find_calls()` / `get_calls()`
#[derive(Default)]
pub struct InMemoryService {
    records: DashMap<String, Value>,
    next_id: AtomicU64,
    unavailable: AtomicBool,
    latency: Option<Duration>,
    find_calls: AtomicUsize,
    get_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl InMemoryService {
    /// Create an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Insert or replace a record under `id`.
    pub fn insert(&self, id: impl Into<String>, mut record: Value) {
        let id = id.into();
        if let Value::Object(fields) = &mut record {
            fields.insert("id".to_string(), Value::String(id.clone()));
        }
        self.records.insert(id, record);
    }

    /// Toggle a simulated outage.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    async fn round_trip(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::TransportError("service unavailable".to_string()));
        }
        Ok(())
    }

    fn not_found(id: &str) -> Error {
        Error::TransportError(format!("No record found for id '{}'", id))
    }

    fn matches(record: &Value, params: &Query) -> bool {
        match params {
            Value::Object(filters) => filters
                .iter()
                .all(|(field, expected)| record.get(field) == Some(expected)),
            _ => true,
        }
    }
}

impl RemoteService for InMemoryService {
    type Id = String;
    type Value = Value;
    type Payload = Value;

    async fn find(&self, params: Query) -> Result<Value> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;

        let mut found: Vec<(String, Value)> = self
            .records
            .iter()
            .filter(|entry| Self::matches(entry.value(), &params))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        found.sort_by(|a, b| (a.0.len(), &a.0).cmp(&(b.0.len(), &b.0)));

        Ok(Value::Array(found.into_iter().map(|(_, record)| record).collect()))
    }

    async fn get(&self, id: String) -> Result<Value> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;

        self.records
            .get(&id)
            .map(|record| record.value().clone())
            .ok_or_else(|| Self::not_found(&id))
    }

    async fn create(&self, data: Value) -> Result<Value> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;

        if !data.is_object() {
            return Err(Error::TransportError(
                "create payload must be an object".to_string(),
            ));
        }
        let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        self.insert(id.clone(), data);
        self.records
            .get(&id)
            .map(|record| record.value().clone())
            .ok_or_else(|| Self::not_found(&id))
    }

    async fn update(&self, id: String, data: Value) -> Result<Value> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;

        if !self.records.contains_key(&id) {
            return Err(Self::not_found(&id));
        }
        self.insert(id.clone(), data);
        self.records
            .get(&id)
            .map(|record| record.value().clone())
            .ok_or_else(|| Self::not_found(&id))
    }

    async fn patch(&self, id: String, data: Value) -> Result<Value> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;

        let mut record = self.records.get_mut(&id).ok_or_else(|| Self::not_found(&id))?;
        if let (Value::Object(target), Value::Object(changes)) = (record.value_mut(), data) {
            for (field, value) in changes {
                if field != "id" {
                    target.insert(field, value);
                }
            }
        }
        Ok(record.value().clone())
    }

    async fn remove(&self, id: String) -> Result<Value> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;

        self.records
            .remove(&id)
            .map(|(_, record)| record)
            .ok_or_else(|| Self::not_found(&id))
    }
}
