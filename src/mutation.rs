//! Mutation gateway - remote writes followed by a cache refresh.
//!
//! The four writes share one wrapper: perform the write, and only if it
//! succeeds ask the coordinator to re-fetch every key in the configured
//! [`RefreshScope`](crate::strategy::RefreshScope). The write's own response
//! goes back to the caller and is never stored in the cache.

use crate::coordinator::FetchCoordinator;
use crate::error::Result;
use crate::remote::RemoteService;
use crate::strategy::FetchTrigger;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// The four remote writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Update,
    Patch,
    Remove,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Create => write!(f, "create"),
            MutationKind::Update => write!(f, "update"),
            MutationKind::Patch => write!(f, "patch"),
            MutationKind::Remove => write!(f, "remove"),
        }
    }
}

/// Wraps the remote writes with refresh-after-success.
pub struct MutationGateway<S: RemoteService> {
    coordinator: Arc<FetchCoordinator<S>>,
}

impl<S: RemoteService> Clone for MutationGateway<S> {
    fn clone(&self) -> Self {
        MutationGateway {
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

impl<S: RemoteService> MutationGateway<S> {
    pub fn new(coordinator: Arc<FetchCoordinator<S>>) -> Self {
        MutationGateway { coordinator }
    }

    /// Create an entity, then refresh.
    ///
    /// # Errors
    ///
    /// Returns the remote error unchanged; nothing is refreshed.
    pub async fn create(&self, data: S::Payload) -> Result<S::Value> {
        let write = self.coordinator.remote().create(data);
        self.mutate(MutationKind::Create, write).await
    }

    /// Replace an entity, then refresh.
    ///
    /// # Errors
    ///
    /// Returns the remote error unchanged; nothing is refreshed.
    pub async fn update(&self, id: S::Id, data: S::Payload) -> Result<S::Value> {
        let write = self.coordinator.remote().update(id, data);
        self.mutate(MutationKind::Update, write).await
    }

    /// Merge fields into an entity, then refresh.
    ///
    /// # Errors
    ///
    /// Returns the remote error unchanged; nothing is refreshed.
    pub async fn patch(&self, id: S::Id, data: S::Payload) -> Result<S::Value> {
        let write = self.coordinator.remote().patch(id, data);
        self.mutate(MutationKind::Patch, write).await
    }

    /// Delete an entity, then refresh.
    ///
    /// # Errors
    ///
    /// Returns the remote error unchanged; nothing is refreshed.
    pub async fn remove(&self, id: S::Id) -> Result<S::Value> {
        let write = self.coordinator.remote().remove(id);
        self.mutate(MutationKind::Remove, write).await
    }

    /// Await a write and refresh the cache if it succeeded.
    async fn mutate<F>(&self, kind: MutationKind, write: F) -> Result<S::Value>
    where
        F: Future<Output = Result<S::Value>>,
    {
        let timer = Instant::now();
        let service = &self.coordinator.config().service_name;

        match write.await {
            Ok(response) => {
                let scope = self.coordinator.config().refresh_scope;
                let refreshed = self.coordinator.refresh(scope, FetchTrigger::Refresh);
                self.coordinator
                    .metrics()
                    .record_mutation(kind, timer.elapsed(), refreshed);
                info!(
                    "✓ {} {} succeeded in {:?}, refreshing {} keys",
                    service,
                    kind,
                    timer.elapsed(),
                    refreshed
                );
                Ok(response)
            }
            Err(e) => {
                self.coordinator
                    .metrics()
                    .record_mutation_error(kind, &e.to_string());
                warn!("✗ {} {} failed: {}", service, kind, e);
                Err(e)
            }
        }
    }
}
