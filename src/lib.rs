//! # live-cache
//!
//! A reference-counted subscription cache for remote data services.
//!
//! ## Features
//!
//! - **Shared fetches:** one fetch per distinct query or entity, however many
//!   components are watching it
//! - **Reference-counted lines:** a cache line lives exactly as long as it has
//!   subscribers
//! - **Refresh on write:** successful creates, updates, patches and removes
//!   re-fetch every cached query and entity
//! - **Transport agnostic:** implement [`RemoteService`] for REST, websockets or
//!   an in-process fake
//! - **Production ready:** built-in logging, metrics hooks and error handling
//!
//! ## Quick Start
//!
//! Use [`ServiceCache`] for one remote service, and [`Feed`] for each mounted
//! component:
//!
//! ```ignore
//! use live_cache::{ServiceCache, remote::InMemoryService};
//! use serde_json::json;
//!
//! // 1. Create one cache per service (Clone is an Arc increment)
//! let todos = ServiceCache::new(InMemoryService::new());
//!
//! // 2. Watch a query; the first watcher triggers the fetch
//! let mut open = todos.watch_find(&json!({"status": "open"}));
//! open.changed().await?;
//! println!("{}", open.read());
//!
//! // 3. Write; every cached query is refreshed on success
//! todos.create(json!({"status": "open", "title": "ship it"})).await?;
//! open.changed().await?;
//! ```
//!
//! ### For Custom Bindings (Advanced)
//!
//! Call [`ServiceCache::subscribe`] and [`ServiceCache::unsubscribe`] with
//! explicit keys from [`KeyCodec`], and listen on [`ServiceCache::changes`].
//! Every subscribe must be balanced by exactly one unsubscribe.

#[macro_use]
extern crate log;

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod feed;
pub mod key;
pub mod mutation;
pub mod observability;
pub mod registry;
pub mod remote;
pub mod service;
pub mod strategy;

// Re-exports for convenience
pub use cache::{Outcome, ResultCache};
pub use config::ServiceConfig;
pub use coordinator::FetchCoordinator;
pub use error::{Error, Result};
pub use events::{CacheEvent, CacheEventKind};
pub use feed::Feed;
pub use key::{KeyCodec, Namespace, Query};
pub use mutation::{MutationGateway, MutationKind};
pub use observability::CacheMetrics;
pub use registry::SubscriptionRegistry;
pub use remote::RemoteService;
pub use service::ServiceCache;
pub use strategy::{FetchTrigger, RefreshScope};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
