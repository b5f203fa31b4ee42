//! Refresh scopes and fetch triggers.
//!
//! # When to Use Each Scope
//!
//! | Scope | Refreshed keys | Use Case |
//! |-------|----------------|----------|
//! | **AllCached** | every cached key plus every key with a fetch in flight | Default after mutations |
//! | **Subscribed** | every key with at least one subscriber | Manual refresh |
//!
//! The two differ only for keys whose fetch is still in flight when the last
//! subscriber leaves: such a key is no longer subscribed, but its fetch is
//! still racing. Refreshing it is harmless because the completion is dropped
//! for unsubscribed keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which keys a refresh re-fetches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshScope {
    /// Every cached key and every key with a fetch in flight, in both namespaces.
    #[default]
    AllCached,

    /// Every key that currently has at least one subscriber.
    Subscribed,
}

impl fmt::Display for RefreshScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshScope::AllCached => write!(f, "AllCached"),
            RefreshScope::Subscribed => write!(f, "Subscribed"),
        }
    }
}

/// Why a fetch was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchTrigger {
    /// A key went from zero to one subscriber.
    FirstSubscriber,

    /// A successful mutation invalidated the cache.
    ///
    /// If a fetch for the key is already in flight it may have read the
    /// remote state from before the write, so the key is fetched once more
    /// after that fetch completes.
    Refresh,

    /// The binding layer asked for a refresh of all subscribed keys.
    Manual,
}

impl FetchTrigger {
    /// Whether an in-flight fetch must be followed by another one.
    pub fn supersedes_in_flight(&self) -> bool {
        match self {
            FetchTrigger::FirstSubscriber => false,
            FetchTrigger::Refresh | FetchTrigger::Manual => true,
        }
    }
}

impl fmt::Display for FetchTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchTrigger::FirstSubscriber => write!(f, "FirstSubscriber"),
            FetchTrigger::Refresh => write!(f, "Refresh"),
            FetchTrigger::Manual => write!(f, "Manual"),
        }
    }
}
