//! Cache key management: namespaces and the canonical key codec.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Query parameters for a collection fetch.
pub type Query = Value;

/// The two independent key spaces of a service cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Collection queries, answered by the remote `find`.
    Collection,
    /// Single-entity fetches, answered by the remote `get`.
    Entity,
}

impl Namespace {
    /// Both namespaces, collection first.
    pub const ALL: [Namespace; 2] = [Namespace::Collection, Namespace::Entity];
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Collection => write!(f, "find"),
            Namespace::Entity => write!(f, "get"),
        }
    }
}

/// Converts query parameters and entity ids to canonical string keys and back.
///
/// Collection keys are compact JSON with object fields sorted at every depth,
/// so `{"a":1,"b":2}` and `{"b":2,"a":1}` share a cache line. Entity keys are
/// the id's `Display` form.
pub struct KeyCodec;

impl KeyCodec {
    /// Encode query parameters into a canonical key.
    ///
    /// Never fails. `null` parameters are treated as the empty query `{}`.
    pub fn encode(params: &Query) -> String {
        match params {
            Value::Null => "{}".to_string(),
            other => canonicalize(other).to_string(),
        }
    }

    /// Decode a key produced by [`KeyCodec::encode`] back into query parameters.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeserializationError` if the key is not valid JSON.
    pub fn decode(key: &str) -> Result<Query> {
        serde_json::from_str(key).map_err(Error::from)
    }

    /// Encode an entity id into a key.
    pub fn encode_id(id: &dyn fmt::Display) -> String {
        id.to_string()
    }

    /// Decode an entity key back into an id.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeserializationError` if the id type rejects the key.
    pub fn decode_id<I: FromStr>(key: &str) -> Result<I> {
        key.parse().ok().ok_or_else(|| {
            Error::DeserializationError(format!("Failed to parse entity id from key: {}", key))
        })
    }

    /// Qualified `namespace:key` form used in logs and metrics.
    pub fn qualified(namespace: Namespace, key: &str) -> String {
        format!("{}:{}", namespace, key)
    }
}

/// Rebuild a value with object fields in sorted order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut entries: Vec<(&String, &Value)> = fields.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            let mut sorted = Map::with_capacity(entries.len());
            for (name, inner) in entries {
                sorted.insert(name.clone(), canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
