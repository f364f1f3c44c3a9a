//! Backing key-value store abstraction.
//!
//! The engine is written against [`KeyValueStore`], a document store that
//! guarantees per-key atomic reads and writes and nothing more — no
//! cross-key transactions exist anywhere in this crate. Items are addressed
//! by a table name plus a single or compound key and stored as JSON objects.
//!
//! [`memory::MemoryStore`] backs tests and embedded use; [`postgres::PostgresStore`]
//! maps every operation to one SQL statement so the same atomicity contract
//! holds. [`retry::RetryingStore`] adds per-call timeouts and bounded
//! retry-with-backoff on top of either.

pub mod memory;
pub mod postgres;
pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use retry::{RetryPolicy, RetryingStore};

/// A stored document.
pub type Item = Map<String, Value>;

/// Serialize a record into a stored document.
pub fn to_item<T: serde::Serialize>(value: &T) -> Result<Item, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Backend(format!(
            "record did not serialize to an object: {other}"
        ))),
    }
}

/// Deserialize a stored document into a record.
pub fn from_item<T: serde::de::DeserializeOwned>(item: Item) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(item))?)
}

/// Errors surfaced by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    /// Whether retrying the call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Backend(_) | StoreError::Timeout(_))
    }
}

/// Primary key of a stored item: a single partition key, or a
/// (partition, sort) pair for compound-key tables such as the token ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Single(String),
    Compound(String, String),
}

impl Key {
    pub fn single(pk: impl Into<String>) -> Self {
        Key::Single(pk.into())
    }

    pub fn compound(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Key::Compound(pk.into(), sk.into())
    }

    pub fn pk(&self) -> &str {
        match self {
            Key::Single(pk) | Key::Compound(pk, _) => pk,
        }
    }

    /// Sort key; empty for single-key tables.
    pub fn sk(&self) -> &str {
        match self {
            Key::Single(_) => "",
            Key::Compound(_, sk) => sk,
        }
    }
}

/// Per-key-atomic document store.
///
/// `update_if` is the only conditional primitive: it atomically applies a
/// patch when a guard field matches and returns the patched item, which is
/// what single-use token consumption is built on.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Point read.
    async fn get(&self, table: &str, key: &Key) -> Result<Option<Item>, StoreError>;

    /// Unconditional upsert.
    async fn put(&self, table: &str, key: &Key, item: Item) -> Result<(), StoreError>;

    /// Merge `patch` into an existing item. Returns `false` when the key is
    /// absent.
    async fn update(&self, table: &str, key: &Key, patch: Item) -> Result<bool, StoreError>;

    /// Atomically merge `patch` iff `item[guard_field] == guard_value`,
    /// returning the patched item on success and `None` when the guard does
    /// not hold (including when the key is absent).
    async fn update_if(
        &self,
        table: &str,
        key: &Key,
        guard_field: &str,
        guard_value: &Value,
        patch: Item,
    ) -> Result<Option<Item>, StoreError>;

    /// Remove an item. Returns `false` when the key was absent.
    async fn delete(&self, table: &str, key: &Key) -> Result<bool, StoreError>;

    /// Secondary-index scan: every item in `table` whose top-level `field`
    /// equals `value`.
    async fn query_index(
        &self,
        table: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Item>, StoreError>;
}
