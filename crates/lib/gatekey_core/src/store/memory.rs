//! In-memory store backend.
//!
//! Per-key atomicity comes from the map's entry locks: every operation takes
//! the entry for its key exactly once. Used by the test suite and by
//! embedders that do not need persistence.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;

use super::{Item, Key, KeyValueStore, StoreError};

type FullKey = (String, String, String);

/// `DashMap`-backed [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: DashMap<FullKey, Item>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn full_key(table: &str, key: &Key) -> FullKey {
        (table.to_string(), key.pk().to_string(), key.sk().to_string())
    }
}

fn merge(into: &mut Item, patch: &Item) {
    for (field, value) in patch {
        into.insert(field.clone(), value.clone());
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, table: &str, key: &Key) -> Result<Option<Item>, StoreError> {
        Ok(self
            .items
            .get(&Self::full_key(table, key))
            .map(|entry| entry.value().clone()))
    }

    async fn put(&self, table: &str, key: &Key, item: Item) -> Result<(), StoreError> {
        self.items.insert(Self::full_key(table, key), item);
        Ok(())
    }

    async fn update(&self, table: &str, key: &Key, patch: Item) -> Result<bool, StoreError> {
        match self.items.entry(Self::full_key(table, key)) {
            Entry::Occupied(mut occupied) => {
                merge(occupied.get_mut(), &patch);
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn update_if(
        &self,
        table: &str,
        key: &Key,
        guard_field: &str,
        guard_value: &Value,
        patch: Item,
    ) -> Result<Option<Item>, StoreError> {
        match self.items.entry(Self::full_key(table, key)) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().get(guard_field) != Some(guard_value) {
                    return Ok(None);
                }
                merge(occupied.get_mut(), &patch);
                Ok(Some(occupied.get().clone()))
            }
            Entry::Vacant(_) => Ok(None),
        }
    }

    async fn delete(&self, table: &str, key: &Key) -> Result<bool, StoreError> {
        Ok(self.items.remove(&Self::full_key(table, key)).is_some())
    }

    async fn query_index(
        &self,
        table: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Item>, StoreError> {
        Ok(self
            .items
            .iter()
            .filter(|entry| {
                entry.key().0 == table
                    && entry.value().get(field).and_then(Value::as_str) == Some(value)
            })
            .map(|entry| entry.value().clone())
            .collect())
    }
}
