//! In-memory [`DocumentStore`] implementation for tests and dry runs.
//!
//! Uses `BTreeMap`s behind `std::sync::RwLock`. Alias semantics follow
//! Elasticsearch: an alias may point at several indices, and deleting an
//! index drops its alias bindings.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::DocumentStore;
use crate::schema::IndexSchema;

#[derive(Default)]
struct StoredIndex {
    schema: Option<IndexSchema>,
    docs: BTreeMap<String, Value>,
}

#[derive(Default)]
struct State {
    indices: BTreeMap<String, StoredIndex>,
    aliases: BTreeMap<String, BTreeSet<String>>,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    /// All index names, sorted.
    pub fn indices(&self) -> Vec<String> {
        self.read()
            .map(|s| s.indices.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of documents in `index`, if it exists.
    pub fn doc_count(&self, index: &str) -> Option<usize> {
        self.read()
            .ok()
            .and_then(|s| s.indices.get(index).map(|i| i.docs.len()))
    }

    /// A stored document body.
    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.read()
            .ok()
            .and_then(|s| s.indices.get(index).and_then(|i| i.docs.get(id).cloned()))
    }

    /// All document ids in `index`, sorted.
    pub fn document_ids(&self, index: &str) -> Vec<String> {
        self.read()
            .ok()
            .and_then(|s| s.indices.get(index).map(|i| i.docs.keys().cloned().collect()))
            .unwrap_or_default()
    }

    /// Schema `index` was created with.
    pub fn schema(&self, index: &str) -> Option<IndexSchema> {
        self.read()
            .ok()
            .and_then(|s| s.indices.get(index).and_then(|i| i.schema.clone()))
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.read()?.indices.contains_key(index))
    }

    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<()> {
        let mut state = self.write()?;
        if state.indices.contains_key(index) {
            bail!("index {} already exists", index);
        }
        state.indices.insert(
            index.to_string(),
            StoredIndex {
                schema: Some(schema.clone()),
                docs: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, index: &str, id: &str, source: &Value) -> Result<()> {
        let mut state = self.write()?;
        let stored = state
            .indices
            .get_mut(index)
            .ok_or_else(|| anyhow!("no such index: {}", index))?;
        stored.docs.insert(id.to_string(), source.clone());
        Ok(())
    }

    async fn get_alias(&self, alias: &str) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .aliases
            .get(alias)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn put_alias(&self, index: &str, alias: &str) -> Result<()> {
        let mut state = self.write()?;
        if !state.indices.contains_key(index) {
            bail!("no such index: {}", index);
        }
        state
            .aliases
            .entry(alias.to_string())
            .or_default()
            .insert(index.to_string());
        Ok(())
    }

    async fn delete_alias(&self, index: &str, alias: &str) -> Result<()> {
        let mut state = self.write()?;
        let removed = state
            .aliases
            .get_mut(alias)
            .map(|set| set.remove(index))
            .unwrap_or(false);
        if !removed {
            bail!("alias {} => {} not found", alias, index);
        }
        if state.aliases.get(alias).is_some_and(|set| set.is_empty()) {
            state.aliases.remove(alias);
        }
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let mut state = self.write()?;
        if state.indices.remove(index).is_none() {
            bail!("no such index: {}", index);
        }
        for set in state.aliases.values_mut() {
            set.remove(index);
        }
        state.aliases.retain(|_, set| !set.is_empty());
        Ok(())
    }
}
