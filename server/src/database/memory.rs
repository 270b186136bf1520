//! In-memory document store
//!
//! Development backend: every collection is an insertion-ordered map
//! behind its own lock, held only for a single read-modify-write.
//! Nothing survives a restart.

use super::store::{
    apply_merge, stamp_new, Document, DocumentStore, StoreError, StoreResult,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct Collection {
    order: Vec<String>,
    docs: HashMap<String, Document>,
}

/// Map-backed store for tests and local development
#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, Arc<RwLock<Collection>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, name: &str) -> Arc<RwLock<Collection>> {
        self.collections
            .entry(name.to_string())
            .or_default()
            .value()
            .clone()
    }
}

fn poisoned(collection: &str) -> StoreError {
    StoreError::Backend(format!("collection lock poisoned: {}", collection))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, id: &str, doc: Document) -> StoreResult<Document> {
        let handle = self.collection(collection);
        let mut col = handle.write().map_err(|_| poisoned(collection))?;

        if col.docs.contains_key(id) {
            return Err(StoreError::Backend(format!(
                "duplicate id {} in {}",
                id, collection
            )));
        }

        let doc = stamp_new(doc, id);
        col.order.push(id.to_string());
        col.docs.insert(id.to_string(), doc.clone());

        tracing::debug!("Inserted {}/{}", collection, id);
        Ok(doc)
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let handle = self.collection(collection);
        let col = handle.read().map_err(|_| poisoned(collection))?;
        Ok(col.docs.get(id).cloned())
    }

    async fn merge(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
        expected_version: Option<u64>,
    ) -> StoreResult<Option<Document>> {
        let handle = self.collection(collection);
        let mut col = handle.write().map_err(|_| poisoned(collection))?;

        let Some(existing) = col.docs.get_mut(id) else {
            return Ok(None);
        };

        apply_merge(existing, patch, expected_version)?;

        tracing::debug!("Merged {}/{}", collection, id);
        Ok(Some(existing.clone()))
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let handle = self.collection(collection);
        let col = handle.read().map_err(|_| poisoned(collection))?;

        Ok(col
            .order
            .iter()
            .filter_map(|id| col.docs.get(id).cloned())
            .collect())
    }
}
