//! In-memory document store

use crate::{DocPage, DocumentStore, SearchQuery};
use pod_common::{DocRef, PodError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

/// Thread-safe in-memory [`DocumentStore`].
///
/// Backs the core's collaborators in tests and single-process deployments.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<DocRef, HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently held in one collection.
    pub fn len(&self, coll: &DocRef) -> usize {
        self.collections
            .read()
            .map(|c| c.get(coll).map(HashMap::len).unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, coll: &DocRef) -> bool {
        self.len(coll) == 0
    }
}

impl DocumentStore for MemoryStore {
    fn exists(&self, coll: &DocRef, id: &str) -> Result<bool> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections
            .get(coll)
            .map(|docs| docs.contains_key(id))
            .unwrap_or(false))
    }

    fn get(&self, coll: &DocRef, id: &str) -> Result<Option<Value>> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections.get(coll).and_then(|docs| docs.get(id)).cloned())
    }

    fn insert(&self, coll: &DocRef, id: &str, doc: Value) -> Result<()> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let docs = collections.entry(coll.clone()).or_default();
        if docs.contains_key(id) {
            return Err(PodError::Store(format!(
                "duplicate insert for {}/{}",
                coll, id
            )));
        }
        docs.insert(id.to_string(), doc);
        Ok(())
    }

    fn update(&self, coll: &DocRef, id: &str, doc: Value) -> Result<()> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let docs = collections
            .get_mut(coll)
            .ok_or_else(|| PodError::NotFound(format!("{}/{}", coll, id)))?;
        if !docs.contains_key(id) {
            return Err(PodError::NotFound(format!("{}/{}", coll, id)));
        }
        docs.insert(id.to_string(), doc);
        Ok(())
    }

    fn delete(&self, coll: &DocRef, id: &str) -> Result<()> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        if let Some(docs) = collections.get_mut(coll) {
            docs.remove(id);
        }
        Ok(())
    }

    fn search(&self, coll: &DocRef, query: &SearchQuery) -> Result<DocPage> {
        let collections = self.collections.read().map_err(poisoned)?;
        let Some(docs) = collections.get(coll) else {
            return Ok(DocPage::default());
        };

        let mut matched: Vec<(String, Value)> = docs
            .iter()
            .filter(|(_, doc)| match query.min_time {
                Some(min) => doc
                    .get(&query.time_field)
                    .and_then(Value::as_i64)
                    .map(|t| t >= min)
                    .unwrap_or(false),
                None => true,
            })
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect();

        matched.sort_by_key(|(id, doc)| {
            (
                doc.get(&query.time_field).and_then(Value::as_i64),
                id.clone(),
            )
        });

        let end = (query.offset + query.page_size).min(matched.len());
        let has_more = end < matched.len();
        let docs = if query.offset < matched.len() {
            matched[query.offset..end].to_vec()
        } else {
            Vec::new()
        };

        Ok(DocPage { docs, has_more })
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> PodError {
    PodError::Store("store lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn coll() -> DocRef {
        DocRef::new("user", "profile")
    }

    #[test]
    fn insert_get_delete() {
        let store = MemoryStore::new();
        store.insert(&coll(), "a", json!({"time": 1})).unwrap();

        assert!(store.exists(&coll(), "a").unwrap());
        assert_eq!(store.get(&coll(), "a").unwrap(), Some(json!({"time": 1})));

        store.delete(&coll(), "a").unwrap();
        assert!(!store.exists(&coll(), "a").unwrap());
    }

    #[test]
    fn duplicate_insert_fails() {
        let store = MemoryStore::new();
        store.insert(&coll(), "a", json!({})).unwrap();
        assert!(store.insert(&coll(), "a", json!({})).is_err());
    }

    #[test]
    fn update_requires_existing() {
        let store = MemoryStore::new();
        assert!(store.update(&coll(), "a", json!({})).is_err());

        store.insert(&coll(), "a", json!({"v": 1})).unwrap();
        store.update(&coll(), "a", json!({"v": 2})).unwrap();
        assert_eq!(store.get(&coll(), "a").unwrap(), Some(json!({"v": 2})));
    }

    #[test]
    fn search_filters_and_orders_by_time() {
        let store = MemoryStore::new();
        store.insert(&coll(), "a", json!({"time": 300})).unwrap();
        store.insert(&coll(), "b", json!({"time": 100})).unwrap();
        store.insert(&coll(), "c", json!({"time": 200})).unwrap();

        let page = store
            .search(&coll(), &SearchQuery::since("time", 150, 10))
            .unwrap();

        let ids: Vec<_> = page.docs.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert!(!page.has_more);
    }

    #[test]
    fn search_pages_with_continuation() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .insert(&coll(), &format!("d{}", i), json!({"time": i * 10}))
                .unwrap();
        }

        let mut query = SearchQuery::since("time", 0, 2);
        let first = store.search(&coll(), &query).unwrap();
        assert_eq!(first.docs.len(), 2);
        assert!(first.has_more);

        query.offset = 4;
        let last = store.search(&coll(), &query).unwrap();
        assert_eq!(last.docs.len(), 1);
        assert!(!last.has_more);
    }
}
