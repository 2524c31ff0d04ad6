//! Document and watermark storage for podsync
//!
//! The sync core consumes storage through the [`DocumentStore`] trait; the
//! real indexing engine lives behind it. This crate ships the in-memory
//! implementation used by the core's collaborators and tests, plus the
//! persistent per-(peer, action) watermark store.

pub mod memory;
pub mod watermark;

pub use memory::MemoryStore;
pub use watermark::{MemoryWatermarkStore, SqliteWatermarkStore, WatermarkStore};

use pod_common::{DocRef, Result};
use serde_json::Value;

/// Per-collection CRUD + query capability, keyed by (collection, id).
pub trait DocumentStore: Send + Sync {
    fn exists(&self, coll: &DocRef, id: &str) -> Result<bool>;

    fn get(&self, coll: &DocRef, id: &str) -> Result<Option<Value>>;

    /// Insert a new document. Fails if the id already exists.
    fn insert(&self, coll: &DocRef, id: &str, doc: Value) -> Result<()>;

    /// Overwrite an existing document. Fails if the id is absent.
    fn update(&self, coll: &DocRef, id: &str, doc: Value) -> Result<()>;

    fn delete(&self, coll: &DocRef, id: &str) -> Result<()>;

    /// Time-filtered ascending page scan over one collection.
    fn search(&self, coll: &DocRef, query: &SearchQuery) -> Result<DocPage>;
}

/// Query shape for incremental pulls: ascending by a time field, filtered to
/// `time >= min_time`, paged by offset.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub time_field: String,
    pub min_time: Option<i64>,
    pub page_size: usize,
    pub offset: usize,
}

impl SearchQuery {
    pub fn since(time_field: impl Into<String>, min_time: i64, page_size: usize) -> Self {
        Self {
            time_field: time_field.into(),
            min_time: Some(min_time),
            page_size,
            offset: 0,
        }
    }
}

/// One page of (id, document) results plus a continuation flag.
#[derive(Debug, Clone, Default)]
pub struct DocPage {
    pub docs: Vec<(String, Value)>,
    pub has_more: bool,
}
