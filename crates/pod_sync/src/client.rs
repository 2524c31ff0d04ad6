//! Remote peer pull client
//!
//! Pulls pages of documents from a peer's search endpoint. The transport is
//! behind the [`RemoteSource`] trait so the engine and its tests can run
//! against in-process sources.

use crate::peers::PeerDescriptor;
use async_trait::async_trait;
use pod_common::{DocRef, PodError, Result};
use pod_store::{DocPage, DocumentStore, SearchQuery};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Paged pull capability over one peer's collections.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch_page(
        &self,
        peer: &PeerDescriptor,
        source: &DocRef,
        query: &SearchQuery,
    ) -> Result<DocPage>;
}

/// Wire request for the peer search endpoint.
#[derive(Debug, Serialize, Deserialize)]
struct SearchRequest<'a> {
    time_field: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_time: Option<i64>,
    size: usize,
    from: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct SearchResponse {
    hits: Vec<SearchHit>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct SearchHit {
    id: String,
    document: serde_json::Value,
}

/// HTTP implementation of [`RemoteSource`] with bounded retry.
pub struct HttpRemoteSource {
    client: reqwest::Client,
    retry_count: usize,
    retry_backoff: Duration,
}

impl HttpRemoteSource {
    pub fn new(sync: &pod_config::SyncConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(sync.request_timeout())
            .build()
            .map_err(|e| PodError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry_count: sync.retry_count,
            retry_backoff: sync.retry_backoff(),
        })
    }

    async fn fetch_once(
        &self,
        peer: &PeerDescriptor,
        source: &DocRef,
        query: &SearchQuery,
    ) -> Result<DocPage> {
        let url = format!(
            "{}/{}/{}/_search",
            peer.endpoint_url(),
            source.index,
            source.doc_type
        );
        let request = SearchRequest {
            time_field: &query.time_field,
            min_time: query.min_time,
            size: query.page_size,
            from: query.offset,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PodError::Network(format!("{}: {}", peer.id(), e)))?;

        if !response.status().is_success() {
            return Err(PodError::Network(format!(
                "{} returned {}",
                peer.id(),
                response.status()
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| PodError::Network(format!("{}: bad search response: {}", peer.id(), e)))?;

        Ok(DocPage {
            docs: body.hits.into_iter().map(|h| (h.id, h.document)).collect(),
            has_more: body.has_more,
        })
    }
}

#[async_trait]
impl RemoteSource for HttpRemoteSource {
    async fn fetch_page(
        &self,
        peer: &PeerDescriptor,
        source: &DocRef,
        query: &SearchQuery,
    ) -> Result<DocPage> {
        let mut backoff = self.retry_backoff;
        let mut last_err = None;

        for attempt in 1..=self.retry_count.max(1) {
            match self.fetch_once(peer, source, query).await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    tracing::debug!(
                        "fetch from {} failed (attempt {}/{}): {}",
                        peer.id(),
                        attempt,
                        self.retry_count.max(1),
                        e
                    );
                    last_err = Some(e);
                    if attempt < self.retry_count.max(1) {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| PodError::Network(format!("fetch from {} failed", peer.id()))))
    }
}

/// [`RemoteSource`] backed by a local [`DocumentStore`].
///
/// Used as the in-process stand-in for a remote peer in tests and local
/// replay; pages come straight out of the store's search capability.
pub struct StoreRemoteSource {
    store: Arc<dyn DocumentStore>,
}

impl StoreRemoteSource {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RemoteSource for StoreRemoteSource {
    async fn fetch_page(
        &self,
        _peer: &PeerDescriptor,
        source: &DocRef,
        query: &SearchQuery,
    ) -> Result<DocPage> {
        self.store.search(source, query)
    }
}
