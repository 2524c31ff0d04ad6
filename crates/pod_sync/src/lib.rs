//! # podsync synchronization engine
//!
//! Incremental, idempotent document synchronization between pods.
//!
//! ## Architecture
//!
//! - **SyncAction**: one (source collection, destination collection) unit of
//!   synchronization with its own validation chain and execution order
//! - **ValidationPipeline**: signature, time-window and business checks
//!   returning explicit verdicts (accepted / rejected / deferred)
//! - **SyncScheduler**: periodic driver running every registered action
//!   against every eligible peer, bounded and single-flighted
//! - **Watermarks**: persisted per-(peer, action) cursors so a pass resumes
//!   where the last one durably stopped
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pod_common::crypto::Ed25519CryptoService;
//! use pod_store::{MemoryStore, MemoryWatermarkStore};
//! use pod_sync::{catalog, HttpRemoteSource, SyncContext, SyncScheduler};
//! use pod_sync::events::UserEventBus;
//! use pod_sync::pipeline::TimeWindow;
//! use pod_sync::peers::{PeerSelector, StaticPeerRegistry};
//! use pod_sync::scheduler::AlwaysReady;
//!
//! #[tokio::main]
//! async fn main() -> pod_common::Result<()> {
//!     let config = pod_config::Config::load(std::path::Path::new("."))?;
//!     let ctx = Arc::new(SyncContext {
//!         store: Arc::new(MemoryStore::new()),
//!         crypto: Arc::new(Ed25519CryptoService),
//!         watermarks: Arc::new(MemoryWatermarkStore::new()),
//!         events: UserEventBus::new(64),
//!         time_window: TimeWindow::from_config(&config.sync),
//!         page_size: config.sync.page_size,
//!     });
//!     let registry = Arc::new(catalog::standard_registry());
//!     let scheduler = SyncScheduler::new(
//!         registry,
//!         Arc::new(StaticPeerRegistry::new(vec![])),
//!         PeerSelector::new(&config.network.currency, &config.peers),
//!         Arc::new(HttpRemoteSource::new(&config.sync)?),
//!         ctx,
//!         Arc::new(AlwaysReady),
//!         config.sync.clone(),
//!     );
//!     let report = scheduler.run_pass().await;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod catalog;
pub mod client;
pub mod events;
pub mod peers;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod scheduler;

pub use action::{ActionOutcome, ApplyMode, SyncAction, SyncContext};
pub use client::{HttpRemoteSource, RemoteSource, StoreRemoteSource};
pub use peers::{ApiKind, PeerDescriptor, PeerSelector};
pub use pipeline::{DeferReason, RejectReason, TimeWindow, Verdict};
pub use registry::SyncActionRegistry;
pub use report::SyncReport;
pub use scheduler::SyncScheduler;

/// Common result type for sync operations
pub type Result<T> = pod_common::Result<T>;
