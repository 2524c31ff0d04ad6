//! Sync actions: one unit of (source collection → destination collection)
//! synchronization
//!
//! An action owns its validation chain, insertion listeners, execution order
//! and update/delete policy. `apply` walks one peer's history incrementally
//! and idempotently: per-document failures become counters, never aborts;
//! only a network failure ends the walk early, leaving the persisted
//! watermark where the last durably applied page put it.

use crate::client::RemoteSource;
use crate::events::UserEventBus;
use crate::peers::{ApiKind, PeerDescriptor};
use crate::pipeline::{self, DeferReason, RejectReason, TimeWindow, Verdict};
use crate::report::SyncReport;
use pod_common::{crypto::CryptoService, DocRef, RawDocument, Result};
use pod_store::{DocumentStore, SearchQuery, WatermarkStore};
use std::sync::Arc;

/// Relative anchors for action ordering. Dependent actions must order
/// strictly after the collections they reference.
pub const EXECUTION_ORDER_FIRST: i32 = 0;
pub const EXECUTION_ORDER_MIDDLE: i32 = 50;
pub const EXECUTION_ORDER_END: i32 = 100;

/// Business validation guard. Pure: probes the store, never mutates.
pub type Validator = Arc<dyn Fn(&SyncContext, &RawDocument) -> Verdict + Send + Sync>;

/// Post-commit side effect (notifications). Best effort only.
pub type InsertionListener = Arc<dyn Fn(&SyncContext, &RawDocument) -> Result<()> + Send + Sync>;

/// Capabilities and settings shared by every action during a pass.
pub struct SyncContext {
    pub store: Arc<dyn DocumentStore>,
    pub crypto: Arc<dyn CryptoService>,
    pub watermarks: Arc<dyn WatermarkStore>,
    pub events: UserEventBus,
    pub time_window: TimeWindow,
    pub page_size: usize,
}

/// What acceptance means for this action's destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Insert new ids, update existing ones when updates are enabled.
    Upsert,
    /// The source collection holds deletion records: store the tombstone for
    /// onward relay, then delete the referenced target if present.
    DeleteHistory,
}

pub struct SyncAction {
    pub id: String,
    pub source: DocRef,
    pub dest: DocRef,
    pub execution_order: i32,
    pub enable_update: bool,
    pub enable_signature_validation: bool,
    pub time_field: String,
    pub required_api: ApiKind,
    pub mode: ApplyMode,
    validators: Vec<Validator>,
    insertion_listeners: Vec<InsertionListener>,
}

impl SyncAction {
    pub fn new(
        id: impl Into<String>,
        source: DocRef,
        dest: DocRef,
        execution_order: i32,
    ) -> Self {
        Self {
            id: id.into(),
            source,
            dest,
            execution_order,
            enable_update: false,
            enable_signature_validation: true,
            time_field: pod_common::FIELD_TIME.to_string(),
            required_api: ApiKind::DocumentSearch,
            mode: ApplyMode::Upsert,
            validators: Vec::new(),
            insertion_listeners: Vec::new(),
        }
    }

    pub fn with_update_enabled(mut self, enabled: bool) -> Self {
        self.enable_update = enabled;
        self
    }

    pub fn with_signature_validation(mut self, enabled: bool) -> Self {
        self.enable_signature_validation = enabled;
        self
    }

    pub fn with_time_field(mut self, field: impl Into<String>) -> Self {
        self.time_field = field.into();
        self
    }

    pub fn with_mode(mut self, mode: ApplyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn with_insertion_listener(mut self, listener: InsertionListener) -> Self {
        self.insertion_listeners.push(listener);
        self
    }

    pub(crate) fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Pull and apply this action's collection from one peer, starting at the
    /// `since` watermark (inclusive).
    pub async fn apply(
        &self,
        peer: &PeerDescriptor,
        source: &dyn RemoteSource,
        ctx: &SyncContext,
        since: i64,
    ) -> Result<ActionOutcome> {
        let mut report = SyncReport::new();
        let mut cursor = WatermarkCursor::default();
        let mut offset = 0;

        loop {
            let query = SearchQuery {
                time_field: self.time_field.clone(),
                min_time: Some(since),
                page_size: ctx.page_size,
                offset,
            };
            let page = source.fetch_page(peer, &self.source, &query).await?;

            for (id, value) in page.docs {
                self.process_document(id, value, ctx, &mut report, &mut cursor);
            }

            // The page is durably applied; persist before fetching the next
            // one so a crash loses at most the page in flight.
            if let Some(mark) = cursor.candidate() {
                ctx.watermarks.advance(&peer.id(), &self.id, mark)?;
            }

            if !page.has_more {
                break;
            }
            offset += ctx.page_size;
        }

        tracing::debug!(
            "{} from {}: {} applied, {} invalid",
            self.id,
            peer.id(),
            report.total(),
            report.invalid_total()
        );

        Ok(ActionOutcome {
            watermark: cursor.candidate(),
            report,
        })
    }

    fn process_document(
        &self,
        id: String,
        value: serde_json::Value,
        ctx: &SyncContext,
        report: &mut SyncReport,
        cursor: &mut WatermarkCursor,
    ) {
        let doc = match RawDocument::from_value(id, value) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::debug!("{}: malformed document skipped: {}", self.id, e);
                report.record_invalid_format(&self.dest);
                return;
            }
        };
        let time = doc.time(&self.time_field);

        match pipeline::check(self, &doc, ctx) {
            Verdict::Accepted => match self.apply_accepted(&doc, ctx, report) {
                Ok(()) => cursor.accept(time),
                Err(e) => {
                    // A store failure is not the document's fault; hold the
                    // watermark back so the document is retried.
                    tracing::warn!("{}: failed to apply {}: {}", self.id, doc.id, e);
                    cursor.defer(time);
                }
            },
            Verdict::Rejected(reason) => {
                tracing::debug!("{}: rejected {}: {:?}", self.id, doc.id, reason);
                match reason {
                    RejectReason::InvalidSignature => report.record_invalid_signature(&self.dest),
                    RejectReason::InvalidTime { .. } => report.record_invalid_time(&self.dest),
                    RejectReason::InvalidFormat(_) => report.record_invalid_format(&self.dest),
                    RejectReason::AccessDenied(_) => report.record_access_denied(&self.dest),
                }
                cursor.reject(time);
            }
            Verdict::Deferred(DeferReason::MissingDependency(what)) => {
                tracing::debug!("{}: held back {} (missing {})", self.id, doc.id, what);
                cursor.defer(time);
            }
        }
    }

    fn apply_accepted(
        &self,
        doc: &RawDocument,
        ctx: &SyncContext,
        report: &mut SyncReport,
    ) -> Result<()> {
        match self.mode {
            ApplyMode::Upsert => {
                let committed = if ctx.store.exists(&self.dest, &doc.id)? {
                    if self.enable_update {
                        ctx.store.update(&self.dest, &doc.id, doc.to_value())?;
                        report.record_update(&self.dest);
                        true
                    } else {
                        tracing::trace!("{}: {} already present, skipped", self.id, doc.id);
                        false
                    }
                } else {
                    ctx.store.insert(&self.dest, &doc.id, doc.to_value())?;
                    report.record_insert(&self.dest);
                    true
                };

                if committed {
                    self.run_insertion_listeners(doc, ctx);
                }
                Ok(())
            }
            ApplyMode::DeleteHistory => self.apply_deletion(doc, ctx, report),
        }
    }

    /// Tombstones are stored regardless so they relay onward; the actual
    /// delete only happens when the target is present.
    fn apply_deletion(
        &self,
        doc: &RawDocument,
        ctx: &SyncContext,
        report: &mut SyncReport,
    ) -> Result<()> {
        if !ctx.store.exists(&self.dest, &doc.id)? {
            ctx.store.insert(&self.dest, &doc.id, doc.to_value())?;
        }

        let target = match deletion_target(doc) {
            Some(target) => target,
            None => {
                tracing::debug!("{}: deletion record {} lacks a target", self.id, doc.id);
                report.record_invalid_format(&self.dest);
                return Ok(());
            }
        };

        let (coll, target_id) = target;
        if ctx.store.exists(&coll, &target_id)? {
            ctx.store.delete(&coll, &target_id)?;
            report.record_delete(&self.dest);
        } else {
            tracing::debug!(
                "{}: target {}/{} already absent, tombstone kept",
                self.id,
                coll,
                target_id
            );
        }
        Ok(())
    }

    fn run_insertion_listeners(&self, doc: &RawDocument, ctx: &SyncContext) {
        for listener in &self.insertion_listeners {
            if let Err(e) = listener(ctx, doc) {
                tracing::warn!("{}: insertion listener failed for {}: {}", self.id, doc.id, e);
            }
        }
    }
}

/// Target collection and id referenced by a deletion record.
fn deletion_target(doc: &RawDocument) -> Option<(DocRef, String)> {
    let index = doc.str_field("index")?;
    let doc_type = doc.str_field("type")?;
    let id = doc.str_field("id")?;
    Some((DocRef::new(index, doc_type), id.to_string()))
}

/// Result of applying one action against one peer.
#[derive(Debug)]
pub struct ActionOutcome {
    pub report: SyncReport,
    /// Watermark reached by this run, when any document carried a timestamp.
    pub watermark: Option<i64>,
}

/// Tracks how far the watermark may advance within one run.
///
/// Policy: advance to the highest accepted timestamp, capped at the earliest
/// deferred timestamp so held-back documents are refetched. Rejected
/// documents are terminal; one beyond the accepted range must not drag the
/// cursor forward past history we have not applied yet.
#[derive(Debug, Default)]
struct WatermarkCursor {
    accepted_max: Option<i64>,
    deferred_min: Option<i64>,
}

impl WatermarkCursor {
    fn accept(&mut self, time: Option<i64>) {
        if let Some(t) = time {
            self.accepted_max = Some(self.accepted_max.map_or(t, |m| m.max(t)));
        }
    }

    fn defer(&mut self, time: Option<i64>) {
        if let Some(t) = time {
            self.deferred_min = Some(self.deferred_min.map_or(t, |m| m.min(t)));
        }
    }

    fn reject(&mut self, _time: Option<i64>) {
        // Terminal failures neither hold the cursor back nor advance it.
    }

    fn candidate(&self) -> Option<i64> {
        match (self.accepted_max, self.deferred_min) {
            (Some(a), Some(d)) => Some(a.min(d)),
            (Some(a), None) => Some(a),
            (None, Some(d)) => Some(d),
            (None, None) => None,
        }
    }
}
