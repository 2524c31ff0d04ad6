//! Document validation pipeline
//!
//! Every incoming document passes, in order: format checks, authenticity
//! (issuer signature or content hash for anonymous events), time window, then
//! the action's business validators. The first non-accepting check wins.
//! Verdicts are explicit values; rejection is terminal, deferral means the
//! document is retried on a later pass.

use crate::action::{SyncAction, SyncContext};
use pod_common::{crypto::content_hash_hex, RawDocument, FIELD_HASH};

/// Terminal rejection reasons, counted per collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    InvalidSignature,
    InvalidTime { time: i64 },
    InvalidFormat(String),
    AccessDenied(String),
}

/// Non-terminal reasons: the document may become acceptable later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferReason {
    /// A referenced dependency document is not present yet.
    MissingDependency(String),
}

/// Outcome of validating one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
    Deferred(DeferReason),
}

impl Verdict {
    pub fn missing_dependency(what: impl Into<String>) -> Self {
        Verdict::Deferred(DeferReason::MissingDependency(what.into()))
    }

    pub fn invalid_format(why: impl Into<String>) -> Self {
        Verdict::Rejected(RejectReason::InvalidFormat(why.into()))
    }

    pub fn access_denied(why: impl Into<String>) -> Self {
        Verdict::Rejected(RejectReason::AccessDenied(why.into()))
    }
}

/// Acceptable distance between a document's declared time and the local
/// clock. Guards against replay of stale documents and clock-skew abuse.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    pub max_past_secs: i64,
    pub max_future_secs: i64,
}

impl TimeWindow {
    pub fn from_config(sync: &pod_config::SyncConfig) -> Self {
        Self {
            max_past_secs: sync.max_past_delta_secs as i64,
            max_future_secs: sync.max_future_delta_secs as i64,
        }
    }

    fn contains(&self, time: i64, now: i64) -> bool {
        time >= now - self.max_past_secs && time <= now + self.max_future_secs
    }
}

/// Run the full validation chain for one document.
pub fn check(action: &SyncAction, doc: &RawDocument, ctx: &SyncContext) -> Verdict {
    let Some(time) = doc.time(&action.time_field) else {
        return Verdict::invalid_format(format!("missing time field '{}'", action.time_field));
    };

    if let Some(verdict) = check_authenticity(action, doc, ctx) {
        return verdict;
    }

    let now = chrono::Utc::now().timestamp();
    if !ctx.time_window.contains(time, now) {
        return Verdict::Rejected(RejectReason::InvalidTime { time });
    }

    for validator in action.validators() {
        match validator(ctx, doc) {
            Verdict::Accepted => continue,
            other => return other,
        }
    }

    Verdict::Accepted
}

/// Signature check, or the content-hash substitute for anonymous actions.
fn check_authenticity(action: &SyncAction, doc: &RawDocument, ctx: &SyncContext) -> Option<Verdict> {
    if action.enable_signature_validation {
        let Some(issuer) = doc.issuer() else {
            return Some(Verdict::invalid_format("missing issuer"));
        };
        let Some(signature) = doc.signature() else {
            return Some(Verdict::invalid_format("missing signature"));
        };
        if !ctx.crypto.verify(issuer, signature, &doc.canonical_bytes()) {
            return Some(Verdict::Rejected(RejectReason::InvalidSignature));
        }
    } else {
        // Anonymous events carry no issuer signature; authenticity is a
        // content hash over the hashable form instead.
        let Some(declared) = doc.str_field(FIELD_HASH) else {
            return Some(Verdict::invalid_format("missing content hash"));
        };
        if declared != content_hash_hex(&hashable_bytes(doc)) {
            return Some(Verdict::Rejected(RejectReason::InvalidSignature));
        }
    }
    None
}

/// Canonical bytes with the hash field itself excluded as well.
pub fn hashable_bytes(doc: &RawDocument) -> Vec<u8> {
    let mut value = doc.to_value();
    if let Some(obj) = value.as_object_mut() {
        obj.remove(pod_common::FIELD_SIGNATURE);
        obj.remove(FIELD_HASH);
    }
    serde_json::to_vec(&value).unwrap_or_default()
}
