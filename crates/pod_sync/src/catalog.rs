//! Standard action catalog for a pod
//!
//! Execution order encodes cross-collection dependencies: deletion history
//! runs first so delete-then-recreate sequences resolve correctly within one
//! pass, user profiles/settings run before anything that references a user,
//! and blockchain blocks run last.

use crate::action::{
    ApplyMode, SyncAction, Validator, EXECUTION_ORDER_END, EXECUTION_ORDER_FIRST,
    EXECUTION_ORDER_MIDDLE,
};
use crate::events::{UserEvent, UserEventKind};
use crate::pipeline::Verdict;
use crate::registry::SyncActionRegistry;
use pod_common::DocRef;
use std::sync::Arc;

pub const ACTION_DELETIONS: &str = "deletions";
pub const ACTION_PEERS: &str = "peers";
pub const ACTION_PROFILES: &str = "profiles";
pub const ACTION_SETTINGS: &str = "settings";
pub const ACTION_PAGES: &str = "pages";
pub const ACTION_COMMENTS: &str = "comments";
pub const ACTION_MESSAGES: &str = "messages";
pub const ACTION_LIKES: &str = "likes";
pub const ACTION_BLOCKS: &str = "blocks";

const FIELD_RECIPIENT: &str = "recipient";
const FIELD_PAGE: &str = "page_id";
const FIELD_TARGET_INDEX: &str = "target_index";
const FIELD_TARGET_TYPE: &str = "target_type";
const FIELD_TARGET_ID: &str = "target_id";

pub fn deletions() -> SyncAction {
    SyncAction::new(
        ACTION_DELETIONS,
        DocRef::new("history", "delete"),
        DocRef::new("history", "delete"),
        EXECUTION_ORDER_FIRST,
    )
    .with_mode(ApplyMode::DeleteHistory)
}

pub fn peer_records() -> SyncAction {
    SyncAction::new(
        ACTION_PEERS,
        DocRef::new("network", "peer"),
        DocRef::new("network", "peer"),
        EXECUTION_ORDER_FIRST + 1,
    )
    .with_update_enabled(true)
}

pub fn profiles() -> SyncAction {
    SyncAction::new(
        ACTION_PROFILES,
        DocRef::new("user", "profile"),
        DocRef::new("user", "profile"),
        EXECUTION_ORDER_MIDDLE,
    )
    .with_update_enabled(true)
    .with_validator(require_self_issued())
}

pub fn settings() -> SyncAction {
    SyncAction::new(
        ACTION_SETTINGS,
        DocRef::new("user", "settings"),
        DocRef::new("user", "settings"),
        EXECUTION_ORDER_MIDDLE,
    )
    .with_update_enabled(true)
    .with_validator(require_self_issued())
}

pub fn pages() -> SyncAction {
    SyncAction::new(
        ACTION_PAGES,
        DocRef::new("page", "record"),
        DocRef::new("page", "record"),
        EXECUTION_ORDER_MIDDLE + 1,
    )
    .with_update_enabled(true)
}

/// Comments depend on their parent page, so they order strictly after pages.
pub fn comments() -> SyncAction {
    SyncAction::new(
        ACTION_COMMENTS,
        DocRef::new("page", "comment"),
        DocRef::new("page", "comment"),
        EXECUTION_ORDER_MIDDLE + 2,
    )
    .with_update_enabled(true)
    .with_validator(require_existing(
        DocRef::new("page", "record"),
        FIELD_PAGE,
        "parent page",
    ))
}

/// Messages depend on the recipient being a known user, so they order after
/// profiles and settings.
pub fn messages() -> SyncAction {
    SyncAction::new(
        ACTION_MESSAGES,
        DocRef::new("message", "inbox"),
        DocRef::new("message", "inbox"),
        EXECUTION_ORDER_MIDDLE + 3,
    )
    .with_validator(require_known_recipient())
    .with_insertion_listener(Arc::new(|ctx, doc| {
        let Some(recipient) = doc.str_field(FIELD_RECIPIENT) else {
            return Ok(());
        };
        ctx.events.publish(UserEvent {
            recipient: recipient.to_string(),
            kind: UserEventKind::MessageReceived,
            doc_id: doc.id.clone(),
            time: doc.time(pod_common::FIELD_TIME).unwrap_or(0),
        });
        Ok(())
    }))
}

/// Likes are anonymous events: no issuer signature, a content hash instead.
pub fn likes() -> SyncAction {
    SyncAction::new(
        ACTION_LIKES,
        DocRef::new("like", "record"),
        DocRef::new("like", "record"),
        EXECUTION_ORDER_MIDDLE + 4,
    )
    .with_signature_validation(false)
    .with_validator(require_like_target())
    .with_insertion_listener(Arc::new(|ctx, doc| {
        // Notify the owner of the liked document, when it names one.
        let Some(target) = like_target(doc) else {
            return Ok(());
        };
        let (coll, target_id) = target;
        if let Some(owner) = ctx
            .store
            .get(&coll, &target_id)?
            .as_ref()
            .and_then(|d| d.get(pod_common::FIELD_ISSUER))
            .and_then(serde_json::Value::as_str)
        {
            ctx.events.publish(UserEvent {
                recipient: owner.to_string(),
                kind: UserEventKind::LikeReceived,
                doc_id: doc.id.clone(),
                time: doc.time(pod_common::FIELD_TIME).unwrap_or(0),
            });
        }
        Ok(())
    }))
}

/// Blockchain blocks: chain rewrites legitimately overwrite stored blocks.
pub fn blocks() -> SyncAction {
    SyncAction::new(
        ACTION_BLOCKS,
        DocRef::new("block", "record"),
        DocRef::new("block", "record"),
        EXECUTION_ORDER_END,
    )
    .with_update_enabled(true)
    .with_time_field("medianTime")
}

/// The full standard registry, in dependency order.
pub fn standard_registry() -> SyncActionRegistry {
    let mut registry = SyncActionRegistry::new();
    registry
        .register(deletions())
        .register(peer_records())
        .register(profiles())
        .register(settings())
        .register(pages())
        .register(comments())
        .register(messages())
        .register(likes())
        .register(blocks());
    registry
}

/// Documents owned by their issuer must use the issuer pubkey as id.
fn require_self_issued() -> Validator {
    Arc::new(|_ctx, doc| match doc.issuer() {
        Some(issuer) if issuer == doc.id => Verdict::Accepted,
        Some(_) => Verdict::access_denied("document id does not match issuer"),
        None => Verdict::invalid_format("missing issuer"),
    })
}

/// Defer until a referenced document exists in `coll`.
fn require_existing(coll: DocRef, field: &'static str, what: &'static str) -> Validator {
    Arc::new(move |ctx, doc| {
        let Some(id) = doc.str_field(field) else {
            return Verdict::invalid_format(format!("missing field '{}'", field));
        };
        match ctx.store.exists(&coll, id) {
            Ok(true) => Verdict::Accepted,
            Ok(false) => Verdict::missing_dependency(format!("{} {}/{}", what, coll, id)),
            // A store probe failure just defers; the next pass retries.
            Err(_) => Verdict::missing_dependency(format!("{} {}/{}", what, coll, id)),
        }
    })
}

/// The recipient must already have a profile or settings document.
fn require_known_recipient() -> Validator {
    let profile = DocRef::new("user", "profile");
    let settings = DocRef::new("user", "settings");
    Arc::new(move |ctx, doc| {
        let Some(recipient) = doc.str_field(FIELD_RECIPIENT) else {
            return Verdict::invalid_format("missing recipient");
        };
        let known = ctx.store.exists(&profile, recipient).unwrap_or(false)
            || ctx.store.exists(&settings, recipient).unwrap_or(false);
        if known {
            Verdict::Accepted
        } else {
            Verdict::missing_dependency(format!("recipient {}", recipient))
        }
    })
}

fn require_like_target() -> Validator {
    Arc::new(|ctx, doc| {
        let Some((coll, id)) = like_target(doc) else {
            return Verdict::invalid_format("missing like target");
        };
        match ctx.store.exists(&coll, &id) {
            Ok(true) => Verdict::Accepted,
            _ => Verdict::missing_dependency(format!("like target {}/{}", coll, id)),
        }
    })
}

fn like_target(doc: &pod_common::RawDocument) -> Option<(DocRef, String)> {
    let index = doc.str_field(FIELD_TARGET_INDEX)?;
    let doc_type = doc.str_field(FIELD_TARGET_TYPE)?;
    let id = doc.str_field(FIELD_TARGET_ID)?;
    Some((DocRef::new(index, doc_type), id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_orders_dependencies() {
        let registry = standard_registry();
        let ids: Vec<_> = registry
            .iter_ordered()
            .iter()
            .map(|a| a.id.clone())
            .collect();

        assert_eq!(ids.first().map(String::as_str), Some(ACTION_DELETIONS));
        assert_eq!(ids.last().map(String::as_str), Some(ACTION_BLOCKS));

        let pos = |id: &str| ids.iter().position(|x| x == id).unwrap();
        assert!(pos(ACTION_PROFILES) < pos(ACTION_MESSAGES));
        assert!(pos(ACTION_PAGES) < pos(ACTION_COMMENTS));
        assert!(pos(ACTION_PAGES) < pos(ACTION_LIKES));
    }

    #[test]
    fn likes_skip_signature_validation() {
        assert!(!likes().enable_signature_validation);
        assert!(deletions().enable_signature_validation);
    }

    #[test]
    fn blocks_use_median_time() {
        let action = blocks();
        assert_eq!(action.time_field, "medianTime");
        assert!(action.enable_update);
    }
}
