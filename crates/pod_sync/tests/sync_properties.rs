//! End-to-end properties of the synchronization engine, run against
//! in-memory stores and an in-process remote peer.

use async_trait::async_trait;
use pod_common::crypto::Ed25519CryptoService;
use pod_common::{DocRef, Result};
use pod_config::SyncConfig;
use pod_store::{DocPage, DocumentStore, MemoryStore, MemoryWatermarkStore, SearchQuery, WatermarkStore};
use pod_sync::events::{UserEventBus, UserEventKind};
use pod_sync::peers::{ApiKind, PeerDescriptor, StaticPeerRegistry};
use pod_sync::scheduler::AlwaysReady;
use pod_sync::{
    catalog, PeerSelector, RemoteSource, StoreRemoteSource, SyncAction, SyncActionRegistry,
    SyncContext, SyncScheduler, TimeWindow,
};
use pod_test_helpers::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn peer() -> PeerDescriptor {
    PeerDescriptor {
        pubkey: String::new(),
        host: "peer-a".to_string(),
        port: 9200,
        tls: false,
        currency: "g1".to_string(),
        api_capabilities: vec![ApiKind::DocumentSearch],
    }
}

fn test_ctx(page_size: usize) -> (Arc<SyncContext>, Arc<MemoryStore>, Arc<MemoryWatermarkStore>) {
    let store = Arc::new(MemoryStore::new());
    let watermarks = Arc::new(MemoryWatermarkStore::new());
    let ctx = Arc::new(SyncContext {
        store: store.clone(),
        crypto: Arc::new(Ed25519CryptoService),
        watermarks: watermarks.clone(),
        events: UserEventBus::new(64),
        time_window: TimeWindow {
            max_past_secs: 3600 * 24 * 365,
            max_future_secs: 600,
        },
        page_size,
    });
    (ctx, store, watermarks)
}

fn scheduler_for(
    registry: SyncActionRegistry,
    remote: Arc<MemoryStore>,
    ctx: Arc<SyncContext>,
) -> SyncScheduler {
    SyncScheduler::new(
        Arc::new(registry),
        Arc::new(StaticPeerRegistry::new(vec![peer()])),
        PeerSelector::new("g1", &pod_config::PeersConfig::default()),
        Arc::new(StoreRemoteSource::new(remote)),
        ctx,
        Arc::new(AlwaysReady),
        SyncConfig::default(),
    )
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Plain content action with no business validators, for focused tests.
fn things_action(enable_update: bool) -> SyncAction {
    SyncAction::new(
        "things",
        DocRef::new("thing", "record"),
        DocRef::new("thing", "record"),
        pod_sync::action::EXECUTION_ORDER_MIDDLE,
    )
    .with_update_enabled(enable_update)
}

#[tokio::test]
async fn since_filter_applies_only_newer_documents() {
    let base = now();
    let (ctx, local, watermarks) = test_ctx(100);
    let remote = Arc::new(MemoryStore::new());
    let coll = DocRef::new("thing", "record");
    let key = TestKey::generate();

    for (id, t) in [("d1", base - 300), ("d2", base - 200), ("d3", base - 100)] {
        let (id, doc) = signed_doc(&key, id, json!({"time": t, "payload": id}));
        remote.insert(&coll, &id, doc).unwrap();
    }

    let action = things_action(false);
    let source = StoreRemoteSource::new(remote);
    let outcome = action
        .apply(&peer(), &source, &ctx, base - 250)
        .await
        .unwrap();

    assert_eq!(outcome.report.counters(&coll).inserts, 2);
    assert!(!local.exists(&coll, "d1").unwrap());
    assert!(local.exists(&coll, "d2").unwrap());
    assert!(local.exists(&coll, "d3").unwrap());
    assert_eq!(
        watermarks.get(&peer().id(), "things").unwrap(),
        Some(base - 100)
    );
}

#[tokio::test]
async fn reapplying_a_page_is_idempotent() {
    let base = now();
    let (ctx, local, _) = test_ctx(100);
    let remote = Arc::new(MemoryStore::new());
    let coll = DocRef::new("thing", "record");
    let key = TestKey::generate();

    for i in 0..3 {
        let (id, doc) = signed_doc(
            &key,
            &format!("d{}", i),
            json!({"time": base - 100 + i, "n": i}),
        );
        remote.insert(&coll, &id, doc).unwrap();
    }

    let action = things_action(false);
    let source = StoreRemoteSource::new(remote);

    let first = action.apply(&peer(), &source, &ctx, 0).await.unwrap();
    assert_eq!(first.report.counters(&coll).inserts, 3);

    let second = action.apply(&peer(), &source, &ctx, 0).await.unwrap();
    assert_eq!(second.report.counters(&coll).inserts, 0);
    assert_eq!(second.report.total(), 0);
    assert_eq!(local.len(&coll), 3);
}

#[tokio::test]
async fn reapplying_with_updates_enabled_overwrites_consistently() {
    let base = now();
    let (ctx, local, _) = test_ctx(100);
    let remote = Arc::new(MemoryStore::new());
    let coll = DocRef::new("thing", "record");
    let key = TestKey::generate();

    let (id, doc) = signed_doc(&key, "d1", json!({"time": base - 50, "v": 1}));
    remote.insert(&coll, &id, doc).unwrap();

    let action = things_action(true);
    let source = StoreRemoteSource::new(remote);

    let first = action.apply(&peer(), &source, &ctx, 0).await.unwrap();
    assert_eq!(first.report.counters(&coll).inserts, 1);

    let second = action.apply(&peer(), &source, &ctx, 0).await.unwrap();
    assert_eq!(second.report.counters(&coll).updates, 1);
    assert_eq!(local.len(&coll), 1);
}

#[tokio::test]
async fn tampered_document_never_lands_in_store() {
    let base = now();
    let (ctx, local, _) = test_ctx(100);
    let remote = Arc::new(MemoryStore::new());
    let coll = DocRef::new("thing", "record");
    let key = TestKey::generate();

    let (id, doc) = tampered_doc(
        &key,
        "evil",
        json!({"time": base - 10, "amount": 1}),
        "amount",
        json!(1_000_000),
    );
    remote.insert(&coll, &id, doc).unwrap();

    let action = things_action(false);
    let source = StoreRemoteSource::new(remote);
    let outcome = action.apply(&peer(), &source, &ctx, 0).await.unwrap();

    assert_eq!(outcome.report.counters(&coll).invalid_signatures, 1);
    assert_eq!(outcome.report.total(), 0);
    assert!(!local.exists(&coll, "evil").unwrap());
}

#[tokio::test]
async fn profile_for_another_key_counts_as_access_denied() {
    let base = now();
    let (ctx, local, _) = test_ctx(100);
    let remote = Arc::new(MemoryStore::new());
    let coll = DocRef::new("user", "profile");
    let key = TestKey::generate();

    // Well-signed, but claims an id that is not the issuer's pubkey.
    let (id, doc) = signed_doc(&key, "somebody-else", json!({"time": base - 10, "title": "x"}));
    remote.insert(&coll, &id, doc).unwrap();

    let action = catalog::profiles();
    let source = StoreRemoteSource::new(remote);
    let outcome = action.apply(&peer(), &source, &ctx, 0).await.unwrap();

    let counters = outcome.report.counters(&coll);
    assert_eq!(counters.access_denied, 1);
    assert_eq!(counters.invalid_formats, 0);
    assert_eq!(outcome.report.total(), 0);
    assert!(!local.exists(&coll, "somebody-else").unwrap());
}

#[tokio::test]
async fn future_timestamp_rejected_and_watermark_unmoved_by_it() {
    let base = now();
    let (ctx, local, watermarks) = test_ctx(100);
    let remote = Arc::new(MemoryStore::new());
    let coll = DocRef::new("thing", "record");
    let key = TestKey::generate();

    let (id, doc) = signed_doc(&key, "ok", json!({"time": base - 100}));
    remote.insert(&coll, &id, doc).unwrap();
    // 10_000s in the future, far beyond the 600s window.
    let (id, doc) = signed_doc(&key, "future", json!({"time": base + 10_000}));
    remote.insert(&coll, &id, doc).unwrap();

    let action = things_action(false);
    let source = StoreRemoteSource::new(remote);
    let outcome = action.apply(&peer(), &source, &ctx, 0).await.unwrap();

    let counters = outcome.report.counters(&coll);
    assert_eq!(counters.inserts, 1);
    assert_eq!(counters.invalid_times, 1);
    assert!(!local.exists(&coll, "future").unwrap());

    // The cursor stops at the highest accepted time, not the rejected one.
    assert_eq!(
        watermarks.get(&peer().id(), "things").unwrap(),
        Some(base - 100)
    );
}

#[tokio::test]
async fn watermark_never_regresses_across_passes() {
    let base = now();
    let (ctx, _, watermarks) = test_ctx(100);
    let remote = Arc::new(MemoryStore::new());
    let coll = DocRef::new("thing", "record");
    let key = TestKey::generate();

    let (id, doc) = signed_doc(&key, "d1", json!({"time": base - 100}));
    remote.insert(&coll, &id, doc).unwrap();

    let action = things_action(false);
    let source = StoreRemoteSource::new(remote);

    action.apply(&peer(), &source, &ctx, 0).await.unwrap();
    let w1 = watermarks.get(&peer().id(), "things").unwrap().unwrap();

    action.apply(&peer(), &source, &ctx, 0).await.unwrap();
    let w2 = watermarks.get(&peer().id(), "things").unwrap().unwrap();
    assert!(w2 >= w1);
}

#[tokio::test]
async fn message_for_known_recipient_accepted_in_ordered_pass() {
    let base = now();
    let (ctx, local, _) = test_ctx(100);
    let remote = Arc::new(MemoryStore::new());
    let recipient = TestKey::generate();
    let sender = TestKey::generate();

    let recipient_id = recipient.pubkey.clone();
    let (id, doc) = signed_doc(
        &recipient,
        &recipient_id,
        json!({"time": base - 200, "title": "me"}),
    );
    remote.insert(&DocRef::new("user", "profile"), &id, doc).unwrap();

    let (id, doc) = signed_doc(
        &sender,
        "m1",
        json!({"time": base - 100, "recipient": recipient_id, "content": "hi"}),
    );
    remote.insert(&DocRef::new("message", "inbox"), &id, doc).unwrap();

    let mut events = ctx.events.subscribe();

    let mut registry = SyncActionRegistry::new();
    registry.register(catalog::profiles());
    registry.register(catalog::messages());
    let scheduler = scheduler_for(registry, remote, ctx);

    let report = scheduler.run_pass().await;
    assert_eq!(report.counters(&DocRef::new("user", "profile")).inserts, 1);
    assert_eq!(report.counters(&DocRef::new("message", "inbox")).inserts, 1);
    assert!(local.exists(&DocRef::new("message", "inbox"), "m1").unwrap());

    let event = events.try_recv().unwrap();
    assert_eq!(event.kind, UserEventKind::MessageReceived);
    assert_eq!(event.recipient, recipient.pubkey);
}

#[tokio::test]
async fn message_before_profile_is_held_back_then_retried() {
    let base = now();
    let (ctx, local, watermarks) = test_ctx(100);
    let remote = Arc::new(MemoryStore::new());
    let recipient = TestKey::generate();
    let sender = TestKey::generate();
    let inbox = DocRef::new("message", "inbox");

    let recipient_id = recipient.pubkey.clone();
    let (id, doc) = signed_doc(
        &sender,
        "m1",
        json!({"time": base - 100, "recipient": recipient_id, "content": "hi"}),
    );
    remote.insert(&inbox, &id, doc).unwrap();

    // Recipient unknown: the message defers without crashing.
    let action = catalog::messages();
    let source = StoreRemoteSource::new(remote.clone());
    let outcome = action.apply(&peer(), &source, &ctx, 0).await.unwrap();
    assert_eq!(outcome.report.total(), 0);
    assert!(!local.exists(&inbox, "m1").unwrap());
    // The watermark holds at the deferred document so it is refetched.
    assert_eq!(
        watermarks.get(&peer().id(), catalog::ACTION_MESSAGES).unwrap(),
        Some(base - 100)
    );

    // Once the profile exists, the next pass accepts the message.
    let profile_id = recipient.pubkey.clone();
    let (id, doc) = signed_doc(
        &recipient,
        &profile_id,
        json!({"time": base - 200, "title": "me"}),
    );
    local.insert(&DocRef::new("user", "profile"), &id, doc).unwrap();

    let outcome = action
        .apply(&peer(), &source, &ctx, base - 100)
        .await
        .unwrap();
    assert_eq!(outcome.report.counters(&inbox).inserts, 1);
    assert!(local.exists(&inbox, "m1").unwrap());
}

#[tokio::test]
async fn delete_then_recreate_leaves_document_present() {
    let base = now();
    let (ctx, local, _) = test_ctx(100);
    let remote = Arc::new(MemoryStore::new());
    let key = TestKey::generate();
    let pages = DocRef::new("page", "record");
    let tombstones = DocRef::new("history", "delete");

    // Stale local copy that the remote has deleted and re-created.
    local
        .insert(&pages, "p1", json!({"time": base - 500, "title": "old"}))
        .unwrap();

    let (id, doc) = signed_doc(
        &key,
        "del-p1",
        json!({"time": base - 200, "index": "page", "type": "record", "id": "p1"}),
    );
    remote.insert(&tombstones, &id, doc).unwrap();

    let (id, doc) = signed_doc(&key, "p1", json!({"time": base - 100, "title": "new"}));
    remote.insert(&pages, &id, doc).unwrap();

    let mut registry = SyncActionRegistry::new();
    registry.register(catalog::pages());
    registry.register(catalog::deletions());
    let scheduler = scheduler_for(registry, remote, ctx);

    let report = scheduler.run_pass().await;

    // Deletions run first even though they registered last.
    assert_eq!(report.counters(&tombstones).deletes, 1);
    assert_eq!(report.counters(&pages).inserts, 1);

    let stored = local.get(&pages, "p1").unwrap().unwrap();
    assert_eq!(stored.get("title").and_then(|v| v.as_str()), Some("new"));
    // The tombstone itself is kept for onward relay.
    assert!(local.exists(&tombstones, "del-p1").unwrap());
}

#[tokio::test]
async fn tombstone_for_absent_target_is_stored_not_an_error() {
    let base = now();
    let (ctx, local, _) = test_ctx(100);
    let remote = Arc::new(MemoryStore::new());
    let key = TestKey::generate();
    let tombstones = DocRef::new("history", "delete");

    let (id, doc) = signed_doc(
        &key,
        "del-ghost",
        json!({"time": base - 10, "index": "page", "type": "record", "id": "ghost"}),
    );
    remote.insert(&tombstones, &id, doc).unwrap();

    let action = catalog::deletions();
    let source = StoreRemoteSource::new(remote);
    let outcome = action.apply(&peer(), &source, &ctx, 0).await.unwrap();

    assert_eq!(outcome.report.counters(&tombstones).deletes, 0);
    assert!(local.exists(&tombstones, "del-ghost").unwrap());
}

#[tokio::test]
async fn anonymous_like_uses_content_hash_and_notifies_owner() {
    let base = now();
    let (ctx, local, _) = test_ctx(100);
    let remote = Arc::new(MemoryStore::new());
    let owner = TestKey::generate();
    let pages = DocRef::new("page", "record");
    let likes = DocRef::new("like", "record");

    let (id, doc) = signed_doc(&owner, "p1", json!({"time": base - 500, "title": "post"}));
    local.insert(&pages, &id, doc).unwrap();

    let (id, doc) = anonymous_doc(
        "l1",
        json!({
            "time": base - 100,
            "target_index": "page",
            "target_type": "record",
            "target_id": "p1"
        }),
    );
    remote.insert(&likes, &id, doc).unwrap();

    // A like with a corrupted hash must be rejected.
    let (_, mut bad) = anonymous_doc("l2", json!({"time": base - 90, "target_index": "page", "target_type": "record", "target_id": "p1"}));
    bad.as_object_mut()
        .unwrap()
        .insert("hash".to_string(), json!("0000"));
    remote.insert(&likes, "l2", bad).unwrap();

    let mut events = ctx.events.subscribe();

    let action = catalog::likes();
    let source = StoreRemoteSource::new(remote);
    let outcome = action.apply(&peer(), &source, &ctx, 0).await.unwrap();

    let counters = outcome.report.counters(&likes);
    assert_eq!(counters.inserts, 1);
    assert_eq!(counters.invalid_signatures, 1);
    assert!(local.exists(&likes, "l1").unwrap());
    assert!(!local.exists(&likes, "l2").unwrap());

    let event = events.try_recv().unwrap();
    assert_eq!(event.kind, UserEventKind::LikeReceived);
    assert_eq!(event.recipient, owner.pubkey);
}

#[tokio::test]
async fn paging_walks_the_whole_history() {
    let base = now();
    let (ctx, local, watermarks) = test_ctx(2);
    let remote = Arc::new(MemoryStore::new());
    let coll = DocRef::new("thing", "record");
    let key = TestKey::generate();

    for i in 0..7 {
        let (id, doc) = signed_doc(&key, &format!("d{}", i), json!({"time": base - 100 + i}));
        remote.insert(&coll, &id, doc).unwrap();
    }

    let action = things_action(false);
    let source = StoreRemoteSource::new(remote);
    let outcome = action.apply(&peer(), &source, &ctx, 0).await.unwrap();

    assert_eq!(outcome.report.counters(&coll).inserts, 7);
    assert_eq!(local.len(&coll), 7);
    assert_eq!(
        watermarks.get(&peer().id(), "things").unwrap(),
        Some(base - 100 + 6)
    );
}

/// Remote source that delays every fetch, to force overlap between passes.
struct SlowSource {
    inner: StoreRemoteSource,
}

#[async_trait]
impl RemoteSource for SlowSource {
    async fn fetch_page(
        &self,
        peer: &PeerDescriptor,
        source: &DocRef,
        query: &SearchQuery,
    ) -> Result<DocPage> {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        self.inner.fetch_page(peer, source, query).await
    }
}

#[tokio::test]
async fn concurrent_passes_do_not_double_apply() {
    let base = now();
    let (ctx, local, watermarks) = test_ctx(100);
    let remote = Arc::new(MemoryStore::new());
    let coll = DocRef::new("thing", "record");
    let key = TestKey::generate();

    for i in 0..5 {
        let (id, doc) = signed_doc(&key, &format!("d{}", i), json!({"time": base - 100 + i}));
        remote.insert(&coll, &id, doc).unwrap();
    }

    let mut registry = SyncActionRegistry::new();
    registry.register(things_action(false));
    let scheduler = Arc::new(SyncScheduler::new(
        Arc::new(registry),
        Arc::new(StaticPeerRegistry::new(vec![peer()])),
        PeerSelector::new("g1", &pod_config::PeersConfig::default()),
        Arc::new(SlowSource {
            inner: StoreRemoteSource::new(remote),
        }),
        ctx,
        Arc::new(AlwaysReady),
        SyncConfig::default(),
    ));

    let (a, b) = tokio::join!(scheduler.run_pass(), scheduler.run_pass());

    // One pass does the work; the overlapping one is skipped or finds
    // everything already applied. Never double counting, never double state.
    assert_eq!(
        a.counters(&coll).inserts + b.counters(&coll).inserts,
        5
    );
    assert_eq!(local.len(&coll), 5);
    assert_eq!(
        watermarks.get(&peer().id(), "things").unwrap(),
        Some(base - 100 + 4)
    );
}

#[tokio::test]
async fn network_failure_aborts_task_and_preserves_watermark() {
    struct FailingSource;

    #[async_trait]
    impl RemoteSource for FailingSource {
        async fn fetch_page(
            &self,
            peer: &PeerDescriptor,
            _source: &DocRef,
            _query: &SearchQuery,
        ) -> Result<DocPage> {
            Err(pod_common::PodError::Network(format!(
                "{} unreachable",
                peer.id()
            )))
        }
    }

    let (ctx, _, watermarks) = test_ctx(100);
    watermarks.advance(&peer().id(), "things", 500).unwrap();

    let action = things_action(false);
    let err = action
        .apply(&peer(), &FailingSource, &ctx, 500)
        .await
        .unwrap_err();
    assert!(matches!(err, pod_common::PodError::Network(_)));
    assert_eq!(watermarks.get(&peer().id(), "things").unwrap(), Some(500));
}
