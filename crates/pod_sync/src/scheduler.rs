//! Sync pass scheduling
//!
//! Drives every registered action against every eligible peer, in execution
//! order, on a periodic tick. Tasks for distinct (peer, action) pairs run in
//! parallel under a bounded pool; tasks sharing a pair are single-flighted.
//! A single peer's failure never blocks the rest of the pass.

use crate::action::{SyncAction, SyncContext};
use crate::client::RemoteSource;
use crate::peers::{PeerDescriptor, PeerRegistry, PeerSelector};
use crate::registry::SyncActionRegistry;
use crate::report::SyncReport;
use async_trait::async_trait;
use pod_config::SyncConfig;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Semaphore};

/// Scheduler lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    WaitingClusterReady,
    RunningPass,
}

/// External readiness gate. A pass only starts when the cluster says so.
#[async_trait]
pub trait ClusterGate: Send + Sync {
    async fn ready(&self) -> bool;
}

/// Gate that never blocks; the default for single-node pods and tests.
pub struct AlwaysReady;

#[async_trait]
impl ClusterGate for AlwaysReady {
    async fn ready(&self) -> bool {
        true
    }
}

/// At-most-one concurrent task per key.
#[derive(Default, Clone)]
pub(crate) struct SingleFlight {
    in_flight: Arc<Mutex<HashSet<(String, String)>>>,
}

impl SingleFlight {
    /// Claim a key. Returns `None` when another task already holds it.
    pub(crate) fn begin(&self, key: (String, String)) -> Option<FlightGuard> {
        let mut in_flight = self.in_flight.lock().ok()?;
        if !in_flight.insert(key.clone()) {
            return None;
        }
        Some(FlightGuard {
            set: Arc::clone(&self.in_flight),
            key,
        })
    }
}

pub(crate) struct FlightGuard {
    set: Arc<Mutex<HashSet<(String, String)>>>,
    key: (String, String),
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.key);
        }
    }
}

pub struct SyncScheduler {
    registry: Arc<SyncActionRegistry>,
    peer_registry: Arc<dyn PeerRegistry>,
    selector: PeerSelector,
    source: Arc<dyn RemoteSource>,
    ctx: Arc<SyncContext>,
    gate: Arc<dyn ClusterGate>,
    config: SyncConfig,
    state: Mutex<SchedulerState>,
    single_flight: SingleFlight,
    pool: Arc<Semaphore>,
}

impl SyncScheduler {
    pub fn new(
        registry: Arc<SyncActionRegistry>,
        peer_registry: Arc<dyn PeerRegistry>,
        selector: PeerSelector,
        source: Arc<dyn RemoteSource>,
        ctx: Arc<SyncContext>,
        gate: Arc<dyn ClusterGate>,
        config: SyncConfig,
    ) -> Self {
        let pool = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        Self {
            registry,
            peer_registry,
            selector,
            source,
            ctx,
            gate,
            config,
            state: Mutex::new(SchedulerState::Idle),
            single_flight: SingleFlight::default(),
            pool,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(SchedulerState::Idle)
    }

    fn set_state(&self, state: SchedulerState) {
        if let Ok(mut s) = self.state.lock() {
            *s = state;
        }
    }

    /// Periodic driver. Runs until `shutdown` flips to true; an in-flight
    /// pass finishes before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.config.enabled {
            tracing::info!("sync disabled by configuration");
            return;
        }

        if self.config.full_resync_at_startup {
            if let Err(e) = self.ctx.watermarks.clear() {
                tracing::error!("failed to reset watermarks for full resync: {}", e);
            } else {
                tracing::info!("watermarks cleared, full resync from zero");
            }
        }

        if self.config.run_at_startup {
            let report = self.run_pass().await;
            tracing::info!("startup sync pass done: {} applied", report.total());
        }

        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_pass().await;
                    tracing::info!("scheduled sync pass done: {} applied", report.total());
                }
                changed = shutdown.changed() => {
                    // A dropped sender means nobody can keep us running.
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("sync scheduler shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// One full pass: every action in execution order, every eligible peer.
    pub async fn run_pass(&self) -> SyncReport {
        if !self.gate.ready().await {
            tracing::info!("cluster not ready, sync pass skipped");
            self.set_state(SchedulerState::WaitingClusterReady);
            return SyncReport::new();
        }
        self.set_state(SchedulerState::RunningPass);

        let mut pass_report = SyncReport::new();
        for action in self.registry.iter_ordered() {
            let peers = self
                .selector
                .select(self.peer_registry.as_ref(), action.required_api);
            if peers.is_empty() {
                tracing::debug!("{}: no eligible peer", action.id);
                continue;
            }

            let mut handles = Vec::with_capacity(peers.len());
            for peer in peers {
                handles.push(self.spawn_task(Arc::clone(&action), peer));
            }
            for handle in handles {
                match handle.await {
                    Ok(report) => pass_report.merge(report),
                    Err(e) => tracing::error!("sync task panicked: {}", e),
                }
            }
        }

        self.set_state(SchedulerState::Idle);
        pass_report
    }

    fn spawn_task(
        &self,
        action: Arc<SyncAction>,
        peer: PeerDescriptor,
    ) -> tokio::task::JoinHandle<SyncReport> {
        let ctx = Arc::clone(&self.ctx);
        let source = Arc::clone(&self.source);
        let single_flight = self.single_flight.clone();
        let pool = Arc::clone(&self.pool);

        tokio::spawn(async move {
            let Ok(_permit) = pool.acquire_owned().await else {
                return SyncReport::new();
            };
            sync_peer_action(&action, &peer, source.as_ref(), &ctx, &single_flight).await
        })
    }
}

/// Run one (peer, action) unit of work under the single-flight guard.
pub(crate) async fn sync_peer_action(
    action: &SyncAction,
    peer: &PeerDescriptor,
    source: &dyn RemoteSource,
    ctx: &SyncContext,
    single_flight: &SingleFlight,
) -> SyncReport {
    let key = (peer.id(), action.id.clone());
    let Some(_guard) = single_flight.begin(key) else {
        tracing::debug!("{} from {} already in flight, skipped", action.id, peer.id());
        return SyncReport::new();
    };

    let since = match ctx.watermarks.get(&peer.id(), &action.id) {
        Ok(mark) => mark.unwrap_or(0),
        Err(e) => {
            tracing::error!("{}: failed to read watermark for {}: {}", action.id, peer.id(), e);
            return SyncReport::new();
        }
    };

    match action.apply(peer, source, ctx, since).await {
        Ok(outcome) => outcome.report,
        Err(e) => {
            // Watermark untouched; the next tick retries from where the
            // last durably applied page left it.
            tracing::error!("{} from {} aborted: {}", action.id, peer.id(), e);
            SyncReport::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_flight_blocks_duplicate_keys() {
        let flight = SingleFlight::default();
        let key = ("peer:9200".to_string(), "profiles".to_string());

        let guard = flight.begin(key.clone());
        assert!(guard.is_some());
        assert!(flight.begin(key.clone()).is_none());

        drop(guard);
        assert!(flight.begin(key).is_some());
    }

    #[test]
    fn single_flight_distinct_keys_independent() {
        let flight = SingleFlight::default();
        let a = flight.begin(("p1".to_string(), "x".to_string()));
        let b = flight.begin(("p2".to_string(), "x".to_string()));
        let c = flight.begin(("p1".to_string(), "y".to_string()));
        assert!(a.is_some() && b.is_some() && c.is_some());
    }

    #[tokio::test]
    async fn run_exits_when_shutdown_sender_dropped() {
        use crate::client::StoreRemoteSource;
        use crate::events::UserEventBus;
        use crate::peers::StaticPeerRegistry;
        use crate::pipeline::TimeWindow;
        use pod_common::crypto::Ed25519CryptoService;
        use pod_config::PeersConfig;
        use pod_store::{MemoryStore, MemoryWatermarkStore};

        let ctx = Arc::new(SyncContext {
            store: Arc::new(MemoryStore::new()),
            crypto: Arc::new(Ed25519CryptoService),
            watermarks: Arc::new(MemoryWatermarkStore::new()),
            events: UserEventBus::default(),
            time_window: TimeWindow {
                max_past_secs: 3600,
                max_future_secs: 600,
            },
            page_size: 10,
        });
        let mut config = SyncConfig::default();
        config.run_at_startup = false;

        let scheduler = SyncScheduler::new(
            Arc::new(SyncActionRegistry::new()),
            Arc::new(StaticPeerRegistry::new(vec![])),
            crate::peers::PeerSelector::new("g1", &PeersConfig::default()),
            Arc::new(StoreRemoteSource::new(Arc::new(MemoryStore::new()))),
            ctx,
            Arc::new(AlwaysReady),
            config,
        );

        let (tx, rx) = watch::channel(false);
        drop(tx);

        // Must terminate instead of spinning on the closed channel.
        tokio::time::timeout(std::time::Duration::from_secs(5), scheduler.run(rx))
            .await
            .expect("scheduler did not shut down after the sender went away");
    }
}
