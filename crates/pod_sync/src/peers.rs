//! Peer descriptors and sync-source selection

use pod_config::PeersConfig;
use serde::{Deserialize, Serialize};

/// Kinds of endpoint a peer may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiKind {
    /// Paged document search (the pull protocol this core consumes)
    DocumentSearch,
    /// Peer descriptor exchange
    PeerExchange,
    /// Change-notification subscriptions
    Subscription,
}

/// A known remote pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    #[serde(default)]
    pub pubkey: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    pub currency: String,
    #[serde(default)]
    pub api_capabilities: Vec<ApiKind>,
}

impl PeerDescriptor {
    /// Stable identifier used for watermark keys and single-flight guards.
    pub fn id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn endpoint_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn supports(&self, api: ApiKind) -> bool {
        self.api_capabilities.contains(&api)
    }
}

/// Source of currently-known peers (discovery cache, config, ...).
pub trait PeerRegistry: Send + Sync {
    fn known_peers(&self) -> Vec<PeerDescriptor>;
}

/// Fixed peer list, used for configured pods and tests.
pub struct StaticPeerRegistry {
    peers: Vec<PeerDescriptor>,
}

impl StaticPeerRegistry {
    pub fn new(peers: Vec<PeerDescriptor>) -> Self {
        Self { peers }
    }
}

impl PeerRegistry for StaticPeerRegistry {
    fn known_peers(&self) -> Vec<PeerDescriptor> {
        self.peers.clone()
    }
}

/// Filters the known peer set down to eligible sync sources.
#[derive(Debug, Clone)]
pub struct PeerSelector {
    currency: String,
    include_endpoints: Vec<String>,
    default_endpoints: Vec<String>,
}

impl PeerSelector {
    pub fn new(currency: &str, peers: &PeersConfig) -> Self {
        Self {
            currency: currency.to_string(),
            include_endpoints: peers.include_endpoints.clone(),
            default_endpoints: peers.default_endpoints.clone(),
        }
    }

    /// Eligible peers for an action requiring `api`: matching currency,
    /// advertising the capability, and on the include-list when one is set.
    /// When nothing matches, configured include endpoints are used directly
    /// as sync sources, then the default endpoints.
    pub fn select(&self, registry: &dyn PeerRegistry, api: ApiKind) -> Vec<PeerDescriptor> {
        let selected: Vec<PeerDescriptor> = registry
            .known_peers()
            .into_iter()
            .filter(|peer| peer.currency == self.currency)
            .filter(|peer| peer.supports(api))
            .filter(|peer| {
                self.include_endpoints.is_empty() || self.include_endpoints.contains(&peer.id())
            })
            .collect();

        if selected.is_empty() {
            let fallback = if self.include_endpoints.is_empty() {
                &self.default_endpoints
            } else {
                &self.include_endpoints
            };
            if !fallback.is_empty() {
                tracing::debug!(
                    "no eligible peer found, falling back to {} configured endpoint(s)",
                    fallback.len()
                );
                return fallback
                    .iter()
                    .filter_map(|endpoint| self.descriptor_from_endpoint(endpoint, api))
                    .collect();
            }
        }

        selected
    }

    fn descriptor_from_endpoint(&self, endpoint: &str, api: ApiKind) -> Option<PeerDescriptor> {
        let (host, port) = endpoint.rsplit_once(':')?;
        let port: u16 = port.parse().ok()?;
        Some(PeerDescriptor {
            pubkey: String::new(),
            host: host.to_string(),
            port,
            tls: false,
            currency: self.currency.clone(),
            api_capabilities: vec![api],
        })
    }
}
