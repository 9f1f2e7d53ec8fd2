//! Turns stored cluster objects into peer addresses.
//!
//! The builder is a pure function of the store snapshot it is given, so
//! running it twice over the same snapshot yields the same list.  The
//! result is sorted before it is handed out, which keeps the cache ring
//! input stable regardless of store iteration order.

use std::net::Ipv6Addr;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Endpoints, Pod};

use crate::config::{Mechanism, PoolConfig};
use crate::logging::Logger;
use crate::types::ClusterObject;

/// Formats `scheme://address:port`, bracketing IPv6 literals.
pub fn format_peer(scheme: &str, address: &str, port: u16) -> String {
    if address.parse::<Ipv6Addr>().is_ok() {
        format!("{}://[{}]:{}", scheme, address, port)
    } else {
        format!("{}://{}:{}", scheme, address, port)
    }
}

/// A pod qualifies as a peer only when every one of its containers is both
/// ready and running.  A pod reporting no container statuses qualifies.
pub fn pod_is_ready(pod: &Pod) -> bool {
    let statuses = pod
        .status
        .as_ref()
        .and_then(|status| status.container_statuses.as_deref())
        .unwrap_or_default();
    statuses.iter().all(|status| {
        let running = status
            .state
            .as_ref()
            .is_some_and(|state| state.running.is_some());
        status.ready && running
    })
}

pub struct PeerListBuilder {
    mechanism: Mechanism,
    scheme: String,
    port: u16,
    logger: Arc<dyn Logger>,
}

impl PeerListBuilder {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            mechanism: config.mechanism,
            scheme: config.peer_scheme.clone(),
            port: config.peer_port,
            logger: Arc::clone(&config.logger),
        }
    }

    pub fn build(&self, objects: &[ClusterObject]) -> Vec<String> {
        let mut peers = Vec::new();
        match self.mechanism {
            Mechanism::Pods => self.logger.debug(format_args!("Fetching peer list from pods")),
            Mechanism::Endpoints => self
                .logger
                .debug(format_args!("Fetching peer list from endpoints")),
        }

        for object in objects {
            match (self.mechanism, object) {
                (Mechanism::Pods, ClusterObject::Pod(pod)) => self.collect_pod(pod, &mut peers),
                (Mechanism::Endpoints, ClusterObject::Endpoints(endpoints)) => {
                    self.collect_endpoints(endpoints, &mut peers)
                }
                (mechanism, other) => {
                    self.logger.error(format_args!(
                        "expected {} object got {} instead, skipping",
                        mechanism,
                        other.kind()
                    ));
                }
            }
        }

        peers.sort();
        peers
    }

    /// Pods without an assigned IP are skipped before readiness is checked,
    /// so a fresh pod with no container statuses yet is not a peer.
    fn collect_pod(&self, pod: &Pod, peers: &mut Vec<String>) {
        let ip = match pod.status.as_ref().and_then(|s| s.pod_ip.as_deref()) {
            Some(ip) if !ip.is_empty() => ip,
            _ => {
                self.logger.debug(format_args!(
                    "Skipping pod {:?} because it has no address yet",
                    pod.metadata.name
                ));
                return;
            }
        };

        let peer = format_peer(&self.scheme, ip, self.port);
        if !pod_is_ready(pod) {
            self.logger.debug(format_args!(
                "Skipping peer because it's not ready or not running: {}",
                peer
            ));
            return;
        }

        self.logger.debug(format_args!("Peer: {}", peer));
        peers.push(peer);
    }

    fn collect_endpoints(&self, endpoints: &Endpoints, peers: &mut Vec<String>) {
        for subset in endpoints.subsets.iter().flatten() {
            for address in subset.addresses.iter().flatten() {
                let peer = format_peer(&self.scheme, &address.ip, self.port);
                self.logger.debug(format_args!("Peer: {}", peer));
                peers.push(peer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::testing::RecordingLogger;
    use crate::logging::NoopLogger;
    use crate::types::fixtures::{container, endpoints, pod};

    fn builder(mechanism: Mechanism, scheme: &str, port: u16) -> PeerListBuilder {
        let config = PoolConfig::new(|_| {})
            .mechanism(mechanism)
            .peer_scheme(scheme)
            .peer_port(port)
            .logger(Arc::new(NoopLogger));
        PeerListBuilder::new(&config)
    }

    #[test]
    fn formats_ipv4_and_ipv6() {
        assert_eq!(format_peer("http", "10.0.0.1", 8080), "http://10.0.0.1:8080");
        assert_eq!(format_peer("http", "fd00::1", 8080), "http://[fd00::1]:8080");
    }

    #[test]
    fn endpoint_subset_address() {
        let b = builder(Mechanism::Endpoints, "http", 9090);
        let peers = b.build(&[endpoints("cache", &[&["10.0.0.1"]])]);
        assert_eq!(peers, vec!["http://10.0.0.1:9090"]);
    }

    #[test]
    fn every_endpoint_address_is_a_peer() {
        let b = builder(Mechanism::Endpoints, "http", 8080);
        let peers = b.build(&[
            endpoints("a", &[&["10.0.0.3", "10.0.0.1"], &["10.0.1.1"]]),
            endpoints("b", &[&[], &["10.0.2.1"]]),
        ]);
        assert_eq!(
            peers,
            vec![
                "http://10.0.0.1:8080",
                "http://10.0.0.3:8080",
                "http://10.0.1.1:8080",
                "http://10.0.2.1:8080",
            ]
        );
    }

    #[test]
    fn repeated_endpoint_addresses_are_kept() {
        let b = builder(Mechanism::Endpoints, "http", 8080);
        let peers = b.build(&[
            endpoints("a", &[&["10.0.0.1"], &["10.0.0.1"]]),
            endpoints("b", &[&["10.0.0.1"]]),
        ]);
        assert_eq!(peers, vec!["http://10.0.0.1:8080"; 3]);
    }

    #[test]
    fn ready_pod_is_a_peer() {
        let b = builder(Mechanism::Pods, "https", 443);
        let peers = b.build(&[pod("web-0", "10.0.0.2", vec![container(true, true)])]);
        assert_eq!(peers, vec!["https://10.0.0.2:443"]);
    }

    #[test]
    fn one_unready_container_excludes_the_pod() {
        let b = builder(Mechanism::Pods, "https", 443);
        assert!(b
            .build(&[pod("web-0", "10.0.0.2", vec![container(false, true)])])
            .is_empty());
        assert!(b
            .build(&[pod(
                "web-0",
                "10.0.0.2",
                vec![container(true, true), container(true, false)]
            )])
            .is_empty());
    }

    #[test]
    fn pod_without_container_statuses_is_included() {
        let b = builder(Mechanism::Pods, "http", 8080);
        let peers = b.build(&[pod("web-0", "10.0.0.4", vec![])]);
        assert_eq!(peers, vec!["http://10.0.0.4:8080"]);
    }

    #[test]
    fn pod_without_address_is_skipped() {
        let b = builder(Mechanism::Pods, "http", 8080);
        assert!(b.build(&[pod("web-0", "", vec![])]).is_empty());
    }

    #[test]
    fn build_is_idempotent() {
        let b = builder(Mechanism::Pods, "http", 8080);
        let store = vec![
            pod("web-1", "10.0.0.9", vec![container(true, true)]),
            pod("web-0", "10.0.0.8", vec![container(true, true)]),
        ];
        assert_eq!(b.build(&store), b.build(&store));
    }

    #[test]
    fn wrong_kind_is_skipped_and_logged() {
        let logger = Arc::new(RecordingLogger::default());
        let config = PoolConfig::new(|_| {})
            .mechanism(Mechanism::Pods)
            .logger(logger.clone());
        let b = PeerListBuilder::new(&config);

        let peers = b.build(&[
            endpoints("cache", &[&["10.0.0.1"]]),
            pod("web-0", "10.0.0.2", vec![container(true, true)]),
        ]);

        assert_eq!(peers, vec!["http://10.0.0.2:8080"]);
        assert_eq!(
            logger.errors(),
            vec!["expected pods object got Endpoints instead, skipping"]
        );
    }
}
