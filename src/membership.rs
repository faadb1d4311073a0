/**
 * Copyright (c) 2024-2025 ArcX, Inc.
 *
 * This file is part of ArcX Gateway
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use std::sync::{Arc, RwLock};
use std::time::Duration;

use rs_consul::{Config, Consul, GetServiceNodesRequest, ResponseMeta};
use tracing::{info, warn};

use crate::shutdown::ShutdownWatch;

#[derive(Debug, Clone, PartialEq)]
pub struct PeerStatus {
    pub address: String,
    pub alive: bool,
}

// cluster liveness and leader election, modeled at the seam the same way
// the teacher models its upstream backends behind a trait.
pub trait Membership: Send + Sync {
    fn peers(&self) -> Vec<PeerStatus>;
    // None means this node cannot currently locate itself in the peer
    // list (e.g. a Consul self-lookup miss); it must never be treated
    // as index 0, or every node with an unresolved self_index would
    // concurrently believe it is the leader.
    fn self_index(&self) -> Option<usize>;

    // the lowest-indexed live peer is the leader.
    fn elected_leader(&self) -> Option<usize> {
        self.peers().iter().position(|p| p.alive)
    }

    fn is_leader(&self) -> bool {
        match self.self_index() {
            Some(idx) => self.elected_leader() == Some(idx),
            None => false,
        }
    }
}

// fixed peer list, used in tests and single-node deployments.
pub struct StaticMembership {
    self_index: usize,
    peers: Vec<PeerStatus>,
}

impl StaticMembership {
    pub fn new(self_index: usize, peers: Vec<PeerStatus>) -> Self {
        StaticMembership { self_index, peers }
    }

    pub fn single_node() -> Self {
        StaticMembership::new(
            0,
            vec![PeerStatus {
                address: "127.0.0.1".to_string(),
                alive: true,
            }],
        )
    }
}

impl Membership for StaticMembership {
    fn peers(&self) -> Vec<PeerStatus> {
        self.peers.clone()
    }

    fn self_index(&self) -> Option<usize> {
        Some(self.self_index)
    }
}

// polls Hashicorp Consul's service catalog for peer liveness, generalized
// from the teacher's ConsulServiceDiscovery/DiscoveryBackgroundService
// pair ("discover load-balancer backends") to "discover coordinator peers
// and derive a leader ordering" by sorted address.
pub struct ConsulMembership {
    // must be this node's routable advertise address in the exact
    // "{node.service.address}:{node.service.port}" shape Consul reports
    // in refresh(); a bind address like "0.0.0.0:6189" will never match
    // and self_index() would incorrectly report None forever.
    self_address: String,
    cache: Arc<RwLock<Vec<PeerStatus>>>,
}

impl ConsulMembership {
    pub fn new(consul_address: String, token: Option<String>, service_name: String, self_address: String) -> (Self, ConsulMembershipUpdater) {
        let mut config = Config::default();
        config.address = consul_address;
        config.token = token;
        let consul = Arc::new(Consul::new(config));
        let cache = Arc::new(RwLock::new(Vec::new()));
        let updater = ConsulMembershipUpdater {
            consul,
            service_name,
            cache: Arc::clone(&cache),
        };
        (
            ConsulMembership {
                self_address,
                cache,
            },
            updater,
        )
    }
}

impl Membership for ConsulMembership {
    fn peers(&self) -> Vec<PeerStatus> {
        self.cache.read().unwrap().clone()
    }

    fn self_index(&self) -> Option<usize> {
        self.peers().iter().position(|p| p.address == self.self_address)
    }
}

// background poller that refreshes the peer cache every 10s, mirroring
// the teacher's DiscoveryBackgroundService tick/shutdown select loop.
pub struct ConsulMembershipUpdater {
    consul: Arc<Consul>,
    service_name: String,
    cache: Arc<RwLock<Vec<PeerStatus>>>,
}

impl ConsulMembershipUpdater {
    async fn refresh(&self) {
        let request = GetServiceNodesRequest {
            service: &self.service_name,
            passing: true,
            ..Default::default()
        };
        match self.consul.get_service_nodes(request, None).await {
            Ok(ResponseMeta { response, .. }) => {
                let mut peers: Vec<PeerStatus> = response
                    .iter()
                    .map(|node| PeerStatus {
                        address: format!("{}:{}", node.service.address, node.service.port),
                        alive: true,
                    })
                    .collect();
                peers.sort_by(|a, b| a.address.cmp(&b.address));
                *self.cache.write().unwrap() = peers;
            }
            Err(err) => {
                warn!(error = %err, "consul membership poll failed, keeping last known peer set");
            }
        }
    }

    pub async fn run(&self, mut shutdown: ShutdownWatch) {
        let interval = Duration::from_secs(10);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.refresh().await;
                }
                _ = shutdown.changed() => {
                    info!("consul membership updater shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_indexed_live_peer_is_leader() {
        let membership = StaticMembership::new(
            1,
            vec![
                PeerStatus { address: "a".into(), alive: false },
                PeerStatus { address: "b".into(), alive: true },
                PeerStatus { address: "c".into(), alive: true },
            ],
        );
        assert_eq!(membership.elected_leader(), Some(1));
        assert!(membership.is_leader());
    }

    #[test]
    fn non_leader_reports_false() {
        let membership = StaticMembership::new(
            2,
            vec![
                PeerStatus { address: "a".into(), alive: true },
                PeerStatus { address: "b".into(), alive: true },
            ],
        );
        assert!(!membership.is_leader());
    }

    #[test]
    fn unresolved_self_index_never_claims_leadership() {
        // a ConsulMembership whose self_address never matches any
        // discovered peer must not fall back to index 0 and silently
        // become leader everywhere.
        let (membership, _updater) = ConsulMembership::new(
            "http://consul.invalid:8500".to_string(),
            None,
            "spider-coordinator".to_string(),
            "10.0.0.9:6189".to_string(),
        );
        assert_eq!(membership.self_index(), None);
        assert!(!membership.is_leader());
    }
}
