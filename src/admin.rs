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

use std::net::Ipv4Addr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::Router;

use crate::clock::now_ms;
use crate::coordinator::Coordinator;
use crate::membership::Membership;

#[derive(Clone)]
pub struct AdminState {
    pub coordinator: Arc<Coordinator>,
    pub membership: Arc<dyn Membership>,
    // every peer's admin port; peer hosts are read live from
    // membership.peers() so this works under both StaticMembership and
    // ConsulMembership, whose peer lists have independent, possibly
    // differently-ordered address spaces.
    pub admin_port: u16,
}

// extracts the port this node's own admin listener bound to, so it can
// be applied to a peer's RPC host to guess that peer's admin URL.
pub fn port_of(bind_address: &str) -> u16 {
    bind_address
        .rsplit_once(':')
        .and_then(|(_, port)| port.parse().ok())
        .unwrap_or(8080)
}

fn peer_admin_url(peer_address: &str, admin_port: u16) -> String {
    let host = peer_address.rsplit_once(':').map(|(host, _)| host).unwrap_or(peer_address);
    format!("http://{host}:{admin_port}/admin/proxies")
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/proxies", get(proxies_table))
        .with_state(state)
}

async fn proxies_table(State(state): State<AdminState>) -> Html<String> {
    if !state.membership.is_leader() {
        // a single peers() snapshot for both the leader lookup and the
        // index; two independent snapshots could observe a Consul
        // refresh landing in between and index a stale or reordered list.
        let peers = state.membership.peers();
        let leader_url = peers
            .iter()
            .position(|p| p.alive)
            .and_then(|idx| peers.get(idx))
            .map(|peer| peer_admin_url(&peer.address, state.admin_port))
            .unwrap_or_else(|| "(no leader elected)".to_string());
        return Html(format!(
            "<html><body>this node is not the leader, see <a href=\"{leader_url}\">{leader_url}</a></body></html>"
        ));
    }

    let now = now_ms();
    let snapshot = state.coordinator.snapshot().await;

    let mut rows = String::new();
    for (ip, port, stat) in snapshot {
        let since_success = age_or_none(stat.last_success_ms, now);
        let since_attempt = age_or_none(stat.last_attempt_ms, now);
        let duration = if stat.last_attempt_ms <= 0 {
            "unknown".to_string()
        } else if stat.last_duration_ms == -1 {
            "FAILED".to_string()
        } else {
            format!("{}ms", stat.last_duration_ms)
        };
        let style = if stat.last_error != 0 { " style=\"background:#fdd\"" } else { "" };
        rows.push_str(&format!(
            "<tr{style}><td>{}</td><td>{port}</td><td>{since_success}</td><td>{since_attempt}</td><td>{duration}</td></tr>",
            Ipv4Addr::from(ip),
        ));
    }

    Html(format!(
        "<html><body><table border=\"1\"><tr><td><b>ip</b></td><td><b>port</b></td>\
         <td><b>last successful probe</b></td><td><b>last attempt</b></td><td><b>last duration</b></td></tr>\
         {rows}</table></body></html>"
    ))
}

fn age_or_none(stamp_ms: i64, now_ms: i64) -> String {
    if stamp_ms <= 0 {
        "none".to_string()
    } else {
        format!("{}ms ago", (now_ms - stamp_ms).max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::StaticMembership;

    #[tokio::test]
    async fn non_leader_renders_a_link_to_the_leader() {
        let coordinator = Arc::new(Coordinator::new(std::env::temp_dir()));
        coordinator.bootstrap("1.1.1.1").await.unwrap();
        let membership: Arc<dyn Membership> = Arc::new(StaticMembership::new(
            1,
            vec![
                crate::membership::PeerStatus { address: "a".into(), alive: true },
                crate::membership::PeerStatus { address: "b".into(), alive: true },
            ],
        ));
        let state = AdminState {
            coordinator,
            membership,
            admin_port: 8080,
        };

        let Html(body) = proxies_table(State(state)).await;
        assert!(body.contains("http://a:8080/admin/proxies"));
    }

    #[tokio::test]
    async fn leader_renders_proxy_table() {
        let coordinator = Arc::new(Coordinator::new(std::env::temp_dir()));
        coordinator.bootstrap("1.1.1.1").await.unwrap();
        let membership: Arc<dyn Membership> = Arc::new(StaticMembership::single_node());
        let state = AdminState {
            coordinator,
            membership,
            admin_port: 8080,
        };

        let Html(body) = proxies_table(State(state)).await;
        assert!(body.contains("1.1.1.1"));
        assert!(body.contains("unknown"));
    }

    #[test]
    fn peer_admin_url_strips_rpc_port_and_applies_admin_port() {
        assert_eq!(peer_admin_url("10.0.0.5:6189", 8080), "http://10.0.0.5:8080/admin/proxies");
        assert_eq!(peer_admin_url("10.0.0.5", 8080), "http://10.0.0.5:8080/admin/proxies");
    }
}
