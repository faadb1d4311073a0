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

use tracing::{info_span, Instrument};

use crate::clock::now_ms;
use crate::coordinator::Coordinator;
use crate::fetcher::ProbeFetcher;
use crate::membership::Membership;
use crate::shutdown::ShutdownWatch;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

// periodic test-url fetch through every configured proxy, gated by
// leadership. implemented as a background service driven by a 1s
// interval and a shutdown watch, grounded in the teacher's
// DiscoveryBackgroundService tick/shutdown select loop.
pub struct HealthProber {
    coordinator: Arc<Coordinator>,
    membership: Arc<dyn Membership>,
    fetcher: Arc<dyn ProbeFetcher>,
    test_url: RwLock<String>,
}

impl HealthProber {
    pub fn new(
        coordinator: Arc<Coordinator>,
        membership: Arc<dyn Membership>,
        fetcher: Arc<dyn ProbeFetcher>,
        test_url: String,
    ) -> Self {
        HealthProber {
            coordinator,
            membership,
            fetcher,
            test_url: RwLock::new(test_url),
        }
    }

    pub fn set_test_url(&self, test_url: String) {
        *self.test_url.write().unwrap() = test_url;
    }

    async fn tick(&self) {
        if !self.membership.is_leader() {
            return;
        }
        let test_url = self.test_url.read().unwrap().clone();
        if test_url.is_empty() {
            return;
        }

        let started_ms = now_ms();
        let candidates = self.coordinator.probe_candidates(started_ms).await;
        for (ip, port) in candidates {
            let fetcher = Arc::clone(&self.fetcher);
            let coordinator = Arc::clone(&self.coordinator);
            let test_url = test_url.clone();
            tokio::spawn(
                async move {
                    let outcome = fetcher.fetch_through(ip, port, &test_url, PROBE_TIMEOUT).await;
                    let finished_ms = now_ms();
                    coordinator
                        .record_probe_result(ip, port, started_ms, finished_ms, outcome)
                        .await;
                }
                .instrument(info_span!("probe", proxy_ip = ip, proxy_port = port)),
            );
        }
    }

    pub async fn run(&self, mut shutdown: ShutdownWatch) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::ProbeOutcome;
    use crate::membership::StaticMembership;
    use async_trait::async_trait;

    struct AlwaysOk;

    #[async_trait]
    impl ProbeFetcher for AlwaysOk {
        async fn fetch_through(&self, _ip: u32, _port: u16, _url: &str, _timeout: Duration) -> ProbeOutcome {
            ProbeOutcome::success()
        }
    }

    #[tokio::test]
    async fn no_op_prober_does_not_mark_any_proxy_in_flight() {
        let coordinator = Arc::new(Coordinator::new(std::env::temp_dir()));
        coordinator.bootstrap("1.1.1.1").await.unwrap();
        let membership: Arc<dyn Membership> = Arc::new(StaticMembership::single_node());
        let prober = HealthProber::new(coordinator.clone(), membership, Arc::new(AlwaysOk), String::new());

        prober.tick().await;

        let snapshot = coordinator.snapshot().await;
        assert!(!snapshot[0].2.probe_in_flight);
    }

    #[tokio::test]
    async fn non_leader_never_probes() {
        let coordinator = Arc::new(Coordinator::new(std::env::temp_dir()));
        coordinator.bootstrap("1.1.1.1").await.unwrap();
        let membership: Arc<dyn Membership> = Arc::new(StaticMembership::new(
            1,
            vec![
                crate::membership::PeerStatus { address: "a".into(), alive: true },
                crate::membership::PeerStatus { address: "b".into(), alive: true },
            ],
        ));
        let prober = HealthProber::new(
            coordinator.clone(),
            membership,
            Arc::new(AlwaysOk),
            "http://example.test".to_string(),
        );

        prober.tick().await;

        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot[0].2.last_attempt_ms, 0);
    }
}
