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

use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{CoordinatorError, Result};
use crate::fetcher::ProbeOutcome;
use crate::ledger::LoadLedger;
use crate::registry::{ProxyRegistry, ProxyStat};
use crate::selector;

const PERSIST_FILE: &str = "proxystats.dat";
const PROBE_RETRY_AFTER_MS: i64 = 31_000;

// the registry, ledger and lease counter have one logical owner. the
// struct itself is not safe for unsynchronized concurrent access; the
// mutex wrapper is what lets concurrent tokio tasks (handler dispatch,
// the prober, persistence, the admin responder) serialize onto it.
struct State {
    registry: ProxyRegistry,
    ledger: LoadLedger,
}

pub struct Coordinator {
    state: Mutex<State>,
    persist_dir: PathBuf,
}

impl Coordinator {
    pub fn new(persist_dir: PathBuf) -> Self {
        Coordinator {
            state: Mutex::new(State {
                registry: ProxyRegistry::new(),
                ledger: LoadLedger::new(),
            }),
            persist_dir,
        }
    }

    // loads persisted registry stats (best-effort) then parses the
    // initial proxy list text on top of them.
    pub async fn bootstrap(&self, proxy_list_text: &str) -> Result<()> {
        let loaded = ProxyRegistry::load(&self.persist_dir, PERSIST_FILE);
        let mut state = self.state.lock().await;
        state.registry = loaded;
        state.registry.rebuild(proxy_list_text)?;
        Ok(())
    }

    // hot-reload entry point: a parse error leaves the registry
    // byte-identical and is surfaced to the caller.
    pub async fn reconfigure(&self, proxy_list_text: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.registry.rebuild(proxy_list_text) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(%err, "proxy list rebuild rejected, keeping previous registry");
                Err(err)
            }
        }
    }

    pub async fn lease(
        &self,
        target_ip: u32,
        worker_host_id: u32,
        now_ms: i64,
    ) -> Result<(u32, u16, u32)> {
        let mut state = self.state.lock().await;
        if state.registry.is_empty() {
            warn!("lease request reached a coordinator with no configured proxies");
            return Err(CoordinatorError::NoProxies);
        }
        let State { registry, ledger } = &mut *state;
        let (proxy_ip, proxy_port) =
            selector::select(registry, ledger, target_ip, now_ms).ok_or(CoordinatorError::NoProxies)?;
        let bucket = ledger.grant(target_ip, worker_host_id, proxy_ip, proxy_port, now_ms);
        ledger.gc(now_ms);
        info!(target_ip, proxy_ip, proxy_port, lease_id = bucket.lease_id, "lease granted");
        Ok((proxy_ip, proxy_port, bucket.lease_id))
    }

    pub async fn release(
        &self,
        target_ip: u32,
        proxy_ip: u32,
        proxy_port: u16,
        lease_id: u32,
        now_ms: i64,
    ) -> bool {
        let mut state = self.state.lock().await;
        let applied = state
            .ledger
            .complete(target_ip, proxy_ip, proxy_port, lease_id, now_ms);
        if applied {
            info!(target_ip, proxy_ip, proxy_port, lease_id, "lease released");
        }
        applied
    }

    // optional hook: see the "lease leakage on worker death" design note.
    pub async fn complete_all_for_host(&self, worker_host_id: u32, now_ms: i64) {
        let mut state = self.state.lock().await;
        state.ledger.complete_all_for_host(worker_host_id, now_ms);
    }

    pub async fn snapshot(&self) -> Vec<(u32, u16, ProxyStat)> {
        let state = self.state.lock().await;
        let mut out = Vec::with_capacity(state.registry.len());
        state.registry.for_each(|ip, port, stat| out.push((ip, port, *stat)));
        out
    }

    // marks candidates as in-flight and stamps their attempt time; the
    // caller then awaits the fetch outside the lock.
    pub async fn probe_candidates(&self, now_ms: i64) -> Vec<(u32, u16)> {
        let mut state = self.state.lock().await;
        let mut candidates = Vec::new();
        state.registry.for_each_mut(|ip, port, stat| {
            if stat.probe_in_flight {
                return;
            }
            if now_ms - stat.last_attempt_ms < PROBE_RETRY_AFTER_MS {
                return;
            }
            stat.probe_in_flight = true;
            stat.last_attempt_ms = now_ms;
            candidates.push((ip, port));
        });
        candidates
    }

    pub async fn record_probe_result(&self, ip: u32, port: u16, started_ms: i64, now_ms: i64, outcome: ProbeOutcome) {
        let mut state = self.state.lock().await;
        let Some(stat) = state.registry.lookup_mut(ip, port) else {
            return;
        };
        stat.probe_in_flight = false;
        stat.last_error = outcome.error_code;
        if outcome.ok {
            stat.last_duration_ms = now_ms - started_ms;
            stat.last_success_ms = now_ms;
        } else {
            stat.last_duration_ms = -1;
        }
    }

    pub async fn persist(&self) -> std::io::Result<()> {
        let state = self.state.lock().await;
        state.registry.save(&self.persist_dir, PERSIST_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lease_then_release_round_trip() {
        let coordinator = Coordinator::new(std::env::temp_dir());
        coordinator.bootstrap("1.1.1.1 2.2.2.2").await.unwrap();

        let (ip, port, lease_id) = coordinator.lease(100, 1, 0).await.unwrap();
        assert!(coordinator.release(100, ip, port, lease_id, 10).await);
        assert!(!coordinator.release(100, ip, port, lease_id, 20).await);
    }

    #[tokio::test]
    async fn empty_registry_yields_no_proxies_error() {
        let coordinator = Coordinator::new(std::env::temp_dir());
        let err = coordinator.lease(1, 1, 0).await.unwrap_err();
        assert_eq!(err, CoordinatorError::NoProxies);
    }

    #[tokio::test]
    async fn reconfigure_rejects_bad_token_without_mutating_state() {
        let coordinator = Coordinator::new(std::env::temp_dir());
        coordinator.bootstrap("1.1.1.1").await.unwrap();
        assert!(coordinator.reconfigure("1.1.1").await.is_err());
        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.len(), 1);
    }
}
