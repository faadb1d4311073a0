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

// one download request ever granted, retained until 10 minutes after
// completion. endMs == 0 means still outstanding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadBucket {
    pub target_ip: u32,
    pub start_ms: i64,
    pub end_ms: i64,
    pub worker_host_id: u32,
    pub proxy_ip: u32,
    pub proxy_port: u16,
    pub lease_id: u32,
}

const GC_THRESHOLD_MS: i64 = 10 * 60 * 1000;

// multimap from target ip to outstanding/recent leases
pub struct LoadLedger {
    leases: Vec<LoadBucket>,
    next_lease_id: u32,
}

impl LoadLedger {
    pub fn new() -> Self {
        LoadLedger {
            leases: Vec::new(),
            next_lease_id: 0,
        }
    }

    // allocates a lease id and records the lease; does not GC.
    pub fn grant(
        &mut self,
        target_ip: u32,
        worker_host_id: u32,
        proxy_ip: u32,
        proxy_port: u16,
        start_ms: i64,
    ) -> LoadBucket {
        let lease_id = self.next_lease_id;
        self.next_lease_id += 1;
        let bucket = LoadBucket {
            target_ip,
            start_ms,
            end_ms: 0,
            worker_host_id,
            proxy_ip,
            proxy_port,
            lease_id,
        };
        self.leases.push(bucket);
        bucket
    }

    pub fn for_each_lease_by_target(&self, target_ip: u32, mut visitor: impl FnMut(&LoadBucket)) {
        for lease in &self.leases {
            if lease.target_ip == target_ip {
                visitor(lease);
            }
        }
    }

    // idempotent: stamps the matching outstanding lease's end time, or
    // does nothing if it is already completed or does not exist.
    pub fn complete(
        &mut self,
        target_ip: u32,
        proxy_ip: u32,
        proxy_port: u16,
        lease_id: u32,
        now_ms: i64,
    ) -> bool {
        for lease in &mut self.leases {
            if lease.target_ip == target_ip
                && lease.proxy_ip == proxy_ip
                && lease.proxy_port == proxy_port
                && lease.lease_id == lease_id
                && lease.end_ms == 0
            {
                lease.end_ms = now_ms;
                return true;
            }
        }
        false
    }

    // marks every outstanding lease held by a host as complete; used by
    // the optional membership-death hook, never by the rpc handlers.
    pub fn complete_all_for_host(&mut self, worker_host_id: u32, now_ms: i64) {
        for lease in &mut self.leases {
            if lease.worker_host_id == worker_host_id && lease.end_ms == 0 {
                lease.end_ms = now_ms;
            }
        }
    }

    // mark-and-sweep: drop every completed lease at least 10 minutes old.
    pub fn gc(&mut self, now_ms: i64) {
        self.leases
            .retain(|lease| !(lease.end_ms != 0 && now_ms - lease.end_ms >= GC_THRESHOLD_MS));
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_ids_strictly_increase() {
        let mut ledger = LoadLedger::new();
        let a = ledger.grant(1, 1, 10, 80, 0);
        let b = ledger.grant(1, 1, 10, 80, 0);
        assert!(b.lease_id > a.lease_id);
    }

    #[test]
    fn release_is_idempotent() {
        let mut ledger = LoadLedger::new();
        let lease = ledger.grant(100, 1, 10, 80, 0);
        assert!(ledger.complete(100, 10, 80, lease.lease_id, 1000));
        assert!(!ledger.complete(100, 10, 80, lease.lease_id, 2000));

        let mut end_ms = None;
        ledger.for_each_lease_by_target(100, |l| end_ms = Some(l.end_ms));
        assert_eq!(end_ms, Some(1000));
    }

    #[test]
    fn gc_respects_strict_boundary() {
        // endMs == 0 means "still outstanding" per the ledger invariant,
        // so both fixtures here complete at endMs = 1 and vary `now`.
        let mut ledger = LoadLedger::new();
        let a = ledger.grant(1, 1, 10, 80, 0);
        ledger.complete(1, 10, 80, a.lease_id, 1);

        ledger.gc(600_001);
        let mut remaining = 0;
        ledger.for_each_lease_by_target(1, |_| remaining += 1);
        assert_eq!(remaining, 0);

        let mut ledger = LoadLedger::new();
        let b = ledger.grant(1, 1, 10, 80, 0);
        ledger.complete(1, 10, 80, b.lease_id, 1);

        ledger.gc(600_000);
        let mut remaining = 0;
        ledger.for_each_lease_by_target(1, |_| remaining += 1);
        assert_eq!(remaining, 1);
    }
}
