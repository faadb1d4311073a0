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

use crate::ledger::LoadLedger;
use crate::registry::ProxyRegistry;

// picks the best proxy for a target ip: fewest outstanding leases for
// that ip, then oldest last-use, preferring healthy proxies. falls back
// to every proxy if none are healthy. returns None only if the registry
// is empty.
pub fn select(
    registry: &mut ProxyRegistry,
    ledger: &LoadLedger,
    target_ip: u32,
    _now_ms: i64,
) -> Option<(u32, u16)> {
    if registry.is_empty() {
        return None;
    }

    registry.for_each_mut(|_, _, stat| {
        stat.count_for_this_ip = 0;
        stat.last_used_for_this_ip_ms = 0;
    });

    ledger.for_each_lease_by_target(target_ip, |lease| {
        let Some(stat) = registry.lookup_mut(lease.proxy_ip, lease.proxy_port) else {
            // lease references a proxy no longer in the registry; ignored.
            return;
        };
        if lease.end_ms == 0 {
            stat.count_for_this_ip += 1;
        } else if lease.end_ms > stat.last_used_for_this_ip_ms {
            stat.last_used_for_this_ip_ms = lease.end_ms;
        }
    });

    select_best(registry, false).or_else(|| select_best(registry, true))
}

fn select_best(registry: &ProxyRegistry, allow_dead: bool) -> Option<(u32, u16)> {
    let mut best: Option<(u32, u16, u32, i64)> = None;
    registry.for_each(|ip, port, stat| {
        if !allow_dead && stat.last_error != 0 {
            return;
        }
        let better = match best {
            None => true,
            Some((_, _, count, last_used)) => {
                stat.count_for_this_ip < count
                    || (stat.count_for_this_ip == count && stat.last_used_for_this_ip_ms < last_used)
            }
        };
        if better {
            best = Some((ip, port, stat.count_for_this_ip, stat.last_used_for_this_ip_ms));
        }
    });
    best.map(|(ip, port, _, _)| (ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(tokens: &str) -> ProxyRegistry {
        let mut reg = ProxyRegistry::new();
        reg.rebuild(tokens).unwrap();
        reg
    }

    #[test]
    fn spreads_sequential_leases_across_distinct_proxies() {
        let mut reg = registry_with("1.1.1.1 2.2.2.2");
        let mut ledger = LoadLedger::new();

        let first = select(&mut reg, &ledger, 100, 0).unwrap();
        ledger.grant(100, 1, first.0, first.1, 0);

        let second = select(&mut reg, &ledger, 100, 0).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn release_then_reuse_prefers_oldest_use() {
        let mut reg = registry_with("1.1.1.1 2.2.2.2");
        let mut ledger = LoadLedger::new();

        let p1 = select(&mut reg, &ledger, 100, 0).unwrap();
        let lease = ledger.grant(100, 1, p1.0, p1.1, 0);
        ledger.complete(100, p1.0, p1.1, lease.lease_id, 1000);

        // mark the other proxy dead so only p1 is eligible
        let other = if p1 == (0x01010101, 80) { (0x02020202, 80) } else { (0x01010101, 80) };
        reg.lookup_mut(other.0, other.1).unwrap().last_error = 99;

        let again = select(&mut reg, &ledger, 100, 1001).unwrap();
        assert_eq!(again, p1);

        reg.lookup_mut(other.0, other.1).unwrap().last_error = 0;
        let third = select(&mut reg, &ledger, 100, 1002).unwrap();
        assert_eq!(third, other);
    }

    #[test]
    fn dead_fallback_still_returns_a_proxy() {
        let mut reg = registry_with("1.1.1.1 2.2.2.2");
        reg.for_each_mut(|_, _, stat| stat.last_error = 7);
        let ledger = LoadLedger::new();

        let chosen = select(&mut reg, &ledger, 1, 0);
        assert!(chosen.is_some());
    }

    #[test]
    fn healthy_proxy_always_preferred_over_dead() {
        let mut reg = registry_with("1.1.1.1 2.2.2.2");
        reg.lookup_mut(0x01010101, 80).unwrap().last_error = 7;
        let mut ledger = LoadLedger::new();
        // load up the healthy one heavily; it must still win
        for _ in 0..5 {
            ledger.grant(1, 1, 0x02020202, 80, 0);
        }

        let chosen = select(&mut reg, &ledger, 1, 0).unwrap();
        assert_eq!(chosen, (0x02020202, 80));
    }
}
