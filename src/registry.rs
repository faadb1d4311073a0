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

use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::parse::parse_proxy_list;
use crate::persistence;

// stats for a single outbound proxy. not safe for unsynchronized concurrent
// access; callers serialize through the coordinator actor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProxyStat {
    pub last_attempt_ms: i64,
    pub last_duration_ms: i64,
    pub last_success_ms: i64,
    pub last_error: u32,
    pub probe_in_flight: bool,
    // selection scratch, cleared and recomputed on every select()
    pub count_for_this_ip: u32,
    pub last_used_for_this_ip_ms: i64,
}

impl ProxyStat {
    fn fresh() -> Self {
        ProxyStat {
            last_attempt_ms: 0,
            last_duration_ms: -1,
            last_success_ms: -1,
            last_error: 0,
            probe_in_flight: false,
            count_for_this_ip: 0,
            last_used_for_this_ip_ms: 0,
        }
    }
}

struct Entry {
    ip: u32,
    port: u16,
    stat: ProxyStat,
}

// in-memory map of proxy endpoint to ProxyStat, preserving first-seen
// iteration order so selector tiebreaks are deterministic.
pub struct ProxyRegistry {
    entries: Vec<Entry>,
    index: HashMap<(u32, u16), usize>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        ProxyRegistry {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // parses and validates the whole text before mutating anything; on
    // any parse failure the registry is left byte-identical.
    pub fn rebuild(&mut self, text: &str) -> Result<()> {
        let candidates = parse_proxy_list(text)?;

        let mut next_entries = Vec::with_capacity(candidates.len());
        let mut next_index = HashMap::with_capacity(candidates.len());
        let mut seen = std::collections::HashSet::with_capacity(candidates.len());

        for (ip, port) in candidates {
            if !seen.insert((ip, port)) {
                continue;
            }
            let stat = match self.index.get(&(ip, port)) {
                Some(&old_idx) => self.entries[old_idx].stat,
                None => ProxyStat::fresh(),
            };
            next_index.insert((ip, port), next_entries.len());
            next_entries.push(Entry { ip, port, stat });
        }

        self.entries = next_entries;
        self.index = next_index;
        Ok(())
    }

    pub fn lookup(&self, ip: u32, port: u16) -> Option<&ProxyStat> {
        self.index.get(&(ip, port)).map(|&idx| &self.entries[idx].stat)
    }

    pub fn lookup_mut(&mut self, ip: u32, port: u16) -> Option<&mut ProxyStat> {
        let idx = *self.index.get(&(ip, port))?;
        Some(&mut self.entries[idx].stat)
    }

    pub fn for_each(&self, mut visitor: impl FnMut(u32, u16, &ProxyStat)) {
        for entry in &self.entries {
            visitor(entry.ip, entry.port, &entry.stat);
        }
    }

    pub fn for_each_mut(&mut self, mut visitor: impl FnMut(u32, u16, &mut ProxyStat)) {
        for entry in &mut self.entries {
            visitor(entry.ip, entry.port, &mut entry.stat);
        }
    }

    pub fn save(&self, dir: &Path, name: &str) -> std::io::Result<()> {
        persistence::save(self, dir, name)
    }

    pub fn load(dir: &Path, name: &str) -> Self {
        persistence::load(dir, name)
    }

    pub(crate) fn insert_raw(&mut self, ip: u32, port: u16, stat: ProxyStat) {
        let idx = self.entries.len();
        self.entries.push(Entry { ip, port, stat });
        self.index.insert((ip, port), idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuild_preserves_stats_for_unchanged_endpoints() {
        let mut reg = ProxyRegistry::new();
        reg.rebuild("1.2.3.4 5.6.7.8:8080").unwrap();
        reg.lookup_mut(0x01020304, 80).unwrap().last_error = 7;

        reg.rebuild("1.2.3.4 9.9.9.9").unwrap();

        assert_eq!(reg.lookup(0x01020304, 80).unwrap().last_error, 7);
        assert!(reg.lookup(0x05060708, 8080).is_none());
        assert!(reg.lookup(0x09090909, 80).is_some());
    }

    #[test]
    fn parse_error_leaves_registry_untouched() {
        let mut reg = ProxyRegistry::new();
        reg.rebuild("1.2.3.4").unwrap();
        let before_len = reg.len();

        let err = reg.rebuild("1.2.3 bogus");
        assert!(err.is_err());
        assert_eq!(reg.len(), before_len);
        assert!(reg.lookup(0x01020304, 80).is_some());
    }

    #[test]
    fn new_endpoints_start_with_sentinel_timings() {
        let mut reg = ProxyRegistry::new();
        reg.rebuild("1.2.3.4").unwrap();
        let stat = reg.lookup(0x01020304, 80).unwrap();
        assert_eq!(stat.last_duration_ms, -1);
        assert_eq!(stat.last_success_ms, -1);
        assert_eq!(stat.last_attempt_ms, 0);
    }
}
