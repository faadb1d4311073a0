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

// hand-rolled fixed-width binary format for the proxy registry, in the
// teacher's own raw offset/buffer style (see core/src/service/offset.rs)
// rather than an external serialization crate, so the on-disk shape does
// not move with any one serde backend's wire evolution.
//
// layout: u32 record count (LE), then that many fixed-width records of
// ip(u32) ++ port(u16) ++ last_attempt_ms(i64) ++ last_duration_ms(i64)
// ++ last_success_ms(i64) ++ last_error(u32) ++ probe_in_flight(u8), all LE.

use std::fs;
use std::io;
use std::path::Path;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::registry::{ProxyRegistry, ProxyStat};

const RECORD_LEN: usize = 4 + 2 + 8 + 8 + 8 + 4 + 1;

pub fn save(registry: &ProxyRegistry, dir: &Path, name: &str) -> io::Result<()> {
    let mut buf = BytesMut::with_capacity(4 + registry.len() * RECORD_LEN);
    buf.put_u32_le(registry.len() as u32);
    registry.for_each(|ip, port, stat| {
        buf.put_u32_le(ip);
        buf.put_u16_le(port);
        buf.put_i64_le(stat.last_attempt_ms);
        buf.put_i64_le(stat.last_duration_ms);
        buf.put_i64_le(stat.last_success_ms);
        buf.put_u32_le(stat.last_error);
        buf.put_u8(stat.probe_in_flight as u8);
    });
    fs::create_dir_all(dir)?;
    fs::write(dir.join(name), buf)
}

// best-effort: a missing or corrupt file yields an empty registry.
pub fn load(dir: &Path, name: &str) -> ProxyRegistry {
    match fs::read(dir.join(name)) {
        Ok(raw) => decode(Bytes::from(raw)).unwrap_or_else(|| ProxyRegistry::new()),
        Err(_) => ProxyRegistry::new(),
    }
}

fn decode(mut buf: Bytes) -> Option<ProxyRegistry> {
    if buf.remaining() < 4 {
        return None;
    }
    let count = buf.get_u32_le() as usize;
    if buf.remaining() != count * RECORD_LEN {
        return None;
    }

    let mut registry = ProxyRegistry::new();
    for _ in 0..count {
        let ip = buf.get_u32_le();
        let port = buf.get_u16_le();
        let stat = ProxyStat {
            last_attempt_ms: buf.get_i64_le(),
            last_duration_ms: buf.get_i64_le(),
            last_success_ms: buf.get_i64_le(),
            last_error: buf.get_u32_le(),
            probe_in_flight: buf.get_u8() != 0,
            count_for_this_ip: 0,
            last_used_for_this_ip_ms: 0,
        };
        registry.insert_raw(ip, port, stat);
    }
    Some(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_a_temp_dir() {
        let mut reg = ProxyRegistry::new();
        reg.rebuild("1.2.3.4 5.6.7.8:8080").unwrap();
        reg.lookup_mut(0x01020304, 80).unwrap().last_error = 3;

        let dir = std::env::temp_dir().join(format!("spider-coordinator-test-{}", std::process::id()));
        reg.save(&dir, "proxystats.dat").unwrap();

        let loaded = ProxyRegistry::load(&dir, "proxystats.dat");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.lookup(0x01020304, 80).unwrap().last_error, 3);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_yields_empty_registry() {
        let dir = std::env::temp_dir().join("spider-coordinator-does-not-exist");
        let loaded = ProxyRegistry::load(&dir, "proxystats.dat");
        assert_eq!(loaded.len(), 0);
    }
}
