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
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

// closed, crate-local set of probe error kinds. there is no shared errno
// namespace to surface across the ecosystem, so 0 still means success
// and everything else is this crate's own classification.
pub const ERR_NONE: u32 = 0;
pub const ERR_TIMEOUT: u32 = 1;
pub const ERR_CONNECT: u32 = 2;
pub const ERR_OTHER: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub ok: bool,
    pub error_code: u32,
}

impl ProbeOutcome {
    pub fn success() -> Self {
        ProbeOutcome { ok: true, error_code: ERR_NONE }
    }

    pub fn failure(error_code: u32) -> Self {
        ProbeOutcome { ok: false, error_code }
    }
}

// fetch-through-proxy, modeled at the seam since the teacher's own http
// path is upstream_peer selection for inbound traffic, not outbound
// fetch-through-proxy.
#[async_trait]
pub trait ProbeFetcher: Send + Sync {
    async fn fetch_through(
        &self,
        proxy_ip: u32,
        proxy_port: u16,
        test_url: &str,
        timeout: Duration,
    ) -> ProbeOutcome;
}

pub struct ReqwestProbeFetcher;

impl ReqwestProbeFetcher {
    pub fn new() -> Self {
        ReqwestProbeFetcher
    }
}

#[async_trait]
impl ProbeFetcher for ReqwestProbeFetcher {
    async fn fetch_through(
        &self,
        proxy_ip: u32,
        proxy_port: u16,
        test_url: &str,
        timeout: Duration,
    ) -> ProbeOutcome {
        let proxy_addr = Ipv4Addr::from(proxy_ip);
        let proxy_url = format!("http://{proxy_addr}:{proxy_port}");

        let proxy = match reqwest::Proxy::http(&proxy_url) {
            Ok(proxy) => proxy,
            Err(_) => return ProbeOutcome::failure(ERR_OTHER),
        };
        let client = match reqwest::Client::builder().proxy(proxy).timeout(timeout).build() {
            Ok(client) => client,
            Err(_) => return ProbeOutcome::failure(ERR_OTHER),
        };

        match client.get(test_url).send().await {
            Ok(_) => ProbeOutcome::success(),
            Err(err) if err.is_timeout() => {
                debug!(proxy = %proxy_url, "probe timed out");
                ProbeOutcome::failure(ERR_TIMEOUT)
            }
            Err(err) if err.is_connect() => {
                debug!(proxy = %proxy_url, "probe failed to connect");
                ProbeOutcome::failure(ERR_CONNECT)
            }
            Err(_) => ProbeOutcome::failure(ERR_OTHER),
        }
    }
}
