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

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};

use crate::clock::now_ms;
use crate::coordinator::Coordinator;
use crate::error::{CoordinatorError, Result};

pub const OPCODE_LEASE: u8 = 0x54;
pub const OPCODE_RELEASE: u8 = 0x55;

// a trait at the seam, mirroring the teacher's ServiceType/ProxyHttp
// pattern: the transport looks a handler up by opcode and hands it a
// payload slice plus the worker host id extracted from the connection.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    fn opcode(&self) -> u8;
    async fn handle(&self, payload: &[u8], worker_host_id: u32) -> Result<Vec<u8>>;
}

pub struct LeaseHandler {
    coordinator: Arc<Coordinator>,
}

impl LeaseHandler {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        LeaseHandler { coordinator }
    }
}

#[async_trait]
impl RpcHandler for LeaseHandler {
    fn opcode(&self) -> u8 {
        OPCODE_LEASE
    }

    async fn handle(&self, payload: &[u8], worker_host_id: u32) -> Result<Vec<u8>> {
        if payload.len() != 4 {
            return Err(CoordinatorError::BadRequestSize { expected: 4, got: payload.len() });
        }
        let target_ip = (&payload[..]).get_u32();
        let (proxy_ip, proxy_port, lease_id) = self
            .coordinator
            .lease(target_ip, worker_host_id, now_ms())
            .await?;

        let mut reply = BytesMut::with_capacity(10);
        reply.put_u32(proxy_ip);
        reply.put_u16(proxy_port);
        reply.put_u32(lease_id);
        Ok(reply.to_vec())
    }
}

pub struct ReleaseHandler {
    coordinator: Arc<Coordinator>,
}

impl ReleaseHandler {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        ReleaseHandler { coordinator }
    }
}

#[async_trait]
impl RpcHandler for ReleaseHandler {
    fn opcode(&self) -> u8 {
        OPCODE_RELEASE
    }

    async fn handle(&self, payload: &[u8], _worker_host_id: u32) -> Result<Vec<u8>> {
        if payload.len() != 14 {
            return Err(CoordinatorError::BadRequestSize { expected: 14, got: payload.len() });
        }
        let mut buf = &payload[..];
        let target_ip = buf.get_u32();
        let proxy_ip = buf.get_u32();
        let proxy_port = buf.get_u16();
        let lease_id = buf.get_u32();

        // release is permitted to be idempotent or never arrive; the
        // coordinator always replies empty regardless of whether a
        // matching outstanding lease was found.
        self.coordinator
            .release(target_ip, proxy_ip, proxy_port, lease_id, now_ms())
            .await;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lease_rejects_wrong_size_body() {
        let coordinator = Arc::new(Coordinator::new(std::env::temp_dir()));
        coordinator.bootstrap("1.1.1.1").await.unwrap();
        let handler = LeaseHandler::new(coordinator.clone());

        let err = handler.handle(&[1, 2, 3], 1).await.unwrap_err();
        assert_eq!(err, CoordinatorError::BadRequestSize { expected: 4, got: 3 });

        // no lease should have been recorded
        assert_eq!(coordinator.snapshot().await[0].2.count_for_this_ip, 0);
    }

    #[tokio::test]
    async fn lease_then_release_round_trip() {
        let coordinator = Arc::new(Coordinator::new(std::env::temp_dir()));
        coordinator.bootstrap("1.1.1.1").await.unwrap();
        let lease_handler = LeaseHandler::new(coordinator.clone());
        let release_handler = ReleaseHandler::new(coordinator.clone());

        let reply = lease_handler.handle(&100u32.to_be_bytes(), 7).await.unwrap();
        assert_eq!(reply.len(), 10);
        let proxy_ip = u32::from_be_bytes(reply[0..4].try_into().unwrap());
        let proxy_port = u16::from_be_bytes(reply[4..6].try_into().unwrap());
        let lease_id = u32::from_be_bytes(reply[6..10].try_into().unwrap());

        let mut release_body = Vec::new();
        release_body.extend_from_slice(&100u32.to_be_bytes());
        release_body.extend_from_slice(&proxy_ip.to_be_bytes());
        release_body.extend_from_slice(&proxy_port.to_be_bytes());
        release_body.extend_from_slice(&lease_id.to_be_bytes());

        let reply = release_handler.handle(&release_body, 7).await.unwrap();
        assert!(reply.is_empty());
    }
}
