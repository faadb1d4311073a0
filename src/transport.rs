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

// length-prefixed tcp framing, built on the teacher's raw listener/
// session idiom (accept loop, per-connection read loop, reuseaddr
// socket setup) but generalized to opcode dispatch instead of http
// proxying.
//
// request frame:  length(4 BE, counts opcode+payload) ++ opcode(1) ++ payload
// reply   frame:  length(4 BE, counts status+body)    ++ status(1) ++ body
// status: 0 = ok, 1 = bad request size, 2 = other error

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{error, info, info_span, warn, Instrument};

use crate::error::CoordinatorError;
use crate::handlers::RpcHandler;
use crate::shutdown::ShutdownWatch;

const STATUS_OK: u8 = 0;
const STATUS_BAD_REQUEST_SIZE: u8 = 1;
const STATUS_ERROR: u8 = 2;

pub struct RpcTransport {
    handlers: HashMap<u8, Arc<dyn RpcHandler>>,
}

impl RpcTransport {
    pub fn new() -> Self {
        RpcTransport { handlers: HashMap::new() }
    }

    pub fn register(mut self, handler: Arc<dyn RpcHandler>) -> Self {
        self.handlers.insert(handler.opcode(), handler);
        self
    }

    pub async fn bind(self, address: &str) -> std::io::Result<BoundTransport> {
        let socket_address: std::net::SocketAddr = address
            .parse()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad rpc bind address"))?;
        let socket = if socket_address.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(socket_address)?;
        let listener = socket.listen(1024)?;
        Ok(BoundTransport {
            listener,
            handlers: Arc::new(self.handlers),
        })
    }
}

pub struct BoundTransport {
    listener: TcpListener,
    handlers: Arc<HashMap<u8, Arc<dyn RpcHandler>>>,
}

impl BoundTransport {
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.listener.local_addr().expect("bound listener always has a local address")
    }

    pub async fn run(self, mut shutdown: ShutdownWatch) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let handlers = Arc::clone(&self.handlers);
                            let worker_host_id = match peer.ip() {
                                std::net::IpAddr::V4(v4) => u32::from(v4),
                                std::net::IpAddr::V6(_) => 0,
                            };
                            tokio::spawn(
                                async move {
                                    if let Err(err) = serve_connection(stream, handlers, worker_host_id).await {
                                        warn!(%err, "rpc connection ended with an error");
                                    }
                                }
                                .instrument(info_span!("rpc_connection", peer = %peer)),
                            );
                        }
                        Err(err) => error!(%err, "failed to accept rpc connection"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("rpc transport shutting down");
                    break;
                }
            }
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    handlers: Arc<HashMap<u8, Arc<dyn RpcHandler>>>,
    worker_host_id: u32,
) -> std::io::Result<()> {
    loop {
        let mut len_buf = [0u8; 4];
        if stream.read_exact(&mut len_buf).await.is_err() {
            return Ok(());
        }
        let frame_len = u32::from_be_bytes(len_buf) as usize;
        if frame_len == 0 {
            return Ok(());
        }

        let mut frame = vec![0u8; frame_len];
        stream.read_exact(&mut frame).await?;
        let opcode = frame[0];
        let payload = &frame[1..];

        let (status, body) = match handlers.get(&opcode) {
            Some(handler) => match handler.handle(payload, worker_host_id).await {
                Ok(body) => (STATUS_OK, body),
                Err(CoordinatorError::BadRequestSize { .. }) => (STATUS_BAD_REQUEST_SIZE, Vec::new()),
                Err(_) => (STATUS_ERROR, Vec::new()),
            },
            None => (STATUS_ERROR, Vec::new()),
        };

        let mut reply = Vec::with_capacity(5 + body.len());
        reply.extend_from_slice(&((1 + body.len()) as u32).to_be_bytes());
        reply.push(status);
        reply.extend_from_slice(&body);
        stream.write_all(&reply).await?;
    }
}

