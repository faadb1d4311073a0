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
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix;
use tracing::{error, info, warn};

use spider_proxy_coordinator::admin::{self, AdminState};
use spider_proxy_coordinator::coordinator::Coordinator;
use spider_proxy_coordinator::fetcher::ReqwestProbeFetcher;
use spider_proxy_coordinator::handlers::{LeaseHandler, ReleaseHandler};
use spider_proxy_coordinator::membership::{ConsulMembership, Membership, PeerStatus, StaticMembership};
use spider_proxy_coordinator::prober::HealthProber;
use spider_proxy_coordinator::settings;
use spider_proxy_coordinator::transport::RpcTransport;

const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(5);
const PERSIST_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().json().with_target(true).with_line_number(true).init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());
    let settings = settings::load(&config_path);

    let proxy_list_text = match settings::read_proxy_list(&settings.proxy_list_path) {
        Ok(text) => text,
        Err(err) => {
            error!(%err, path = %settings.proxy_list_path, "unable to read proxy list file");
            std::process::exit(1);
        }
    };

    let coordinator = Arc::new(Coordinator::new(PathBuf::from(&settings.persist_dir)));
    if let Err(err) = coordinator.bootstrap(&proxy_list_text).await {
        error!(%err, "initial proxy list configuration is invalid");
        std::process::exit(1);
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let membership: Arc<dyn Membership> = match &settings.consul_address {
        Some(consul_address) => {
            let Some(advertise_address) = settings.advertise_address.clone() else {
                error!("consul_address is set but advertise_address is missing; refusing to start with an unresolvable self-lookup");
                std::process::exit(1);
            };
            let (membership, updater) = ConsulMembership::new(
                consul_address.clone(),
                settings.consul_token.clone(),
                settings.consul_service_name.clone().unwrap_or_default(),
                advertise_address,
            );
            let membership = Arc::new(membership);
            let rx = shutdown_rx.clone();
            tokio::spawn(async move { updater.run(rx).await });
            membership
        }
        None => {
            let peers = settings
                .peers
                .iter()
                .map(|address| PeerStatus { address: address.clone(), alive: true })
                .collect();
            Arc::new(StaticMembership::new(settings.self_index, peers))
        }
    };

    let fetcher = Arc::new(ReqwestProbeFetcher::new());
    let prober = Arc::new(HealthProber::new(
        Arc::clone(&coordinator),
        Arc::clone(&membership),
        fetcher,
        settings.proxy_test_url.clone(),
    ));
    {
        let prober = Arc::clone(&prober);
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { prober.run(rx).await });
    }

    let transport = RpcTransport::new()
        .register(Arc::new(LeaseHandler::new(Arc::clone(&coordinator))))
        .register(Arc::new(ReleaseHandler::new(Arc::clone(&coordinator))));
    let bound_transport = match transport.bind(&settings.rpc_bind_address).await {
        Ok(bound) => bound,
        Err(err) => {
            error!(%err, address = %settings.rpc_bind_address, "failed to bind rpc listener");
            std::process::exit(2);
        }
    };
    {
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { bound_transport.run(rx).await });
    }

    let admin_port = admin::port_of(&settings.admin_bind_address);
    let admin_state = AdminState {
        coordinator: Arc::clone(&coordinator),
        membership: Arc::clone(&membership),
        admin_port,
    };
    let admin_listener = match tokio::net::TcpListener::bind(&settings.admin_bind_address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%err, address = %settings.admin_bind_address, "failed to bind admin listener");
            std::process::exit(2);
        }
    };
    {
        let app = admin::router(admin_state);
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(admin_listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.changed().await;
                })
                .await
                .unwrap_or_else(|err| error!(%err, "admin server exited with an error"));
        });
    }

    {
        let coordinator = Arc::clone(&coordinator);
        let proxy_list_path = settings.proxy_list_path.clone();
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut last_mtime = std::fs::metadata(&proxy_list_path).and_then(|m| m.modified()).ok();
            let mut interval = tokio::time::interval(CONFIG_POLL_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let mtime = std::fs::metadata(&proxy_list_path).and_then(|m| m.modified()).ok();
                        if mtime.is_some() && mtime != last_mtime {
                            last_mtime = mtime;
                            match settings::read_proxy_list(&proxy_list_path) {
                                Ok(text) => {
                                    if let Err(err) = coordinator.reconfigure(&text).await {
                                        warn!(%err, "proxy list reload rejected");
                                    } else {
                                        info!("proxy list reloaded");
                                    }
                                }
                                Err(err) => warn!(%err, "failed to read proxy list for reload"),
                            }
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
        });
    }

    {
        let coordinator = Arc::clone(&coordinator);
        let membership = Arc::clone(&membership);
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PERSIST_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if membership.is_leader() {
                            if let Err(err) = coordinator.persist().await {
                                error!(%err, "failed to persist proxy registry");
                            }
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
        });
    }

    info!(rpc = %settings.rpc_bind_address, admin = %settings.admin_bind_address, "spider proxy coordinator running");
    wait_for_shutdown_signal().await;

    let _ = shutdown_tx.send(true);
    if membership.is_leader() {
        if let Err(err) = coordinator.persist().await {
            error!(%err, "failed to persist proxy registry during shutdown");
        }
    }
    info!("shutdown complete");
}

async fn wait_for_shutdown_signal() {
    let mut graceful_terminate = unix::signal(unix::SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut fast_shutdown = unix::signal(unix::SignalKind::interrupt()).expect("failed to register SIGINT handler");
    tokio::select! {
        _ = graceful_terminate.recv() => info!("graceful termination signalled"),
        _ = fast_shutdown.recv() => info!("fast shutdown signalled"),
    }
}
