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

use std::fs::File;

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub proxy_list_path: String,
    #[serde(default)]
    pub proxy_test_url: String,
    #[serde(default = "default_admin_bind")]
    pub admin_bind_address: String,
    #[serde(default = "default_rpc_bind")]
    pub rpc_bind_address: String,
    #[serde(default = "default_persist_dir")]
    pub persist_dir: String,
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default)]
    pub self_index: usize,
    pub consul_address: Option<String>,
    pub consul_token: Option<String>,
    pub consul_service_name: Option<String>,
    // this node's routable address, as Consul will report it
    // ("{service.address}:{service.port}"). Required in consul mode:
    // rpc_bind_address is a bind address (often a wildcard like
    // "0.0.0.0:6189") and will never match Consul's advertised address.
    pub advertise_address: Option<String>,
}

fn default_admin_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_rpc_bind() -> String {
    "0.0.0.0:6189".to_string()
}

fn default_persist_dir() -> String {
    ".".to_string()
}

// parse yaml file to settings based on provided path, overridable by
// environment variables loaded via dotenv.
fn load_yaml(file_path: &str) -> Settings {
    let file = File::open(file_path).expect("Unable to find configuration file.");
    serde_yaml::from_reader(file).expect("Unable to parse YAML")
}

pub fn load(file_path: &str) -> Settings {
    dotenv::dotenv().ok();
    let mut settings = load_yaml(file_path);

    if let Ok(address) = std::env::var("SPIDER_RPC_BIND_ADDRESS") {
        settings.rpc_bind_address = address;
    }
    if let Ok(address) = std::env::var("SPIDER_ADMIN_BIND_ADDRESS") {
        settings.admin_bind_address = address;
    }
    if let Ok(url) = std::env::var("SPIDER_PROXY_TEST_URL") {
        settings.proxy_test_url = url;
    }
    if let Ok(token) = std::env::var("SPIDER_CONSUL_TOKEN") {
        settings.consul_token = Some(token);
    }
    if let Ok(address) = std::env::var("SPIDER_ADVERTISE_ADDRESS") {
        settings.advertise_address = Some(address);
    }

    settings
}

pub fn read_proxy_list(path: &str) -> std::io::Result<String> {
    std::fs::read_to_string(path)
}
