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

use std::fmt;

// result alias with the coordinator's own error type
pub type Result<T, E = CoordinatorError> = std::result::Result<T, E>;

// every error kind the coordinator surfaces, never used to crash the process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    // rpc request body length did not match the opcode's expected size
    BadRequestSize { expected: usize, got: usize },
    // proxy list token failed validation; the registry is left untouched
    ConfigParse { token: String, reason: &'static str },
    // probe through a proxy exceeded its deadline
    ProbeTimeout,
    // probe through a proxy failed to connect
    ProbeConnect,
    // a lease referenced a proxy endpoint no longer present in the registry
    ProxyGone,
    // selector invoked against an empty registry
    NoProxies,
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorError::BadRequestSize { expected, got } => {
                write!(f, "bad request size: expected {expected} bytes, got {got}")
            }
            CoordinatorError::ConfigParse { token, reason } => {
                write!(f, "invalid proxy token '{token}': {reason}")
            }
            CoordinatorError::ProbeTimeout => write!(f, "probe timed out"),
            CoordinatorError::ProbeConnect => write!(f, "probe failed to connect"),
            CoordinatorError::ProxyGone => write!(f, "lease referenced a proxy no longer configured"),
            CoordinatorError::NoProxies => write!(f, "no proxies configured"),
        }
    }
}

impl std::error::Error for CoordinatorError {}
