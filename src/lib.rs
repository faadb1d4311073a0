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

pub mod admin;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod handlers;
pub mod ledger;
pub mod membership;
pub mod parse;
pub mod persistence;
pub mod prober;
pub mod registry;
pub mod selector;
pub mod settings;
pub mod shutdown;
pub mod transport;
