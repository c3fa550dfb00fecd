// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of indiefeed.
//
// indiefeed is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// indiefeed is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with indiefeed.  If not,
// see <http://www.gnu.org/licenses/>.

//! # indiefeed
//!
//! A per-viewer home timeline engine for a federated social server. For every account that reads
//! its home feed, [manager::Manager] maintains an ordered, paginated index of the statuses that
//! account may see, along with a cache of their rendered forms, without going back to the status
//! store on every read.
//!
//! The store, the follow/block/mute graph & the status renderer are all supplied by the embedding
//! application through the traits in [storage], [visibility] & [render]; [memory] provides
//! in-process implementations of all three.

pub mod config;
pub mod entities;
pub mod manager;
pub mod memory;
pub mod metrics;
pub mod pagination;
pub mod render;
pub mod storage;
pub mod timeline;
pub mod visibility;
