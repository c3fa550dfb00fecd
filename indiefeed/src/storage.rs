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

//! # storage
//!
//! Abstractions for the status store. The store is the source of truth; the timeline engine only
//! ever reads from it (for backfill & for hydrating entries it indexed but never prepared).

use async_trait::async_trait;

use crate::entities::{AccountId, Status, StatusId};

/// The error type for every collaborator the embedding application supplies
///
/// The store, the relationship oracle ([crate::visibility::Oracle]) & the renderer
/// ([crate::render::Renderer]) may fail for any number of implementation-specific reasons; they
/// box-up whatever went wrong in one of these.
#[derive(Debug)]
pub struct Error {
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error {
            source: Box::new(err),
        }
    }
}

#[async_trait]
pub trait Backend {
    /// Retrieve a single [Status] by ID; `None` means there is no such status (any more).
    async fn get_status(&self, id: &StatusId) -> Result<Option<Status>, Error>;
    /// Retrieve candidates for `viewer`'s home timeline
    ///
    /// Implementations shall return up to `limit` statuses authored by `viewer`, or by accounts
    /// `viewer` follows, ordered newest first. If `max_id` is given, only statuses strictly older
    /// than it shall be returned; this is how callers page back through the store.
    ///
    /// Candidates are *not* expected to be visibility-checked; the caller will do that. A short
    /// page (fewer than `limit` statuses) means the store is exhausted.
    async fn get_home_timeline(
        &self,
        viewer: &AccountId,
        max_id: Option<&StatusId>,
        limit: usize,
    ) -> Result<Vec<Status>, Error>;
}
