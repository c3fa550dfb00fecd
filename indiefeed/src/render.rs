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

//! # render
//!
//! The status renderer turns a raw [Status] into the representation we hand to clients. Doing so
//! can be expensive (it typically involves looking-up the author, attachments, counts, the boosted
//! status & so forth), which is the whole reason the timeline engine caches its output.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{AccountId, Status, StatusId, Visibility};

pub use crate::storage::Error;

/// A fully hydrated status, ready to be serialized to a client
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StatusView {
    pub id: StatusId,
    pub account: AccountId,
    pub content: String,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub local: bool,
    /// The boosted status, if this is a boost
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reblog: Option<Box<StatusView>>,
}

#[async_trait]
pub trait Renderer {
    /// Render `status` as seen by `viewer`
    async fn render(&self, status: &Status, viewer: &AccountId) -> Result<StatusView, Error>;
}
