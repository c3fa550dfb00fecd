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

//! # Status Visibility
//!
//! ## Introduction
//!
//! Whether a given viewer may see a given status is a function of two things: the status'
//! [Visibility] level, and the relationship between the viewer & the author (does the viewer follow
//! the author? the other way 'round? has either blocked the other?). This module keeps those two
//! concerns apart: relationship *facts* come from an [Oracle] (which, in a real deployment, is
//! backed by the follow graph & the block & mute lists in the database), and the *rules* are a
//! pure function of those facts, [Visibility::permits].
//!
//! ## Home Timelines
//!
//! Being permitted to see a status isn't the same as wanting it in one's home timeline. On top of
//! the visibility rules, a status belongs in a viewer's home timeline only if:
//!
//! - the viewer wrote it, follows its author, or is mentioned in it
//! - the viewer hasn't muted its author
//! - if it's a reply, the viewer follows (or is) the account being replied to; nobody wants half
//!   of a conversation between a follow & a stranger
//! - if it's a boost, the viewer could see the boosted status, too
//!
//! Oracle failures are *never* papered-over: guessing "visible" leaks private statuses, and
//! guessing "hidden" silently drops them. [Filter] just propagates the error.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::entities::{AccountId, Status, Visibility};

pub use crate::storage::Error;

type Result<T> = std::result::Result<T, Error>;

/// Relationship facts between a viewer & some other account, from the viewer's perspective
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Relationship {
    /// The viewer follows the other account
    pub following: bool,
    /// The other account follows the viewer
    pub followed_by: bool,
    /// The viewer blocks the other account
    pub blocking: bool,
    /// The other account blocks the viewer
    pub blocked_by: bool,
    /// The viewer has muted the other account
    pub muting: bool,
}

impl Relationship {
    fn is_blocked(&self) -> bool {
        self.blocking || self.blocked_by
    }
}

#[async_trait]
pub trait Oracle {
    /// Produce the [Relationship] between `viewer` and `other`, from `viewer`'s perspective
    async fn relationship(&self, viewer: &AccountId, other: &AccountId) -> Result<Relationship>;
}

impl Visibility {
    /// Evaluate the visibility rule for this level
    ///
    /// `relationship` is the viewer's relationship to the author, and `mentioned` is true if the
    /// viewer is mentioned in the status. Authors can always see their own statuses; that case is
    /// handled by the caller.
    pub fn permits(&self, relationship: &Relationship, mentioned: bool) -> bool {
        match self {
            Visibility::Public | Visibility::Unlisted => true,
            Visibility::FollowersOnly => relationship.following || mentioned,
            Visibility::MutualsOnly => {
                (relationship.following && relationship.followed_by) || mentioned
            }
            Visibility::Direct => mentioned,
        }
    }
}

/// The visibility filter
///
/// Stateless beyond its handle on the [Oracle]; cheap to clone.
#[derive(Clone)]
pub struct Filter {
    oracle: Arc<dyn Oracle + Send + Sync>,
}

impl Filter {
    pub fn new(oracle: Arc<dyn Oracle + Send + Sync>) -> Filter {
        Filter { oracle }
    }
    /// Return true if `status` belongs in `viewer`'s home timeline
    ///
    /// That is, if `viewer` is permitted to see it, and the home timeline rules described in the
    /// [module](self) documentation admit it.
    pub async fn status_home_timelineable(
        &self,
        status: &Status,
        viewer: &AccountId,
    ) -> Result<bool> {
        // Our own statuses always land in our own timeline, whomever they're replying to
        if status.author == *viewer && !status.is_boost() {
            return Ok(true);
        }

        let relationship = self.relationship_to(viewer, &status.author).await?;
        if !self.visible_given(status, viewer, &relationship).await? {
            return Ok(false);
        }

        if relationship.muting {
            debug!("{viewer} has muted {}; dropping {}", status.author, status.id);
            return Ok(false);
        }

        let mentioned = status.mentions(viewer);
        if status.author != *viewer && !relationship.following && !mentioned {
            return Ok(false);
        }

        match &status.in_reply_to_account {
            Some(replied_to) if *replied_to != *viewer && *replied_to != status.author => {
                let to_replied = self.relationship_to(viewer, replied_to).await?;
                Ok(to_replied.following && !to_replied.is_blocked() && !to_replied.muting)
            }
            _ => Ok(true),
        }
    }
    async fn relationship_to(&self, viewer: &AccountId, other: &AccountId) -> Result<Relationship> {
        if viewer == other {
            Ok(Relationship {
                following: true,
                followed_by: true,
                ..Default::default()
            })
        } else {
            self.oracle.relationship(viewer, other).await
        }
    }
    // `relationship` is `viewer`'s relationship to `status.author`
    async fn visible_given(
        &self,
        status: &Status,
        viewer: &AccountId,
        relationship: &Relationship,
    ) -> Result<bool> {
        if status.author != *viewer {
            if relationship.is_blocked() {
                return Ok(false);
            }
            if !status
                .visibility
                .permits(relationship, status.mentions(viewer))
            {
                return Ok(false);
            }
        }

        match &status.boost_of {
            Some(boosted) if boosted.author != *viewer => {
                let to_boosted = self.oracle.relationship(viewer, &boosted.author).await?;
                // We don't have the boosted status' mentions to hand; only public & unlisted
                // statuses are boostable, anyway.
                Ok(!to_boosted.is_blocked()
                    && !to_boosted.muting
                    && boosted.visibility.permits(&to_boosted, false))
            }
            _ => Ok(true),
        }
    }
}
