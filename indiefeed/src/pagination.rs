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

//! # Cursor Pagination
//!
//! Clients page through timelines with boundary IDs rather than numeric offsets, since offsets
//! are meaningless on a list that's growing at the head & being pruned in the middle while the
//! client reads it. The parameters are the ones Mastodon made conventional:
//!
//! - `max_id`: return entries strictly older than this ("scroll down")
//! - `since_id`: return entries strictly newer than this, newest first ("what's new since I last
//!   looked?"); we stop walking the index as soon as we reach it
//! - `min_id`: return the entries *immediately* newer than this ("scroll up")-- i.e. the page that
//!   abuts `min_id`, rather than the newest page
//! - `limit`: page size
//! - `local_only`: skip entries authored on other instances
//!
//! Results are always newest first.

use crate::{entities::StatusId, timeline::IndexEntry};

/// A cursor window over a timeline
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Cursor {
    pub max_id: Option<StatusId>,
    pub since_id: Option<StatusId>,
    pub min_id: Option<StatusId>,
    pub limit: usize,
    pub local_only: bool,
}

impl Cursor {
    /// A cursor naming the newest `limit` entries
    pub fn top(limit: usize) -> Cursor {
        Cursor {
            limit,
            ..Default::default()
        }
    }
    pub fn max_id(mut self, max_id: StatusId) -> Cursor {
        self.max_id = Some(max_id);
        self
    }
    pub fn since_id(mut self, since_id: StatusId) -> Cursor {
        self.since_id = Some(since_id);
        self
    }
    pub fn min_id(mut self, min_id: StatusId) -> Cursor {
        self.min_id = Some(min_id);
        self
    }
    pub fn local_only(mut self, local_only: bool) -> Cursor {
        self.local_only = local_only;
        self
    }
    /// True if this cursor walks toward older entries (and so might run off the end of what we've
    /// indexed so far)
    pub fn is_backward(&self) -> bool {
        self.since_id.is_none() && self.min_id.is_none()
    }
}

/// Resolve `cursor` against `entries`
///
/// `entries` must yield [IndexEntry]s newest first (i.e. in descending [StatusId] order); the
/// iterator need not begin at the head of the timeline (callers may seek to `max_id` first).
pub fn resolve<'a, I>(entries: I, cursor: &Cursor) -> Vec<StatusId>
where
    I: IntoIterator<Item = &'a IndexEntry>,
    I::IntoIter: DoubleEndedIterator,
{
    if cursor.limit == 0 {
        return Vec::new();
    }

    let below_max = |entry: &&IndexEntry| {
        cursor
            .max_id
            .as_ref()
            .is_none_or(|max_id| entry.status_id < *max_id)
    };
    let eligible = |entry: &&IndexEntry| !cursor.local_only || entry.local;

    match (&cursor.min_id, &cursor.since_id) {
        (Some(min_id), None) => {
            // Walk up from `min_id` so that we take the page closest to it, then flip the result
            // around to newest first.
            let mut ids = entries
                .into_iter()
                .rev()
                .skip_while(|entry| entry.status_id <= *min_id)
                .take_while(below_max)
                .filter(eligible)
                .take(cursor.limit)
                .map(|entry| entry.status_id.clone())
                .collect::<Vec<StatusId>>();
            ids.reverse();
            ids
        }
        (min_id, since_id) => entries
            .into_iter()
            .skip_while(|entry| !below_max(entry))
            .take_while(|entry| {
                since_id
                    .as_ref()
                    .is_none_or(|since_id| entry.status_id > *since_id)
                    && min_id
                        .as_ref()
                        .is_none_or(|min_id| entry.status_id > *min_id)
            })
            .filter(eligible)
            .take(cursor.limit)
            .map(|entry| entry.status_id.clone())
            .collect(),
    }
}
