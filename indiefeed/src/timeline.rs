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

//! # The Home Timeline
//!
//! ## Introduction
//!
//! Conceptually, each account has a *home timeline*: an ever-growing list of statuses posted by the
//! account itself & the accounts it follows, ordered by time. The list is growing at the head as
//! new statuses are posted (or arrive over federation), grows at the tail as we backfill from the
//! store, and has elements "in the middle" removed as statuses are deleted or their authors muted
//! or blocked.
//!
//! ## The Model
//!
//! A [Timeline] is two collections:
//!
//! 1. the *index*: an ordered set of [IndexEntry], newest first. An entry in the index just says
//!    "this status belongs in this timeline, at this position".
//!
//! 2. the *prepared* set: the hydrated, client-ready rendition of (some of) the indexed statuses.
//!    Rendering is expensive, so we do it lazily & cache the result.
//!
//! Every prepared status is also indexed, but not the other way 'round. Both collections sit behind
//! one lock, so that no reader ever sees a half-applied "index & prepare".
//!
//! Note that a [Timeline] is purely in-memory & never touches the store or the renderer itself:
//! callers do the (async) work of fetching & rendering *outside* the lock & then hand us the
//! results to apply in one critical section.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::RwLock,
};

use tracing::debug;

use crate::{
    entities::{AccountId, Status, StatusId},
    pagination::{self, Cursor},
    render::StatusView,
};

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            entries                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// "This status (or boost) is eligible to appear in this timeline"
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexEntry {
    pub status_id: StatusId,
    pub boost_of_id: Option<StatusId>,
    pub author_id: AccountId,
    pub boost_of_author_id: Option<AccountId>,
    /// True if `author_id` is local to this instance
    pub local: bool,
}

impl From<&Status> for IndexEntry {
    fn from(status: &Status) -> Self {
        IndexEntry {
            status_id: status.id.clone(),
            boost_of_id: status.boost_of.as_ref().map(|boost| boost.id.clone()),
            author_id: status.author.clone(),
            boost_of_author_id: status.boost_of.as_ref().map(|boost| boost.author.clone()),
            local: status.local,
        }
    }
}

impl IndexEntry {
    fn involves(&self, account: &AccountId) -> bool {
        self.author_id == *account || self.boost_of_author_id.as_ref() == Some(account)
    }
}

/// A cached, hydrated status
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PreparedEntry {
    pub status_id: StatusId,
    pub author_id: AccountId,
    pub rendered: StatusView,
}

/// Sort key for the index
///
/// Deriving [Ord] would result in an ascending sort order, whereas we want *descending*, so that
/// iterating the index (or taking its first element) yields the newest entry.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct IndexKey(StatusId);

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Timeline                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Per-timeline tunables
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Settings {
    /// Retain at most this many entries, trimming the oldest; zero means "unbounded"
    pub max_indexed: usize,
    /// A boost won't be indexed if the boosted status, or another boost of it, is among this many
    /// of the most recent entries; zero (the default) turns this off
    pub boost_reinsertion_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_indexed: 1000,
            boost_reinsertion_depth: 0,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    index: BTreeMap<IndexKey, IndexEntry>,
    prepared: HashMap<StatusId, PreparedEntry>,
}

impl Inner {
    fn boost_is_redundant(&self, entry: &IndexEntry, depth: usize) -> bool {
        match &entry.boost_of_id {
            Some(boosted) => self.index.values().take(depth).any(|indexed| {
                indexed.status_id == *boosted || indexed.boost_of_id.as_ref() == Some(boosted)
            }),
            None => false,
        }
    }
    // Return the number of deletions performed (zero, one or two)
    fn remove_one(&mut self, id: &StatusId) -> usize {
        self.index.remove(&IndexKey(id.clone())).map_or(0, |_| 1)
            + self.prepared.remove(id).map_or(0, |_| 1)
    }
    // True if indexing `id` would only see it trimmed straight back out
    fn is_beyond(&self, id: &StatusId, max_indexed: usize) -> bool {
        max_indexed != 0
            && self.index.len() >= max_indexed
            && self
                .index
                .last_key_value()
                .is_some_and(|(IndexKey(oldest), _)| id < oldest)
    }
    fn trim(&mut self, max_indexed: usize) {
        if max_indexed == 0 {
            return;
        }
        while self.index.len() > max_indexed {
            if let Some((IndexKey(id), _)) = self.index.pop_last() {
                debug!("Trimming {id}");
                self.prepared.remove(&id);
            }
        }
    }
}

/// One account's home timeline
#[derive(Debug)]
pub struct Timeline {
    account_id: AccountId,
    settings: Settings,
    inner: RwLock<Inner>,
}

impl Timeline {
    pub fn new(account_id: AccountId, settings: Settings) -> Timeline {
        Timeline {
            account_id,
            settings,
            inner: RwLock::new(Inner::default()),
        }
    }
    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }
    /// Index `entry`; return true if it was newly inserted
    ///
    /// If `entry.status_id` is already indexed, this is a no-op returning false (the first
    /// ingestion of a status wins its slot).
    ///
    /// A full timeline makes room by trimming its oldest entries; an entry older than everything in
    /// a full timeline is turned away, and false returned.
    pub fn ingest(&self, entry: IndexEntry) -> bool {
        let mut inner = self.inner.write().expect("Poisoned timeline lock!");
        self.insert(&mut inner, entry, None, true)
    }
    /// Index `entry` without trimming; return true if it was newly inserted
    ///
    /// This is for extending the timeline into the past at a reader's request: the reader is
    /// scrolling back through exactly those entries that trimming would drop. The next trimmed
    /// insert brings the timeline back within bounds.
    pub fn ingest_behind(&self, entry: IndexEntry) -> bool {
        let mut inner = self.inner.write().expect("Poisoned timeline lock!");
        self.insert(&mut inner, entry, None, false)
    }
    /// Index `entry` & cache its prepared form; return true if it was newly inserted
    ///
    /// Same idempotence contract as [ingest](Timeline::ingest). If the status is already indexed
    /// but was never prepared, `rendered` is cached (but false is still returned); an existing
    /// prepared entry is left alone-- use [refresh_prepared](Timeline::refresh_prepared) for that.
    pub fn ingest_and_prepare(&self, entry: IndexEntry, rendered: StatusView) -> bool {
        let mut inner = self.inner.write().expect("Poisoned timeline lock!");
        self.insert(&mut inner, entry, Some(rendered), true)
    }
    /// True if `id` is older than everything in this timeline, and the timeline is full
    ///
    /// [ingest](Timeline::ingest) & [ingest_and_prepare](Timeline::ingest_and_prepare) would turn
    /// such a status away.
    pub fn is_beyond_window(&self, id: &StatusId) -> bool {
        self.inner
            .read()
            .expect("Poisoned timeline lock!")
            .is_beyond(id, self.settings.max_indexed)
    }
    fn insert(
        &self,
        inner: &mut Inner,
        entry: IndexEntry,
        rendered: Option<StatusView>,
        trim: bool,
    ) -> bool {
        let key = IndexKey(entry.status_id.clone());
        if inner.index.contains_key(&key) {
            if let Some(rendered) = rendered {
                inner
                    .prepared
                    .entry(entry.status_id.clone())
                    .or_insert_with(|| PreparedEntry {
                        status_id: entry.status_id,
                        author_id: entry.author_id,
                        rendered,
                    });
            }
            return false;
        }
        if inner.boost_is_redundant(&entry, self.settings.boost_reinsertion_depth) {
            debug!(
                "{} boosts a status already near the top of {}'s timeline",
                entry.status_id, self.account_id
            );
            return false;
        }
        if trim && inner.is_beyond(&entry.status_id, self.settings.max_indexed) {
            debug!(
                "{} is older than all of {}'s (full) timeline",
                entry.status_id, self.account_id
            );
            return false;
        }

        if let Some(rendered) = rendered {
            inner.prepared.insert(
                entry.status_id.clone(),
                PreparedEntry {
                    status_id: entry.status_id.clone(),
                    author_id: entry.author_id.clone(),
                    rendered,
                },
            );
        }
        inner.index.insert(key, entry);
        if trim {
            inner.trim(self.settings.max_indexed);
        }
        true
    }
    /// Cache `rendered` as the prepared form of `id`
    ///
    /// Only succeeds if `id` is still indexed (it may have been removed while the caller was
    /// rendering it) & hasn't been prepared in the meantime. Return true if `rendered` was cached.
    pub fn prepare(&self, id: &StatusId, rendered: StatusView) -> bool {
        let mut inner = self.inner.write().expect("Poisoned timeline lock!");
        let author_id = match inner.index.get(&IndexKey(id.clone())) {
            Some(entry) if !inner.prepared.contains_key(id) => entry.author_id.clone(),
            _ => return false,
        };
        inner.prepared.insert(
            id.clone(),
            PreparedEntry {
                status_id: id.clone(),
                author_id,
                rendered,
            },
        );
        true
    }
    /// Replace the prepared form of `id`, if it's indexed; return true if it was
    pub fn refresh_prepared(&self, id: &StatusId, rendered: StatusView) -> bool {
        let mut inner = self.inner.write().expect("Poisoned timeline lock!");
        let author_id = match inner.index.get(&IndexKey(id.clone())) {
            Some(entry) => entry.author_id.clone(),
            None => return false,
        };
        inner.prepared.insert(
            id.clone(),
            PreparedEntry {
                status_id: id.clone(),
                author_id,
                rendered,
            },
        );
        true
    }
    /// Remove `id` from this timeline
    ///
    /// Return the number of deletions performed: one if `id` was indexed, and one more if it had
    /// been prepared (so zero, one or two).
    pub fn remove(&self, id: &StatusId) -> usize {
        self.inner
            .write()
            .expect("Poisoned timeline lock!")
            .remove_one(id)
    }
    /// Remove `id` from this timeline, along with any boosts of it
    ///
    /// Return the number of deletions performed, counted per entry as for
    /// [remove](Timeline::remove).
    pub fn remove_with_boosts(&self, id: &StatusId) -> usize {
        let mut inner = self.inner.write().expect("Poisoned timeline lock!");
        let boosts = inner
            .index
            .values()
            .filter(|entry| entry.boost_of_id.as_ref() == Some(id))
            .map(|entry| entry.status_id.clone())
            .collect::<Vec<StatusId>>();
        boosts
            .iter()
            .fold(inner.remove_one(id), |acc, boost| acc + inner.remove_one(boost))
    }
    /// Remove every entry authored by `account`, or boosting a status authored by `account`
    ///
    /// Return the number of deletions performed, counted per entry as for
    /// [remove](Timeline::remove).
    pub fn remove_all_by(&self, account: &AccountId) -> usize {
        let mut inner = self.inner.write().expect("Poisoned timeline lock!");
        let doomed = inner
            .index
            .values()
            .filter(|entry| entry.involves(account))
            .map(|entry| entry.status_id.clone())
            .collect::<Vec<StatusId>>();
        doomed.iter().map(|id| inner.remove_one(id)).sum()
    }
    /// Resolve `cursor` against this timeline
    pub fn page(&self, cursor: &Cursor) -> Vec<StatusId> {
        let inner = self.inner.read().expect("Poisoned timeline lock!");
        match &cursor.max_id {
            // Seek past `max_id` first rather than walking the head of the timeline
            Some(max_id) => pagination::resolve(
                inner
                    .index
                    .range((Bound::Excluded(IndexKey(max_id.clone())), Bound::Unbounded))
                    .map(|(_, entry)| entry),
                cursor,
            ),
            None => pagination::resolve(inner.index.values(), cursor),
        }
    }
    /// The oldest indexed status, if any
    pub fn oldest_id(&self) -> Option<StatusId> {
        self.inner
            .read()
            .expect("Poisoned timeline lock!")
            .index
            .last_key_value()
            .map(|(IndexKey(id), _)| id.clone())
    }
    /// The newest indexed status, if any
    pub fn newest_id(&self) -> Option<StatusId> {
        self.inner
            .read()
            .expect("Poisoned timeline lock!")
            .index
            .first_key_value()
            .map(|(IndexKey(id), _)| id.clone())
    }
    /// The number of indexed entries
    pub fn len(&self) -> usize {
        self.inner.read().expect("Poisoned timeline lock!").index.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// The number of prepared entries
    pub fn prepared_len(&self) -> usize {
        self.inner
            .read()
            .expect("Poisoned timeline lock!")
            .prepared
            .len()
    }
    pub fn is_indexed(&self, id: &StatusId) -> bool {
        self.inner
            .read()
            .expect("Poisoned timeline lock!")
            .index
            .contains_key(&IndexKey(id.clone()))
    }
    pub fn is_prepared(&self, id: &StatusId) -> bool {
        self.inner
            .read()
            .expect("Poisoned timeline lock!")
            .prepared
            .contains_key(id)
    }
    /// The prepared form of `id`, if we have one
    pub fn prepared(&self, id: &StatusId) -> Option<StatusView> {
        self.inner
            .read()
            .expect("Poisoned timeline lock!")
            .prepared
            .get(id)
            .map(|entry| entry.rendered.clone())
    }
    /// Snapshot the index, newest first
    pub fn indexed_ids(&self) -> Vec<StatusId> {
        self.inner
            .read()
            .expect("Poisoned timeline lock!")
            .index
            .keys()
            .map(|IndexKey(id)| id.clone())
            .collect()
    }
    /// Snapshot the prepared set (in no particular order)
    pub fn prepared_ids(&self) -> Vec<StatusId> {
        self.inner
            .read()
            .expect("Poisoned timeline lock!")
            .prepared
            .keys()
            .cloned()
            .collect()
    }
}
