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

//! # The Timeline Manager
//!
//! ## Introduction
//!
//! The [Manager] is the process-wide entry point to the timeline engine. It owns a registry of
//! [Timeline]s, one per viewing account, created the first time anyone touches that account's
//! timeline, and it's the only thing that talks to the collaborators: the status store (for
//! backfill & hydration), the relationship oracle (via the visibility [Filter]) and the renderer.
//!
//! ## Writers
//!
//! Statuses arrive from two directions: pushed in by the posting pipeline & the federation inbox
//! ([ingest](Manager::ingest), [ingest_and_prepare](Manager::ingest_and_prepare)), and pulled in
//! from the store when a timeline is first read or a reader scrolls past what we've indexed
//! ([prepare_x_from_top](Manager::prepare_x_from_top), [index_behind](Manager::index_behind)).
//! Either way, a status must pass the visibility gate before it gets anywhere near a [Timeline].
//!
//! Deletions, blocks & the like fan-out through [remove](Manager::remove) & the `wipe_*` family.
//!
//! ## Locking
//!
//! The registry lock is held only long enough to look-up (or create) a [Timeline]; it's never held
//! while a [Timeline] is mutated, nor across an `.await`. Store, oracle & renderer calls are all
//! made outside any lock, and their results applied to the [Timeline] in a single critical section.
//! Dropping any of these futures part-way through therefore leaves every [Timeline] consistent.

use std::{
    num::NonZero,
    sync::{Arc, Mutex},
};

use futures::prelude::*;
use lru::LruCache;
use snafu::{prelude::*, Backtrace};
use tap::{Pipe, TapFallible};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::Configuration,
    counter_add,
    entities::{AccountId, Status, StatusId},
    gauge_setu,
    metrics::{self, Instruments, Sort},
    pagination::Cursor,
    render::{self, Renderer, StatusView},
    storage::{self, Backend},
    timeline::Timeline,
    visibility::{self, Filter, Oracle},
};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Failed to render status {id}: {source}"))]
    Render {
        id: StatusId,
        source: render::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("The status store failed: {source}"))]
    Store {
        source: storage::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to determine whether {viewer} may see {id}: {source}"))]
    Visibility {
        id: StatusId,
        viewer: AccountId,
        source: visibility::Error,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

inventory::submit! { metrics::Registration::new("timeline.ingest.inserted", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("timeline.ingest.duplicates", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("timeline.ingest.not-visible", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("timeline.removed", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("timeline.backfill.indexed", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("timeline.render.failures", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("timeline.registry.size", Sort::IntegralGauge) }

/// The process-wide registry of home timelines
pub struct Manager {
    config: Configuration,
    storage: Arc<dyn Backend + Send + Sync>,
    filter: Filter,
    renderer: Arc<dyn Renderer + Send + Sync>,
    instruments: Arc<Instruments>,
    timelines: Mutex<LruCache<AccountId, Arc<Timeline>>>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("config", &self.config)
            .field("registered", &self.registered())
            .finish()
    }
}

impl Manager {
    /// Create a [Manager] with an empty registry
    ///
    /// A `max-timelines` of zero means the registry is unbounded.
    pub fn new(
        config: Configuration,
        storage: Arc<dyn Backend + Send + Sync>,
        oracle: Arc<dyn Oracle + Send + Sync>,
        renderer: Arc<dyn Renderer + Send + Sync>,
        instruments: Arc<Instruments>,
    ) -> Manager {
        let timelines = match NonZero::new(config.max_timelines) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Manager {
            config,
            storage,
            filter: Filter::new(oracle),
            renderer,
            instruments,
            timelines: Mutex::new(timelines),
        }
    }
    /// Retrieve `viewer`'s [Timeline], creating it if need be
    fn timeline_for(&self, viewer: &AccountId) -> Arc<Timeline> {
        let mut timelines = self.timelines.lock().expect("Poisoned mutex!");
        let timeline = timelines
            .get_or_insert(viewer.clone(), || {
                debug!("Creating a home timeline for {viewer}");
                Arc::new(Timeline::new(
                    viewer.clone(),
                    self.config.timeline_settings(),
                ))
            })
            .clone();
        gauge_setu!(
            self.instruments,
            "timeline.registry.size",
            timelines.len() as u64,
            &[]
        );
        timeline
    }
    /// Retrieve `viewer`'s [Timeline] if it's been created
    fn existing_timeline(&self, viewer: &AccountId) -> Option<Arc<Timeline>> {
        self.timelines
            .lock()
            .expect("Poisoned mutex!")
            .get(viewer)
            .cloned()
    }
    // Copy out the registry contents so that fan-out operations don't hold the registry lock
    fn snapshot(&self) -> Vec<Arc<Timeline>> {
        self.timelines
            .lock()
            .expect("Poisoned mutex!")
            .iter()
            .map(|(_, timeline)| timeline.clone())
            .collect()
    }
    fn count_ingestion(&self, inserted: bool) {
        if inserted {
            counter_add!(self.instruments, "timeline.ingest.inserted", 1, &[]);
        } else {
            counter_add!(self.instruments, "timeline.ingest.duplicates", 1, &[]);
        }
    }
    async fn is_timelineable(&self, status: &Status, viewer: &AccountId) -> Result<bool> {
        let timelineable = self
            .filter
            .status_home_timelineable(status, viewer)
            .await
            .context(VisibilitySnafu {
                id: status.id.clone(),
                viewer: viewer.clone(),
            })?;
        if !timelineable {
            debug!("{} doesn't belong in {viewer}'s home timeline", status.id);
            counter_add!(self.instruments, "timeline.ingest.not-visible", 1, &[]);
        }
        Ok(timelineable)
    }
    /// Index `status` in `viewer`'s home timeline
    ///
    /// Return true if it was newly indexed, false if `viewer` may not see it (in which case the
    /// timeline isn't touched) or it was already there.
    #[instrument(skip(self, status), fields(status_id = %status.id))]
    pub async fn ingest(&self, status: &Status, viewer: &AccountId) -> Result<bool> {
        if !self.is_timelineable(status, viewer).await? {
            return Ok(false);
        }
        let inserted = self.timeline_for(viewer).ingest(status.into());
        self.count_ingestion(inserted);
        Ok(inserted)
    }
    /// Index `status` in `viewer`'s home timeline, and cache its rendered form
    ///
    /// As [ingest](Manager::ingest), save that the status is rendered before being indexed. If
    /// rendering fails, nothing is indexed & the error is returned.
    #[instrument(skip(self, status), fields(status_id = %status.id))]
    pub async fn ingest_and_prepare(&self, status: &Status, viewer: &AccountId) -> Result<bool> {
        if !self.is_timelineable(status, viewer).await? {
            return Ok(false);
        }
        let rendered = self
            .renderer
            .render(status, viewer)
            .await
            .context(RenderSnafu {
                id: status.id.clone(),
            })?;
        let inserted = self
            .timeline_for(viewer)
            .ingest_and_prepare(status.into(), rendered);
        self.count_ingestion(inserted);
        Ok(inserted)
    }
    /// Fill `viewer`'s home timeline from the newest end of the store
    ///
    /// Walks the store's home timeline candidates newest first, ingesting & preparing those
    /// `viewer` may see, until `amount` new entries have been indexed, the store runs out, or the
    /// timeline fills up.
    #[instrument(skip(self))]
    pub async fn prepare_x_from_top(&self, viewer: &AccountId, amount: usize) -> Result<()> {
        let timeline = self.timeline_for(viewer);
        let indexed = self.backfill(viewer, &timeline, None, amount, true).await?;
        info!("Prepared {indexed} statuses for {viewer}'s home timeline");
        Ok(())
    }
    /// Extend `viewer`'s home timeline into the past
    ///
    /// Index (but don't prepare) up to `amount` statuses older than the oldest currently indexed;
    /// return the number of entries indexed. These entries aren't subject to `max-indexed`
    /// (until the next status arrives at the top of the timeline).
    #[instrument(skip(self))]
    pub async fn index_behind(&self, viewer: &AccountId, amount: usize) -> Result<usize> {
        let timeline = self.timeline_for(viewer);
        let oldest = timeline.oldest_id();
        self.index_older_than(viewer, &timeline, oldest, amount).await
    }
    async fn index_older_than(
        &self,
        viewer: &AccountId,
        timeline: &Timeline,
        max_id: Option<StatusId>,
        amount: usize,
    ) -> Result<usize> {
        self.backfill(viewer, timeline, max_id, amount, false)
            .await
            .tap_ok(|indexed| debug!("Indexed {indexed} older statuses for {viewer}"))
    }
    // With `prepare`, fill from `max_id` down, ingesting & preparing, & stop once the timeline is
    // full. Without, just index, growing the timeline past `max-indexed` if need be.
    async fn backfill(
        &self,
        viewer: &AccountId,
        timeline: &Timeline,
        mut max_id: Option<StatusId>,
        amount: usize,
        prepare: bool,
    ) -> Result<usize> {
        let mut indexed = 0;
        let mut full = false;
        while indexed < amount && !full {
            let page = self
                .storage
                .get_home_timeline(viewer, max_id.as_ref(), amount)
                .await
                .context(StoreSnafu)?;
            let exhausted = page.len() < amount;
            max_id = page.last().map(|status| status.id.clone());

            for status in page {
                if indexed >= amount {
                    break;
                }
                if timeline.is_indexed(&status.id) && (!prepare || timeline.is_prepared(&status.id))
                {
                    continue;
                }
                if prepare && timeline.is_beyond_window(&status.id) {
                    full = true;
                    break;
                }
                match self.filter.status_home_timelineable(&status, viewer).await {
                    Ok(true) => (),
                    Ok(false) => continue,
                    Err(err) => {
                        warn!("Skipping {} while backfilling for {viewer}: {err}", status.id);
                        continue;
                    }
                }
                let inserted = if prepare {
                    match self.renderer.render(&status, viewer).await {
                        Ok(rendered) => timeline.ingest_and_prepare((&status).into(), rendered),
                        Err(err) => {
                            warn!("Failed to render {} for {viewer}: {err}", status.id);
                            counter_add!(self.instruments, "timeline.render.failures", 1, &[]);
                            continue;
                        }
                    }
                } else {
                    timeline.ingest_behind((&status).into())
                };
                if inserted {
                    indexed += 1;
                }
            }

            if exhausted || max_id.is_none() {
                break;
            }
        }
        counter_add!(
            self.instruments,
            "timeline.backfill.indexed",
            indexed as u64,
            &[]
        );
        Ok(indexed)
    }
    /// Serve a page of `viewer`'s home timeline
    ///
    /// `limit` is clamped to the configured maximum page size (and defaulted when `None`). An empty
    /// timeline is first filled from the store; an older-direction page that comes back short
    /// causes one round of [index_behind](Manager::index_behind). Indexed entries that haven't been
    /// prepared are rendered & cached on the way out. Entries whose status has disappeared from the
    /// store, or which can't be rendered even on retry, are left out of the page.
    #[instrument(skip(self))]
    pub async fn home_timeline(
        &self,
        viewer: &AccountId,
        max_id: Option<StatusId>,
        since_id: Option<StatusId>,
        min_id: Option<StatusId>,
        limit: Option<usize>,
        local_only: bool,
    ) -> Result<Vec<StatusView>> {
        let cursor = Cursor {
            max_id,
            since_id,
            min_id,
            limit: self.config.page_size(limit),
            local_only,
        };
        let backfill_amount = self.config.backfill_amount.max(cursor.limit);

        let timeline = self.timeline_for(viewer);
        let mut backfilled = false;
        if timeline.is_empty() {
            self.prepare_x_from_top(viewer, backfill_amount).await?;
            backfilled = true;
        }

        let mut ids = timeline.page(&cursor);
        if ids.len() < cursor.limit && cursor.is_backward() && !backfilled {
            // The reader may already be past the oldest entry we hold (if it's been trimmed since
            // their last page), in which case there's no point re-indexing what lies in between.
            let behind = match (&cursor.max_id, timeline.oldest_id()) {
                (Some(max_id), Some(oldest)) if *max_id < oldest => Some(max_id.clone()),
                (_, oldest) => oldest,
            };
            if self
                .index_older_than(viewer, &timeline, behind, backfill_amount)
                .await?
                > 0
            {
                ids = timeline.page(&cursor);
            }
        }

        let timeline: &Timeline = &timeline;
        stream::iter(ids)
            .then(|id| self.hydrate(timeline, viewer, id))
            .collect::<Vec<Result<Option<StatusView>>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<Option<StatusView>>>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<StatusView>>()
            .pipe(Ok)
    }
    // Produce the prepared form of `id`, rendering & caching it if need be
    async fn hydrate(
        &self,
        timeline: &Timeline,
        viewer: &AccountId,
        id: StatusId,
    ) -> Result<Option<StatusView>> {
        if let Some(rendered) = timeline.prepared(&id) {
            return Ok(Some(rendered));
        }
        let status = match self.storage.get_status(&id).await.context(StoreSnafu)? {
            Some(status) => status,
            None => {
                let removed = timeline.remove(&id);
                info!("{id} has disappeared from the store; dropped {removed} entries");
                counter_add!(self.instruments, "timeline.removed", removed as u64, &[]);
                return Ok(None);
            }
        };
        match self.render_with_retry(&status, viewer).await {
            Some(rendered) => {
                timeline.prepare(&id, rendered);
                // Someone else may have prepared (or removed) it in the meantime
                Ok(timeline.prepared(&id))
            }
            None => Ok(None),
        }
    }
    async fn render_with_retry(&self, status: &Status, viewer: &AccountId) -> Option<StatusView> {
        for attempt in 1..=2 {
            match self.renderer.render(status, viewer).await {
                Ok(rendered) => return Some(rendered),
                Err(err) => {
                    warn!(
                        "Failed to render {} for {viewer} (attempt {attempt}): {err}",
                        status.id
                    );
                    counter_add!(self.instruments, "timeline.render.failures", 1, &[]);
                }
            }
        }
        None
    }
    /// The number of entries indexed in `viewer`'s home timeline
    pub fn get_indexed_length(&self, viewer: &AccountId) -> usize {
        self.timeline_for(viewer).len()
    }
    /// The oldest status indexed in `viewer`'s home timeline, if any
    pub fn get_oldest_indexed_id(&self, viewer: &AccountId) -> Option<StatusId> {
        self.timeline_for(viewer).oldest_id()
    }
    /// Remove `status_id` from `viewer`'s home timeline
    ///
    /// Return the number of deletions performed (zero, one or two); see [Timeline::remove].
    #[instrument(skip(self))]
    pub async fn remove(&self, viewer: &AccountId, status_id: &StatusId) -> Result<usize> {
        let removed = self
            .existing_timeline(viewer)
            .map_or(0, |timeline| timeline.remove(status_id));
        counter_add!(self.instruments, "timeline.removed", removed as u64, &[]);
        Ok(removed)
    }
    /// Remove `status_id` (along with any boosts of it) from every home timeline
    ///
    /// This is what happens when a status is deleted.
    #[instrument(skip(self))]
    pub async fn wipe_status_from_all_timelines(&self, status_id: &StatusId) -> Result<()> {
        let removed = self
            .snapshot()
            .into_iter()
            .map(|timeline| timeline.remove_with_boosts(status_id))
            .sum::<usize>();
        counter_add!(self.instruments, "timeline.removed", removed as u64, &[]);
        info!("Wiped {status_id} from all timelines ({removed} deletions)");
        Ok(())
    }
    /// Remove everything by `author` (including boosts of `author`'s statuses) from `viewer`'s home
    /// timeline
    ///
    /// This is what happens when `viewer` blocks, mutes or unfollows `author`.
    #[instrument(skip(self))]
    pub async fn wipe_statuses_from_account_id(
        &self,
        viewer: &AccountId,
        author: &AccountId,
    ) -> Result<()> {
        let removed = self
            .existing_timeline(viewer)
            .map_or(0, |timeline| timeline.remove_all_by(author));
        counter_add!(self.instruments, "timeline.removed", removed as u64, &[]);
        debug!("Wiped {removed} entries by {author} from {viewer}'s home timeline");
        Ok(())
    }
    /// Remove everything by `author` from every home timeline
    ///
    /// For account deletion & de-federation.
    #[instrument(skip(self))]
    pub async fn wipe_account_from_all_timelines(&self, author: &AccountId) -> Result<()> {
        let removed = self
            .snapshot()
            .into_iter()
            .map(|timeline| timeline.remove_all_by(author))
            .sum::<usize>();
        counter_add!(self.instruments, "timeline.removed", removed as u64, &[]);
        info!("Wiped {author} from all timelines ({removed} deletions)");
        Ok(())
    }
    /// Re-render `status` for `viewer`, replacing any cached form
    ///
    /// For use after an edit (or a change in, say, boost counts). Return true if `viewer`'s home
    /// timeline had `status` indexed (and so was refreshed).
    #[instrument(skip(self, status), fields(status_id = %status.id))]
    pub async fn refresh(&self, status: &Status, viewer: &AccountId) -> Result<bool> {
        let timeline = match self.existing_timeline(viewer) {
            Some(timeline) if timeline.is_indexed(&status.id) => timeline,
            _ => return Ok(false),
        };
        let rendered = self
            .renderer
            .render(status, viewer)
            .await
            .context(RenderSnafu {
                id: status.id.clone(),
            })?;
        Ok(timeline.refresh_prepared(&status.id, rendered))
    }
    /// Drop `viewer`'s home timeline altogether; return true if there was one
    pub fn forget(&self, viewer: &AccountId) -> bool {
        let mut timelines = self.timelines.lock().expect("Poisoned mutex!");
        let forgotten = timelines.pop(viewer).is_some();
        gauge_setu!(
            self.instruments,
            "timeline.registry.size",
            timelines.len() as u64,
            &[]
        );
        forgotten
    }
    /// The number of home timelines currently in memory
    pub fn registered(&self) -> usize {
        self.timelines.lock().expect("Poisoned mutex!").len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::{entities::Visibility, memory::Memory};

    const VIEWER: &str = "01F8MH1H7YV1Z7D2C8K2730QBF";
    const FRIEND: &str = "01F8MH5NBDF2MV7CTC4Q5128HF";
    const STRANGER: &str = "01F8MH5ZK5VRH73AKHQM6Y9VNX";

    // Five statuses by `FRIEND`, oldest first
    const STATUSES: [&str; 5] = [
        "01F8MH75CBF9JFX4ZAD54N0W0R",
        "01F8MH82FYRXD2RC6108DAJ5HB",
        "01F8MHAAY43M6RJ473VQFCVH37",
        "01F8MHAMCHF6Y650WCRSCP4WMY",
        "01F8MHAYFKS4KMXF8K5Y1C0KRN",
    ];

    fn account(text: &str) -> AccountId {
        AccountId::new(text).unwrap()
    }

    fn status(id: &str, author: &str, visibility: Visibility) -> Status {
        Status::new(
            StatusId::new(id).unwrap(),
            account(author),
            true,
            visibility,
            "Hello, world!",
        )
    }

    fn fixture(config: Configuration) -> (Arc<Memory>, Arc<Manager>) {
        let memory = Arc::new(Memory::new());
        memory.follow(&account(VIEWER), &account(FRIEND));
        for id in STATUSES {
            memory.add_status(status(id, FRIEND, Visibility::Public));
        }
        let manager = Manager::new(
            config,
            memory.clone(),
            memory.clone(),
            memory.clone(),
            Arc::new(Instruments::new("indiefeed")),
        );
        (memory, Arc::new(manager))
    }

    fn ids(views: &[StatusView]) -> Vec<&str> {
        views.iter().map(|view| view.id.as_ref()).collect()
    }

    #[tokio::test]
    async fn test_visibility_gate() {
        let (_, manager) = fixture(Configuration::default());
        let viewer = account(VIEWER);

        let private = status(
            "01F8MHBBN8120SYH7D5S050MGK",
            STRANGER,
            Visibility::FollowersOnly,
        );
        assert!(!manager.ingest(&private, &viewer).await.unwrap());
        assert!(!manager.ingest_and_prepare(&private, &viewer).await.unwrap());
        assert_eq!(manager.get_indexed_length(&viewer), 0);

        let public = status(STATUSES[0], FRIEND, Visibility::Public);
        assert!(manager.ingest(&public, &viewer).await.unwrap());
        assert!(!manager.ingest(&public, &viewer).await.unwrap());
        assert_eq!(manager.get_indexed_length(&viewer), 1);
        assert_eq!(
            manager.get_oldest_indexed_id(&viewer).unwrap().as_ref(),
            STATUSES[0]
        );
        // Our own reply to someone we don't follow still lands in our own timeline
        let reply = status("01F8MHBQCBTDKN6X5VHGMMN4MA", VIEWER, Visibility::Public)
            .in_reply_to(account(STRANGER));
        assert!(manager.ingest(&reply, &viewer).await.unwrap());
        assert_eq!(manager.get_indexed_length(&viewer), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ingestion() {
        let (_, manager) = fixture(Configuration::default());
        let viewer = account(VIEWER);
        let s = status(STATUSES[2], FRIEND, Visibility::Public);

        let handles = (0..16)
            .map(|i| {
                let manager = manager.clone();
                let viewer = viewer.clone();
                let s = s.clone();
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        manager.ingest(&s, &viewer).await
                    } else {
                        manager.ingest_and_prepare(&s, &viewer).await
                    }
                })
            })
            .collect::<Vec<_>>();
        let inserted = future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .filter(|inserted| *inserted)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(manager.get_indexed_length(&viewer), 1);
        assert_eq!(manager.registered(), 1);
    }

    #[tokio::test]
    async fn test_backfill() {
        let (memory, manager) = fixture(Configuration {
            backfill_amount: 2,
            ..Default::default()
        });
        let viewer = account(VIEWER);

        // The timeline is empty, so it's filled from the top
        let page = manager
            .home_timeline(&viewer, None, None, None, Some(2), false)
            .await
            .unwrap();
        assert_eq!(ids(&page), vec![STATUSES[4], STATUSES[3]]);
        assert_eq!(manager.get_indexed_length(&viewer), 2);
        assert_eq!(memory.render_count(), 2);

        // Scrolling past what we've got indexes more
        let page = manager
            .home_timeline(
                &viewer,
                Some(StatusId::new(STATUSES[3]).unwrap()),
                None,
                None,
                Some(2),
                false,
            )
            .await
            .unwrap();
        assert_eq!(ids(&page), vec![STATUSES[2], STATUSES[1]]);
        assert_eq!(manager.get_indexed_length(&viewer), 4);

        let page = manager
            .home_timeline(
                &viewer,
                Some(StatusId::new(STATUSES[1]).unwrap()),
                None,
                None,
                Some(2),
                false,
            )
            .await
            .unwrap();
        assert_eq!(ids(&page), vec![STATUSES[0]]);

        // Nothing more to be had
        let page = manager
            .home_timeline(
                &viewer,
                Some(StatusId::new(STATUSES[0]).unwrap()),
                None,
                None,
                Some(2),
                false,
            )
            .await
            .unwrap();
        assert!(page.is_empty());
        assert_eq!(manager.get_indexed_length(&viewer), 5);

        // Serving from the cache doesn't render again
        let renders = memory.render_count();
        let page = manager
            .home_timeline(&viewer, None, None, None, None, false)
            .await
            .unwrap();
        assert_eq!(page.len(), 5);
        assert_eq!(memory.render_count(), renders);
    }

    #[tokio::test]
    async fn test_forward_pages() {
        let (_, manager) = fixture(Configuration::default());
        let viewer = account(VIEWER);
        manager.prepare_x_from_top(&viewer, 20).await.unwrap();
        assert_eq!(manager.get_indexed_length(&viewer), 5);

        let page = manager
            .home_timeline(
                &viewer,
                None,
                None,
                Some(StatusId::new(STATUSES[1]).unwrap()),
                Some(2),
                false,
            )
            .await
            .unwrap();
        assert_eq!(ids(&page), vec![STATUSES[3], STATUSES[2]]);

        let page = manager
            .home_timeline(
                &viewer,
                None,
                Some(StatusId::new(STATUSES[1]).unwrap()),
                None,
                Some(2),
                false,
            )
            .await
            .unwrap();
        assert_eq!(ids(&page), vec![STATUSES[4], STATUSES[3]]);
    }

    #[tokio::test]
    async fn test_render_failures() {
        let (memory, manager) = fixture(Configuration::default());
        let viewer = account(VIEWER);
        let flaky = status(STATUSES[3], FRIEND, Visibility::Public);
        let broken = status(STATUSES[4], FRIEND, Visibility::Public);

        // Rendering failures at ingestion time are errors...
        memory.fail_renders(&broken.id, 1);
        assert!(matches!(
            manager.ingest_and_prepare(&broken, &viewer).await,
            Err(Error::Render { .. })
        ));
        assert_eq!(manager.get_indexed_length(&viewer), 0);

        // while at read time, we retry once & then give up on that entry
        assert!(manager.ingest(&flaky, &viewer).await.unwrap());
        assert!(manager.ingest(&broken, &viewer).await.unwrap());
        memory.fail_renders(&flaky.id, 1);
        memory.fail_renders(&broken.id, 2);
        let page = manager
            .home_timeline(&viewer, None, None, None, Some(2), false)
            .await
            .unwrap();
        assert_eq!(ids(&page), vec![STATUSES[3]]);
        // The unrenderable entry stays indexed, to be tried again next time
        assert_eq!(manager.get_indexed_length(&viewer), 2);
        let page = manager
            .home_timeline(&viewer, None, None, None, Some(2), false)
            .await
            .unwrap();
        assert_eq!(ids(&page), vec![STATUSES[4], STATUSES[3]]);
    }

    #[tokio::test]
    async fn test_collaborator_failures() {
        let (memory, manager) = fixture(Configuration::default());
        let viewer = account(VIEWER);
        let s = status(STATUSES[0], FRIEND, Visibility::Public);

        memory.set_oracle_down(true);
        assert!(matches!(
            manager.ingest(&s, &viewer).await,
            Err(Error::Visibility { .. })
        ));
        memory.set_oracle_down(false);

        memory.set_store_down(true);
        assert!(matches!(
            manager.prepare_x_from_top(&viewer, 20).await,
            Err(Error::Store { .. })
        ));
        assert!(matches!(
            manager
                .home_timeline(&viewer, None, None, None, None, false)
                .await,
            Err(Error::Store { .. })
        ));
        memory.set_store_down(false);
        assert_eq!(manager.get_indexed_length(&viewer), 0);
    }

    #[tokio::test]
    async fn test_vanished_status() {
        let (memory, manager) = fixture(Configuration::default());
        let viewer = account(VIEWER);
        let doomed = status(STATUSES[4], FRIEND, Visibility::Public);
        let survivor = status(STATUSES[3], FRIEND, Visibility::Public);
        assert!(manager.ingest(&doomed, &viewer).await.unwrap());
        assert!(manager.ingest(&survivor, &viewer).await.unwrap());

        memory.remove_status(&doomed.id);
        let page = manager
            .home_timeline(&viewer, None, None, None, Some(1), false)
            .await
            .unwrap();
        assert!(page.is_empty());
        assert_eq!(manager.get_indexed_length(&viewer), 1);
        let page = manager
            .home_timeline(&viewer, None, None, None, Some(1), false)
            .await
            .unwrap();
        assert_eq!(ids(&page), vec![STATUSES[3]]);
    }

    #[tokio::test]
    async fn test_wipes() {
        let (memory, manager) = fixture(Configuration::default());
        let viewer = account(VIEWER);
        let friend = account(FRIEND);
        memory.follow(&friend, &viewer);
        let mine = status("01F8MHBBN8120SYH7D5S050MGK", VIEWER, Visibility::Public);
        memory.add_status(mine.clone());

        manager.prepare_x_from_top(&viewer, 20).await.unwrap();
        manager.prepare_x_from_top(&friend, 20).await.unwrap();
        assert_eq!(manager.get_indexed_length(&viewer), 6);
        assert_eq!(manager.get_indexed_length(&friend), 6);

        manager
            .wipe_status_from_all_timelines(&mine.id)
            .await
            .unwrap();
        assert_eq!(manager.get_indexed_length(&viewer), 5);
        assert_eq!(manager.get_indexed_length(&friend), 5);

        // Scoped to the one viewer
        manager
            .wipe_statuses_from_account_id(&viewer, &friend)
            .await
            .unwrap();
        assert_eq!(manager.get_indexed_length(&viewer), 0);
        assert_eq!(manager.get_indexed_length(&friend), 5);

        manager
            .wipe_account_from_all_timelines(&friend)
            .await
            .unwrap();
        assert_eq!(manager.get_indexed_length(&friend), 0);

        // Prepared & indexed: two deletions; gone: none
        let s = status(STATUSES[0], FRIEND, Visibility::Public);
        assert!(manager.ingest_and_prepare(&s, &viewer).await.unwrap());
        assert_eq!(manager.remove(&viewer, &s.id).await.unwrap(), 2);
        assert_eq!(manager.remove(&viewer, &s.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scrolling_past_the_window() {
        let (memory, manager) = fixture(Configuration {
            max_indexed: 2,
            backfill_amount: 2,
            ..Default::default()
        });
        let viewer = account(VIEWER);
        let page_before = |max_id: &str| {
            let manager = manager.clone();
            let viewer = viewer.clone();
            let max_id = StatusId::new(max_id).unwrap();
            async move {
                manager
                    .home_timeline(&viewer, Some(max_id), None, None, Some(2), false)
                    .await
                    .unwrap()
            }
        };

        let page = manager
            .home_timeline(&viewer, None, None, None, Some(2), false)
            .await
            .unwrap();
        assert_eq!(ids(&page), vec![STATUSES[4], STATUSES[3]]);
        assert_eq!(manager.get_indexed_length(&viewer), 2);

        // Older history is indexed on demand, past `max-indexed`
        assert_eq!(
            ids(&page_before(STATUSES[3]).await),
            vec![STATUSES[2], STATUSES[1]]
        );
        assert_eq!(ids(&page_before(STATUSES[1]).await), vec![STATUSES[0]]);
        assert!(page_before(STATUSES[0]).await.is_empty());
        assert_eq!(manager.get_indexed_length(&viewer), 5);

        // A new arrival at the top trims the timeline back down...
        let newest = status("01F8MHBBN8120SYH7D5S050MGK", FRIEND, Visibility::Public);
        memory.add_status(newest.clone());
        assert!(manager.ingest(&newest, &viewer).await.unwrap());
        assert_eq!(manager.get_indexed_length(&viewer), 2);
        assert_eq!(
            manager.get_oldest_indexed_id(&viewer).unwrap().as_ref(),
            STATUSES[4]
        );

        // but a reader still holding a cursor from before is served from the store
        assert_eq!(
            ids(&page_before(STATUSES[3]).await),
            vec![STATUSES[2], STATUSES[1]]
        );
        let page = manager
            .home_timeline(&viewer, None, None, None, Some(2), false)
            .await
            .unwrap();
        assert_eq!(ids(&page), vec!["01F8MHBBN8120SYH7D5S050MGK", STATUSES[4]]);
    }

    #[tokio::test]
    async fn test_boosts() {
        let (memory, manager) = fixture(Configuration::default());
        let viewer = account(VIEWER);
        let original = status(STATUSES[0], STRANGER, Visibility::Public);
        let boost = status(STATUSES[1], FRIEND, Visibility::Public).boosting(&original);
        memory.add_status(original.clone());
        memory.add_status(boost.clone());
        // `VIEWER` follows the booster, but not the original's author
        assert!(!manager.ingest(&original, &viewer).await.unwrap());

        // A fresh boost is indexed exactly once
        assert!(manager.ingest_and_prepare(&boost, &viewer).await.unwrap());
        assert!(!manager.ingest_and_prepare(&boost, &viewer).await.unwrap());
        assert_eq!(manager.get_indexed_length(&viewer), 1);

        // Removing the original from one timeline leaves its boost be...
        assert_eq!(manager.remove(&viewer, &original.id).await.unwrap(), 0);
        assert_eq!(manager.remove(&viewer, &boost.id).await.unwrap(), 2);
        assert!(manager.ingest_and_prepare(&boost, &viewer).await.unwrap());

        // while deleting it takes the boost along
        manager
            .wipe_status_from_all_timelines(&original.id)
            .await
            .unwrap();
        assert_eq!(manager.get_indexed_length(&viewer), 0);
    }

    #[tokio::test]
    async fn test_refresh() {
        let (memory, manager) = fixture(Configuration::default());
        let viewer = account(VIEWER);
        let mut s = status(STATUSES[0], FRIEND, Visibility::Public);
        assert!(!manager.refresh(&s, &viewer).await.unwrap());
        assert!(manager.ingest_and_prepare(&s, &viewer).await.unwrap());

        s.content = "Hello, edited world!".to_owned();
        memory.add_status(s.clone());
        assert!(manager.refresh(&s, &viewer).await.unwrap());
        let page = manager
            .home_timeline(&viewer, None, None, None, None, false)
            .await
            .unwrap();
        assert_eq!(page[0].content, "Hello, edited world!");
    }

    #[tokio::test]
    async fn test_registry() {
        let (_, manager) = fixture(Configuration {
            max_timelines: 1,
            ..Default::default()
        });
        let viewer = account(VIEWER);
        let friend = account(FRIEND);
        manager.prepare_x_from_top(&viewer, 20).await.unwrap();
        assert_eq!(manager.get_indexed_length(&viewer), 5);

        // Touching `friend`'s timeline evicts `viewer`'s
        assert_eq!(manager.get_indexed_length(&friend), 0);
        assert_eq!(manager.registered(), 1);
        assert_eq!(manager.get_indexed_length(&viewer), 0);

        assert!(manager.forget(&viewer));
        assert!(!manager.forget(&viewer));
        assert_eq!(manager.registered(), 0);
    }
}
