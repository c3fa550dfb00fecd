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

//! # In-memory collaborators
//!
//! [Memory] is a status store, relationship oracle & renderer all in one, kept entirely in
//! process. It's what the tests run against, and it's enough to embed the timeline engine in a
//! small deployment that has no database.
//!
//! It also supports fault injection: the store & the oracle can be "taken down", and rendering can
//! be made to fail for particular statuses a given number of times.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        RwLock,
    },
};

use async_trait::async_trait;
use snafu::{Backtrace, Snafu};
use tracing::debug;

use crate::{
    entities::{AccountId, Status, StatusId},
    render::{self, Renderer, StatusView},
    storage::{self, Backend},
    visibility::{self, Oracle, Relationship},
};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("The status store is unavailable"))]
    StoreUnavailable { backtrace: Backtrace },
    #[snafu(display("The relationship oracle is unavailable"))]
    OracleUnavailable { backtrace: Backtrace },
    #[snafu(display("Failed to render status {id}"))]
    RenderFailed { id: StatusId, backtrace: Backtrace },
}

#[derive(Debug, Default)]
struct State {
    statuses: BTreeMap<StatusId, Status>,
    // (follower, followee)
    follows: HashSet<(AccountId, AccountId)>,
    // (blocker, blockee)
    blocks: HashSet<(AccountId, AccountId)>,
    // (muter, mutee)
    mutes: HashSet<(AccountId, AccountId)>,
}

impl State {
    fn follows(&self, follower: &AccountId, followee: &AccountId) -> bool {
        self.follows.contains(&(follower.clone(), followee.clone()))
    }
    fn blocks(&self, blocker: &AccountId, blockee: &AccountId) -> bool {
        self.blocks.contains(&(blocker.clone(), blockee.clone()))
    }
    fn mutes(&self, muter: &AccountId, mutee: &AccountId) -> bool {
        self.mutes.contains(&(muter.clone(), mutee.clone()))
    }
    fn view_of(&self, status: &Status) -> StatusView {
        StatusView {
            id: status.id.clone(),
            account: status.author.clone(),
            content: status.content.clone(),
            visibility: status.visibility,
            created_at: status.created_at,
            local: status.local,
            reblog: status
                .boost_of
                .as_ref()
                .and_then(|boost| self.statuses.get(&boost.id))
                .map(|boosted| Box::new(self.view_of(boosted))),
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    store_down: bool,
    oracle_down: bool,
    // Status => number of times rendering it should still fail
    render_failures: HashMap<StatusId, usize>,
}

/// In-memory status store, relationship oracle & renderer
#[derive(Debug, Default)]
pub struct Memory {
    state: RwLock<State>,
    faults: RwLock<Faults>,
    renders: AtomicUsize,
}

impl Memory {
    pub fn new() -> Memory {
        Memory::default()
    }
    /// Add (or replace) a status
    pub fn add_status(&self, status: Status) {
        self.state
            .write()
            .expect("Poisoned lock!")
            .statuses
            .insert(status.id.clone(), status);
    }
    /// Delete a status from the store; return it if it was there
    pub fn remove_status(&self, id: &StatusId) -> Option<Status> {
        self.state.write().expect("Poisoned lock!").statuses.remove(id)
    }
    pub fn follow(&self, follower: &AccountId, followee: &AccountId) {
        self.state
            .write()
            .expect("Poisoned lock!")
            .follows
            .insert((follower.clone(), followee.clone()));
    }
    pub fn unfollow(&self, follower: &AccountId, followee: &AccountId) {
        self.state
            .write()
            .expect("Poisoned lock!")
            .follows
            .remove(&(follower.clone(), followee.clone()));
    }
    pub fn block(&self, blocker: &AccountId, blockee: &AccountId) {
        self.state
            .write()
            .expect("Poisoned lock!")
            .blocks
            .insert((blocker.clone(), blockee.clone()));
    }
    pub fn mute(&self, muter: &AccountId, mutee: &AccountId) {
        self.state
            .write()
            .expect("Poisoned lock!")
            .mutes
            .insert((muter.clone(), mutee.clone()));
    }
    /// Make every subsequent store call fail (or succeed again)
    pub fn set_store_down(&self, down: bool) {
        self.faults.write().expect("Poisoned lock!").store_down = down;
    }
    /// Make every subsequent oracle call fail (or succeed again)
    pub fn set_oracle_down(&self, down: bool) {
        self.faults.write().expect("Poisoned lock!").oracle_down = down;
    }
    /// Fail the next `times` attempts to render `id`
    pub fn fail_renders(&self, id: &StatusId, times: usize) {
        self.faults
            .write()
            .expect("Poisoned lock!")
            .render_failures
            .insert(id.clone(), times);
    }
    /// The number of render attempts made so far (failed ones included)
    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for Memory {
    async fn get_status(&self, id: &StatusId) -> Result<Option<Status>, storage::Error> {
        if self.faults.read().expect("Poisoned lock!").store_down {
            return Err(storage::Error::new(StoreUnavailableSnafu.build()));
        }
        Ok(self
            .state
            .read()
            .expect("Poisoned lock!")
            .statuses
            .get(id)
            .cloned())
    }

    async fn get_home_timeline(
        &self,
        viewer: &AccountId,
        max_id: Option<&StatusId>,
        limit: usize,
    ) -> Result<Vec<Status>, storage::Error> {
        if self.faults.read().expect("Poisoned lock!").store_down {
            return Err(storage::Error::new(StoreUnavailableSnafu.build()));
        }
        let state = self.state.read().expect("Poisoned lock!");
        let candidates = match max_id {
            Some(max_id) => state
                .statuses
                .range::<StatusId, _>(..max_id)
                .rev()
                .map(|(_, status)| status)
                .filter(|status| status.author == *viewer || state.follows(viewer, &status.author))
                .take(limit)
                .cloned()
                .collect::<Vec<Status>>(),
            None => state
                .statuses
                .values()
                .rev()
                .filter(|status| status.author == *viewer || state.follows(viewer, &status.author))
                .take(limit)
                .cloned()
                .collect::<Vec<Status>>(),
        };
        debug!(
            "Found {} home timeline candidates for {viewer} (max_id: {max_id:?})",
            candidates.len()
        );
        Ok(candidates)
    }
}

#[async_trait]
impl Oracle for Memory {
    async fn relationship(
        &self,
        viewer: &AccountId,
        other: &AccountId,
    ) -> Result<Relationship, visibility::Error> {
        if self.faults.read().expect("Poisoned lock!").oracle_down {
            return Err(visibility::Error::new(OracleUnavailableSnafu.build()));
        }
        let state = self.state.read().expect("Poisoned lock!");
        Ok(Relationship {
            following: state.follows(viewer, other),
            followed_by: state.follows(other, viewer),
            blocking: state.blocks(viewer, other),
            blocked_by: state.blocks(other, viewer),
            muting: state.mutes(viewer, other),
        })
    }
}

#[async_trait]
impl Renderer for Memory {
    async fn render(
        &self,
        status: &Status,
        _viewer: &AccountId,
    ) -> Result<StatusView, render::Error> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        {
            let mut faults = self.faults.write().expect("Poisoned lock!");
            if let Some(remaining) = faults.render_failures.get_mut(&status.id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(render::Error::new(
                        RenderFailedSnafu {
                            id: status.id.clone(),
                        }
                        .build(),
                    ));
                }
            }
        }
        Ok(self.state.read().expect("Poisoned lock!").view_of(status))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::entities::Visibility;

    fn account(text: &str) -> AccountId {
        AccountId::new(text).unwrap()
    }

    fn status(id: &str, author: &AccountId) -> Status {
        Status::new(
            StatusId::new(id).unwrap(),
            author.clone(),
            true,
            Visibility::Public,
            "Hello, world!",
        )
    }

    #[tokio::test]
    async fn test_home_timeline_candidates() {
        let viewer = account("01F8MH1H7YV1Z7D2C8K2730QBF");
        let followed = account("01F8MH5NBDF2MV7CTC4Q5128HF");
        let stranger = account("01F8MH5ZK5VRH73AKHQM6Y9VNX");
        let memory = Memory::new();
        memory.follow(&viewer, &followed);
        memory.add_status(status("01F8MH75CBF9JFX4ZAD54N0W0R", &viewer));
        memory.add_status(status("01F8MH82FYRXD2RC6108DAJ5HB", &followed));
        memory.add_status(status("01F8MHAAY43M6RJ473VQFCVH37", &stranger));
        memory.add_status(status("01F8MHAMCHF6Y650WCRSCP4WMY", &followed));

        let ids = memory
            .get_home_timeline(&viewer, None, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|status| status.id.to_string())
            .collect::<Vec<String>>();
        assert_eq!(
            ids,
            vec![
                "01F8MHAMCHF6Y650WCRSCP4WMY",
                "01F8MH82FYRXD2RC6108DAJ5HB",
                "01F8MH75CBF9JFX4ZAD54N0W0R"
            ]
        );

        let max_id = StatusId::new("01F8MHAMCHF6Y650WCRSCP4WMY").unwrap();
        let page = memory
            .get_home_timeline(&viewer, Some(&max_id), 1)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id.as_ref(), "01F8MH82FYRXD2RC6108DAJ5HB");
    }

    #[tokio::test]
    async fn test_faults() {
        let viewer = account("01F8MH1H7YV1Z7D2C8K2730QBF");
        let other = account("01F8MH5NBDF2MV7CTC4Q5128HF");
        let memory = Memory::new();
        let s = status("01F8MH75CBF9JFX4ZAD54N0W0R", &other);
        memory.add_status(s.clone());

        memory.set_store_down(true);
        assert!(memory.get_status(&s.id).await.is_err());
        memory.set_store_down(false);
        assert!(memory.get_status(&s.id).await.unwrap().is_some());

        memory.set_oracle_down(true);
        assert!(memory.relationship(&viewer, &other).await.is_err());
        memory.set_oracle_down(false);
        memory.follow(&viewer, &other);
        let rel = memory.relationship(&viewer, &other).await.unwrap();
        assert!(rel.following && !rel.followed_by);

        memory.fail_renders(&s.id, 1);
        assert!(memory.render(&s, &viewer).await.is_err());
        assert_eq!(memory.render(&s, &viewer).await.unwrap().id, s.id);
        assert_eq!(memory.render_count(), 2);
    }

    #[tokio::test]
    async fn test_render_boost() {
        let viewer = account("01F8MH1H7YV1Z7D2C8K2730QBF");
        let other = account("01F8MH5NBDF2MV7CTC4Q5128HF");
        let memory = Memory::new();
        let original = status("01F8MH75CBF9JFX4ZAD54N0W0R", &other);
        let boost = status("01F8MH82FYRXD2RC6108DAJ5HB", &viewer).boosting(&original);
        memory.add_status(original.clone());
        memory.add_status(boost.clone());

        let view = memory.render(&boost, &viewer).await.unwrap();
        assert_eq!(view.account, viewer);
        assert_eq!(view.reblog.unwrap().id, original.id);
    }
}
