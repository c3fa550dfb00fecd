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

//! # The indiefeed Integration Tests
//!
//! # Introduction
//!
//! As with the unit tests, these run against the in-memory collaborators in [indiefeed::memory],
//! but against a larger, fixed population of accounts & statuses (the [Fixture]), and through the
//! [Manager] only.
//!
//! # Project Structure
//!
//! This crate produces a library (this one) and an integration test program. The tests themselves
//! live in [timelines], as `async` functions returning `Result<(), Failed>`; the test program in
//! `tests/` registers them with the harness & supplies the runtime on which they run. Code relating
//! to the test framework itself (the `Test` struct, the test configuration) belongs in
//! `tests/common`.
//!
//! # The Fixture
//!
//! Four accounts, three local & one remote. `local_account_1` follows `admin_account` &
//! `local_account_2`, and `local_account_2` follows `local_account_1` back. Nobody follows
//! `remote_account_1`, and `admin_account` follows nobody.
//!
//! Fifteen statuses are home-timeline candidates for `local_account_1` (written by itself or by
//! the accounts it follows), of which twelve are visible to it. The other three are two direct
//! messages not addressed to it and one mutuals-only status from `admin_account`.

use std::{collections::HashMap, sync::Arc};

use indiefeed::{
    config::Configuration,
    entities::{self, AccountId, Status, StatusId, Visibility},
    manager::Manager,
    memory::Memory,
    metrics::Instruments,
};
use snafu::{prelude::*, Backtrace};

pub mod timelines;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Bad fixture identifier: {source}"))]
    BadId {
        source: entities::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("{name} does not name a fixture account"))]
    NoSuchAccount { name: String, backtrace: Backtrace },
    #[snafu(display("{name} does not name a fixture status"))]
    NoSuchStatus { name: String, backtrace: Backtrace },
}

type Result<T> = std::result::Result<T, Error>;

// (name, ID, local)
const ACCOUNTS: [(&str, &str, bool); 4] = [
    ("admin_account", "01F8MH17FWEB39HZJ76B6VXSKF", true),
    ("local_account_1", "01F8MH1H7YV1Z7D2C8K2730QBF", true),
    ("local_account_2", "01F8MH5NBDF2MV7CTC4Q5128HF", true),
    ("remote_account_1", "01F8MH5ZK5VRH73AKHQM6Y9VNX", false),
];

// (follower, followee)
const FOLLOWS: [(&str, &str); 3] = [
    ("local_account_1", "admin_account"),
    ("local_account_1", "local_account_2"),
    ("local_account_2", "local_account_1"),
];

// (name, ID, author, visibility, mentions)
const STATUSES: [(&str, &str, &str, Visibility, &[&str]); 16] = [
    (
        "admin_account_status_1",
        "01F8MH75CBF9JFX4ZAD54N0W0R",
        "admin_account",
        Visibility::Public,
        &[],
    ),
    (
        "admin_account_status_2",
        "01F8MH7TDVANYKWVE8VVKFPJTJ",
        "admin_account",
        Visibility::Direct,
        &["local_account_2"],
    ),
    (
        "local_account_1_status_1",
        "01F8MH82FYRXD2RC6108DAJ5HB",
        "local_account_1",
        Visibility::Public,
        &[],
    ),
    (
        "admin_account_status_3",
        "01F8MHAAY43M6RJ473VQFCVH37",
        "admin_account",
        Visibility::Public,
        &[],
    ),
    (
        "local_account_1_status_2",
        "01F8MHAMCHF6Y650WCRSCP4WMY",
        "local_account_1",
        Visibility::Public,
        &[],
    ),
    (
        "local_account_1_status_3",
        "01F8MHAYFKS4KMXF8K5Y1C0KRN",
        "local_account_1",
        Visibility::Unlisted,
        &[],
    ),
    (
        "local_account_1_status_4",
        "01F8MHBBN8120SYH7D5S050MGK",
        "local_account_1",
        Visibility::MutualsOnly,
        &[],
    ),
    (
        "local_account_2_status_2",
        "01F8MHBGQ1V3NRRCFN6VTVTM4X",
        "local_account_2",
        Visibility::Direct,
        &["admin_account"],
    ),
    (
        "local_account_2_status_1",
        "01F8MHBQCBTDKN6X5VHGMMN4MA",
        "local_account_2",
        Visibility::Public,
        &[],
    ),
    (
        "local_account_2_status_3",
        "01F8MHC0H0A7XHTVH5F596ZKBM",
        "local_account_2",
        Visibility::Unlisted,
        &[],
    ),
    (
        "local_account_2_status_4",
        "01F8MHC8VWDRBQR0N1BATDDEM5",
        "local_account_2",
        Visibility::FollowersOnly,
        &[],
    ),
    (
        "local_account_2_status_5",
        "01F8MHCP5P2NWYQ416SBA0XSEV",
        "local_account_2",
        Visibility::Public,
        &[],
    ),
    (
        "local_account_2_status_6",
        "01F8MHD0N4G9TA3GVCX0ZBYJ0E",
        "local_account_2",
        Visibility::MutualsOnly,
        &[],
    ),
    (
        "local_account_1_status_5",
        "01FCTA44PW9H1TB328S9AQXKDS",
        "local_account_1",
        Visibility::Public,
        &[],
    ),
    (
        "admin_account_status_4",
        "01FF25D5Q0DH7CHD57CTRS6WK0",
        "admin_account",
        Visibility::MutualsOnly,
        &[],
    ),
    (
        "remote_account_1_status_1",
        "01FHMQX3GAQ7Y0K7J1R7DMNXRH",
        "remote_account_1",
        Visibility::Public,
        &[],
    ),
];

/// A populated in-memory store & relationship graph
pub struct Fixture {
    memory: Arc<Memory>,
    accounts: HashMap<&'static str, (AccountId, bool)>,
    statuses: HashMap<&'static str, Status>,
}

impl Fixture {
    pub fn new() -> Result<Fixture> {
        let accounts = ACCOUNTS
            .iter()
            .map(|(name, id, local)| {
                Ok((*name, (AccountId::new(id).context(BadIdSnafu)?, *local)))
            })
            .collect::<Result<HashMap<&'static str, (AccountId, bool)>>>()?;

        let memory = Arc::new(Memory::new());
        for (follower, followee) in FOLLOWS {
            memory.follow(&accounts[follower].0, &accounts[followee].0);
        }

        let mut fixture = Fixture {
            memory,
            accounts,
            statuses: HashMap::new(),
        };
        for (name, id, author, visibility, mentions) in STATUSES {
            let (author, local) = fixture.accounts[author].clone();
            let status = Status::new(
                StatusId::new(id).context(BadIdSnafu)?,
                author,
                local,
                visibility,
                &format!("This is {name}"),
            )
            .with_mentions(
                mentions
                    .iter()
                    .map(|mention| fixture.account(mention))
                    .collect::<Result<Vec<AccountId>>>()?,
            );
            fixture.memory.add_status(status.clone());
            fixture.statuses.insert(name, status);
        }
        Ok(fixture)
    }
    /// The in-memory collaborators backing this fixture
    pub fn memory(&self) -> Arc<Memory> {
        self.memory.clone()
    }
    pub fn account(&self, name: &str) -> Result<AccountId> {
        self.accounts
            .get(name)
            .map(|(id, _)| id.clone())
            .context(NoSuchAccountSnafu { name })
    }
    pub fn status(&self, name: &str) -> Result<Status> {
        self.statuses
            .get(name)
            .cloned()
            .context(NoSuchStatusSnafu { name })
    }
    /// Add a status to the store (only) & return it
    pub fn add_status(&self, status: Status) -> Status {
        self.memory.add_status(status.clone());
        status
    }
    /// Build a [Manager] over this fixture's collaborators
    pub fn manager(&self, config: Configuration) -> Manager {
        Manager::new(
            config,
            self.memory.clone(),
            self.memory.clone(),
            self.memory.clone(),
            Arc::new(Instruments::new("indiefeed-test")),
        )
    }
}
