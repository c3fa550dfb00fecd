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

//! # Home timeline integration tests
//!
//! Each test builds its own [Fixture] & [Manager], so they may be run in any order (or
//! concurrently).

use std::{collections::HashSet, sync::Arc};

use futures::prelude::*;
use indiefeed::{
    config::Configuration,
    entities::{Status, StatusId, Visibility},
    manager::Manager,
    render::StatusView,
};
use libtest_mimic::Failed;

use crate::Fixture;

fn ids(views: &[StatusView]) -> Vec<String> {
    views.iter().map(|view| view.id.to_string()).collect()
}

/// Build the manager & fill `local_account_1`'s home timeline from the top
async fn prepared(fixture: &Fixture) -> Result<Manager, Failed> {
    let manager = fixture.manager(Configuration::default());
    manager
        .prepare_x_from_top(&fixture.account("local_account_1")?, 20)
        .await?;
    Ok(manager)
}

/// Walk the life of `local_account_1`'s home timeline through backfill, deletions, a block, and
/// re-ingestion
pub async fn test_manager_lifecycle() -> Result<(), Failed> {
    let fixture = Fixture::new()?;
    let viewer = fixture.account("local_account_1")?;
    let manager = prepared(&fixture).await?;

    // Twelve of the fifteen candidates are visible
    assert_eq!(manager.get_indexed_length(&viewer), 12);
    let oldest = manager
        .get_oldest_indexed_id(&viewer)
        .ok_or("empty timeline")?;
    assert_eq!(oldest.as_ref(), "01F8MH75CBF9JFX4ZAD54N0W0R");

    // Delete the oldest status everywhere
    manager.wipe_status_from_all_timelines(&oldest).await?;
    assert_eq!(manager.get_indexed_length(&viewer), 11);
    let oldest = manager
        .get_oldest_indexed_id(&viewer)
        .ok_or("empty timeline")?;
    assert_eq!(oldest.as_ref(), "01F8MH82FYRXD2RC6108DAJ5HB");

    // Remove the new oldest from this timeline; it was indexed & prepared, so that's two deletions
    assert_eq!(manager.remove(&viewer, &oldest).await?, 2);
    assert_eq!(manager.get_indexed_length(&viewer), 10);
    assert_eq!(
        manager
            .get_oldest_indexed_id(&viewer)
            .ok_or("empty timeline")?
            .as_ref(),
        "01F8MHAAY43M6RJ473VQFCVH37"
    );

    // Everything by `local_account_2` goes
    manager
        .wipe_statuses_from_account_id(&viewer, &fixture.account("local_account_2")?)
        .await?;
    assert_eq!(manager.get_indexed_length(&viewer), 5);

    // ...and two statuses come back
    assert!(
        manager
            .ingest(&fixture.status("admin_account_status_1")?, &viewer)
            .await?
    );
    let status = fixture.status("local_account_2_status_1")?;
    assert!(manager.ingest_and_prepare(&status, &viewer).await?);
    assert_eq!(manager.get_indexed_length(&viewer), 7);

    // Once
    assert!(!manager.ingest_and_prepare(&status, &viewer).await?);
    assert_eq!(manager.get_indexed_length(&viewer), 7);

    Ok(())
}

/// Page through the whole of `local_account_1`'s home timeline, five at a time
pub async fn test_paging() -> Result<(), Failed> {
    let fixture = Fixture::new()?;
    let viewer = fixture.account("local_account_1")?;
    let manager = prepared(&fixture).await?;

    let mut seen = Vec::new();
    let mut max_id: Option<StatusId> = None;
    loop {
        let page = manager
            .home_timeline(&viewer, max_id.clone(), None, None, Some(5), false)
            .await?;
        if page.is_empty() {
            break;
        }
        assert!(page.len() <= 5);
        max_id = page.last().map(|view| view.id.clone());
        seen.extend(ids(&page));
    }

    assert_eq!(seen.len(), 12);
    assert!(seen.windows(2).all(|pair| pair[0] > pair[1]));
    assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 12);
    assert_eq!(seen.last().map(String::as_str), Some("01F8MH75CBF9JFX4ZAD54N0W0R"));

    // Forward from the oldest
    let page = manager
        .home_timeline(
            &viewer,
            None,
            None,
            Some(StatusId::new("01F8MH75CBF9JFX4ZAD54N0W0R")?),
            Some(2),
            false,
        )
        .await?;
    assert_eq!(
        ids(&page),
        vec!["01F8MHAAY43M6RJ473VQFCVH37", "01F8MH82FYRXD2RC6108DAJ5HB"]
    );

    // What's new since the newest of `local_account_2`'s statuses?
    let page = manager
        .home_timeline(
            &viewer,
            None,
            Some(StatusId::new("01F8MHD0N4G9TA3GVCX0ZBYJ0E")?),
            None,
            None,
            false,
        )
        .await?;
    assert_eq!(ids(&page), vec!["01FCTA44PW9H1TB328S9AQXKDS"]);

    Ok(())
}

/// Deleting a status takes its boosts along with it, in every timeline
pub async fn test_cascade() -> Result<(), Failed> {
    let fixture = Fixture::new()?;
    let viewer = fixture.account("local_account_1")?;
    let booster = fixture.account("local_account_2")?;
    let original = fixture.status("admin_account_status_1")?;
    let boost = fixture.add_status(
        Status::new(
            StatusId::new("01FHMQX3GAQ7Y0K7J1R7DMNXRJ")?,
            booster.clone(),
            true,
            Visibility::Public,
            "",
        )
        .boosting(&original),
    );

    let manager = prepared(&fixture).await?;
    manager.prepare_x_from_top(&booster, 20).await?;
    assert_eq!(manager.get_indexed_length(&viewer), 13);
    let booster_len = manager.get_indexed_length(&booster);

    // The author deletes it
    let memory = fixture.memory();
    memory.remove_status(&original.id);
    memory.remove_status(&boost.id);
    manager.wipe_status_from_all_timelines(&original.id).await?;
    assert_eq!(manager.get_indexed_length(&viewer), 11);
    // `local_account_2` can't see `admin_account`'s statuses, but it did boost one
    assert_eq!(manager.get_indexed_length(&booster), booster_len - 1);
    let page = manager
        .home_timeline(&viewer, None, None, None, Some(40), false)
        .await?;
    assert!(page
        .iter()
        .all(|view| view.id != original.id && view.id != boost.id));

    Ok(())
}

/// Wiping an author from one timeline leaves the others alone
pub async fn test_scoped_wipe() -> Result<(), Failed> {
    let fixture = Fixture::new()?;
    let viewer = fixture.account("local_account_1")?;
    let other = fixture.account("local_account_2")?;
    let manager = prepared(&fixture).await?;
    manager.prepare_x_from_top(&other, 20).await?;
    let other_len = manager.get_indexed_length(&other);
    assert!(other_len > 0);

    manager.wipe_statuses_from_account_id(&other, &viewer).await?;
    assert_eq!(manager.get_indexed_length(&viewer), 12);
    assert!(manager.get_indexed_length(&other) < other_len);

    Ok(())
}

/// `local_only` pages skip statuses from other instances
pub async fn test_local_only() -> Result<(), Failed> {
    let fixture = Fixture::new()?;
    let viewer = fixture.account("local_account_1")?;
    let remote = fixture.account("remote_account_1")?;
    fixture.memory().follow(&viewer, &remote);
    let manager = prepared(&fixture).await?;
    assert_eq!(manager.get_indexed_length(&viewer), 13);

    let page = manager
        .home_timeline(&viewer, None, None, None, Some(1), false)
        .await?;
    assert_eq!(ids(&page), vec!["01FHMQX3GAQ7Y0K7J1R7DMNXRH"]);
    let page = manager
        .home_timeline(&viewer, None, None, None, Some(1), true)
        .await?;
    assert_eq!(ids(&page), vec!["01FCTA44PW9H1TB328S9AQXKDS"]);

    Ok(())
}

/// Readers & writers hammering one timeline concurrently
///
/// Run this on a multi-threaded runtime.
pub async fn test_concurrent_readers_and_writers() -> Result<(), Failed> {
    let fixture = Fixture::new()?;
    let viewer = fixture.account("local_account_1")?;
    let manager = Arc::new(fixture.manager(Configuration::default()));
    let statuses = [
        "admin_account_status_1",
        "admin_account_status_3",
        "local_account_1_status_2",
        "local_account_2_status_1",
        "local_account_2_status_5",
        "local_account_1_status_5",
    ]
    .iter()
    .map(|name| fixture.status(name))
    .collect::<Result<Vec<Status>, _>>()?;

    let writers = (0..4)
        .map(|i| {
            let manager = manager.clone();
            let viewer = viewer.clone();
            let statuses = statuses.clone();
            tokio::spawn(async move {
                let mut inserted = 0;
                for status in statuses.iter().cycle().skip(i).take(statuses.len()) {
                    if manager.ingest_and_prepare(status, &viewer).await? {
                        inserted += 1;
                    }
                }
                Ok::<usize, indiefeed::manager::Error>(inserted)
            })
        })
        .collect::<Vec<_>>();
    let readers = (0..4)
        .map(|_| {
            let manager = manager.clone();
            let viewer = viewer.clone();
            tokio::spawn(async move {
                for _ in 0..8 {
                    let page = manager
                        .home_timeline(&viewer, None, None, None, Some(5), false)
                        .await?;
                    assert!(page.windows(2).all(|pair| pair[0].id > pair[1].id));
                }
                Ok::<(), indiefeed::manager::Error>(())
            })
        })
        .collect::<Vec<_>>();

    let readers = future::join_all(readers).await;
    let inserted = future::join_all(writers)
        .await
        .into_iter()
        .map(|joined| joined.map_err(|err| Failed::from(err.to_string())))
        .collect::<Result<Vec<_>, Failed>>()?
        .into_iter()
        .collect::<Result<Vec<usize>, _>>()?
        .into_iter()
        .sum::<usize>();
    for reader in readers {
        reader.map_err(|err| Failed::from(err.to_string()))??;
    }

    // Readers may have backfilled some of these first, so we can't say how many the writers
    // inserted, only that no status was inserted twice
    assert!(inserted <= statuses.len());
    // Depending on who got there first, readers may only have backfilled behind the oldest status
    // a writer inserted; filling from the top closes any gap
    manager.prepare_x_from_top(&viewer, 20).await?;
    assert_eq!(manager.get_indexed_length(&viewer), 12);

    Ok(())
}
