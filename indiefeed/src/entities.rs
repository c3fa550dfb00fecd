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

//! # indiefeed entities
//!
//! ## Introduction
//!
//! The vocabulary of the timeline engine: statuses, the accounts that write & read them, and the
//! identifiers that name (and order) both. Every other module speaks in these terms.
//!
//! ## Identifiers
//!
//! Statuses & accounts are named by time-ordered unique identifiers in their 26 character,
//! Crockford base32 text form (i.e. [ULIDs]). The nice property of that representation is that
//! sorting the *text* sorts the identifiers chronologically, which means the timeline engine never
//! has to compare timestamps: a [StatusId] that sorts after another was minted after it.
//!
//! [ULIDs]: https://github.com/ulid/spec

use std::{fmt::Display, ops::Deref, str::FromStr};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use snafu::{prelude::*, Backtrace};

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       module Error type                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{text} is not a valid account ID"))]
    BadAccountId { text: String, backtrace: Backtrace },
    #[snafu(display("{text} is not a valid status ID"))]
    BadStatusId { text: String, backtrace: Backtrace },
    #[snafu(display("{text} is not a recognized visibility level"))]
    BadVisibility { text: String, backtrace: Backtrace },
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          identifiers                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

lazy_static! {
    // The first character is restricted to 0-7 because a ULID is only 128 bits wide
    static ref ULID: Regex = Regex::new("^[0-7][0-9A-HJKMNP-TV-Z]{25}$").unwrap(/* known good */);
}

fn check_id(s: &str) -> bool {
    ULID.is_match(s)
}

/// A refined type representing a status identifier
///
/// The derived [Ord] implementation compares the underlying text byte-by-byte, which for this
/// representation is chronological order. Construct one with [StatusId::new] (copying from a
/// `&str`) or [TryFrom::try_from] (moving a [String]).
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct StatusId(String);

impl StatusId {
    pub fn new(text: &str) -> Result<StatusId> {
        check_id(text)
            .then_some(StatusId(text.to_owned()))
            .context(BadStatusIdSnafu {
                text: text.to_owned(),
            })
    }
}

impl AsRef<str> for StatusId {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Deref for StatusId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Implement `Deserialize` by hand to fail if the serialized value isn't a legit `StatusId`
impl<'de> Deserialize<'de> for StatusId {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        StatusId::try_from(s).map_err(serde::de::Error::custom)
    }
}

impl Display for StatusId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StatusId {
    type Err = Error;

    fn from_str(s: &str) -> StdResult<Self, Self::Err> {
        StatusId::new(s)
    }
}

impl TryFrom<String> for StatusId {
    type Error = Error;

    fn try_from(text: String) -> StdResult<Self, Self::Error> {
        if check_id(&text) {
            Ok(StatusId(text))
        } else {
            BadStatusIdSnafu { text }.fail()
        }
    }
}

/// A refined type representing an account identifier
///
/// Accounts may be local or remote; the engine never cares which, save for the `local_only`
/// pagination filter, and that information travels on the [Status].
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(text: &str) -> Result<AccountId> {
        check_id(text)
            .then_some(AccountId(text.to_owned()))
            .context(BadAccountIdSnafu {
                text: text.to_owned(),
            })
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Deref for AccountId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        AccountId::try_from(s).map_err(serde::de::Error::custom)
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = Error;

    fn from_str(s: &str) -> StdResult<Self, Self::Err> {
        AccountId::new(s)
    }
}

impl TryFrom<String> for AccountId {
    type Error = Error;

    fn try_from(text: String) -> StdResult<Self, Self::Error> {
        if check_id(&text) {
            Ok(AccountId(text))
        } else {
            BadAccountIdSnafu { text }.fail()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Visibility                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Status visibility levels
///
/// These follow the conventions that have grown up around ActivityPub servers:
///
/// - public: anyone can see it, and it shows up on public timelines
/// - unlisted: anyone can see it, but it's kept off public timelines
/// - followers only: only the author's followers can see it
/// - mutuals only: only accounts that follow the author *and* are followed by the author
/// - direct: only the accounts mentioned in the status
///
/// The rules themselves live in [crate::visibility].
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Visibility {
    #[serde(rename = "public")]
    Public,
    #[serde(rename = "unlisted")]
    Unlisted,
    #[serde(rename = "followers_only")]
    FollowersOnly,
    #[serde(rename = "mutuals_only")]
    MutualsOnly,
    #[serde(rename = "direct")]
    Direct,
}

impl Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Visibility::Public => "public",
                Visibility::Unlisted => "unlisted",
                Visibility::FollowersOnly => "followers_only",
                Visibility::MutualsOnly => "mutuals_only",
                Visibility::Direct => "direct",
            }
        )
    }
}

impl FromStr for Visibility {
    type Err = Error;

    fn from_str(s: &str) -> StdResult<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "unlisted" => Ok(Visibility::Unlisted),
            "followers_only" => Ok(Visibility::FollowersOnly),
            "mutuals_only" => Ok(Visibility::MutualsOnly),
            "direct" => Ok(Visibility::Direct),
            _ => BadVisibilitySnafu {
                text: s.to_owned(),
            }
            .fail(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             Status                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// What a boost points at
///
/// A boost is a status in its own right (with its own [StatusId], authored by the booster), that
/// wraps another. We carry just enough of the boosted status to run visibility checks without a
/// second trip to the store.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BoostOf {
    pub id: StatusId,
    pub author: AccountId,
    pub visibility: Visibility,
}

/// A status, as held by the status store
///
/// This is the "raw" record; the hydrated, client-facing form is [crate::render::StatusView].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Status {
    pub id: StatusId,
    pub author: AccountId,
    /// True if `author` is an account on this instance
    pub local: bool,
    pub visibility: Visibility,
    /// Accounts explicitly mentioned in (or addressed by) this status
    #[serde(default)]
    pub mentions: Vec<AccountId>,
    #[serde(rename = "in-reply-to-account", default)]
    pub in_reply_to_account: Option<AccountId>,
    #[serde(rename = "boost-of", default)]
    pub boost_of: Option<BoostOf>,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "created-at")]
    pub created_at: DateTime<Utc>,
}

impl Status {
    /// Construct a new (non-boost, non-reply) [Status] with no mentions
    pub fn new(
        id: StatusId,
        author: AccountId,
        local: bool,
        visibility: Visibility,
        content: &str,
    ) -> Status {
        Status {
            id,
            author,
            local,
            visibility,
            mentions: Vec::new(),
            in_reply_to_account: None,
            boost_of: None,
            content: content.to_owned(),
            created_at: Utc::now(),
        }
    }
    pub fn with_mentions(mut self, mentions: impl IntoIterator<Item = AccountId>) -> Status {
        self.mentions = mentions.into_iter().collect();
        self
    }
    pub fn in_reply_to(mut self, account: AccountId) -> Status {
        self.in_reply_to_account = Some(account);
        self
    }
    /// Make this status a boost of `boosted`
    pub fn boosting(mut self, boosted: &Status) -> Status {
        self.boost_of = Some(BoostOf {
            id: boosted.id.clone(),
            author: boosted.author.clone(),
            visibility: boosted.visibility,
        });
        self
    }
    pub fn is_boost(&self) -> bool {
        self.boost_of.is_some()
    }
    pub fn mentions(&self, account: &AccountId) -> bool {
        self.mentions.iter().any(|mention| mention == account)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ids() {
        assert!(StatusId::new("01F8MH75CBF9JFX4ZAD54N0W0R").is_ok());
        // Wrong length
        assert!(StatusId::new("01F8MH75CBF9JFX4ZAD54N0W0").is_err());
        // 'U' isn't part of the Crockford alphabet
        assert!(StatusId::new("01F8MH75CBF9JFX4ZAD54N0W0U").is_err());
        // Lower-case
        assert!(AccountId::new("01f8mh17fweb39hzj76b6vxskf").is_err());
        // Overflows 128 bits
        assert!(AccountId::new("81F8MH17FWEB39HZJ76B6VXSKF").is_err());

        let id: StatusId = serde_json::from_str("\"01F8MH82FYRXD2RC6108DAJ5HB\"").unwrap();
        assert_eq!(id.as_ref(), "01F8MH82FYRXD2RC6108DAJ5HB");
        assert!(serde_json::from_str::<StatusId>("\"not-an-id\"").is_err());
    }

    #[test]
    fn test_chronological_order() {
        let older = StatusId::new("01F8MH75CBF9JFX4ZAD54N0W0R").unwrap();
        let newer = StatusId::new("01F8MH82FYRXD2RC6108DAJ5HB").unwrap();
        let newest = StatusId::new("01FCTA44PW9H1TB328S9AQXKDS").unwrap();
        assert!(older < newer);
        assert!(newer < newest);
    }

    #[test]
    fn test_visibility_text() {
        for vis in [
            Visibility::Public,
            Visibility::Unlisted,
            Visibility::FollowersOnly,
            Visibility::MutualsOnly,
            Visibility::Direct,
        ] {
            assert_eq!(vis, vis.to_string().parse::<Visibility>().unwrap());
        }
        assert!("friends".parse::<Visibility>().is_err());
    }
}
