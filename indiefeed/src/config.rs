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

//! # Timeline engine configuration
//!
//! The engine is configured from a small TOML document:
//!
//! ```toml
//! version = "1"
//! max-indexed = 1000
//! boost-reinsertion-depth = 0
//! backfill-amount = 20
//! default-page-size = 20
//! max-page-size = 40
//! max-timelines = 10000
//! ```
//!
//! Every key but `version` is optional.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use snafu::{Backtrace, ResultExt, Snafu};

use crate::timeline::Settings;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Failed to parse the timeline configuration: {source}"))]
    Parse {
        source: toml::de::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to read the timeline configuration from {pth:?}: {source}"))]
    Read {
        pth: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("max-page-size ({max}) may not be less than default-page-size ({default})"))]
    PageSizes {
        default: usize,
        max: usize,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// Timeline engine configuration, version one
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ConfigV1 {
    /// Retain at most this many entries per timeline; zero means "don't trim"
    #[serde(rename = "max-indexed")]
    pub max_indexed: usize,
    /// Suppress a boost when the boosted status (or another boost of it) is among this many of the
    /// most recent entries. Zero, the default, indexes every boost; note that a suppressed boost
    /// is reported by `ingest` as not inserted, just like a duplicate.
    #[serde(rename = "boost-reinsertion-depth")]
    pub boost_reinsertion_depth: usize,
    /// The number of entries to index when backfilling a timeline from the store
    #[serde(rename = "backfill-amount")]
    pub backfill_amount: usize,
    /// Page size when the caller doesn't ask for one
    #[serde(rename = "default-page-size")]
    pub default_page_size: usize,
    /// Requested page sizes are clamped to this
    #[serde(rename = "max-page-size")]
    pub max_page_size: usize,
    /// Keep at most this many timelines in memory, evicting the least recently used
    #[serde(rename = "max-timelines")]
    pub max_timelines: usize,
}

impl Default for ConfigV1 {
    fn default() -> Self {
        ConfigV1 {
            max_indexed: 1000,
            boost_reinsertion_depth: 0,
            backfill_amount: 20,
            default_page_size: 20, // Mastodon's default
            max_page_size: 40,     // & Mastodon's limit
            max_timelines: 10000,
        }
    }
}

impl ConfigV1 {
    /// The per-timeline settings implied by this configuration
    pub fn timeline_settings(&self) -> Settings {
        Settings {
            max_indexed: self.max_indexed,
            boost_reinsertion_depth: self.boost_reinsertion_depth,
        }
    }
    /// Map a requested page size onto the page size we'll actually serve
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size)
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "version")] // tag "internally"
enum Versioned {
    #[serde(rename = "1")]
    V1(ConfigV1),
}

/// The timeline engine configuration
pub type Configuration = ConfigV1;

impl FromStr for ConfigV1 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let cfg = match toml::from_str::<Versioned>(s).context(ParseSnafu)? {
            Versioned::V1(cfg) => cfg,
        };
        if cfg.max_page_size < cfg.default_page_size {
            return PageSizesSnafu {
                default: cfg.default_page_size,
                max: cfg.max_page_size,
            }
            .fail();
        }
        Ok(cfg)
    }
}

impl ConfigV1 {
    /// Read the configuration at `pth`
    pub fn from_path(pth: &Path) -> Result<ConfigV1> {
        std::fs::read_to_string(pth)
            .context(ReadSnafu {
                pth: pth.to_path_buf(),
            })?
            .parse()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse() {
        let cfg = r#"version = "1"
max-indexed = 250
max-page-size = 80
boost-reinsertion-depth = 50
"#
        .parse::<Configuration>()
        .unwrap();
        assert_eq!(cfg.max_indexed, 250);
        assert_eq!(cfg.max_page_size, 80);
        assert_eq!(cfg.boost_reinsertion_depth, 50);
        assert_eq!(cfg.timeline_settings().boost_reinsertion_depth, 50);
        // Defaulted
        assert_eq!(cfg.backfill_amount, 20);
        assert_eq!(cfg.max_timelines, 10000);

        assert_eq!(
            r#"version = "1""#.parse::<Configuration>().unwrap(),
            Configuration::default()
        );
    }

    #[test]
    fn test_bad_configs() {
        // Unversioned
        assert!(matches!(
            "max-indexed = 250".parse::<Configuration>(),
            Err(Error::Parse { .. })
        ));
        assert!(matches!(
            r#"version = "2""#.parse::<Configuration>(),
            Err(Error::Parse { .. })
        ));
        assert!(matches!(
            "version = \"1\"\ndefault-page-size = 50\nmax-page-size = 40"
                .parse::<Configuration>(),
            Err(Error::PageSizes { .. })
        ));
        assert!(matches!(
            Configuration::from_path(Path::new("/no/such/indiefeed.toml")),
            Err(Error::Read { .. })
        ));
    }

    #[test]
    fn test_page_size() {
        let cfg = Configuration::default();
        assert_eq!(cfg.page_size(None), 20);
        assert_eq!(cfg.page_size(Some(5)), 5);
        assert_eq!(cfg.page_size(Some(500)), 40);
    }
}
