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

//! # The indiefeed Integration Test Framework

use std::{env, fs};

use libtest_mimic::Failed;
use serde::Deserialize;
use snafu::{IntoError, ResultExt, Snafu};
use tap::Pipe;
use tracing::Level;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to parse {pth}: {source}"))]
    De {
        pth: String,
        source: toml::de::Error,
    },
    #[snafu(display("Failed to read INDIEFEED_TEST_CONFIG: {source}"))]
    Env { source: std::env::VarError },
    #[snafu(display("Failed to read {pth}: {source}"))]
    Read { pth: String, source: std::io::Error },
}

type Result<T> = std::result::Result<T, Error>;

/// Common indiefeed test configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Install a tracing subscriber for the duration of the tests
    pub logging: bool,
    #[serde(rename = "log-level", deserialize_with = "de_level::deserialize")]
    pub log_level: Level,
    /// Worker threads for the tests' multi-threaded runtime
    #[serde(rename = "worker-threads")]
    pub worker_threads: usize,
}

mod de_level {
    use std::str::FromStr;

    use serde::{Deserialize, Deserializer};
    use tracing::Level;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Level::from_str(&s)
            .map_err(|_| serde::de::Error::custom(format!("{s} cannot be interpreted as a log level")))
    }
}

impl Configuration {
    /// Obtain a [Configuration]
    ///
    /// Check the `INDIEFEED_TEST_CONFIG` environment variable; if defined, attempt to parse a
    /// [Configuration] from the file named therein; else return a default instance.
    pub fn new() -> Result<Configuration> {
        match env::var("INDIEFEED_TEST_CONFIG") {
            Ok(f) => fs::read_to_string(&f)
                .context(ReadSnafu { pth: f.clone() })?
                .pipe(|s| toml::from_str::<Configuration>(&s))
                .context(DeSnafu { pth: f.clone() }),
            Err(env::VarError::NotPresent) => Ok(Configuration::default()),
            Err(err) => Err(EnvSnafu.into_error(err)),
        }
    }
}

impl Default for Configuration {
    /// Default configuration
    ///
    /// When invoked with a bare `cargo test` (i.e. without `INDIEFEED_TEST_CONFIG` set), this is
    /// the configuration that will be used, so be sure the tests will pass with it.
    fn default() -> Self {
        Configuration {
            logging: false,
            log_level: Level::INFO,
            worker_threads: 4,
        }
    }
}

pub struct Test {
    pub name: &'static str,
    pub test_fn: fn(&Configuration) -> std::result::Result<(), Failed>,
}

inventory::collect!(Test);
