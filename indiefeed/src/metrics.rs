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

//! # indiefeed metrics
//!
//! The timeline engine reports what it's doing through [OpenTelemetry] instruments: how many
//! statuses were ingested, how many were turned away as duplicates or as not visible, how many
//! entries were removed, and so on. Whether anything *collects* those numbers is up to the embedding
//! application; absent a meter provider, OTel hands back no-op instruments & the calls cost next to
//! nothing.
//!
//! [OpenTelemetry]: https://docs.rs/opentelemetry/latest/opentelemetry/index.html
//!
//! Metrics are declared at the site that updates them via the [inventory] crate:
//!
//! ```ignore
//! inventory::submit! { metrics::Registration::new("timeline.removed", Sort::IntegralCounter) }
//! // ...
//! counter_add!(self.instruments, "timeline.removed", removed as u64, &[]);
//! ```
//!
//! [Instruments::new] walks the inventory & builds every instrument up-front, so that updating one
//! only needs `&self`. Looking-up a name that was never registered, or that names an instrument of
//! a different sort, is a logic error & panics.

use std::collections::{hash_map::Entry, HashMap};

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Meter},
    KeyValue,
};
use snafu::{Backtrace, Snafu};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("The metric name {name} was registered more than once"))]
    DuplicateMetric {
        name: &'static str,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// Instrument type
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Sort {
    /// `Counter<u64>`
    IntegralCounter,
    /// `Gauge<u64>`
    IntegralGauge,
}

/// A metric declaration, collected by [inventory]
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Registration {
    name: &'static str,
    sort: Sort,
}

impl Registration {
    pub const fn new(name: &'static str, sort: Sort) -> Registration {
        Registration { name, sort }
    }
    pub fn name(&self) -> &'static str {
        self.name
    }
    pub fn sort(&self) -> Sort {
        self.sort
    }
}

inventory::collect!(Registration);

/// Verify that no two sites registered the same metric name
pub fn check_metric_registrations() -> Result<()> {
    let mut seen = HashMap::new();
    for reg in inventory::iter::<Registration> {
        if seen.insert(reg.name(), reg.sort()).is_some() {
            return DuplicateMetricSnafu { name: reg.name() }.fail();
        }
    }
    Ok(())
}

enum Instrument {
    CounterU64(Counter<u64>),
    GaugeU64(Gauge<u64>),
}

/// Container for OTel instruments
pub struct Instruments {
    meter: Meter,
    map: HashMap<&'static str, Instrument>,
}

impl std::fmt::Debug for Instruments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instruments")
            .field("names", &self.map.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Instruments {
    /// Build an instrument for every registered metric, under meter `prefix`
    ///
    /// Panics if any metric name was registered twice; call [check_metric_registrations] first if
    /// you'd rather find out gracefully.
    pub fn new(prefix: &'static str) -> Instruments {
        let meter = global::meter(prefix);
        let mut map = HashMap::new();
        for reg in inventory::iter::<Registration> {
            match map.entry(reg.name()) {
                Entry::Occupied(_) => panic!("The metric name {} was used twice", reg.name()),
                Entry::Vacant(vacant) => {
                    vacant.insert(match reg.sort() {
                        Sort::IntegralCounter => {
                            Instrument::CounterU64(meter.u64_counter(reg.name()).build())
                        }
                        Sort::IntegralGauge => {
                            Instrument::GaugeU64(meter.u64_gauge(reg.name()).build())
                        }
                    });
                }
            }
        }
        Instruments { meter, map }
    }
    pub fn meter(&self) -> &Meter {
        &self.meter
    }
    /// True if `name` was registered
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }
    // panics if `name` doesn't name a counter
    pub fn add(&self, name: &str, count: u64, attributes: &[KeyValue]) {
        match self.map.get(name) {
            Some(Instrument::CounterU64(counter)) => counter.add(count, attributes),
            _ => panic!("{} does not name a counter", name),
        }
    }
    // panics if `name` doesn't name a gauge
    pub fn recordu(&self, name: &str, value: u64, attributes: &[KeyValue]) {
        match self.map.get(name) {
            Some(Instrument::GaugeU64(gauge)) => gauge.record(value, attributes),
            _ => panic!("{} does not name a gauge", name),
        }
    }
}

#[macro_export]
macro_rules! counter_add {
    ($instr:expr, $name:expr, $count:expr, $attrs:expr) => {
        $instr.add($name, $count, $attrs);
    };
}

#[macro_export]
macro_rules! gauge_setu {
    ($instr:expr, $name:expr, $value:expr, $attrs:expr) => {
        $instr.recordu($name, $value, $attrs);
    };
}
