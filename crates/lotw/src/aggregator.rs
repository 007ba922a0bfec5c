// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use crate::adif::Record;
use crate::constants::{
    FIELD_BAND, FIELD_DXCC, FIELD_MODE, FIELD_QSL_RCVD, FIELD_QSO_DATE, FIELD_QSO_TIMESTAMP,
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BandMode {
    pub band: String,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateBand {
    /// `YYYY-MM-DD`
    pub date: String,
    pub band: String,
}

/// The result of aggregating one full report.
///
/// Only ever produced by [`Aggregator::into_snapshot`] once every record of a pass has been
/// inserted, and never mutated afterwards. Ordered maps keep rendering deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedSnapshot {
    pub totals_by_band_mode: BTreeMap<BandMode, u64>,
    pub confirmed_by_band_mode: BTreeMap<BandMode, u64>,
    pub confirmed_entity_count: usize,
    pub daily_counts_by_date_band: BTreeMap<DateBand, u64>,
    /// Number of non-empty records aggregated.
    pub record_count: usize,
}

#[derive(Debug, Default)]
pub struct Aggregator {
    totals_by_band_mode: BTreeMap<BandMode, u64>,
    confirmed_by_band_mode: BTreeMap<BandMode, u64>,
    confirmed_entities: BTreeSet<String>,
    daily_counts_by_date_band: BTreeMap<DateBand, u64>,
    record_count: usize,
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one record. Empty records are not observations and are ignored.
    ///
    /// Returns whether the record was counted.
    pub fn insert(&mut self, record: &Record) -> bool {
        if record.is_empty() {
            return false;
        }
        self.record_count += 1;

        let band = field(record, FIELD_BAND);
        let key = BandMode {
            band: band.to_string(),
            mode: field(record, FIELD_MODE).to_string(),
        };

        if is_confirmed(record) {
            *self.confirmed_by_band_mode.entry(key.clone()).or_default() += 1;
            let dxcc = field(record, FIELD_DXCC);
            if !dxcc.is_empty() && !self.confirmed_entities.contains(dxcc) {
                self.confirmed_entities.insert(dxcc.to_string());
            }
        }
        *self.totals_by_band_mode.entry(key).or_default() += 1;

        if let Some(date) = date_bucket(record) {
            let key = DateBand {
                date,
                band: band.to_string(),
            };
            *self.daily_counts_by_date_band.entry(key).or_default() += 1;
        }
        true
    }

    #[must_use]
    pub fn into_snapshot(self) -> AggregatedSnapshot {
        AggregatedSnapshot {
            totals_by_band_mode: self.totals_by_band_mode,
            confirmed_by_band_mode: self.confirmed_by_band_mode,
            confirmed_entity_count: self.confirmed_entities.len(),
            daily_counts_by_date_band: self.daily_counts_by_date_band,
            record_count: self.record_count,
        }
    }
}

/// Aggregates a complete sequence of records in one pass.
pub fn aggregate<'a, I>(records: I) -> AggregatedSnapshot
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut aggregator = Aggregator::new();
    for record in records {
        aggregator.insert(record);
    }
    aggregator.into_snapshot()
}

/// Absent fields read as the empty label.
fn field<'a>(record: &'a Record, name: &str) -> &'a str {
    record.get(name).map_or("", String::as_str)
}

fn is_confirmed(record: &Record) -> bool {
    field(record, FIELD_QSL_RCVD).eq_ignore_ascii_case("Y")
}

/// Day of the contact as `YYYY-MM-DD`.
///
/// Prefers the LoTW timestamp (`2025-12-10T15:31:30Z`), falls back to the ADIF `QSO_DATE`
/// (`20251210`). Records with neither contribute no bucket.
fn date_bucket(record: &Record) -> Option<String> {
    if let Some(day) = record
        .get(FIELD_QSO_TIMESTAMP)
        .and_then(|timestamp| timestamp.get(..10))
    {
        return Some(day.to_string());
    }

    let raw = field(record, FIELD_QSO_DATE);
    if raw.len() != 8 || !raw.is_ascii() {
        return None;
    }
    Some(format!("{}-{}-{}", &raw[..4], &raw[4..6], &raw[6..]))
}
