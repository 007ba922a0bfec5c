// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Prometheus text exposition of a [`StoreView`].
//!
//! Each render builds a throwaway registry from one view, so a scrape can never mix gauges from
//! two cycles and label sets that vanished from the report vanish from the output.

use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};

use crate::store::StoreView;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

fn gauge(registry: &Registry, name: &str, help: &str) -> prometheus::Result<Gauge> {
    let gauge = Gauge::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn gauge_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> prometheus::Result<GaugeVec> {
    let gauge = GaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// Renders the view in the Prometheus text format.
#[allow(clippy::cast_precision_loss)]
pub fn render(view: &StoreView) -> prometheus::Result<String> {
    let registry = Registry::new();
    let snapshot = &view.snapshot;
    let status = &view.status;

    let qso_total = gauge_vec(
        &registry,
        "lotw_qso_total",
        "Total number of QSOs logged in LoTW",
        &["band", "mode"],
    )?;
    for (key, count) in &snapshot.totals_by_band_mode {
        qso_total
            .with_label_values(&[key.band.as_str(), key.mode.as_str()])
            .set(*count as f64);
    }

    let qsl_total = gauge_vec(
        &registry,
        "lotw_qsl_confirmed_total",
        "Total number of confirmed QSLs",
        &["band", "mode"],
    )?;
    for (key, count) in &snapshot.confirmed_by_band_mode {
        qsl_total
            .with_label_values(&[key.band.as_str(), key.mode.as_str()])
            .set(*count as f64);
    }

    gauge(
        &registry,
        "lotw_dxcc_entities_count",
        "Number of unique DXCC entities confirmed",
    )?
    .set(snapshot.confirmed_entity_count as f64);

    let history = gauge_vec(
        &registry,
        "lotw_qso_history_count",
        "Number of QSOs per day",
        &["date", "band"],
    )?;
    for (key, count) in &snapshot.daily_counts_by_date_band {
        history
            .with_label_values(&[key.date.as_str(), key.band.as_str()])
            .set(*count as f64);
    }

    gauge(
        &registry,
        "lotw_scrape_duration_seconds",
        "Time taken to fetch and parse LoTW data",
    )?
    .set(status.last_duration_secs);
    gauge(
        &registry,
        "lotw_scrape_success",
        "1 if last scrape was successful, 0 otherwise",
    )?
    .set(if status.success { 1.0 } else { 0.0 });
    gauge(
        &registry,
        "lotw_last_fetch_timestamp_seconds",
        "Timestamp of the last successful LoTW fetch",
    )?
    .set(status.last_success_timestamp.unwrap_or_default() as f64);
    gauge(
        &registry,
        "lotw_fetch_failures_consecutive",
        "Number of failed fetch cycles since the last success",
    )?
    .set(status.consecutive_failures as f64);

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
