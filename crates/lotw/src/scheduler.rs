// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The fetch, decode, aggregate and publish cycle.
//!
//! One cycle runs immediately at startup, then one per interval tick. Cycles are awaited inline,
//! so they never overlap; ticks missed while a slow cycle was in flight are skipped rather than
//! replayed. Any failing stage ends the cycle, records a failure and keeps the previous snapshot.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adif::{decode_record, RecordTokenizer};
use crate::aggregator::{AggregatedSnapshot, Aggregator};
use crate::client::ReportSource;
use crate::constants::MIN_FETCH_INTERVAL;
use crate::errors::{CycleError, FailureKind, ParseError};
use crate::store::MetricsStore;

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success {
        snapshot: Arc<AggregatedSnapshot>,
        duration: Duration,
    },
    Failure {
        kind: FailureKind,
        duration: Duration,
    },
}

impl FetchOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        match self {
            FetchOutcome::Success { duration, .. } | FetchOutcome::Failure { duration, .. } => {
                *duration
            }
        }
    }
}

pub struct Scheduler {
    source: Arc<dyn ReportSource>,
    store: Arc<MetricsStore>,
    interval: Duration,
    max_record_bytes: usize,
}

impl Scheduler {
    /// Intervals below [`MIN_FETCH_INTERVAL`] are raised to it.
    #[must_use]
    pub fn new(
        source: Arc<dyn ReportSource>,
        store: Arc<MetricsStore>,
        interval: Duration,
        max_record_bytes: usize,
    ) -> Self {
        let interval = if interval < MIN_FETCH_INTERVAL {
            warn!("Fetch interval {interval:?} is too short, using {MIN_FETCH_INTERVAL:?}");
            MIN_FETCH_INTERVAL
        } else {
            interval
        };
        Scheduler {
            source,
            store,
            interval,
            max_record_bytes,
        }
    }

    /// Runs cycles until the token is cancelled.
    ///
    /// Cancellation is observed between cycles; an in-flight fetch is bounded only by the
    /// client's own timeout.
    pub async fn run(self, cancel_token: CancellationToken) {
        debug!("Fetch scheduler started, interval {:?}", self.interval);
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // the first tick completes immediately
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let duration = self.run_once().await.duration();
            if duration > self.interval {
                warn!(
                    "Fetch cycle took {:.1}s, longer than the {:?} interval; skipping missed ticks",
                    duration.as_secs_f64(),
                    self.interval
                );
            }
        }

        debug!("Fetch scheduler stopped");
    }

    /// Runs a single cycle and records its outcome in the store.
    pub async fn run_once(&self) -> FetchOutcome {
        let start = Instant::now();
        debug!("Starting LoTW fetch");

        match self.cycle().await {
            Ok(snapshot) => {
                let duration = start.elapsed();
                self.store.publish(Arc::clone(&snapshot), duration);
                info!(
                    "LoTW fetch complete. Processed {} records in {:.3}s",
                    snapshot.record_count,
                    duration.as_secs_f64()
                );
                FetchOutcome::Success { snapshot, duration }
            }
            Err(e) => {
                let duration = start.elapsed();
                let kind = e.kind();
                error!("LoTW fetch failed ({kind}): {e}");
                self.store.record_failure(kind, duration);
                FetchOutcome::Failure { kind, duration }
            }
        }
    }

    async fn cycle(&self) -> Result<Arc<AggregatedSnapshot>, CycleError> {
        let body = self.source.fetch_report().await?;
        debug!("Downloaded {} bytes from LoTW", body.len());

        let max_record_bytes = self.max_record_bytes;
        // a full report can take a while to decode, keep it off the async workers
        let snapshot =
            tokio::task::spawn_blocking(move || aggregate_report(&body, max_record_bytes))
                .await??;
        Ok(Arc::new(snapshot))
    }
}

/// Tokenizes, decodes and aggregates one raw report.
fn aggregate_report(
    body: &[u8],
    max_record_bytes: usize,
) -> Result<AggregatedSnapshot, ParseError> {
    let mut aggregator = Aggregator::new();
    for raw in RecordTokenizer::new(body, max_record_bytes) {
        aggregator.insert(&decode_record(&raw?));
    }
    Ok(aggregator.into_snapshot())
}
