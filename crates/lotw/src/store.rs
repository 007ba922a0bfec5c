// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The single published snapshot and the status of the latest fetch cycle.
//!
//! Snapshots are swapped in whole behind an `Arc`, so every lock is held only for a pointer
//! clone or swap. A reader never observes maps from two different cycles.

use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::debug;

use crate::aggregator::AggregatedSnapshot;
use crate::errors::FailureKind;

/// Status of the most recent cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FetchStatus {
    pub success: bool,
    pub last_duration_secs: f64,
    /// Epoch seconds of the last successful publish.
    pub last_success_timestamp: Option<u64>,
    pub last_error: Option<FailureKind>,
    pub consecutive_failures: u64,
    pub cycles: u64,
}

/// A consistent read of the store.
#[derive(Debug, Clone)]
pub struct StoreView {
    pub snapshot: Arc<AggregatedSnapshot>,
    pub status: FetchStatus,
}

#[derive(Debug, Default)]
struct StoreState {
    snapshot: Arc<AggregatedSnapshot>,
    status: FetchStatus,
}

#[derive(Debug, Default)]
pub struct MetricsStore {
    state: RwLock<StoreState>,
}

impl MetricsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the published snapshot and marks the cycle successful.
    pub fn publish(&self, snapshot: impl Into<Arc<AggregatedSnapshot>>, duration: Duration) {
        self.publish_at(snapshot.into(), duration, SystemTime::now());
    }

    fn publish_at(&self, snapshot: Arc<AggregatedSnapshot>, duration: Duration, now: SystemTime) {
        let timestamp = now
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();

        #[allow(clippy::expect_used)]
        let mut state = self.state.write().expect("lock poisoned");
        state.snapshot = snapshot;
        state.status = FetchStatus {
            success: true,
            last_duration_secs: duration.as_secs_f64(),
            last_success_timestamp: Some(timestamp),
            last_error: None,
            consecutive_failures: 0,
            cycles: state.status.cycles + 1,
        };
        debug!("Published snapshot at {timestamp}");
    }

    /// Records a failed cycle. The published snapshot is left untouched.
    pub fn record_failure(&self, kind: FailureKind, duration: Duration) {
        #[allow(clippy::expect_used)]
        let mut state = self.state.write().expect("lock poisoned");
        let status = &mut state.status;
        status.success = false;
        status.last_duration_secs = duration.as_secs_f64();
        status.last_error = Some(kind);
        status.consecutive_failures += 1;
        status.cycles += 1;
    }

    #[must_use]
    pub fn read(&self) -> StoreView {
        #[allow(clippy::expect_used)]
        let state = self.state.read().expect("lock poisoned");
        StoreView {
            snapshot: Arc::clone(&state.snapshot),
            status: state.status.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adif::parse;
    use crate::aggregator::aggregate;

    fn snapshot(input: &str) -> AggregatedSnapshot {
        aggregate(&parse(input.as_bytes(), 1024).unwrap())
    }

    #[test]
    fn test_initial_state() {
        let store = MetricsStore::new();
        let view = store.read();
        assert_eq!(*view.snapshot, AggregatedSnapshot::default());
        assert!(!view.status.success);
        assert_eq!(view.status.last_success_timestamp, None);
        assert_eq!(view.status.cycles, 0);
    }

    #[test]
    fn test_publish_replaces_snapshot() {
        let store = MetricsStore::new();
        let first = snapshot("<band:3>20M<mode:2>CW<eor>");
        store.publish_at(
            Arc::new(first.clone()),
            Duration::from_millis(1500),
            UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        );

        let view = store.read();
        assert_eq!(*view.snapshot, first);
        assert!(view.status.success);
        assert_eq!(view.status.last_duration_secs, 1.5);
        assert_eq!(view.status.last_success_timestamp, Some(1_700_000_000));

        let second = snapshot("<band:3>40M<mode:3>SSB<eor>");
        store.publish(second.clone(), Duration::from_secs(1));
        assert_eq!(*store.read().snapshot, second);
        assert_eq!(store.read().status.cycles, 2);
    }

    #[test]
    fn test_failure_keeps_previous_snapshot() {
        let store = MetricsStore::new();
        let published = snapshot("<band:3>20M<mode:2>CW<qsl_rcvd:1>Y<dxcc:3>291<eor>");
        store.publish_at(
            Arc::new(published.clone()),
            Duration::from_secs(2),
            UNIX_EPOCH + Duration::from_secs(42),
        );
        let before = store.read().snapshot;

        store.record_failure(FailureKind::Fetch, Duration::from_secs(60));
        store.record_failure(FailureKind::StreamTooLarge, Duration::from_secs(1));

        let view = store.read();
        assert!(Arc::ptr_eq(&before, &view.snapshot));
        assert_eq!(*view.snapshot, published);
        assert!(!view.status.success);
        assert_eq!(view.status.last_duration_secs, 1.0);
        assert_eq!(view.status.last_success_timestamp, Some(42));
        assert_eq!(view.status.last_error, Some(FailureKind::StreamTooLarge));
        assert_eq!(view.status.consecutive_failures, 2);

        store.publish(published, Duration::from_secs(1));
        let status = store.read().status;
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.last_error, None);
    }

    #[test]
    fn test_concurrent_reads_never_torn() {
        use std::thread;

        let store = Arc::new(MetricsStore::new());
        let small = snapshot("<band:3>20M<mode:2>CW<eor>");
        let large = snapshot(
            "<band:3>20M<mode:2>CW<eor><band:3>40M<mode:2>CW<qsl_rcvd:1>Y<dxcc:1>1<eor>",
        );

        let writer_store = Arc::clone(&store);
        let (writer_small, writer_large) = (small.clone(), large.clone());
        let writer = thread::spawn(move || {
            for i in 0..500 {
                let next = if i % 2 == 0 {
                    writer_small.clone()
                } else {
                    writer_large.clone()
                };
                writer_store.publish(next, Duration::from_millis(1));
            }
        });

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let (small, large) = (small.clone(), large.clone());
                thread::spawn(move || {
                    for _ in 0..500 {
                        let view = store.read();
                        let seen = &*view.snapshot;
                        assert!(
                            *seen == small
                                || *seen == large
                                || *seen == AggregatedSnapshot::default()
                        );
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
