// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the fetch cycle.
//!
//! Field decoding never fails, so nothing here describes a malformed tag. Every error below aborts
//! only the current cycle; the previously published snapshot keeps being served.

use serde::Serialize;

/// Failure to obtain the raw report from the remote source.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("report endpoint returned status: {0}")]
    Status(reqwest::StatusCode),
    #[error("report endpoint returned a page that is not an ADIF report")]
    Rejected,
}

/// Failure while tokenizing the report stream.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("single record exceeds the {limit} byte buffer")]
    StreamTooLarge { limit: usize },
    #[error("reading report: {0}")]
    Io(#[from] std::io::Error),
}

/// Any failure that short-circuits a fetch cycle.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("parse task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CycleError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            CycleError::Fetch(_) => FailureKind::Fetch,
            CycleError::Parse(ParseError::StreamTooLarge { .. }) => FailureKind::StreamTooLarge,
            CycleError::Parse(ParseError::Io(_)) => FailureKind::Read,
            CycleError::Task(_) => FailureKind::Internal,
        }
    }
}

/// Coarse failure classification kept in the metrics store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    StreamTooLarge,
    Read,
    Internal,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Fetch => "fetch",
            FailureKind::StreamTooLarge => "stream_too_large",
            FailureKind::Read => "read",
            FailureKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
