// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::constants::{END_OF_HEADER, END_OF_RECORD};
use crate::errors::FetchError;

/// Where a fetch cycle gets its raw ADIF report from.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch_report(&self) -> Result<Vec<u8>, FetchError>;
}

#[derive(Clone)]
pub struct LotwClientConfig {
    pub username: String,
    pub password: String,
    pub base_url: String,
    /// `YYYY-MM-DD`, sent as `qso_startdate`
    pub start_date: String,
    pub timeout: Duration,
}

/// Downloads the full QSO report of one LoTW account.
pub struct LotwClient {
    config: LotwClientConfig,
    http: reqwest::Client,
}

impl LotwClient {
    pub fn new(config: LotwClientConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(LotwClient { config, http })
    }
}

impl std::fmt::Debug for LotwClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LotwClient")
            .field("username", &self.config.username)
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ReportSource for LotwClient {
    async fn fetch_report(&self) -> Result<Vec<u8>, FetchError> {
        debug!(
            "Requesting LoTW report for {} since {}",
            self.config.username, self.config.start_date
        );
        let response = self
            .http
            .get(&self.config.base_url)
            .query(&[
                ("login", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
                // download report
                ("qso_query", "1"),
                // all QSOs, not only confirmed ones
                ("qso_qsl", "no"),
                ("qso_startdate", self.config.start_date.as_str()),
            ])
            .send()
            .await
            // the query string carries the password
            .map_err(|e| FetchError::Request(e.without_url()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status(status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Request(e.without_url()))?
            .to_vec();
        if is_login_page(&body) {
            return Err(FetchError::Rejected);
        }
        Ok(body)
    }
}

/// LoTW answers bad credentials with a 200 HTML page instead of a report.
fn is_login_page(body: &[u8]) -> bool {
    let has_marker = |marker: &[u8]| {
        body.windows(marker.len())
            .any(|window| window.eq_ignore_ascii_case(marker))
    };
    !has_marker(END_OF_HEADER) && !has_marker(END_OF_RECORD) && has_marker(b"<html")
}
