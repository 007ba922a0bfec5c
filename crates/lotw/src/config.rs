// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::client::LotwClientConfig;
use crate::constants::{
    DEFAULT_EXPORTER_HOST, DEFAULT_EXPORTER_PORT, DEFAULT_FETCH_INTERVAL, DEFAULT_FETCH_TIMEOUT,
    DEFAULT_LOG_LEVEL, DEFAULT_LOTW_URL, DEFAULT_MAX_RECORD_BYTES, DEFAULT_START_DATE,
};

#[derive(Clone)]
pub struct Config {
    pub lotw: LotwClientConfig,
    /// how often to fetch the report
    pub fetch_interval: Duration,
    /// largest single record the tokenizer will buffer
    pub max_record_bytes: usize,
    pub exporter_addr: SocketAddr,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("username", &self.lotw.username)
            .field("base_url", &self.lotw.base_url)
            .field("start_date", &self.lotw.start_date)
            .field("fetch_timeout", &self.lotw.timeout)
            .field("fetch_interval", &self.fetch_interval)
            .field("max_record_bytes", &self.max_record_bytes)
            .field("exporter_addr", &self.exporter_addr)
            .finish()
    }
}

impl Config {
    pub fn new() -> anyhow::Result<Config> {
        let username = env::var("LOTW_USERNAME")
            .map_err(|_| anyhow::anyhow!("LOTW_USERNAME environment variable is not set"))?;
        let password = env::var("LOTW_PASSWORD")
            .map_err(|_| anyhow::anyhow!("LOTW_PASSWORD environment variable is not set"))?;

        // LOTW_URL will primarily be used for integration tests
        let base_url = env::var("LOTW_URL").unwrap_or_else(|_| DEFAULT_LOTW_URL.to_string());
        let start_date =
            env::var("LOTW_START_DATE").unwrap_or_else(|_| DEFAULT_START_DATE.to_string());

        let fetch_interval = Duration::from_secs(parse_env_or(
            "LOTW_FETCH_INTERVAL_SECS",
            DEFAULT_FETCH_INTERVAL.as_secs(),
        ));
        if fetch_interval.is_zero() {
            return Err(anyhow::anyhow!(
                "LOTW_FETCH_INTERVAL_SECS must be greater than zero"
            ));
        }
        let timeout = Duration::from_secs(parse_env_or(
            "LOTW_FETCH_TIMEOUT_SECS",
            DEFAULT_FETCH_TIMEOUT.as_secs(),
        ));
        let max_record_bytes = parse_env_or("LOTW_MAX_RECORD_BYTES", DEFAULT_MAX_RECORD_BYTES);

        let host =
            env::var("LOTW_EXPORTER_HOST").unwrap_or_else(|_| DEFAULT_EXPORTER_HOST.to_string());
        let host = IpAddr::from_str(&host)
            .map_err(|e| anyhow::anyhow!("Invalid LOTW_EXPORTER_HOST {host}: {e}"))?;
        let port = parse_env_or("LOTW_EXPORTER_PORT", DEFAULT_EXPORTER_PORT);

        Ok(Config {
            lotw: LotwClientConfig {
                username,
                password,
                base_url,
                start_date,
                timeout,
            },
            fetch_interval,
            max_record_bytes,
            exporter_addr: SocketAddr::new(host, port),
        })
    }
}

/// The `LOTW_LOG_LEVEL` filter directive, lowercased.
///
/// Read on its own so logging can be set up before [`Config::new`] reports errors.
#[must_use]
pub fn log_level() -> String {
    env::var("LOTW_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
}

/// Reads and parses an optional variable, falling back to `default` when unset or invalid.
fn parse_env_or<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("Ignoring invalid {name}={raw}, using {default}");
            default
        }),
        Err(_) => default,
    }
}
