// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # LoTW
//!
//! Periodically downloads a Logbook of The World ADIF report, aggregates it into per band/mode
//! counters and publishes the result for Prometheus-style scraping.
//!
//! ## Architecture
//!
//! - [`adif`]: streaming record tokenizer and best-effort field decoder
//! - [`aggregator`]: turns decoded records into an immutable [`aggregator::AggregatedSnapshot`]
//! - [`store`]: the single shared snapshot, replaced wholesale after each successful cycle
//! - [`scheduler`]: runs the fetch, decode, aggregate and publish cycle on a fixed interval
//! - [`client`]: the LoTW HTTP report source
//! - [`exposition`] and [`server`]: render and serve the store for scrapers

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod adif;
pub mod aggregator;
pub mod client;
pub mod config;
pub mod constants;
pub mod errors;
pub mod exposition;
pub mod scheduler;
pub mod server;
pub mod store;
