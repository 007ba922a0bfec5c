// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use lotw::{
    client::LotwClient,
    config::{self, Config},
    scheduler::Scheduler,
    server::ScrapeServer,
    store::MetricsStore,
};

#[tokio::main]
pub async fn main() {
    let env_filter = format!(
        "h2=off,hyper=off,hyper_util=off,reqwest=off,rustls=off,{}",
        config::log_level()
    );

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return;
    }

    debug!("Logging subsystem enabled");

    let config = match Config::new() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating config on LoTW exporter startup: {e}");
            return;
        }
    };
    debug!("Loaded config: {config:?}");

    let client = match LotwClient::new(config.lotw.clone()) {
        Ok(client) => client,
        Err(e) => {
            error!("Error creating LoTW client: {e}");
            return;
        }
    };

    let store = Arc::new(MetricsStore::new());
    let cancel_token = CancellationToken::new();

    let scrape_server = match ScrapeServer::bind(config.exporter_addr, Arc::clone(&store)).await {
        Ok(server) => server,
        Err(e) => {
            error!("Error binding scrape server to {}: {e}", config.exporter_addr);
            return;
        }
    };
    info!("lotw-exporter: serving metrics on {}", config.exporter_addr);
    let server_handle = tokio::spawn(scrape_server.serve(cancel_token.clone()));

    let scheduler = Scheduler::new(
        Arc::new(client),
        store,
        config.fetch_interval,
        config.max_record_bytes,
    );
    info!(
        "lotw-exporter: fetching LoTW report every {}s",
        config.fetch_interval.as_secs()
    );
    let scheduler_handle = tokio::spawn(scheduler.run(cancel_token.clone()));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for shutdown signal: {e}");
    }
    info!("Shutting down");
    cancel_token.cancel();

    if let Err(e) = scheduler_handle.await {
        error!("Fetch scheduler task failed: {e}");
    }
    match server_handle.await {
        Ok(Err(e)) => error!("Scrape server failed: {e}"),
        Err(e) => error!("Scrape server task failed: {e}"),
        Ok(Ok(())) => {}
    }
}
