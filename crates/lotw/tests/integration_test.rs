// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use lotw::{
    client::{LotwClient, LotwClientConfig},
    constants::DEFAULT_MAX_RECORD_BYTES,
    scheduler::{FetchOutcome, Scheduler},
    server::ScrapeServer,
    store::MetricsStore,
};
use mockito::{Matcher, Server};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const REPORT: &str = "ARRL Logbook of the World Status Report
<PROGRAMID:4>LoTW
<APP_LOTW_NUMREC:1>3
<eoh>

<APP_LOTW_OWNCALL:6>N0CALL
<CALL:5>K1ABC
<BAND:3>20M
<MODE:2>CW
<QSO_DATE:8>20230101
<APP_LOTW_QSO_TIMESTAMP:20>2023-01-01T12:00:00Z
<QSL_RCVD:1>Y
<DXCC:3>291
<eor>

<CALL:6>JA1XYZ
<BAND:3>20M
<MODE:3>SSB
<QSO_DATE:8>20230102
<QSL_RCVD:1>N
<eor>

<CALL:5>DL1AA
<BAND:3>40M
<MODE:3>FT8
<QSO_DATE:8>20230102
<QSL_RCVD:1>y
<DXCC:3>230
<eor>
";

fn client_config(url: String) -> LotwClientConfig {
    LotwClientConfig {
        username: "N0CALL".to_string(),
        password: "mock-password".to_string(),
        base_url: url,
        start_date: "1900-01-01".to_string(),
        timeout: Duration::from_secs(5),
    }
}

async fn scrape(addr: std::net::SocketAddr) -> String {
    reqwest::get(format!("http://{addr}/metrics"))
        .await
        .expect("scrape failed")
        .text()
        .await
        .expect("scrape body failed")
}

#[tokio::test]
async fn exporter_serves_report_and_keeps_it_through_failures() {
    let mut lotw_server = Server::new_async().await;
    let report_mock = lotw_server
        .mock("GET", "/lotwuser/lotwreport.adi")
        .match_query(Matcher::UrlEncoded("login".into(), "N0CALL".into()))
        .with_status(200)
        .with_body(REPORT)
        .create_async()
        .await;

    let client = LotwClient::new(client_config(format!(
        "{}/lotwuser/lotwreport.adi",
        lotw_server.url()
    )))
    .expect("failed to create client");
    let store = Arc::new(MetricsStore::new());
    let scheduler = Scheduler::new(
        Arc::new(client),
        Arc::clone(&store),
        Duration::from_secs(3600),
        DEFAULT_MAX_RECORD_BYTES,
    );

    let scrape_server = ScrapeServer::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&store))
        .await
        .expect("failed to bind scrape server");
    let addr = scrape_server.local_addr().unwrap();
    let cancel_token = CancellationToken::new();
    tokio::spawn(scrape_server.serve(cancel_token.clone()));

    let outcome = scheduler.run_once().await;
    assert!(outcome.is_success());
    report_mock.assert_async().await;

    let metrics = scrape(addr).await;
    assert!(metrics.contains("lotw_qso_total{band=\"20M\",mode=\"CW\"} 1"));
    assert!(metrics.contains("lotw_qso_total{band=\"20M\",mode=\"SSB\"} 1"));
    assert!(metrics.contains("lotw_qso_total{band=\"40M\",mode=\"FT8\"} 1"));
    assert!(metrics.contains("lotw_qsl_confirmed_total{band=\"40M\",mode=\"FT8\"} 1"));
    assert!(metrics.contains("lotw_dxcc_entities_count 2"));
    assert!(metrics.contains("lotw_qso_history_count{band=\"20M\",date=\"2023-01-01\"} 1"));
    assert!(metrics.contains("lotw_qso_history_count{band=\"20M\",date=\"2023-01-02\"} 1"));
    assert!(metrics.contains("lotw_scrape_success 1"));

    report_mock.remove_async().await;
    let _failure_mock = lotw_server
        .mock("GET", Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let outcome = scheduler.run_once().await;
    assert!(matches!(outcome, FetchOutcome::Failure { .. }));

    let stale = scrape(addr).await;
    assert!(stale.contains("lotw_scrape_success 0"));
    assert!(stale.contains("lotw_fetch_failures_consecutive 1"));
    assert!(stale.contains("lotw_dxcc_entities_count 2"));
    assert!(stale.contains("lotw_qso_total{band=\"20M\",mode=\"CW\"} 1"));

    cancel_token.cancel();
}

#[tokio::test]
async fn scheduler_fetches_immediately_on_start() {
    let mut lotw_server = Server::new_async().await;
    let report_mock = lotw_server
        .mock("GET", Matcher::Any)
        .with_status(200)
        .with_body(REPORT)
        .expect_at_least(1)
        .create_async()
        .await;

    let client =
        LotwClient::new(client_config(lotw_server.url())).expect("failed to create client");
    let store = Arc::new(MetricsStore::new());
    let cancel_token = CancellationToken::new();
    let task = tokio::spawn(
        Scheduler::new(
            Arc::new(client),
            Arc::clone(&store),
            Duration::from_secs(3600),
            DEFAULT_MAX_RECORD_BYTES,
        )
        .run(cancel_token.clone()),
    );

    let published = async {
        while !store.read().status.success {
            sleep(Duration::from_millis(20)).await;
        }
    };
    match timeout(Duration::from_secs(5), published).await {
        Ok(()) => report_mock.assert_async().await,
        Err(_) => panic!("timed out before the first cycle published"),
    }
    assert_eq!(store.read().snapshot.record_count, 3);

    cancel_token.cancel();
    timeout(Duration::from_secs(1), task)
        .await
        .expect("scheduler did not stop")
        .expect("scheduler task failed");
}
