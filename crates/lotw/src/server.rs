// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{header, http, Method, Request, Response, StatusCode};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::exposition;
use crate::store::MetricsStore;

const METRICS_ENDPOINT_PATH: &str = "/metrics";
const HEALTH_ENDPOINT_PATH: &str = "/health";

type HttpResponse = Response<Full<Bytes>>;

/// Serves the metrics store to scrapers.
pub struct ScrapeServer {
    listener: TcpListener,
    store: Arc<MetricsStore>,
}

impl ScrapeServer {
    pub async fn bind(addr: SocketAddr, store: Arc<MetricsStore>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(ScrapeServer { listener, store })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the token is cancelled.
    pub async fn serve(self, cancel_token: CancellationToken) -> io::Result<()> {
        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();
        debug!("Scrape server listening on {}", self.local_addr()?);

        loop {
            let conn = tokio::select! {
                _ = cancel_token.cancelled() => break,
                con_res = self.listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Scrape server error: {e}");
                        return Err(e);
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
            };

            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let store = Arc::clone(&self.store);
            joinset.spawn(async move {
                let service = service_fn(move |req| handle_request(req, Arc::clone(&store)));
                if let Err(e) = server.serve_connection(conn, service).await {
                    debug!("Connection error: {e}");
                }
            });
        }

        joinset.shutdown().await;
        debug!("Scrape server stopped");
        Ok(())
    }
}

async fn handle_request(
    req: Request<Incoming>,
    store: Arc<MetricsStore>,
) -> http::Result<HttpResponse> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, METRICS_ENDPOINT_PATH) => match exposition::render(&store.read()) {
            Ok(body) => Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, exposition::CONTENT_TYPE)
                .body(Full::new(Bytes::from(body))),
            Err(e) => log_and_create_http_response(
                &format!("Failed to render metrics: {e}"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        },
        (&Method::GET, HEALTH_ENDPOINT_PATH) => {
            let view = store.read();
            let body = json!({
                "status": view.status,
                "records": view.snapshot.record_count,
            });
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from(body.to_string())))
        }
        (_, METRICS_ENDPOINT_PATH | HEALTH_ENDPOINT_PATH) => log_and_create_http_response(
            &format!("Method {} not allowed", req.method()),
            StatusCode::METHOD_NOT_ALLOWED,
        ),
        (_, path) => log_and_create_http_response(
            &format!("No handler for path {path}"),
            StatusCode::NOT_FOUND,
        ),
    }
}

/// Logs the message and returns it as a JSON `{"message": ...}` body.
fn log_and_create_http_response(message: &str, status: StatusCode) -> http::Result<HttpResponse> {
    if status.is_server_error() {
        error!("{message}");
    } else {
        debug!("{message}");
    }
    let body = json!({ "message": message }).to_string();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adif::parse;
    use crate::aggregator::aggregate;
    use crate::errors::FailureKind;
    use std::time::Duration;

    async fn start(store: Arc<MetricsStore>) -> (SocketAddr, CancellationToken) {
        let server = ScrapeServer::bind("127.0.0.1:0".parse().unwrap(), store)
            .await
            .expect("bind failed");
        let addr = server.local_addr().unwrap();
        let cancel_token = CancellationToken::new();
        tokio::spawn(server.serve(cancel_token.clone()));
        (addr, cancel_token)
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let store = Arc::new(MetricsStore::new());
        store.publish(
            aggregate(&parse("<band:3>20M<mode:2>CW<eor>".as_bytes(), 1024).unwrap()),
            Duration::from_secs(1),
        );
        let (addr, cancel_token) = start(Arc::clone(&store)).await;

        let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            exposition::CONTENT_TYPE
        );
        let body = response.text().await.unwrap();
        assert!(body.contains("lotw_qso_total{band=\"20M\",mode=\"CW\"} 1"));
        assert!(body.contains("lotw_scrape_success 1"));

        cancel_token.cancel();
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let store = Arc::new(MetricsStore::new());
        store.record_failure(FailureKind::Fetch, Duration::from_secs(3));
        let (addr, cancel_token) = start(store).await;

        let body: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["status"]["success"], false);
        assert_eq!(body["status"]["last_error"], "fetch");
        assert_eq!(body["status"]["consecutive_failures"], 1);
        assert_eq!(body["records"], 0);

        cancel_token.cancel();
    }

    #[tokio::test]
    async fn test_unknown_path_and_method() {
        let (addr, cancel_token) = start(Arc::new(MetricsStore::new())).await;
        let client = reqwest::Client::new();

        let response = client
            .get(format!("http://{addr}/nope"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["message"], "No handler for path /nope");

        let response = client
            .post(format!("http://{addr}/metrics"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        cancel_token.cancel();
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let store = Arc::new(MetricsStore::new());
        let server = ScrapeServer::bind("127.0.0.1:0".parse().unwrap(), store)
            .await
            .unwrap();
        let cancel_token = CancellationToken::new();
        let task = tokio::spawn(server.serve(cancel_token.clone()));

        cancel_token.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("server did not stop");
        assert!(result.unwrap().is_ok());
    }
}
