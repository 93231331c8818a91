//! Minimal `/metrics` + `/health/summary` HTTP surface, grounded on
//! `services/log-collector/src/metrics/http.rs`'s hand-rolled hyper server
//! (no framework — this endpoint carries no business logic, per §10.5).

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::http::{Method, Request, Response, StatusCode};
use hyper::service::service_fn;
use hyper_util::rt::TokioExecutor;
use hyper_util::server::conn::auto::Builder as HyperServerBuilder;
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tracing::instrument;

use crate::controller::Controller;

#[instrument(name = "metrics_http::metrics_handler", target = "metrics::http", skip_all, level = "debug")]
async fn metrics_handler(_req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let metrics_families = prometheus::gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metrics_families, &mut buffer) {
        tracing::error!(error = %err, "failed to encode prometheus metrics");
    }
    let content_type = encoder.format_type().to_string();

    Ok(Response::builder()
        .header(CONTENT_TYPE, content_type)
        .body(Full::new(Bytes::from(buffer)))
        .expect("static response is well-formed"))
}

#[instrument(name = "metrics_http::health_handler", target = "metrics::http", skip_all, level = "debug")]
async fn health_handler(controller: &Controller) -> Result<Response<Full<Bytes>>, Infallible> {
    let summary = controller.health_summary().await;
    let body = serde_json::to_vec(&summary).unwrap_or_default();
    Ok(Response::builder()
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("static response is well-formed"))
}

fn not_found() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Full::new(Bytes::from_static(b"not found")))
        .expect("static response is well-formed")
}

/// Serves `/metrics` and `/health/summary` until the listener is dropped.
/// Callers race this against a shutdown receiver (see `runtime::runtime`).
#[instrument(name = "metrics_http::start_metrics_server", target = "metrics::http", skip_all, level = "debug")]
pub async fn start_metrics_server(addr: &str, controller: Arc<Controller>) -> anyhow::Result<()> {
    let addr: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "metrics/health surface listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let controller = Arc::clone(&controller);

        let service = service_fn(move |req: Request<Incoming>| {
            let controller = Arc::clone(&controller);
            async move {
                match (req.method(), req.uri().path()) {
                    (&Method::GET, "/metrics") => metrics_handler(req).await,
                    (&Method::GET, "/health/summary") => health_handler(&controller).await,
                    _ => Ok(not_found()),
                }
            }
        });

        tokio::spawn(async move {
            if let Err(err) = HyperServerBuilder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                tracing::error!(error = %err, "metrics/health connection error");
            }
        });
    }
}
