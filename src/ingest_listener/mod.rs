use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::CONTENT_TYPE;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::connectivity::{Connectivity, ConnectivitySignal};
use crate::delivery::{DeliveryOrchestrator, Exchange, SubmitOutcome};
use crate::sample::{Fix, Sample};
use crate::transport::Transport;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to bind ingest listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Loopback only: the capture side runs on the same host.
pub async fn bind(port: u16) -> Result<TcpListener, IngestError> {
    TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|source| IngestError::Bind { port, source })
}

/// What every handler task shares.
pub struct IngestState<T: Transport> {
    pub orchestrator: Arc<DeliveryOrchestrator<T>>,
    pub connectivity: Connectivity,
}

impl<T: Transport> Clone for IngestState<T> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            connectivity: self.connectivity.clone(),
        }
    }
}

enum Route {
    Samples,
    Connectivity,
    Status,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl From<SubmitOutcome> for SubmitResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        match outcome {
            SubmitOutcome::Success => Self {
                status: "success",
                message: None,
            },
            SubmitOutcome::Cached => Self {
                status: "cached",
                message: None,
            },
            SubmitOutcome::Error(reason) => Self {
                status: "error",
                message: Some(reason),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectivityUpdate {
    available: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    available: bool,
    pending: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_exchange: Option<Exchange>,
}

fn response(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::default())
        .unwrap_or_default()
}

fn json<V: Serialize>(value: &V) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .unwrap_or_default(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode response");
            response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Validate the incoming request: route and method. Body is read per route.
fn route<B>(req: &Request<B>) -> Result<Route, (StatusCode, String)> {
    let path = req.uri().path();
    let method = req.method();

    let (route, allowed) = match path {
        "/v1/samples" => (Route::Samples, Method::POST),
        "/v1/connectivity" => (Route::Connectivity, Method::POST),
        "/v1/status" => (Route::Status, Method::GET),
        _ => return Err((StatusCode::NOT_FOUND, format!("unknown path: {path}"))),
    };
    if *method != allowed {
        return Err((StatusCode::METHOD_NOT_ALLOWED, format!("{method} {path}")));
    }
    Ok(route)
}

async fn read_json<B, V>(req: Request<B>) -> Result<V, (StatusCode, String)>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    V: for<'de> Deserialize<'de>,
{
    let path = req.uri().path().to_owned();
    let body = req.collect().await.map(|c| c.to_bytes()).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            format!("POST {path}: failed to read body"),
        )
    })?;
    serde_json::from_slice(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("POST {path}: {e}")))
}

fn check_fix(fix: &Fix) -> Result<(), (StatusCode, String)> {
    let in_range = fix.latitude.is_finite()
        && fix.longitude.is_finite()
        && (-90.0..=90.0).contains(&fix.latitude)
        && (-180.0..=180.0).contains(&fix.longitude);
    if in_range {
        Ok(())
    } else {
        Err((
            StatusCode::BAD_REQUEST,
            format!("coordinates out of range: {}, {}", fix.latitude, fix.longitude),
        ))
    }
}

async fn dispatch<B, T>(
    req: Request<B>,
    state: &IngestState<T>,
) -> Result<Response<Full<Bytes>>, (StatusCode, String)>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    T: Transport,
{
    match route(&req)? {
        Route::Samples => {
            let fix: Fix = read_json(req).await?;
            check_fix(&fix)?;
            let outcome = state.orchestrator.submit(Sample::from_fix(fix)).await;
            Ok(json(&SubmitResponse::from(outcome)))
        }
        Route::Connectivity => {
            let update: ConnectivityUpdate = read_json(req).await?;
            state.connectivity.set_available(update.available);
            Ok(response(StatusCode::NO_CONTENT))
        }
        Route::Status => Ok(json(&StatusResponse {
            available: state.connectivity.is_available(),
            pending: state.orchestrator.pending_count(),
            last_exchange: state.orchestrator.last_exchange(),
        })),
    }
}

async fn handle<B, T>(
    req: Request<B>,
    state: IngestState<T>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    T: Transport,
{
    match dispatch(req, &state).await {
        Ok(resp) => Ok(resp),
        Err((status, reason)) => {
            tracing::warn!(reason, "ingest request rejected");
            Ok(response(status))
        }
    }
}

/// Accept connections until `cancel` fires.
///
/// On cancellation every open connection is shut down gracefully and this
/// returns only once their in-flight requests have been answered, so every
/// accepted sample is either delivered or in the store.
pub async fn serve<T: Transport + 'static>(
    listener: TcpListener,
    state: IngestState<T>,
    cancel: CancellationToken,
) {
    let connections = TaskTracker::new();
    loop {
        tokio::select! {
            result = listener.accept() => {
                let stream = match result {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                let state = state.clone();
                let cancel = cancel.clone();
                connections.spawn(async move {
                    let service = service_fn(move |req| handle(req, state.clone()));
                    let builder = Builder::new(TokioExecutor::new());
                    let conn = builder.serve_connection(TokioIo::new(stream), service);
                    tokio::pin!(conn);
                    tokio::select! {
                        _ = conn.as_mut() => {}
                        _ = cancel.cancelled() => {
                            conn.as_mut().graceful_shutdown();
                            let _ = conn.await;
                        }
                    }
                });
            }
            _ = cancel.cancelled() => {
                break;
            }
        }
    }

    connections.close();
    if !connections.is_empty() {
        tracing::debug!(open = connections.len(), "waiting for open connections");
    }
    connections.wait().await;
}
