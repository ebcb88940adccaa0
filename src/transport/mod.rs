pub mod wire;

use std::fmt;
use std::future::Future;
use std::io::Write;

use flate2::write::GzEncoder;
use reqwest::{Client, Response};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::{Compression, Config};
use crate::planner::Batch;

const TRACKING_PATH: &str = "tracking/location";

/// Classification of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The collector accepted the whole batch.
    Success,
    /// The collector answered but declined this batch's content.
    Rejected(String),
    /// No application-level answer: timeout, DNS, reset, refused.
    Unreachable(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "Success"),
            Outcome::Rejected(reason) => write!(f, "Failure: {reason}"),
            Outcome::Unreachable(_) => write!(f, "NoConnection"),
        }
    }
}

/// Sends one batch to the collector. No retries, no local state.
pub trait Transport: Send + Sync {
    fn send(&self, batch: &Batch) -> impl Future<Output = Outcome> + Send;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid collector URL: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
enum EncodeError {
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("gzip compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

pub struct HttpTransport {
    client: Client,
    url: Url,
    compression: Compression,
    headers: Vec<(String, String)>,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        // Connect and total request ceilings are the same value.
        let client = Client::builder()
            .connect_timeout(config.request_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            url: tracking_url(&config.endpoint)?,
            compression: config.compression,
            headers: config.export_headers.clone(),
        })
    }

    fn encode(&self, batch: &Batch) -> Result<Vec<u8>, EncodeError> {
        let body = serde_json::to_vec(&batch.to_request())?;
        match self.compression {
            Compression::Gzip => Ok(compress_gzip(&body)?),
            Compression::None => Ok(body),
        }
    }
}

impl Transport for HttpTransport {
    async fn send(&self, batch: &Batch) -> Outcome {
        let body = match self.encode(batch) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, batch_id = %batch.id, "failed to encode batch");
                return Outcome::Unreachable(e.to_string());
            }
        };

        let mut req = self
            .client
            .post(self.url.clone())
            .header("content-type", "application/json");

        if self.compression == Compression::Gzip {
            req = req.header("content-encoding", "gzip");
        }

        for (k, v) in &self.headers {
            req = req.header(k, v);
        }

        let outcome = match req.body(body).send().await {
            Ok(resp) => classify(resp).await,
            Err(e) => Outcome::Unreachable(e.to_string()),
        };
        debug!(batch_id = %batch.id, size = batch.len(), %outcome, "batch sent");
        outcome
    }
}

/// 2xx is success; 4xx means the collector looked at the content and said no;
/// anything else is treated as the collector not being properly reachable.
async fn classify(resp: Response) -> Outcome {
    let status = resp.status();
    if status.is_success() {
        return Outcome::Success;
    }

    if status.is_client_error() {
        let body = resp
            .text()
            .await
            .ok()
            .filter(|body| !body.trim().is_empty());
        let reason = body.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("failure")
                .to_owned()
        });
        return Outcome::Rejected(reason);
    }

    Outcome::Unreachable(format!("collector returned HTTP {status}"))
}

/// Resolve the tracking path below the configured endpoint, keeping any base
/// path the endpoint carries.
fn tracking_url(endpoint: &Url) -> Result<Url, url::ParseError> {
    let mut base = endpoint.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(TRACKING_PATH)
}

fn compress_gzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(data)?;
    encoder.finish()
}
