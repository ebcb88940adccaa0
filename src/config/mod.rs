use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::drain_trigger::{DrainStrategy, DrainStrategyError};
use crate::planner::BATCH_SIZE;
use crate::store::StoreBackend;

const PREFIX: &str = "LOCATION_RELAY_";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Compression {
    Gzip,
    None,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("LOCATION_RELAY_ENDPOINT is required but not set")]
    EndpointMissing,

    #[error("LOCATION_RELAY_ENDPOINT is not a valid URL: {0}")]
    EndpointInvalidUrl(String),

    #[error("{0} has invalid value: {1}")]
    InvalidNumeric(String, String),

    #[error("LOCATION_RELAY_COMPRESSION has invalid value: {0} (expected \"gzip\" or \"none\")")]
    InvalidCompression(String),

    #[error("LOCATION_RELAY_STORE has invalid value: {0} (expected \"memory\" or \"file:<path>\")")]
    InvalidStore(String),

    #[error("LOCATION_RELAY_BATCH_SIZE must be greater than zero")]
    ZeroBatchSize,

    #[error("LOCATION_RELAY_DRAIN_STRATEGY: {0}")]
    DrainStrategy(#[from] DrainStrategyError),
}

#[derive(Debug)]
pub struct Config {
    pub endpoint: Url,
    pub listener_port: u16,
    pub request_timeout: Duration,
    pub compression: Compression,
    pub export_headers: Vec<(String, String)>,
    pub store: StoreBackend,
    pub batch_size: usize,
    pub drain_strategy: DrainStrategy,
    pub drain_budget: Duration,
    /// `None` disables the reachability probe.
    pub probe_interval: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> =
            env::vars().filter(|(k, _)| k.starts_with(PREFIX)).collect();
        Self::parse(&vars)
    }

    fn parse(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let endpoint = parse_endpoint(vars)?;
        let listener_port = parse_port(vars, "LOCATION_RELAY_LISTENER_PORT", 4320)?;
        let request_timeout = parse_duration_ms(vars, "LOCATION_RELAY_REQUEST_TIMEOUT_MS", 30_000)?;
        let compression = parse_compression(vars)?;
        let export_headers = parse_headers(vars);
        let store = parse_store(vars)?;
        let batch_size = parse_batch_size(vars)?;
        let drain_strategy = match vars.get("LOCATION_RELAY_DRAIN_STRATEGY") {
            Some(raw) => DrainStrategy::parse(raw)?,
            None => DrainStrategy::ReconnectPeriodically {
                interval: Duration::from_secs(15 * 60),
            },
        };
        let drain_budget = parse_duration_ms(vars, "LOCATION_RELAY_DRAIN_BUDGET_MS", 25_000)?;
        let probe_interval = Some(parse_duration_ms(vars, "LOCATION_RELAY_PROBE_INTERVAL_MS", 0)?)
            .filter(|d| !d.is_zero());

        Ok(Self {
            endpoint,
            listener_port,
            request_timeout,
            compression,
            export_headers,
            store,
            batch_size,
            drain_strategy,
            drain_budget,
            probe_interval,
        })
    }

    /// Host and port the reachability probe connects to.
    pub fn probe_target(&self) -> Option<(String, u16)> {
        let host = self.endpoint.host_str()?.to_owned();
        let port = self.endpoint.port_or_known_default()?;
        Some((host, port))
    }
}

fn parse_endpoint(vars: &HashMap<String, String>) -> Result<Url, ConfigError> {
    let raw = vars
        .get("LOCATION_RELAY_ENDPOINT")
        .filter(|s| !s.is_empty())
        .ok_or(ConfigError::EndpointMissing)?;

    let url = Url::parse(raw).map_err(|_| ConfigError::EndpointInvalidUrl(raw.clone()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ConfigError::EndpointInvalidUrl(raw.clone())),
    }
}

fn parse_port(
    vars: &HashMap<String, String>,
    name: &str,
    default: u16,
) -> Result<u16, ConfigError> {
    match vars.get(name) {
        Some(val) => val
            .parse()
            .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone())),
        None => Ok(default),
    }
}

fn parse_duration_ms(
    vars: &HashMap<String, String>,
    name: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    match vars.get(name) {
        Some(val) => {
            let ms: u64 = val
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(Duration::from_millis(default_ms)),
    }
}

fn parse_compression(vars: &HashMap<String, String>) -> Result<Compression, ConfigError> {
    match vars.get("LOCATION_RELAY_COMPRESSION").map(|s| s.as_str()) {
        Some("none") | None => Ok(Compression::None),
        Some("gzip") => Ok(Compression::Gzip),
        Some(other) => Err(ConfigError::InvalidCompression(other.to_owned())),
    }
}

fn parse_store(vars: &HashMap<String, String>) -> Result<StoreBackend, ConfigError> {
    match vars.get("LOCATION_RELAY_STORE").map(|s| s.as_str()) {
        Some("memory") | Some("") | None => Ok(StoreBackend::Memory),
        Some(other) => match other.strip_prefix("file:") {
            Some(path) if !path.is_empty() => Ok(StoreBackend::File(PathBuf::from(path))),
            _ => Err(ConfigError::InvalidStore(other.to_owned())),
        },
    }
}

fn parse_batch_size(vars: &HashMap<String, String>) -> Result<usize, ConfigError> {
    let name = "LOCATION_RELAY_BATCH_SIZE";
    match vars.get(name) {
        Some(val) => match val.parse::<usize>() {
            Ok(0) => Err(ConfigError::ZeroBatchSize),
            Ok(size) => Ok(size),
            Err(_) => Err(ConfigError::InvalidNumeric(name.to_owned(), val.clone())),
        },
        None => Ok(BATCH_SIZE),
    }
}

fn parse_headers(vars: &HashMap<String, String>) -> Vec<(String, String)> {
    vars.get("LOCATION_RELAY_EXPORT_HEADERS")
        .filter(|s| !s.is_empty())
        .map(|raw| {
            raw.split(',')
                .filter_map(|pair| {
                    let (k, v) = pair.split_once('=')?;
                    let k = k.trim();
                    if k.is_empty() {
                        return None;
                    }
                    Some((k.to_owned(), v.trim().to_owned()))
                })
                .collect()
        })
        .unwrap_or_default()
}
