use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::{Compression, Config};
use crate::connectivity::ConnectivitySignal;
use crate::drain_trigger::DrainStrategy;
use crate::planner::Batch;
use crate::sample::Sample;
use crate::store::{PendingStore, StoreBackend};
use crate::transport::{Outcome, Transport};

pub fn sample(n: usize) -> Sample {
    Sample {
        id: format!("s-{n}"),
        latitude: n as f64,
        longitude: -(n as f64),
        accuracy: 5.0,
        speed: None,
        heading: None,
        altitude: None,
        tracked_at: "2026-01-01T00:00:00.000+00:00".into(),
        is_synced: false,
    }
}

pub fn samples(range: Range<usize>) -> Vec<Sample> {
    range.map(sample).collect()
}

pub fn ids(samples: &[Sample]) -> Vec<String> {
    samples.iter().map(|s| s.id.clone()).collect()
}

/// Plays back scripted outcomes in order, then succeeds once the script is
/// exhausted. Records the sample ids of every batch it was handed, before
/// the optional delay.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Outcome>>,
    sent: Mutex<Vec<Vec<String>>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Outcome>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            sent: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn sent(&self) -> Vec<Vec<String>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, batch: &Batch) -> Outcome {
        self.sent
            .lock()
            .unwrap()
            .push(batch.sample_ids().map(str::to_owned).collect());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Success)
    }
}

/// Succeeds after `delay`. Counts calls that completed.
pub struct SlowTransport {
    pub delay: Duration,
    pub completed: Mutex<usize>,
}

impl SlowTransport {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            completed: Mutex::new(0),
        }
    }
}

impl Transport for SlowTransport {
    async fn send(&self, _batch: &Batch) -> Outcome {
        tokio::time::sleep(self.delay).await;
        *self.completed.lock().unwrap() += 1;
        Outcome::Success
    }
}

/// Enqueues a fresh sample into `store` while each batch is in flight,
/// standing in for the capture side racing a drain.
pub struct RacingTransport {
    pub store: Arc<dyn PendingStore>,
    pub next: Mutex<usize>,
}

impl Transport for RacingTransport {
    async fn send(&self, _batch: &Batch) -> Outcome {
        let n = {
            let mut next = self.next.lock().unwrap();
            *next += 1;
            *next
        };
        self.store.enqueue(sample(10_000 + n));
        tokio::task::yield_now().await;
        Outcome::Success
    }
}

/// Answers availability reads from a script, repeating the last answer
/// once it runs out. Counts reads.
pub struct ScriptedSignal {
    answers: Vec<bool>,
    reads: AtomicUsize,
}

impl ScriptedSignal {
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            answers,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ConnectivitySignal for ScriptedSignal {
    fn is_available(&self) -> bool {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        self.answers
            .get(n)
            .or(self.answers.last())
            .copied()
            .unwrap_or(true)
    }
}

/// Bind to port 0 and return the OS-assigned port.
/// The listener is dropped, freeing the port for the caller to rebind.
pub async fn free_port() -> u16 {
    tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub async fn dummy_config() -> Config {
    let _ = rustls::crypto::ring::default_provider().install_default();
    Config {
        endpoint: url::Url::parse("http://localhost:8080/api").unwrap(),
        listener_port: free_port().await,
        request_timeout: Duration::from_millis(500),
        compression: Compression::None,
        export_headers: vec![],
        store: StoreBackend::Memory,
        batch_size: 50,
        drain_strategy: DrainStrategy::Reconnect,
        drain_budget: Duration::from_secs(5),
        probe_interval: None,
    }
}
