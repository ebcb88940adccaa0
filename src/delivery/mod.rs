use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connectivity::ConnectivitySignal;
use crate::planner::{BATCH_SIZE, Batch, plan_with_size};
use crate::sample::Sample;
use crate::store::PendingStore;
use crate::transport::{Outcome, Transport};

/// What happened to a submitted sample, as reported to the capture side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Delivered; never cached.
    Success,
    /// Queued for a later drain.
    Cached,
    /// The collector rejected the sample. It is still queued for retry.
    Error(String),
}

impl fmt::Display for SubmitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitOutcome::Success => write!(f, "success"),
            SubmitOutcome::Cached => write!(f, "cached"),
            SubmitOutcome::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// Last request sent (or cached) and a one-line summary of what came back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exchange {
    pub request: String,
    pub response: String,
}

/// Decides per sample between the fast path and the pending store, and
/// drains the store in bounded batches.
///
/// `submit` and `drain` may run concurrently from different tasks; the store
/// is the only state they share. Drains are serialized among themselves so a
/// second trigger works from a fresh snapshot instead of resending.
pub struct DeliveryOrchestrator<T: Transport> {
    store: Arc<dyn PendingStore>,
    connectivity: Arc<dyn ConnectivitySignal>,
    transport: T,
    batch_size: usize,
    drain_lock: Mutex<()>,
    exchanges: watch::Sender<Option<Exchange>>,
}

impl<T: Transport> DeliveryOrchestrator<T> {
    pub fn new(
        store: Arc<dyn PendingStore>,
        connectivity: Arc<dyn ConnectivitySignal>,
        transport: T,
    ) -> Self {
        let (exchanges, _) = watch::channel(None);
        Self {
            store,
            connectivity,
            transport,
            batch_size: BATCH_SIZE,
            drain_lock: Mutex::new(()),
            exchanges,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_available()
    }

    pub fn pending_count(&self) -> usize {
        self.store.count()
    }

    pub fn has_pending(&self) -> bool {
        self.pending_count() > 0
    }

    pub fn last_exchange(&self) -> Option<Exchange> {
        self.exchanges.borrow().clone()
    }

    pub fn subscribe_exchanges(&self) -> watch::Receiver<Option<Exchange>> {
        self.exchanges.subscribe()
    }

    /// Hot path for a freshly captured sample.
    ///
    /// Offline samples go straight to the store. Otherwise the sample is sent
    /// alone; anything but `Success` leaves it queued.
    pub async fn submit(&self, sample: Sample) -> SubmitOutcome {
        if !self.connectivity.is_available() {
            debug!(id = %sample.id, "offline, caching sample");
            let batch = Batch::single(sample.clone());
            self.store.enqueue(sample);
            self.publish(&batch, "Cached (offline)".to_owned());
            return SubmitOutcome::Cached;
        }

        let batch = Batch::single(sample.clone());
        let outcome = self.transport.send(&batch).await;
        self.publish(&batch, outcome.to_string());

        match outcome {
            Outcome::Success => {
                debug!(id = %sample.id, "sample delivered");
                SubmitOutcome::Success
            }
            Outcome::Unreachable(reason) => {
                warn!(id = %sample.id, reason, "collector unreachable, caching sample");
                self.store.enqueue(sample);
                SubmitOutcome::Cached
            }
            Outcome::Rejected(reason) => {
                warn!(id = %sample.id, reason, "collector rejected sample, caching for retry");
                self.store.enqueue(sample);
                SubmitOutcome::Error(reason)
            }
        }
    }

    /// Try to deliver everything pending. Returns how many samples were
    /// confirmed delivered and removed.
    pub async fn drain(&self) -> usize {
        self.drain_until(&CancellationToken::new()).await
    }

    /// [`drain`](Self::drain) that stops early once `cancel` fires.
    ///
    /// An interrupted batch counts as undelivered; batches already confirmed
    /// are still removed before returning.
    pub async fn drain_until(&self, cancel: &CancellationToken) -> usize {
        let _guard = self.drain_lock.lock().await;

        if !self.connectivity.is_available() {
            debug!("offline, skipping drain");
            return 0;
        }

        let snapshot = self.store.peek_all();
        if snapshot.is_empty() {
            return 0;
        }

        let batches = plan_with_size(&snapshot, self.batch_size);
        let mut delivered: HashSet<String> = HashSet::new();
        let mut synced = 0;

        for (index, batch) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(batch = index, "drain cancelled before batch");
                break;
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(batch = index, "drain cancelled mid-batch");
                    break;
                }
                outcome = self.transport.send(batch) => outcome,
            };
            self.publish(batch, outcome.to_string());

            match outcome {
                Outcome::Success => {
                    delivered.extend(batch.sample_ids().map(str::to_owned));
                    synced += batch.len();
                }
                Outcome::Rejected(reason) => {
                    // Rejections are batch-specific; the rest of the queue can still go.
                    warn!(batch = index, size = batch.len(), reason, "batch rejected, keeping queued");
                }
                Outcome::Unreachable(reason) => {
                    warn!(
                        batch = index,
                        remaining_batches = batches.len() - index,
                        reason,
                        "collector unreachable, aborting drain"
                    );
                    break;
                }
            }
        }

        if !delivered.is_empty() {
            self.store.remove_by_ids(&delivered);
        }

        info!(
            synced,
            batches = batches.len(),
            pending = self.store.count(),
            "drain finished"
        );
        synced
    }

    fn publish(&self, batch: &Batch, response: String) {
        let request = serde_json::to_string(&batch.to_request()).unwrap_or_default();
        self.exchanges
            .send_replace(Some(Exchange { request, response }));
    }
}
