use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connectivity::{Connectivity, ReachabilityProbe};
use crate::delivery::DeliveryOrchestrator;
use crate::drain_trigger::{self, DrainCoordinator, DrainReport};
use crate::error::ExitError;
use crate::ingest_listener::{self, IngestError, IngestState};
use crate::transport::Transport;

/// Owns all state for the relay's main select! loop.
///
/// Capture happens in the ingest listener's handler tasks; this loop only
/// decides when to drain. At most one drain task is in flight at a time.
pub struct EventLoop<T: Transport + 'static> {
    orchestrator: Arc<DeliveryOrchestrator<T>>,
    coordinator: DrainCoordinator,
    // Held so the watch sender outlives every receiver.
    _connectivity: Connectivity,
    connectivity_rx: watch::Receiver<bool>,
    budget: Duration,
    drain_task: Option<JoinHandle<DrainReport>>,
    cancel: CancellationToken,
    listener_task: Option<JoinHandle<()>>,
    probe: Option<ReachabilityProbe>,
}

impl<T: Transport + 'static> EventLoop<T> {
    /// Bind the ingest listener and spawn it, plus the reachability probe
    /// when one is configured.
    pub async fn new(
        orchestrator: Arc<DeliveryOrchestrator<T>>,
        connectivity: Connectivity,
        config: &Config,
        cancel: CancellationToken,
    ) -> Result<Self, IngestError> {
        let listener = ingest_listener::bind(config.listener_port).await?;
        let state = IngestState {
            orchestrator: orchestrator.clone(),
            connectivity: connectivity.clone(),
        };
        let listener_task = tokio::spawn(ingest_listener::serve(listener, state, cancel.clone()));

        let probe = match (config.probe_interval, config.probe_target()) {
            (Some(interval), Some((host, port))) => Some(ReachabilityProbe::spawn(
                connectivity.clone(),
                host,
                port,
                interval,
                config.request_timeout,
            )),
            (Some(_), None) => {
                warn!(endpoint = %config.endpoint, "no probe target in endpoint, probe disabled");
                None
            }
            (None, _) => None,
        };

        info!(
            port = config.listener_port,
            strategy = %config.drain_strategy,
            "relay started"
        );

        Ok(Self {
            orchestrator,
            coordinator: DrainCoordinator::new(config.drain_strategy.clone()),
            connectivity_rx: connectivity.subscribe(),
            _connectivity: connectivity,
            budget: config.drain_budget,
            drain_task: None,
            cancel,
            listener_task: Some(listener_task),
            probe,
        })
    }

    /// Run until `cancel` fires, then drain one last time.
    ///
    /// Returns `Err(ExitError)` if the ingest listener died unexpectedly.
    pub async fn run(&mut self) -> Result<(), ExitError> {
        // Samples left over from a previous run.
        if self.orchestrator.has_pending() {
            self.spawn_drain("startup");
        }
        loop {
            match self.tick().await {
                ControlFlow::Break(result) => return result,
                ControlFlow::Continue(()) => {}
            }
        }
    }

    /// Run one tick of the event loop.
    ///
    /// Multiplexes shutdown, connectivity changes, drain completion, deferred
    /// reconnect drains, the periodic timer and listener liveness.
    async fn tick(&mut self) -> ControlFlow<Result<(), ExitError>> {
        let idle = self.drain_task.is_none();
        let deferred = self.coordinator.deferred_reconnect();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return ControlFlow::Break(self.shutdown().await);
            }
            changed = self.connectivity_rx.changed() => {
                if changed.is_err() {
                    return ControlFlow::Break(Err(ExitError::RuntimeFailure(
                        "connectivity signal closed".into(),
                    )));
                }
                let available = *self.connectivity_rx.borrow_and_update();
                if available && self.drain_task.is_some() {
                    // The running drain may already have aborted on an
                    // unreachable batch; drain again once it ends.
                    self.coordinator.defer_reconnect();
                } else if available && self.coordinator.should_drain_on_reconnect() {
                    self.spawn_drain("reconnect");
                }
            }
            report = wait_drain(&mut self.drain_task) => {
                if let Some(report) = report
                    && self.coordinator.should_follow_up(&report)
                {
                    self.spawn_drain("follow-up");
                }
            }
            _ = sleep_until_due(deferred), if idle && deferred.is_some() => {
                self.coordinator.take_deferred_reconnect();
                self.spawn_drain("reconnect");
            }
            _ = self.coordinator.next_tick() => {
                if self.coordinator.should_drain_on_timer() {
                    self.spawn_drain("timer");
                }
            }
            _ = wait_listener(&mut self.listener_task) => {
                if !self.cancel.is_cancelled() {
                    return ControlFlow::Break(Err(ExitError::RuntimeFailure(
                        "ingest listener died unexpectedly".into(),
                    )));
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Start a budgeted drain in the background. Returns `false` if one is
    /// already running or there is nothing to do.
    fn spawn_drain(&mut self, trigger: &'static str) -> bool {
        if self.drain_task.is_some() {
            debug!(trigger, "drain already in flight, skipping");
            return false;
        }
        if !self.orchestrator.is_online() || !self.orchestrator.has_pending() {
            debug!(trigger, "nothing to drain");
            return false;
        }

        debug!(trigger, pending = self.orchestrator.pending_count(), "starting drain");
        self.coordinator.record_drain();
        self.drain_task = Some(tokio::spawn(drain_trigger::run_budgeted(
            self.orchestrator.clone(),
            self.budget,
        )));
        true
    }

    async fn shutdown(&mut self) -> Result<(), ExitError> {
        debug!("shutting down");
        if let Some(probe) = self.probe.take() {
            probe.stop().await;
        }
        // The listener stops on the same token.
        if let Some(task) = self.listener_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.drain_task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "drain task ended abnormally");
        }

        if self.orchestrator.is_online() && self.orchestrator.has_pending() {
            let report = drain_trigger::run_budgeted(self.orchestrator.clone(), self.budget).await;
            info!(synced = report.synced, remaining = report.remaining, "final drain");
        }
        if self.orchestrator.has_pending() {
            info!(
                pending = self.orchestrator.pending_count(),
                "samples left pending at shutdown"
            );
        }
        Ok(())
    }
}

/// Resolves with the report once the in-flight drain finishes. Pends forever
/// when there is none.
async fn wait_drain(slot: &mut Option<JoinHandle<DrainReport>>) -> Option<DrainReport> {
    let Some(task) = slot.as_mut() else {
        return std::future::pending().await;
    };
    let result = task.await;
    *slot = None;
    match result {
        Ok(report) => Some(report),
        Err(e) => {
            warn!(error = %e, "drain task ended abnormally");
            None
        }
    }
}

async fn sleep_until_due(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn wait_listener(slot: &mut Option<JoinHandle<()>>) {
    let Some(task) = slot.as_mut() else {
        return std::future::pending().await;
    };
    let _ = task.await;
    *slot = None;
}
