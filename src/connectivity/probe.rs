use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Connectivity;

/// Background task that feeds [`Connectivity`] from periodic TCP connects to
/// the collector. Stands in for an OS network-change callback on hosts that
/// don't have one.
pub struct ReachabilityProbe {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ReachabilityProbe {
    pub fn spawn(
        connectivity: Connectivity,
        host: String,
        port: u16,
        interval: Duration,
        connect_timeout: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            connectivity,
            host,
            port,
            interval,
            connect_timeout,
            cancel.clone(),
        ));
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Stop probing. Best-effort: a probe task that already died is logged
    /// and otherwise ignored.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "reachability probe ended abnormally");
        }
    }
}

impl Drop for ReachabilityProbe {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    connectivity: Connectivity,
    host: String,
    port: u16,
    interval: Duration,
    connect_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let reachable = probe_once(&host, port, connect_timeout).await;
                debug!(host, port, reachable, "reachability probe");
                connectivity.set_available(reachable);
            }
        }
    }
}

pub(crate) async fn probe_once(host: &str, port: u16, connect_timeout: Duration) -> bool {
    matches!(
        time::timeout(connect_timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}
