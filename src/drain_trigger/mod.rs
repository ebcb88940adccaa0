use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::delivery::DeliveryOrchestrator;
use crate::transport::Transport;

/// Debounce window: triggers within this duration of the last drain are skipped.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum DrainStrategyError {
    #[error("unknown drain strategy: {0}")]
    UnknownStrategy(String),

    #[error("drain strategy {strategy} requires a positive integer parameter: {detail}")]
    InvalidParameter { strategy: String, detail: String },
}

/// When the relay drains the pending store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainStrategy {
    /// Only when connectivity comes back.
    Reconnect,
    /// Only on a fixed wake-up interval.
    Periodically { interval: Duration },
    /// On reconnect and on a fixed wake-up interval.
    ReconnectPeriodically { interval: Duration },
}

impl DrainStrategy {
    pub fn parse(raw: &str) -> Result<Self, DrainStrategyError> {
        let (name, param) = match raw.split_once(',') {
            Some((name, param)) => (name.trim(), Some(param.trim())),
            None => (raw.trim(), None),
        };

        match name {
            "" | "reconnect" if param.is_none() => Ok(DrainStrategy::Reconnect),
            "periodically" => Ok(DrainStrategy::Periodically {
                interval: parse_interval(name, param)?,
            }),
            "reconnect-periodically" => Ok(DrainStrategy::ReconnectPeriodically {
                interval: parse_interval(name, param)?,
            }),
            _ => Err(DrainStrategyError::UnknownStrategy(raw.to_owned())),
        }
    }

    fn interval(&self) -> Option<Duration> {
        match self {
            DrainStrategy::Reconnect => None,
            DrainStrategy::Periodically { interval }
            | DrainStrategy::ReconnectPeriodically { interval } => Some(*interval),
        }
    }

    fn on_reconnect(&self) -> bool {
        matches!(
            self,
            DrainStrategy::Reconnect | DrainStrategy::ReconnectPeriodically { .. }
        )
    }
}

fn parse_interval(strategy: &str, param: Option<&str>) -> Result<Duration, DrainStrategyError> {
    let invalid = |detail: String| DrainStrategyError::InvalidParameter {
        strategy: strategy.to_owned(),
        detail,
    };
    let raw = param.ok_or_else(|| invalid("missing interval in milliseconds".into()))?;
    match raw.parse::<u64>() {
        Ok(0) => Err(invalid("interval must be greater than zero".into())),
        Ok(ms) => Ok(Duration::from_millis(ms)),
        Err(_) => Err(invalid(format!("{raw:?} is not a number"))),
    }
}

impl fmt::Display for DrainStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrainStrategy::Reconnect => write!(f, "reconnect"),
            DrainStrategy::Periodically { interval } => {
                write!(f, "periodically,{}", interval.as_millis())
            }
            DrainStrategy::ReconnectPeriodically { interval } => {
                write!(f, "reconnect-periodically,{}", interval.as_millis())
            }
        }
    }
}

/// Result of one budgeted drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub synced: usize,
    pub remaining: usize,
    /// The budget ran out before the drain finished on its own.
    pub expired: bool,
}

enum DrainTimer {
    Active { interval: Interval },
    Inactive,
}

/// Decides when a drain should run. Owns the periodic timer; the event loop
/// owns the drain task itself.
pub struct DrainCoordinator {
    strategy: DrainStrategy,
    last_drain: Option<Instant>,
    timer: DrainTimer,
    /// A reconnect edge arrived while a drain was running or debounced and
    /// still owes a drain.
    reconnect_deferred: bool,
}

impl DrainCoordinator {
    pub fn new(strategy: DrainStrategy) -> Self {
        let timer = match strategy.interval() {
            Some(period) => {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                DrainTimer::Active { interval }
            }
            None => DrainTimer::Inactive,
        };
        Self {
            strategy,
            last_drain: None,
            timer,
            reconnect_deferred: false,
        }
    }

    pub fn strategy(&self) -> &DrainStrategy {
        &self.strategy
    }

    /// Await the next timer tick. Pends forever if the timer is inactive.
    pub async fn next_tick(&mut self) {
        match &mut self.timer {
            DrainTimer::Active { interval } => {
                interval.tick().await;
            }
            DrainTimer::Inactive => std::future::pending().await,
        }
    }

    /// Whether a connectivity-regained edge should start a drain now. An
    /// edge inside the debounce window is deferred rather than dropped.
    pub fn should_drain_on_reconnect(&mut self) -> bool {
        if !self.strategy.on_reconnect() {
            return false;
        }
        if self.within_debounce_window() {
            self.reconnect_deferred = true;
            return false;
        }
        true
    }

    /// Remember a reconnect edge that arrived while a drain was in flight.
    pub fn defer_reconnect(&mut self) {
        if self.strategy.on_reconnect() {
            self.reconnect_deferred = true;
        }
    }

    /// When a deferred reconnect drain becomes due, if one is owed.
    pub fn deferred_reconnect(&self) -> Option<Instant> {
        if !self.reconnect_deferred {
            return None;
        }
        Some(
            self.last_drain
                .map(|t| t + DEBOUNCE_WINDOW)
                .unwrap_or_else(Instant::now),
        )
    }

    /// Clear the deferred reconnect. Returns whether one was owed.
    pub fn take_deferred_reconnect(&mut self) -> bool {
        std::mem::take(&mut self.reconnect_deferred)
    }

    /// Whether a timer tick should start a drain.
    pub fn should_drain_on_timer(&self) -> bool {
        !self.within_debounce_window() && self.strategy.interval().is_some()
    }

    /// Record that a drain just started. It covers any deferred reconnect.
    pub fn record_drain(&mut self) {
        self.last_drain = Some(Instant::now());
        self.reconnect_deferred = false;
        if let DrainTimer::Active { interval } = &mut self.timer {
            interval.reset();
        }
    }

    /// Whether a finished drain should be followed up right away: it made
    /// progress but left work behind, e.g. because the budget ran out.
    pub fn should_follow_up(&self, report: &DrainReport) -> bool {
        report.synced > 0 && report.remaining > 0
    }

    fn within_debounce_window(&self) -> bool {
        self.last_drain
            .map(|t| t.elapsed() < DEBOUNCE_WINDOW)
            .unwrap_or(false)
    }
}

/// Run one drain under an execution budget.
///
/// The budget cancels the drain cooperatively, so batches confirmed before
/// expiry are still removed from the store.
pub async fn run_budgeted<T: Transport + 'static>(
    orchestrator: Arc<DeliveryOrchestrator<T>>,
    budget: Duration,
) -> DrainReport {
    let cancel = CancellationToken::new();
    let expiry = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            cancel.cancel();
        })
    };

    let synced = orchestrator.drain_until(&cancel).await;
    expiry.abort();

    let report = DrainReport {
        synced,
        remaining: orchestrator.pending_count(),
        expired: cancel.is_cancelled(),
    };
    if report.expired {
        warn!(?budget, synced, remaining = report.remaining, "drain budget expired");
    } else {
        debug!(synced, remaining = report.remaining, "drain completed");
    }
    report
}
