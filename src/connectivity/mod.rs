mod probe;

pub use probe::ReachabilityProbe;

use std::sync::Arc;

use tokio::sync::watch;

/// Last known reachability. Reads never block and never probe the network.
pub trait ConnectivitySignal: Send + Sync {
    fn is_available(&self) -> bool;
}

/// Process-wide connectivity state, pushed by the platform side.
///
/// Clones share the same state. Observers get woken on every change through
/// [`Connectivity::subscribe`].
#[derive(Clone)]
pub struct Connectivity {
    state: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(initially_available: bool) -> Self {
        let (tx, _) = watch::channel(initially_available);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Record a platform observation. Returns `true` only on an
    /// unavailable → available edge.
    pub fn set_available(&self, available: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == available {
                false
            } else {
                *current = available;
                true
            }
        });
        if changed {
            tracing::info!(available, "connectivity changed");
        }
        changed && available
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivitySignal for Connectivity {
    fn is_available(&self) -> bool {
        *self.state.borrow()
    }
}

#[cfg(test)]
mod tests;
