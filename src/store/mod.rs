mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::sample::Sample;

/// Queue of samples that could not be delivered yet.
///
/// Implementations serialize mutations internally, so capture-side `enqueue`
/// can race a drain's `peek_all` / `remove_by_ids` pair. Removal is by id
/// only: entries enqueued after a snapshot was taken are never touched by a
/// removal built from that snapshot.
pub trait PendingStore: Send + Sync {
    /// Append in arrival order. Never fails from the caller's point of view.
    fn enqueue(&self, sample: Sample);

    /// Ordered snapshot of everything pending.
    fn peek_all(&self) -> Vec<Sample>;

    /// Remove every pending sample whose id is in `ids`. Unknown ids are ignored.
    fn remove_by_ids(&self, ids: &HashSet<String>);

    fn clear(&self);

    fn count(&self) -> usize;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("pending store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("pending store encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Which store backs the pending queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    File(PathBuf),
}

pub fn open(backend: &StoreBackend) -> Result<Arc<dyn PendingStore>, StoreError> {
    Ok(match backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::File(path) => Arc::new(JsonFileStore::open(path)?),
    })
}

#[cfg(test)]
mod tests;
