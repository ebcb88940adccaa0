use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{error, info, warn};

use super::{PendingStore, StoreError};
use crate::sample::Sample;

/// Pending queue persisted as a single JSON array.
///
/// The file is the source of truth: every operation re-reads it and every
/// mutation rewrites it whole, so a separate recovery process can read the
/// same file. The mutex only serializes access from within this process.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let store = Self {
            path,
            lock: Mutex::new(()),
        };

        let pending = store.read_all()?.len();
        if pending > 0 {
            info!(
                pending,
                path = %store.path.display(),
                "pending store has samples from a previous run"
            );
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file or unparsable content reads as an empty queue. Any
    /// other I/O failure is returned so callers never overwrite a backlog
    /// they could not see.
    fn read_all(&self) -> Result<Vec<Sample>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(error = %e, path = %self.path.display(), "pending store is corrupt, treating as empty");
            Vec::new()
        }))
    }

    /// Snapshot for read-only operations. A read failure is reported as empty.
    fn read_or_empty(&self) -> Vec<Sample> {
        self.read_all().unwrap_or_else(|e| {
            warn!(error = %e, path = %self.path.display(), "failed to read pending store");
            Vec::new()
        })
    }

    /// Write to a sibling temp file and rename over the original.
    fn write_all(&self, samples: &[Sample]) -> Result<(), StoreError> {
        let content = serde_json::to_vec(samples)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn mutate(&self, op: impl FnOnce(&mut Vec<Sample>) -> bool) {
        let _guard = self.lock.lock().unwrap();
        let mut samples = match self.read_all() {
            Ok(samples) => samples,
            Err(e) => {
                error!(error = %e, path = %self.path.display(), "failed to read pending store, mutation dropped");
                return;
            }
        };
        if !op(&mut samples) {
            return;
        }
        if let Err(e) = self.write_all(&samples) {
            error!(error = %e, path = %self.path.display(), "failed to persist pending store");
        }
    }
}

impl PendingStore for JsonFileStore {
    fn enqueue(&self, sample: Sample) {
        self.mutate(|samples| {
            samples.push(sample);
            true
        });
    }

    fn peek_all(&self) -> Vec<Sample> {
        let _guard = self.lock.lock().unwrap();
        self.read_or_empty()
    }

    fn remove_by_ids(&self, ids: &HashSet<String>) {
        if ids.is_empty() {
            return;
        }
        self.mutate(|samples| {
            let before = samples.len();
            samples.retain(|s| !ids.contains(&s.id));
            samples.len() != before
        });
    }

    fn clear(&self) {
        self.mutate(|samples| {
            samples.clear();
            true
        });
    }

    fn count(&self) -> usize {
        let _guard = self.lock.lock().unwrap();
        self.read_or_empty().len()
    }
}
