use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use super::PendingStore;
use crate::sample::Sample;

/// Process-local queue. Everything pending is lost if the process dies.
#[derive(Default)]
pub struct MemoryStore {
    queue: Mutex<VecDeque<Sample>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PendingStore for MemoryStore {
    fn enqueue(&self, sample: Sample) {
        self.queue.lock().unwrap().push_back(sample);
    }

    fn peek_all(&self) -> Vec<Sample> {
        self.queue.lock().unwrap().iter().cloned().collect()
    }

    fn remove_by_ids(&self, ids: &HashSet<String>) {
        if ids.is_empty() {
            return;
        }
        self.queue.lock().unwrap().retain(|s| !ids.contains(&s.id));
    }

    fn clear(&self) {
        self.queue.lock().unwrap().clear();
    }

    fn count(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}
