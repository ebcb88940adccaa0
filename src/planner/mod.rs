use crate::sample::{Sample, new_id};
use crate::transport::wire::{BatchRequest, LocationItem};

/// Maximum number of samples carried by one collector request.
pub const BATCH_SIZE: usize = 50;

/// Ordered group of samples sent as one request.
///
/// `id` only names the wire transaction; queue bookkeeping uses the sample ids.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: String,
    pub samples: Vec<Sample>,
}

impl Batch {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            id: new_id(),
            samples,
        }
    }

    /// Batch used by the per-sample fast path. The transaction is named
    /// after the sample.
    pub fn single(sample: Sample) -> Self {
        Self {
            id: sample.id.clone(),
            samples: vec![sample],
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_ids(&self) -> impl Iterator<Item = &str> {
        self.samples.iter().map(|s| s.id.as_str())
    }

    pub fn to_request(&self) -> BatchRequest {
        BatchRequest {
            id: self.id.clone(),
            locations: self.samples.iter().map(LocationItem::from).collect(),
        }
    }
}

/// Split pending samples into consecutive batches of at most [`BATCH_SIZE`].
pub fn plan(samples: &[Sample]) -> Vec<Batch> {
    plan_with_size(samples, BATCH_SIZE)
}

/// Like [`plan`] with a caller-chosen bound. A bound of zero is treated as one.
pub fn plan_with_size(samples: &[Sample], size: usize) -> Vec<Batch> {
    samples
        .chunks(size.max(1))
        .map(|chunk| Batch::new(chunk.to_vec()))
        .collect()
}
