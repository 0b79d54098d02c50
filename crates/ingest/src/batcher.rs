//! Fixed-capacity batch accumulator.
//!
//! Collects envelopes and seals a [`Batch`] as soon as `max_batch` are
//! pending. The remainder is sealed once by [`Batcher::flush_partial`] at
//! end of stream. Every sealed batch is a fresh allocation handed off by
//! value, so the producer never writes into memory a worker is reading.

use bmo_core::{Batch, Envelope};

pub struct Batcher {
    pending: Vec<Envelope>,
    max_batch: usize,
}

impl Batcher {
    /// Create a batcher that seals every `max_batch` envelopes (minimum 1).
    pub fn new(max_batch: usize) -> Self {
        let max_batch = max_batch.max(1);
        Self {
            pending: Vec::with_capacity(max_batch),
            max_batch,
        }
    }

    /// Add an envelope. Returns the sealed batch when this one fills it.
    pub fn append(&mut self, envelope: Envelope) -> Option<Batch> {
        self.pending.push(envelope);
        if self.pending.len() < self.max_batch {
            return None;
        }
        let full = std::mem::replace(&mut self.pending, Vec::with_capacity(self.max_batch));
        Batch::seal(full)
    }

    /// Seal whatever is pending at end of stream. `None` if nothing is.
    pub fn flush_partial(self) -> Option<Batch> {
        Batch::seal(self.pending)
    }

    /// Number of envelopes waiting for the current batch.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn max_batch(&self) -> usize {
        self.max_batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(sequence: u64) -> Envelope {
        Envelope {
            sequence,
            ingested_at: 0,
            payload: json!({ "a": sequence }),
        }
    }

    /// Feed `count` envelopes, returning every sealed batch including the tail.
    fn run(count: u64, max_batch: usize) -> Vec<Batch> {
        let mut batcher = Batcher::new(max_batch);
        let mut batches: Vec<Batch> = (0..count)
            .filter_map(|seq| batcher.append(envelope(seq)))
            .collect();
        batches.extend(batcher.flush_partial());
        batches
    }

    #[test]
    fn seals_when_full() {
        let mut batcher = Batcher::new(2);
        assert!(batcher.append(envelope(0)).is_none());
        assert_eq!(batcher.pending(), 1);
        let batch = batcher.append(envelope(1)).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batcher.pending(), 0);
    }

    #[test]
    fn flush_partial_emits_remainder() {
        let batches = run(3, 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);
        assert_eq!(batches[1].first_sequence(), 2);
    }

    #[test]
    fn flush_partial_on_empty_emits_nothing() {
        assert!(Batcher::new(5).flush_partial().is_none());
        // Exact multiple: nothing left over for the tail.
        assert_eq!(run(10, 5).len(), 2);
    }

    #[test]
    fn batch_counts_follow_ceiling() {
        for (count, size) in [(0u64, 3usize), (1, 3), (3, 3), (7, 3), (200, 200), (401, 200), (5, 1)] {
            let batches = run(count, size);
            let expected = (count as usize).div_ceil(size);
            assert_eq!(batches.len(), expected, "count={count} size={size}");

            if let Some((last, full)) = batches.split_last() {
                assert!(full.iter().all(|b| b.len() == size));
                let tail = count as usize % size;
                assert_eq!(last.len(), if tail == 0 { size } else { tail });
            }
        }
    }

    #[test]
    fn concatenation_reproduces_input() {
        let batches = run(23, 4);
        let seqs: Vec<u64> = batches
            .into_iter()
            .flat_map(Batch::into_envelopes)
            .map(|e| e.sequence)
            .collect();
        assert_eq!(seqs, (0..23).collect::<Vec<_>>());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut batcher = Batcher::new(0);
        assert_eq!(batcher.max_batch(), 1);
        assert!(batcher.append(envelope(0)).is_some());
    }
}
