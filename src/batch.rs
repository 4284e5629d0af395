//! Per-destination batching buffer.
//!
//! Records accumulate until the queue reaches the batch threshold, then the
//! owning destination drains them as one unit. A threshold of 0 or 1 means
//! every record is released immediately.

use crate::record::Record;
use std::collections::VecDeque;

/// FIFO queue of pending records with a readiness threshold.
#[derive(Debug, Default)]
pub struct BatchingBuffer {
    queue: VecDeque<Record>,
    threshold: usize,
}

impl BatchingBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(threshold),
            threshold,
        }
    }

    /// Queue a record and return how many more are needed for a full batch.
    pub fn put(&mut self, record: Record) -> usize {
        self.queue.push_back(record);
        self.threshold.saturating_sub(self.queue.len())
    }

    /// True once the queue holds at least `threshold` records.
    pub fn is_batch_ready(&self) -> bool {
        self.queue.len() >= self.threshold
    }

    /// Pop the oldest record.
    pub fn get(&mut self) -> Option<Record> {
        self.queue.pop_front()
    }

    /// Take every queued record if a batch is ready, oldest first.
    pub fn take_batch(&mut self) -> Vec<Record> {
        if self.is_batch_ready() {
            self.queue.drain(..).collect()
        } else {
            Vec::new()
        }
    }

    /// Force readiness so the next drain releases everything left.
    pub fn close(&mut self) {
        self.threshold = 0;
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: i64) -> Record {
        [("n", n)].into_iter().collect()
    }

    #[test]
    fn test_ready_after_threshold_puts() {
        let mut buf = BatchingBuffer::new(3);
        assert_eq!(buf.put(record(1)), 2);
        assert!(!buf.is_batch_ready());
        assert_eq!(buf.put(record(2)), 1);
        assert!(!buf.is_batch_ready());
        assert_eq!(buf.put(record(3)), 0);
        assert!(buf.is_batch_ready());
        assert_eq!(buf.put(record(4)), 0);
    }

    #[test]
    fn test_get_is_fifo() {
        let mut buf = BatchingBuffer::new(3);
        buf.put(record(1));
        buf.put(record(2));
        assert_eq!(buf.get(), Some(record(1)));
        assert_eq!(buf.get(), Some(record(2)));
        assert_eq!(buf.get(), None);
    }

    #[test]
    fn test_zero_and_one_threshold_release_immediately() {
        for threshold in [0, 1] {
            let mut buf = BatchingBuffer::new(threshold);
            buf.put(record(1));
            assert!(buf.is_batch_ready(), "threshold {threshold}");
            assert_eq!(buf.take_batch(), vec![record(1)]);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_take_batch_waits_for_threshold() {
        let mut buf = BatchingBuffer::new(2);
        buf.put(record(1));
        assert!(buf.take_batch().is_empty());
        assert_eq!(buf.len(), 1);
        buf.put(record(2));
        assert_eq!(buf.take_batch(), vec![record(1), record(2)]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_close_forces_readiness() {
        let mut buf = BatchingBuffer::new(10);
        buf.put(record(1));
        assert!(!buf.is_batch_ready());
        buf.close();
        assert_eq!(buf.threshold(), 0);
        assert!(buf.is_batch_ready());
        assert_eq!(buf.take_batch(), vec![record(1)]);
        // still fine with nothing left
        assert!(buf.take_batch().is_empty());
    }
}
