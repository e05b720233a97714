use crate::record::AnnotationRecord;
use std::collections::VecDeque;
use std::time::Duration;

pub const DEFAULT_CAPACITY: usize = 30;
pub const DEFAULT_TOLERANCE: Duration = Duration::from_millis(500);

/// Fixed-capacity annotation store, sorted ascending by server timestamp.
///
/// Inserts are O(n) in the (small) capacity. Once full, the lowest
/// timestamps are evicted first, so memory is bounded by
/// `capacity × detections per record`.
#[derive(Debug, Clone)]
pub struct AnnotationBuffer {
    records: VecDeque<AnnotationRecord>,
    capacity: usize,
    tolerance_ms: u64,
    evicted: u64,
}

impl Default for AnnotationBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TOLERANCE)
    }
}

impl AnnotationBuffer {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize, tolerance: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            tolerance_ms: tolerance.as_millis() as u64,
            evicted: 0,
        }
    }

    /// Inserts in timestamp order. A record with a timestamp already present
    /// replaces the stored one.
    pub fn insert(&mut self, record: AnnotationRecord) {
        let ts = record.server_ts_ms;
        let idx = self.records.partition_point(|r| r.server_ts_ms < ts);

        if let Some(existing) = self.records.get_mut(idx)
            && existing.server_ts_ms == ts
        {
            *existing = record;
            return;
        }

        self.records.insert(idx, record);

        while self.records.len() > self.capacity {
            if let Some(dropped) = self.records.pop_front() {
                self.evicted += 1;
                tracing::trace!(server_ts_ms = dropped.server_ts_ms, "Evicted annotation");
            }
        }
    }

    /// The record closest to `at_ms` within the tolerance window, if any.
    ///
    /// Earlier and later records are equally eligible; on an exact tie the
    /// earlier one wins.
    pub fn nearest(&self, at_ms: u64) -> Option<&AnnotationRecord> {
        let idx = self.records.partition_point(|r| r.server_ts_ms < at_ms);
        let before = idx.checked_sub(1).and_then(|i| self.records.get(i));
        let after = self.records.get(idx);

        let best = match (before, after) {
            (Some(b), Some(a)) => {
                if at_ms - b.server_ts_ms <= a.server_ts_ms - at_ms {
                    b
                } else {
                    a
                }
            }
            (Some(only), None) | (None, Some(only)) => only,
            (None, None) => return None,
        };

        (best.server_ts_ms.abs_diff(at_ms) <= self.tolerance_ms).then_some(best)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn tolerance(&self) -> Duration {
        Duration::from_millis(self.tolerance_ms)
    }

    /// Records dropped because the buffer was full.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn oldest(&self) -> Option<&AnnotationRecord> {
        self.records.front()
    }

    pub fn newest(&self) -> Option<&AnnotationRecord> {
        self.records.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnnotationRecord> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn record(ts: u64) -> AnnotationRecord {
        AnnotationRecord::new(ts, Instant::now())
    }

    fn timestamps(buffer: &AnnotationBuffer) -> Vec<u64> {
        buffer.iter().map(|r| r.server_ts_ms).collect()
    }

    fn buffer_with(ts: &[u64], tolerance_ms: u64) -> AnnotationBuffer {
        let mut buffer = AnnotationBuffer::new(30, Duration::from_millis(tolerance_ms));
        for &t in ts {
            buffer.insert(record(t));
        }
        buffer
    }

    #[test]
    fn test_selects_closest_record_within_tolerance() {
        let buffer = buffer_with(&[100, 200, 300], 50);

        assert_eq!(buffer.nearest(210).map(|r| r.server_ts_ms), Some(200));
        assert!(buffer.nearest(500).is_none(), "All records outside tolerance");
    }

    #[test]
    fn test_early_and_late_records_are_both_eligible() {
        let buffer = buffer_with(&[100, 200, 300], 50);

        // Late annotation (record after render time).
        assert_eq!(buffer.nearest(290).map(|r| r.server_ts_ms), Some(300));
        // Early annotation (record before render time).
        assert_eq!(buffer.nearest(130).map(|r| r.server_ts_ms), Some(100));
        // Boundary is inclusive.
        assert_eq!(buffer.nearest(350).map(|r| r.server_ts_ms), Some(300));
        assert!(buffer.nearest(351).is_none());
        assert!(buffer.nearest(49).is_none());
    }

    #[test]
    fn test_equal_distance_prefers_earlier_record() {
        let buffer = buffer_with(&[200, 300], 50);
        assert_eq!(buffer.nearest(250).map(|r| r.server_ts_ms), Some(200));
    }

    #[test]
    fn test_empty_buffer_yields_nothing() {
        let buffer = AnnotationBuffer::default();
        assert!(buffer.is_empty());
        assert!(buffer.nearest(0).is_none());
        assert!(buffer.nearest(u64::MAX).is_none());
    }

    #[test]
    fn test_out_of_order_inserts_stay_sorted() {
        let buffer = buffer_with(&[300, 100, 250, 200, 50], 10);
        assert_eq!(timestamps(&buffer), vec![50, 100, 200, 250, 300]);
        assert_eq!(buffer.oldest().map(|r| r.server_ts_ms), Some(50));
        assert_eq!(buffer.newest().map(|r| r.server_ts_ms), Some(300));
    }

    #[test]
    fn test_capacity_is_never_exceeded() {
        let mut buffer = AnnotationBuffer::new(5, DEFAULT_TOLERANCE);
        for ts in (0..200).map(|i| (i * 37) % 1000) {
            buffer.insert(record(ts));
            assert!(buffer.len() <= 5);
        }
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn test_oldest_timestamps_are_evicted_first() {
        let mut buffer = AnnotationBuffer::new(3, DEFAULT_TOLERANCE);
        for ts in [10, 20, 30, 40, 50] {
            buffer.insert(record(ts));
        }
        assert_eq!(timestamps(&buffer), vec![30, 40, 50]);
        assert_eq!(buffer.evicted(), 2);

        // A late record older than everything stored is dropped immediately.
        buffer.insert(record(5));
        assert_eq!(timestamps(&buffer), vec![30, 40, 50]);
        assert_eq!(buffer.evicted(), 3);

        // A late record inside the window displaces the oldest.
        buffer.insert(record(35));
        assert_eq!(timestamps(&buffer), vec![35, 40, 50]);
    }

    #[test]
    fn test_duplicate_timestamp_replaces_record() {
        let mut buffer = AnnotationBuffer::new(3, DEFAULT_TOLERANCE);
        buffer.insert(record(10));

        let mut replacement = record(10);
        replacement.tracked = Vec::new();
        replacement.detections = Vec::new();
        let marker = Instant::now();
        replacement.received_at = marker;
        buffer.insert(replacement);

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.oldest().map(|r| r.received_at), Some(marker));
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut buffer = AnnotationBuffer::new(0, DEFAULT_TOLERANCE);
        buffer.insert(record(1));
        buffer.insert(record(2));
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(timestamps(&buffer), vec![2]);
    }

    #[test]
    fn test_clear_empties_buffer() {
        let mut buffer = buffer_with(&[1, 2, 3], 10);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.tolerance(), Duration::from_millis(10));
    }
}
