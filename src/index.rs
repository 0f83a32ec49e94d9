//! Left-endpoint index: segment lookup by time
//!
//! Maps the first sample time of a nonempty segment to the *last*
//! segment in chain order starting at that time. Entries are always
//! installed insert-or-overwrite, so at a fork boundary the newer
//! segment wins and its one-sample predecessor is transparently
//! skipped. Empty segments are never indexed; the index is empty iff
//! the trajectory holds no samples.

use crate::chain::{Chain, SegmentId};
use crate::types::Instant;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub(crate) struct LeftEndpointIndex {
    map: BTreeMap<Instant, SegmentId>,
}

impl LeftEndpointIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert-or-overwrite: a newer segment at the same boundary time
    /// replaces a decommissioned one.
    pub(crate) fn insert(&mut self, t: Instant, id: SegmentId) {
        self.map.insert(t, id);
    }

    /// The segment with the greatest left endpoint <= `t`
    pub(crate) fn find(&self, t: Instant) -> Option<SegmentId> {
        self.map.range(..=t).next_back().map(|(_, &id)| id)
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The index a chain should have: one entry per nonempty segment,
    /// installed in chain order so later segments win shared keys.
    pub(crate) fn for_chain(chain: &Chain) -> Self {
        let mut index = Self::new();
        for (id, segment) in chain.iter() {
            if let Some(first) = segment.first_time() {
                index.insert(first, id);
            }
        }
        index
    }

    /// Recompute from scratch after a structural mutation.
    pub(crate) fn rebuild(&mut self, chain: &Chain) {
        *self = Self::for_chain(chain);
    }

    pub(crate) fn same_entries(&self, other: &Self) -> bool {
        self.map == other.map
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = Instant> + '_ {
        self.map.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segment;
    use crate::types::State;

    fn segment(times: &[i64]) -> Segment {
        let mut segment = Segment::new();
        for &t in times {
            segment
                .append(Instant::from_millis(t), State::new([0.0; 3], [0.0; 3]))
                .unwrap();
        }
        segment
    }

    #[test]
    fn test_find_greatest_key_at_most_t() {
        let mut chain = Chain::empty();
        let a = chain.push_back(segment(&[0, 1]));
        let b = chain.push_back(segment(&[5, 6]));
        let index = LeftEndpointIndex::for_chain(&chain);

        assert_eq!(index.find(Instant::from_millis(0)), Some(a));
        assert_eq!(index.find(Instant::from_millis(3)), Some(a));
        assert_eq!(index.find(Instant::from_millis(5)), Some(b));
        assert_eq!(index.find(Instant::from_millis(100)), Some(b));
        assert_eq!(index.find(Instant::from_nanos(-1)), None);
    }

    #[test]
    fn test_newer_segment_wins_shared_boundary() {
        let mut chain = Chain::empty();
        let _a = chain.push_back(segment(&[0, 2]));
        // One-sample fork segment at t=2, then its continuation.
        let _b = chain.push_back(segment(&[2]));
        let c = chain.push_back(segment(&[2, 3]));
        let index = LeftEndpointIndex::for_chain(&chain);

        assert_eq!(index.find(Instant::from_millis(2)), Some(c));
    }

    #[test]
    fn test_empty_segments_not_indexed() {
        let mut chain = Chain::new();
        let index = LeftEndpointIndex::for_chain(&chain);
        assert!(index.is_empty());

        chain.push_back(segment(&[7]));
        let index = LeftEndpointIndex::for_chain(&chain);
        assert_eq!(index.keys().count(), 1);
    }
}
