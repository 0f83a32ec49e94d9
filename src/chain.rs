//! Segment chain: ordered segments with stable handles
//!
//! Segments are owned by exactly one chain at a time, but their
//! identities outlive splicing: a `SegmentId` is drawn from a
//! process-wide counter and is never reused, so a handle stays valid
//! for as long as some chain owns the segment, wherever it travels.

use crate::segment::Segment;
use crate::types::{Instant, Sample};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static NEXT_SEGMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable handle to a segment
///
/// Remains valid across appends, `forget_before`, and splicing to
/// another trajectory; invalidated only when the segment itself is
/// dropped (`delete_segments`, or emptied-and-dropped by
/// `forget_after`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(u64);

impl SegmentId {
    fn next() -> Self {
        SegmentId(NEXT_SEGMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The ordered collection of segments backing one trajectory
#[derive(Debug, Default)]
pub(crate) struct Chain {
    order: Vec<SegmentId>,
    segments: HashMap<SegmentId, Segment>,
}

impl Chain {
    /// A chain holding one empty segment, the state of a fresh trajectory
    pub(crate) fn new() -> Self {
        let mut chain = Self::empty();
        chain.push_back(Segment::new());
        chain
    }

    /// A chain with no segments at all; only valid mid-operation
    pub(crate) fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn segment_count(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn ids(&self) -> &[SegmentId] {
        &self.order
    }

    pub(crate) fn first_id(&self) -> Option<SegmentId> {
        self.order.first().copied()
    }

    pub(crate) fn last_id(&self) -> Option<SegmentId> {
        self.order.last().copied()
    }

    pub(crate) fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: SegmentId) -> Option<&mut Segment> {
        self.segments.get_mut(&id)
    }

    /// Position of a segment in chain order
    pub(crate) fn position(&self, id: SegmentId) -> Option<usize> {
        self.order.iter().position(|&s| s == id)
    }

    pub(crate) fn segment_at(&self, position: usize) -> &Segment {
        &self.segments[&self.order[position]]
    }

    /// Segments in chain order
    pub(crate) fn iter(&self) -> impl DoubleEndedIterator<Item = (SegmentId, &Segment)> + '_ {
        self.order.iter().map(move |id| (*id, &self.segments[id]))
    }

    pub(crate) fn push_back(&mut self, segment: Segment) -> SegmentId {
        let id = SegmentId::next();
        self.segments.insert(id, segment);
        self.order.push(id);
        id
    }

    /// Detach `position`..tail into a new chain, preserving identities
    pub(crate) fn split_off(&mut self, position: usize) -> Chain {
        let tail = self.order.split_off(position);
        let mut detached = Chain::empty();
        for id in tail {
            if let Some(segment) = self.segments.remove(&id) {
                detached.segments.insert(id, segment);
                detached.order.push(id);
            }
        }
        debug!(detached = detached.segment_count(), "split segment chain");
        detached
    }

    /// Splice every segment of `other` onto the tail, preserving identities
    pub(crate) fn append_chain(&mut self, other: &mut Chain) {
        let spliced = other.order.len();
        for id in other.order.drain(..) {
            if let Some(segment) = other.segments.remove(&id) {
                self.segments.insert(id, segment);
                self.order.push(id);
            }
        }
        debug!(spliced, "spliced segment chains");
    }

    /// Drop `position`..tail, destroying those segments
    pub(crate) fn truncate(&mut self, position: usize) {
        for id in self.order.split_off(position) {
            self.segments.remove(&id);
        }
    }

    /// Drop one segment, wherever it sits in the order
    pub(crate) fn remove(&mut self, id: SegmentId) {
        if let Some(position) = self.position(id) {
            self.order.remove(position);
            self.segments.remove(&id);
        }
    }

    /// Drop every segment
    pub(crate) fn clear(&mut self) {
        self.order.clear();
        self.segments.clear();
    }

    /// First sample of the first nonempty segment
    pub(crate) fn first_sample(&self) -> Option<&Sample> {
        self.order
            .iter()
            .find_map(|id| self.segments[id].first())
    }

    /// Last sample of the last nonempty segment
    pub(crate) fn last_sample(&self) -> Option<&Sample> {
        self.order
            .iter()
            .rev()
            .find_map(|id| self.segments[id].last())
    }

    /// Total number of distinct samples; a fork sample shared by two
    /// consecutive segments counts once.
    pub(crate) fn sample_count(&self) -> usize {
        let mut total = 0;
        let mut previous_last: Option<Instant> = None;
        for (_, segment) in self.iter() {
            if segment.is_empty() {
                continue;
            }
            total += segment.len();
            if segment.first_time() == previous_last {
                total -= 1;
            }
            previous_last = segment.last_time();
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Instant, State};

    fn one_sample_segment(t: i64) -> Segment {
        let mut segment = Segment::new();
        segment
            .append(Instant::from_millis(t), State::new([0.0; 3], [0.0; 3]))
            .unwrap();
        segment
    }

    #[test]
    fn test_handles_are_unique_and_stable() {
        let mut chain = Chain::new();
        let a = chain.push_back(one_sample_segment(1));
        let b = chain.push_back(one_sample_segment(2));

        assert_ne!(a, b);
        assert_eq!(chain.position(a), Some(1));
        assert_eq!(chain.position(b), Some(2));
        assert_eq!(chain.get(a).unwrap().len(), 1);
    }

    #[test]
    fn test_split_off_preserves_identities() {
        let mut chain = Chain::empty();
        let a = chain.push_back(one_sample_segment(1));
        let b = chain.push_back(one_sample_segment(2));
        let c = chain.push_back(one_sample_segment(3));

        let detached = chain.split_off(1);

        assert_eq!(chain.ids(), &[a]);
        assert_eq!(detached.ids(), &[b, c]);
        assert!(chain.get(b).is_none());
        assert!(detached.get(b).is_some());
    }

    #[test]
    fn test_append_chain_rehomes_segments() {
        let mut left = Chain::empty();
        let a = left.push_back(one_sample_segment(1));
        let mut right = Chain::empty();
        let b = right.push_back(one_sample_segment(2));

        left.append_chain(&mut right);

        assert_eq!(left.ids(), &[a, b]);
        assert_eq!(right.segment_count(), 0);
        assert!(left.get(b).is_some());
    }

    #[test]
    fn test_truncate_destroys_segments() {
        let mut chain = Chain::empty();
        let a = chain.push_back(one_sample_segment(1));
        let b = chain.push_back(one_sample_segment(2));

        chain.truncate(1);

        assert_eq!(chain.ids(), &[a]);
        assert!(chain.get(b).is_none());
    }

    #[test]
    fn test_sample_count_dedups_fork_samples() {
        let mut chain = Chain::empty();
        let mut first = Segment::new();
        let mut second = Segment::new();
        let state = State::new([0.0; 3], [0.0; 3]);
        for t in [0, 1, 2] {
            first.append(Instant::from_millis(t), state).unwrap();
        }
        // Forked: shares the boundary sample at t=2.
        for t in [2, 3, 4] {
            second.append(Instant::from_millis(t), state).unwrap();
        }
        chain.push_back(first);
        chain.push_back(second);

        assert_eq!(chain.sample_count(), 5);
    }
}
