//! Trajectory: the public facade over chain, index and cursor
//!
//! A trajectory owns one segment chain (never fewer than one segment)
//! and its left-endpoint index, and keeps the two mutually consistent
//! across every operation. All operations run synchronously on the
//! caller's thread; the caller decides when to append and prune.
//!
//! Handle and iterator invalidation per operation:
//! - `append`, `new_segment`, `forget_before`: preserve every
//!   previously issued handle.
//! - `forget_after`: invalidates handles to segments it empties and
//!   drops.
//! - `delete_segments`, `detach_segments` (the detached side moves to
//!   the returned trajectory), `clear` (all but the first segment):
//!   invalidate handles into the removed region.

use crate::chain::{Chain, SegmentId};
use crate::cursor::{self, Iter, Pos};
use crate::error::{TrajectoryError, TrajectoryResult};
use crate::index::LeftEndpointIndex;
use crate::segment::Segment;
use crate::types::{DownsamplingParameters, Instant, Sample, State};
use tracing::debug;

/// A segmented, time-ordered sample store
///
/// Move-only: copying the sample data is the explicit [`duplicate`]
/// operation, never implicit.
///
/// [`duplicate`]: Trajectory::duplicate
#[derive(Debug)]
pub struct Trajectory {
    pub(crate) chain: Chain,
    pub(crate) index: LeftEndpointIndex,
}

impl Default for Trajectory {
    fn default() -> Self {
        Self::new()
    }
}

impl Trajectory {
    /// An empty trajectory: one empty segment, no index entries
    pub fn new() -> Self {
        Self {
            chain: Chain::new(),
            index: LeftEndpointIndex::new(),
        }
    }

    // The chain is re-seeded whenever an operation would leave it bare,
    // so a tail segment always exists.
    fn tail_id(&self) -> SegmentId {
        self.chain.last_id().expect("trajectory chain is never empty")
    }

    /// Number of distinct samples (a shared fork sample counts once)
    pub fn len(&self) -> usize {
        self.chain.sample_count()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.first_sample().is_none()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.chain.first_sample()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.chain.last_sample()
    }

    pub fn t_min(&self) -> Option<Instant> {
        self.first().map(|s| s.time)
    }

    pub fn t_max(&self) -> Option<Instant> {
        self.last().map(|s| s.time)
    }

    /// Append a sample; `t` must be strictly after every recorded time
    pub fn append(&mut self, t: Instant, state: State) -> TrajectoryResult<()> {
        if let Some(last) = self.t_max() {
            if t <= last {
                return Err(TrajectoryError::OutOfOrder { t, last });
            }
        }
        let id = self.tail_id();
        let was_empty = match self.chain.get_mut(id) {
            Some(segment) => {
                let was_empty = segment.is_empty();
                segment.append(t, state)?;
                was_empty
            }
            None => return Err(TrajectoryError::NotFound),
        };
        if was_empty {
            self.index.insert(t, id);
        }
        Ok(())
    }

    /// Open a new segment at the tail and return its handle
    ///
    /// On a nonempty trajectory the predecessor's last sample is copied
    /// into the new segment as the shared fork point. No existing
    /// handle is invalidated.
    pub fn new_segment(&mut self) -> SegmentId {
        let fork = self.last().copied();
        let id = self.chain.push_back(Segment::new());
        if let Some(fork) = fork {
            if let Some(segment) = self.chain.get_mut(id) {
                segment.push(fork);
            }
            self.index.insert(fork.time, id);
            debug!(fork_time = %fork.time, "opened forked segment");
        }
        id
    }

    /// Split off `from`..tail as an independent trajectory
    ///
    /// Handles into the detached range stay valid in the returned
    /// trajectory; the receiver keeps everything strictly before
    /// `from` (re-seeded with one empty segment if nothing remains).
    pub fn detach_segments(&mut self, from: SegmentId) -> TrajectoryResult<Trajectory> {
        let position = self.chain.position(from).ok_or(TrajectoryError::NotFound)?;
        let chain = self.chain.split_off(position);
        if self.chain.segment_count() == 0 {
            self.chain.push_back(Segment::new());
        }
        self.index.rebuild(&self.chain);
        let mut detached = Trajectory {
            chain,
            index: LeftEndpointIndex::new(),
        };
        detached.index.rebuild(&detached.chain);
        Ok(detached)
    }

    /// Splice every segment of `other` onto the tail
    ///
    /// Requires `other`'s first sample time to be at least the
    /// receiver's last sample time; an equal boundary time must carry
    /// the same state (a shared fork sample). On failure neither
    /// trajectory is mutated. On success `other` is drained and left a
    /// valid empty trajectory; returns the handle of the first
    /// attached segment.
    pub fn attach_segments(&mut self, other: &mut Trajectory) -> TrajectoryResult<SegmentId> {
        if let (Some(last), Some(first)) = (self.last(), other.first()) {
            if first.time < last.time {
                return Err(TrajectoryError::OutOfOrder {
                    t: first.time,
                    last: last.time,
                });
            }
            if first.time == last.time && first.state != last.state {
                return Err(TrajectoryError::Inconsistent(format!(
                    "attaching would share boundary time {} with a different state",
                    first.time
                )));
            }
        }
        if self.is_empty() {
            // Placeholder segments give way to the attached history.
            self.chain.clear();
        }
        let attached = other
            .chain
            .first_id()
            .expect("trajectory chain is never empty");
        self.chain.append_chain(&mut other.chain);
        other.chain.push_back(Segment::new());
        other.index.clear();
        self.index.rebuild(&self.chain);
        Ok(attached)
    }

    /// Drop `from`..tail, discarding their samples
    ///
    /// Invalidates handles to the removed segments.
    pub fn delete_segments(&mut self, from: SegmentId) -> TrajectoryResult<()> {
        let position = self.chain.position(from).ok_or(TrajectoryError::NotFound)?;
        self.chain.truncate(position);
        if self.chain.segment_count() == 0 {
            self.chain.push_back(Segment::new());
        }
        self.index.rebuild(&self.chain);
        debug!(position, "deleted segments through tail");
        Ok(())
    }

    /// Remove every sample with time >= `t`
    ///
    /// Segments emptied by the operation are dropped, except the last
    /// remaining segment, which is kept possibly empty. Handles to
    /// dropped segments become invalid.
    pub fn forget_after(&mut self, t: Instant) {
        let ids: Vec<SegmentId> = self.chain.ids().to_vec();
        let mut emptied = Vec::new();
        for id in ids {
            if let Some(segment) = self.chain.get_mut(id) {
                let removed = segment.forget_after(t);
                if removed > 0 && segment.is_empty() {
                    emptied.push(id);
                }
            }
        }
        if emptied.len() == self.chain.segment_count() {
            emptied.pop();
        }
        for id in emptied {
            self.chain.remove(id);
        }
        self.index.rebuild(&self.chain);
        debug!(%t, "forgot samples at and after");
    }

    /// Remove every sample with time < `t`
    ///
    /// Segments are kept even when emptied; no handle is invalidated.
    pub fn forget_before(&mut self, t: Instant) {
        let ids: Vec<SegmentId> = self.chain.ids().to_vec();
        for id in ids {
            if let Some(segment) = self.chain.get_mut(id) {
                segment.forget_before(t);
            }
        }
        self.index.rebuild(&self.chain);
        debug!(%t, "forgot samples before");
    }

    /// Remove every sample and every segment but the first
    ///
    /// Handles to the first segment stay valid.
    pub fn clear(&mut self) {
        self.chain.truncate(1);
        if let Some(id) = self.chain.first_id() {
            if let Some(segment) = self.chain.get_mut(id) {
                segment.clear();
            }
        }
        self.index.clear();
    }

    /// Explicit deep copy; the copy gets fresh segment handles
    pub fn duplicate(&self) -> Trajectory {
        let mut chain = Chain::empty();
        for (_, segment) in self.chain.iter() {
            chain.push_back(segment.clone());
        }
        let mut index = LeftEndpointIndex::new();
        index.rebuild(&chain);
        Trajectory { chain, index }
    }

    /// Segment handles in chain order
    pub fn segments(&self) -> impl DoubleEndedIterator<Item = SegmentId> + '_ {
        self.chain.ids().iter().copied()
    }

    /// Segment handles in reverse chain order
    pub fn rsegments(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.chain.ids().iter().rev().copied()
    }

    /// Read access to a segment through its handle
    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.chain.get(id)
    }

    /// The segment whose time range contains `t`
    ///
    /// The final segment extends to the far future; `None` if `t`
    /// precedes the first sample or the trajectory is empty.
    pub fn find_segment(&self, t: Instant) -> Option<SegmentId> {
        self.index.find(t)
    }

    /// Iterate every distinct sample in time order
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(&self.chain)
    }

    /// Cursor positioned at the sample recorded exactly at `t`
    pub fn find(&self, t: Instant) -> Option<Iter<'_>> {
        let id = self.index.find(t)?;
        let seg = self.chain.position(id)?;
        let idx = self.chain.segment_at(seg).find(t)?;
        let pos = cursor::canonicalize(&self.chain, Pos { seg, idx });
        Some(Iter::from_front(&self.chain, pos))
    }

    /// Cursor positioned at the first sample with time >= `t`
    pub fn lower_bound(&self, t: Instant) -> Iter<'_> {
        self.bound(t, false)
    }

    /// Cursor positioned at the first sample with time > `t`
    pub fn upper_bound(&self, t: Instant) -> Iter<'_> {
        self.bound(t, true)
    }

    fn bound(&self, t: Instant, strictly_after: bool) -> Iter<'_> {
        let Some(id) = self.index.find(t) else {
            // Before the first sample, or empty.
            return Iter::new(&self.chain);
        };
        let Some(seg) = self.chain.position(id) else {
            return Iter::exhausted(&self.chain);
        };
        let segment = self.chain.segment_at(seg);
        let idx = if strictly_after {
            segment.upper_bound_index(t)
        } else {
            segment.lower_bound_index(t)
        };
        let pos = if idx < segment.len() {
            Some(Pos { seg, idx })
        } else {
            cursor::next_canonical(
                &self.chain,
                Pos {
                    seg,
                    idx: segment.len() - 1,
                },
            )
        };
        match pos {
            Some(pos) => Iter::from_front(&self.chain, cursor::canonicalize(&self.chain, pos)),
            None => Iter::exhausted(&self.chain),
        }
    }

    /// Install a downsampling policy on a segment
    pub fn set_downsampling(
        &mut self,
        id: SegmentId,
        parameters: DownsamplingParameters,
    ) -> TrajectoryResult<()> {
        self.chain
            .get_mut(id)
            .ok_or(TrajectoryError::NotFound)?
            .set_downsampling(parameters);
        Ok(())
    }

    /// Remove a segment's downsampling policy
    pub fn clear_downsampling(&mut self, id: SegmentId) -> TrajectoryResult<()> {
        self.chain
            .get_mut(id)
            .ok_or(TrajectoryError::NotFound)?
            .clear_downsampling();
        Ok(())
    }

    /// Thin a segment's dense run per its policy; returns the count removed
    pub fn downsample_segment(&mut self, id: SegmentId) -> TrajectoryResult<usize> {
        let removed = self
            .chain
            .get_mut(id)
            .ok_or(TrajectoryError::NotFound)?
            .downsample();
        if removed > 0 {
            self.index.rebuild(&self.chain);
        }
        Ok(removed)
    }

    /// Read-only validation of every structural invariant
    ///
    /// Returns a description of the first violation found; never
    /// panics.
    pub fn check_consistency(&self) -> TrajectoryResult<()> {
        if self.chain.segment_count() == 0 {
            return Err(TrajectoryError::Inconsistent(
                "chain holds no segments".to_string(),
            ));
        }
        for (position, (_, segment)) in self.chain.iter().enumerate() {
            for pair in segment.samples().windows(2) {
                if pair[0].time >= pair[1].time {
                    return Err(TrajectoryError::Inconsistent(format!(
                        "segment {position}: {} does not precede {}",
                        pair[0].time, pair[1].time
                    )));
                }
            }
        }
        let mut previous: Option<(usize, Sample)> = None;
        for (position, (_, segment)) in self.chain.iter().enumerate() {
            if let (Some((prev_position, prev_last)), Some(first)) = (previous, segment.first()) {
                if first.time < prev_last.time {
                    return Err(TrajectoryError::Inconsistent(format!(
                        "segment {position} begins at {} before segment {prev_position} ends at {}",
                        first.time, prev_last.time
                    )));
                }
                if first.time == prev_last.time && first.state != prev_last.state {
                    return Err(TrajectoryError::Inconsistent(format!(
                        "segments {prev_position} and {position} share boundary time {} with different states",
                        first.time
                    )));
                }
            }
            if let Some(last) = segment.last() {
                previous = Some((position, *last));
            }
        }
        let expected = LeftEndpointIndex::for_chain(&self.chain);
        if !self.index.same_entries(&expected) {
            let actual: Vec<Instant> = self.index.keys().collect();
            let wanted: Vec<Instant> = expected.keys().collect();
            return Err(TrajectoryError::Inconsistent(format!(
                "index keys {actual:?} do not match chain left endpoints {wanted:?}"
            )));
        }
        Ok(())
    }
}
