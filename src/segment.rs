//! Segment: one contiguous, time-ordered run of samples
//!
//! A segment owns a sequence of samples with strictly increasing
//! times. It is the atomic unit of storage; the chain splices whole
//! segments around without copying sample data.
//!
//! A segment may carry a downsampling descriptor: the thinning policy
//! plus the instant at which its dense (not yet thinned) run begins.
//! The descriptor is metadata; queries always see the stored samples.

use crate::error::{TrajectoryError, TrajectoryResult};
use crate::types::{DownsamplingParameters, Instant, Sample, State};
use tracing::debug;

/// Downsampling descriptor attached to a segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Downsampling {
    /// The thinning policy
    pub parameters: DownsamplingParameters,
    /// Where the dense run begins; `None` until a sample lands
    pub dense_start: Option<Instant>,
}

/// A contiguous, time-ordered run of samples
#[derive(Debug, Clone, Default)]
pub struct Segment {
    samples: Vec<Sample>,
    downsampling: Option<Downsampling>,
}

impl Segment {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Build a segment from an already validated sample sequence.
    pub(crate) fn from_samples(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            downsampling: None,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn first_time(&self) -> Option<Instant> {
        self.samples.first().map(|s| s.time)
    }

    pub fn last_time(&self) -> Option<Instant> {
        self.samples.last().map(|s| s.time)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// The downsampling descriptor, if one is installed
    pub fn downsampling(&self) -> Option<&Downsampling> {
        self.downsampling.as_ref()
    }

    /// Index of the sample at exactly `t`
    pub fn find(&self, t: Instant) -> Option<usize> {
        self.samples.binary_search_by(|s| s.time.cmp(&t)).ok()
    }

    /// Index of the first sample with time >= `t`
    pub fn lower_bound_index(&self, t: Instant) -> usize {
        self.samples.partition_point(|s| s.time < t)
    }

    /// Index of the first sample with time > `t`
    pub fn upper_bound_index(&self, t: Instant) -> usize {
        self.samples.partition_point(|s| s.time <= t)
    }

    /// Append a sample; `t` must be strictly after the current last time
    pub(crate) fn append(&mut self, t: Instant, state: State) -> TrajectoryResult<()> {
        if let Some(last) = self.samples.last() {
            if t <= last.time {
                return Err(TrajectoryError::OutOfOrder { t, last: last.time });
            }
        }
        self.push(Sample::new(t, state));
        Ok(())
    }

    /// Append without the ordering check; the caller has validated it.
    pub(crate) fn push(&mut self, sample: Sample) {
        debug_assert!(self
            .samples
            .last()
            .map(|last| last.time < sample.time)
            .unwrap_or(true));
        self.samples.push(sample);
        if let Some(ds) = &mut self.downsampling {
            if ds.dense_start.is_none() {
                ds.dense_start = Some(sample.time);
            }
        }
    }

    /// Remove every sample with time >= `t`; returns the count removed
    pub(crate) fn forget_after(&mut self, t: Instant) -> usize {
        let keep = self.lower_bound_index(t);
        let removed = self.samples.len() - keep;
        self.samples.truncate(keep);
        self.clamp_dense_start();
        removed
    }

    /// Remove every sample with time < `t`; returns the count removed
    pub(crate) fn forget_before(&mut self, t: Instant) -> usize {
        let removed = self.lower_bound_index(t);
        self.samples.drain(..removed);
        self.clamp_dense_start();
        removed
    }

    /// Remove every sample, keeping the downsampling policy installed
    pub(crate) fn clear(&mut self) {
        self.samples.clear();
        self.clamp_dense_start();
    }

    /// Install a downsampling descriptor; the dense run starts at the
    /// current tail (or at the first sample appended afterwards).
    pub(crate) fn set_downsampling(&mut self, parameters: DownsamplingParameters) {
        self.downsampling = Some(Downsampling {
            parameters,
            dense_start: self.last_time(),
        });
    }

    /// Reinstall a descriptor deserialized from a message.
    pub(crate) fn restore_downsampling(
        &mut self,
        parameters: DownsamplingParameters,
        dense_start: Instant,
    ) {
        self.downsampling = Some(Downsampling {
            parameters,
            dense_start: Some(dense_start),
        });
    }

    pub(crate) fn clear_downsampling(&mut self) {
        self.downsampling = None;
    }

    /// Thin the dense run if it has outgrown the policy window.
    ///
    /// Drops interior samples of the run whose removal keeps the
    /// linearly interpolated position within tolerance; the endpoints
    /// of the run are always retained. Afterwards the dense run starts
    /// at the segment's last sample. Returns the count removed.
    pub(crate) fn downsample(&mut self) -> usize {
        let Some(ds) = self.downsampling else {
            return 0;
        };
        let Some(dense_start) = ds.dense_start else {
            return 0;
        };
        let start = self.lower_bound_index(dense_start);
        let dense = &self.samples[start..];
        if dense.len() <= ds.parameters.window_size || dense.len() < 2 {
            return 0;
        }

        let mut kept: Vec<Sample> = Vec::with_capacity(dense.len());
        kept.push(dense[0]);
        let mut anchor = dense[0];
        for i in 1..dense.len() - 1 {
            let candidate = dense[i];
            let next = dense[i + 1];
            if position_deviation(&anchor, &next, &candidate) > ds.parameters.tolerance {
                kept.push(candidate);
                anchor = candidate;
            }
        }
        if let Some(last) = dense.last() {
            kept.push(*last);
        }

        let removed = dense.len() - kept.len();
        if removed > 0 {
            self.samples.splice(start.., kept);
            if let Some(ds) = &mut self.downsampling {
                ds.dense_start = self.samples.last().map(|s| s.time);
            }
            debug!(removed, "downsampled segment dense run");
        }
        removed
    }

    // After truncation the recorded dense start may point outside the
    // remaining samples.
    fn clamp_dense_start(&mut self) {
        let Some(ds) = &mut self.downsampling else {
            return;
        };
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => {
                if let Some(dense_start) = ds.dense_start {
                    if dense_start < first.time {
                        ds.dense_start = Some(first.time);
                    } else if dense_start > last.time {
                        ds.dense_start = Some(last.time);
                    }
                }
            }
            _ => ds.dense_start = None,
        }
    }
}

/// Positional deviation of `sample` from the line through `a` and `b`,
/// evaluated at `sample`'s time.
fn position_deviation(a: &Sample, b: &Sample, sample: &Sample) -> f64 {
    let span = (b.time.as_nanos() - a.time.as_nanos()) as f64;
    if span <= 0.0 {
        return f64::INFINITY;
    }
    let alpha = (sample.time.as_nanos() - a.time.as_nanos()) as f64 / span;
    let mut squared = 0.0;
    for k in 0..3 {
        let interpolated = a.state.position[k] + alpha * (b.state.position[k] - a.state.position[k]);
        let delta = sample.state.position[k] - interpolated;
        squared += delta * delta;
    }
    squared.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(x: f64) -> State {
        State::new([x, 0.0, 0.0], [1.0, 0.0, 0.0])
    }

    fn filled(times: &[i64]) -> Segment {
        let mut segment = Segment::new();
        for &t in times {
            segment
                .append(Instant::from_millis(t), state(t as f64))
                .unwrap();
        }
        segment
    }

    #[test]
    fn test_append_in_order() {
        let segment = filled(&[0, 1, 2, 3]);

        assert_eq!(segment.len(), 4);
        assert_eq!(segment.first_time(), Some(Instant::from_millis(0)));
        assert_eq!(segment.last_time(), Some(Instant::from_millis(3)));
    }

    #[test]
    fn test_append_out_of_order_has_no_effect() {
        let mut segment = filled(&[0, 1, 2]);

        let err = segment.append(Instant::from_millis(2), state(9.0));
        assert!(matches!(err, Err(TrajectoryError::OutOfOrder { .. })));

        let err = segment.append(Instant::from_millis(1), state(9.0));
        assert!(matches!(err, Err(TrajectoryError::OutOfOrder { .. })));

        assert_eq!(segment.len(), 3);
        assert_eq!(segment.last_time(), Some(Instant::from_millis(2)));
    }

    #[test]
    fn test_find_and_bounds() {
        let segment = filled(&[10, 20, 30]);

        assert_eq!(segment.find(Instant::from_millis(20)), Some(1));
        assert_eq!(segment.find(Instant::from_millis(25)), None);

        assert_eq!(segment.lower_bound_index(Instant::from_millis(20)), 1);
        assert_eq!(segment.upper_bound_index(Instant::from_millis(20)), 2);
        assert_eq!(segment.lower_bound_index(Instant::from_millis(35)), 3);
        assert_eq!(segment.lower_bound_index(Instant::from_millis(5)), 0);
    }

    #[test]
    fn test_forget_after() {
        let mut segment = filled(&[0, 1, 2, 3, 4]);

        let removed = segment.forget_after(Instant::from_millis(2));
        assert_eq!(removed, 3);
        assert_eq!(segment.last_time(), Some(Instant::from_millis(1)));

        // Idempotent.
        assert_eq!(segment.forget_after(Instant::from_millis(2)), 0);
    }

    #[test]
    fn test_forget_before() {
        let mut segment = filled(&[0, 1, 2, 3, 4]);

        let removed = segment.forget_before(Instant::from_millis(2));
        assert_eq!(removed, 2);
        assert_eq!(segment.first_time(), Some(Instant::from_millis(2)));

        // Idempotent.
        assert_eq!(segment.forget_before(Instant::from_millis(2)), 0);
    }

    #[test]
    fn test_downsample_respects_window() {
        let mut segment = filled(&[0, 1, 2]);
        segment.set_downsampling(DownsamplingParameters {
            window_size: 10,
            tolerance: 1e-3,
        });
        for t in 3..8 {
            segment
                .append(Instant::from_millis(t), state(t as f64))
                .unwrap();
        }

        // Dense run (from time 2) holds 6 samples, within the window.
        assert_eq!(segment.downsample(), 0);
        assert_eq!(segment.len(), 8);
    }

    #[test]
    fn test_downsample_thins_collinear_run() {
        let mut segment = filled(&[0]);
        segment.set_downsampling(DownsamplingParameters {
            window_size: 4,
            tolerance: 1e-6,
        });
        // Positions are exactly collinear in time, so every interior
        // sample of the dense run is droppable.
        for t in 1..=10 {
            segment
                .append(Instant::from_millis(t), state(t as f64))
                .unwrap();
        }

        let removed = segment.downsample();
        assert!(removed > 0);
        // Endpoints of the run are retained.
        assert_eq!(segment.first_time(), Some(Instant::from_millis(0)));
        assert_eq!(segment.last_time(), Some(Instant::from_millis(10)));
        // The dense run now starts at the tail.
        let ds = segment.downsampling().unwrap();
        assert_eq!(ds.dense_start, Some(Instant::from_millis(10)));
    }

    #[test]
    fn test_downsample_keeps_deviating_samples() {
        let mut segment = Segment::new();
        segment.set_downsampling(DownsamplingParameters {
            window_size: 2,
            tolerance: 0.5,
        });
        segment
            .append(Instant::from_millis(0), state(0.0))
            .unwrap();
        // A sharp corner at t=1 deviates by 4.0 from the chord.
        segment
            .append(Instant::from_millis(1), State::new([5.0, 0.0, 0.0], [0.0; 3]))
            .unwrap();
        segment
            .append(Instant::from_millis(2), state(2.0))
            .unwrap();
        segment
            .append(Instant::from_millis(3), state(3.0))
            .unwrap();

        segment.downsample();
        let times: Vec<i64> = segment.iter().map(|s| s.time.as_millis()).collect();
        assert!(times.contains(&1), "corner sample was dropped: {:?}", times);
    }
}
