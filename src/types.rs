//! Core data types for the pathline trajectory store
//!
//! This module defines the fundamental types used throughout the store:
//! - `Instant`: a point on the trajectory's time axis
//! - `State`: the payload recorded at an instant (position + velocity)
//! - `Sample`: the `(Instant, State)` pair exchanged through iterators
//!   and serialization
//! - `DownsamplingParameters`: the policy for thinning dense runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Sub;

/// A point on the trajectory's time axis
///
/// Totally ordered and immutable. Internally a nanosecond tick count,
/// so any two instants compare exactly and subtraction is lossless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Instant(i64);

impl Instant {
    /// Create an instant from a raw nanosecond tick count
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Create an instant from a millisecond count
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis * 1_000_000)
    }

    /// Get the raw nanosecond tick count
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Get the tick count in whole milliseconds
    pub const fn as_millis(self) -> i64 {
        self.0 / 1_000_000
    }

    /// Convert from a calendar datetime
    ///
    /// Returns `None` if the datetime is outside the representable
    /// range (roughly ±292 years around the epoch).
    pub fn from_datetime(datetime: DateTime<Utc>) -> Option<Self> {
        datetime.timestamp_nanos_opt().map(Self)
    }

    /// Convert to a calendar datetime
    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }
}

impl Sub for Instant {
    type Output = chrono::Duration;

    fn sub(self, rhs: Self) -> chrono::Duration {
        chrono::Duration::nanoseconds(self.0 - rhs.0)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

/// The payload recorded at an instant
///
/// A position/velocity pair in an unspecified frame. The store never
/// interprets it, except that the downsampling tolerance measures
/// positional deviation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Position coordinates
    pub position: [f64; 3],
    /// Velocity coordinates
    pub velocity: [f64; 3],
}

impl State {
    pub const fn new(position: [f64; 3], velocity: [f64; 3]) -> Self {
        Self { position, velocity }
    }
}

/// One recorded sample: a state at an instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: Instant,
    pub state: State,
}

impl Sample {
    pub const fn new(time: Instant, state: State) -> Self {
        Self { time, state }
    }
}

/// Policy for thinning the dense run of a segment
///
/// When a segment's dense run grows past `window_size` samples, a
/// downsample pass drops interior samples whose removal keeps the
/// linearly interpolated position within `tolerance` of the recorded
/// one. Endpoints of the run are always retained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownsamplingParameters {
    /// Maximum number of samples in the dense run before thinning
    pub window_size: usize,
    /// Maximum positional deviation introduced by dropping a sample
    pub tolerance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_instant_ordering() {
        let a = Instant::from_millis(1000);
        let b = Instant::from_millis(2000);

        assert!(a < b);
        assert_eq!(a, Instant::from_nanos(1_000_000_000));
        assert_eq!(b.as_millis(), 2000);
    }

    #[test]
    fn test_instant_subtraction() {
        let a = Instant::from_millis(1000);
        let b = Instant::from_millis(2500);

        assert_eq!((b - a).num_milliseconds(), 1500);
        assert_eq!((a - b).num_milliseconds(), -1500);
    }

    #[test]
    fn test_instant_datetime_roundtrip() {
        let datetime = Utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 0).unwrap();
        let instant = Instant::from_datetime(datetime).unwrap();

        assert_eq!(instant.to_datetime(), datetime);
    }

    #[test]
    fn test_sample_serialization() {
        let sample = Sample::new(
            Instant::from_millis(42),
            State::new([1.0, 2.0, 3.0], [0.1, 0.2, 0.3]),
        );

        let json = serde_json::to_string(&sample).unwrap();
        let restored: Sample = serde_json::from_str(&json).unwrap();

        assert_eq!(sample, restored);
    }
}
