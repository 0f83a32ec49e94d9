//! # pathline
//!
//! A segmented, time-ordered sample store for trajectory histories.
//!
//! A [`Trajectory`] records a continuous history of timestamped state
//! samples on behalf of an external stepping loop, which appends
//! computed samples and periodically prunes history. The store keeps
//! exact discrete samples; it never interpolates.
//!
//! ## Features
//!
//! - **Append-only segments**: strictly increasing times, amortized
//!   O(1) append
//! - **Logarithmic lookup**: point and range queries through a
//!   left-endpoint index
//! - **Pruning from either end**: `forget_after` / `forget_before`
//!   with explicit handle-invalidation rules
//! - **Splicing**: detach/attach sub-ranges as independent
//!   trajectories without copying sample data
//! - **Serialization**: checksummed binary envelope, including a
//!   backward-compatible legacy fork-tree format
//!
//! ## Modules
//!
//! - [`types`]: Instant, State, Sample, downsampling parameters
//! - [`segment`]: the atomic storage unit
//! - [`cursor`]: the unified sample iterator
//! - [`trajectory`]: the public facade
//! - [`wire`]: message formats and the envelope codec
//! - [`error`]: error types
//!
//! ## Quick Start
//!
//! ```rust
//! use pathline::{Instant, State, Trajectory};
//!
//! # fn main() -> Result<(), pathline::TrajectoryError> {
//! let mut trajectory = Trajectory::new();
//! for i in 0..5i64 {
//!     let t = Instant::from_millis(i * 100);
//!     trajectory.append(t, State::new([i as f64, 0.0, 0.0], [1.0, 0.0, 0.0]))?;
//! }
//! assert_eq!(trajectory.len(), 5);
//!
//! // Prune old history, keep appending.
//! trajectory.forget_before(Instant::from_millis(200));
//! assert_eq!(trajectory.len(), 3);
//!
//! // Snapshot and restore.
//! let bytes = trajectory.to_bytes(&[], &[])?;
//! let (restored, _tracked) = Trajectory::from_bytes(&bytes)?;
//! assert_eq!(restored.len(), 3);
//! # Ok(())
//! # }
//! ```
//!
//! A trajectory is not safe for unsynchronized concurrent mutation;
//! iterators borrow it immutably, so the borrow checker enforces the
//! read-only rule.

mod chain;
pub mod cursor;
pub mod error;
mod index;
pub mod segment;
pub mod trajectory;
pub mod types;
pub mod wire;

// Re-export top-level types for convenience
pub use chain::SegmentId;
pub use cursor::Iter;
pub use error::{TrajectoryError, TrajectoryResult};
pub use segment::{Downsampling, Segment};
pub use trajectory::Trajectory;
pub use types::{DownsamplingParameters, Instant, Sample, State};
pub use wire::{
    decode, encode, encode_legacy, Brood, DownsamplingMessage, LegacyDownsampling, LegacyMessage,
    SampleRef, SegmentMessage, TrajectoryMessage, VersionedMessage,
};
