//! Structural serialization of trajectories
//!
//! The current format is a flat list of segment messages, the
//! positions of externally tracked segments, and the positions of
//! samples that must be written verbatim ("exact" markers). The legacy
//! format is a recursive fork tree; `read_from_legacy_message` is the
//! only place that reasons about trees, flattening each branch into a
//! chain segment attached at its fork point.
//!
//! Envelope layout:
//! - magic: [u8; 4] = "PLTJ"
//! - version: u16 (1 = legacy tree payload, 2 = current payload)
//! - payload: bincode-encoded message
//! - crc: u32 (CRC32 of magic + version + payload)

use crate::chain::{Chain, SegmentId};
use crate::error::{TrajectoryError, TrajectoryResult};
use crate::index::LeftEndpointIndex;
use crate::segment::Segment;
use crate::trajectory::Trajectory;
use crate::types::{DownsamplingParameters, Instant, Sample};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Magic bytes identifying a serialized trajectory
pub const MESSAGE_MAGIC: [u8; 4] = *b"PLTJ";

/// Version tag of the legacy fork-tree format (read-only)
pub const LEGACY_VERSION: u16 = 1;

/// Version tag of the current flat format
pub const MESSAGE_VERSION: u16 = 2;

/// Serialized form of a whole trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryMessage {
    /// Segments in chain order
    pub segments: Vec<SegmentMessage>,
    /// Positions of segments with externally tracked handles
    pub tracked: Vec<u32>,
    /// Positions of samples that must be written verbatim
    pub exact: Vec<SampleRef>,
}

/// Serialized form of one segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMessage {
    pub samples: Vec<Sample>,
    pub downsampling: Option<DownsamplingMessage>,
}

/// Serialized downsampling descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownsamplingMessage {
    pub window_size: u64,
    pub tolerance: f64,
    pub dense_start: Instant,
}

/// Position of a sample within a serialized trajectory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRef {
    pub segment: u32,
    pub index: u32,
}

/// Legacy recursive trajectory node (read-only compatibility)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyMessage {
    pub samples: Vec<Sample>,
    pub downsampling: Option<LegacyDownsampling>,
    pub children: Vec<Brood>,
}

/// Legacy downsampling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyDownsampling {
    pub max_dense_intervals: u64,
    pub tolerance: f64,
    pub dense_start: Instant,
}

/// Legacy set of branches forking off a trajectory node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brood {
    pub fork_time: Instant,
    pub trajectories: Vec<LegacyMessage>,
}

/// A decoded payload, tagged by envelope version
#[derive(Debug)]
pub enum VersionedMessage {
    Legacy(LegacyMessage),
    Current(TrajectoryMessage),
}

/// Frame a current-format message in the checksummed envelope
pub fn encode(message: &TrajectoryMessage) -> TrajectoryResult<Vec<u8>> {
    encode_payload(MESSAGE_VERSION, bincode::serialize(message)?)
}

/// Frame a legacy-format message; used to exercise the legacy reader
pub fn encode_legacy(message: &LegacyMessage) -> TrajectoryResult<Vec<u8>> {
    encode_payload(LEGACY_VERSION, bincode::serialize(message)?)
}

fn encode_payload(version: u16, payload: Vec<u8>) -> TrajectoryResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(4 + 2 + payload.len() + 4);
    buf.extend_from_slice(&MESSAGE_MAGIC);
    buf.extend_from_slice(&version.to_le_bytes());
    buf.extend_from_slice(&payload);
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Unframe and decode an envelope, dispatching on its version
pub fn decode(bytes: &[u8]) -> TrajectoryResult<VersionedMessage> {
    if bytes.len() < 4 + 2 + 4 {
        return Err(TrajectoryError::Corrupt("message too short".to_string()));
    }
    let (body, crc_bytes) = bytes.split_at(bytes.len() - 4);
    let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(TrajectoryError::Corrupt(format!(
            "checksum mismatch: stored={stored}, computed={computed}"
        )));
    }
    if body[0..4] != MESSAGE_MAGIC {
        return Err(TrajectoryError::Corrupt(format!(
            "invalid magic: {:?}",
            &body[0..4]
        )));
    }
    let version = u16::from_le_bytes([body[4], body[5]]);
    let payload = &body[6..];
    match version {
        LEGACY_VERSION => Ok(VersionedMessage::Legacy(bincode::deserialize(payload)?)),
        MESSAGE_VERSION => Ok(VersionedMessage::Current(bincode::deserialize(payload)?)),
        other => Err(TrajectoryError::Corrupt(format!(
            "unsupported message version: {other}"
        ))),
    }
}

impl Trajectory {
    /// Emit the trajectory as a message
    ///
    /// `tracked` names segments whose handles must survive the round
    /// trip; `exact` names sample times that must be written verbatim
    /// even if they would otherwise be compression candidates. Unknown
    /// handles or times fail with `NotFound`.
    pub fn write_to_message(
        &self,
        tracked: &[SegmentId],
        exact: &[Instant],
    ) -> TrajectoryResult<TrajectoryMessage> {
        let mut segments = Vec::with_capacity(self.chain.segment_count());
        for (_, segment) in self.chain.iter() {
            let downsampling = segment.downsampling().and_then(|ds| {
                ds.dense_start.map(|dense_start| DownsamplingMessage {
                    window_size: ds.parameters.window_size as u64,
                    tolerance: ds.parameters.tolerance,
                    dense_start,
                })
            });
            segments.push(SegmentMessage {
                samples: segment.samples().to_vec(),
                downsampling,
            });
        }

        let mut tracked_out = Vec::with_capacity(tracked.len());
        for &id in tracked {
            let position = self.chain.position(id).ok_or(TrajectoryError::NotFound)?;
            tracked_out.push(position as u32);
        }

        let mut exact_out = Vec::with_capacity(exact.len());
        for &t in exact {
            let id = self.index.find(t).ok_or(TrajectoryError::NotFound)?;
            let position = self.chain.position(id).ok_or(TrajectoryError::NotFound)?;
            let index = self
                .chain
                .segment_at(position)
                .find(t)
                .ok_or(TrajectoryError::NotFound)?;
            exact_out.push(SampleRef {
                segment: position as u32,
                index: index as u32,
            });
        }

        Ok(TrajectoryMessage {
            segments,
            tracked: tracked_out,
            exact: exact_out,
        })
    }

    /// Reconstruct a trajectory from a current-format message
    ///
    /// Returns the trajectory and the live handles for the message's
    /// tracked segments, in message order. All-or-nothing: a malformed
    /// message fails with `Corrupt` and nothing is observable.
    pub fn read_from_message(
        message: &TrajectoryMessage,
    ) -> TrajectoryResult<(Trajectory, Vec<SegmentId>)> {
        if message.segments.is_empty() {
            return Err(TrajectoryError::Corrupt(
                "message contains no segments".to_string(),
            ));
        }

        let mut chain = Chain::empty();
        let mut previous_last: Option<Sample> = None;
        for (i, segment_message) in message.segments.iter().enumerate() {
            for pair in segment_message.samples.windows(2) {
                if pair[0].time >= pair[1].time {
                    return Err(TrajectoryError::Corrupt(format!(
                        "segment {i}: sample times not strictly increasing at {}",
                        pair[1].time
                    )));
                }
            }
            if let (Some(previous), Some(first)) = (previous_last, segment_message.samples.first())
            {
                if first.time < previous.time {
                    return Err(TrajectoryError::Corrupt(format!(
                        "segment {i} begins at {} before its predecessor ends at {}",
                        first.time, previous.time
                    )));
                }
                if first.time == previous.time && first.state != previous.state {
                    return Err(TrajectoryError::Corrupt(format!(
                        "segment {i} restates boundary time {} with a different state",
                        first.time
                    )));
                }
            }

            let mut segment = Segment::from_samples(segment_message.samples.clone());
            if let Some(dm) = &segment_message.downsampling {
                if segment.is_empty() {
                    return Err(TrajectoryError::Corrupt(format!(
                        "segment {i} carries a downsampling descriptor but no samples"
                    )));
                }
                segment.restore_downsampling(
                    DownsamplingParameters {
                        window_size: dm.window_size as usize,
                        tolerance: dm.tolerance,
                    },
                    dm.dense_start,
                );
            }
            if let Some(last) = segment_message.samples.last() {
                previous_last = Some(*last);
            }
            chain.push_back(segment);
        }

        for r in &message.exact {
            let Some(segment_message) = message.segments.get(r.segment as usize) else {
                return Err(TrajectoryError::Corrupt(format!(
                    "exact marker references segment {} of {}",
                    r.segment,
                    message.segments.len()
                )));
            };
            if r.index as usize >= segment_message.samples.len() {
                return Err(TrajectoryError::Corrupt(format!(
                    "exact marker references sample {} of {}",
                    r.index,
                    segment_message.samples.len()
                )));
            }
        }

        let ids: Vec<SegmentId> = chain.ids().to_vec();
        let mut handles = Vec::with_capacity(message.tracked.len());
        for &position in &message.tracked {
            let Some(&id) = ids.get(position as usize) else {
                return Err(TrajectoryError::Corrupt(format!(
                    "tracked segment {} of {}",
                    position,
                    ids.len()
                )));
            };
            handles.push(id);
        }

        let mut index = LeftEndpointIndex::new();
        index.rebuild(&chain);
        let trajectory = Trajectory { chain, index };
        debug_assert!(trajectory.check_consistency().is_ok());
        Ok((trajectory, handles))
    }

    /// Reconstruct a trajectory from a legacy fork-tree message
    ///
    /// Each branch becomes a chain segment attached at its fork point.
    /// Only linear trees are accepted: at most one brood per node, one
    /// trajectory per brood, forking exactly at the end of its parent.
    /// Returns one handle per legacy node, root first.
    pub fn read_from_legacy_message(
        message: &LegacyMessage,
    ) -> TrajectoryResult<(Trajectory, Vec<SegmentId>)> {
        // Flatten and validate the tree shape first.
        let mut nodes = vec![message];
        let mut current = message;
        loop {
            match current.children.as_slice() {
                [] => break,
                [brood] => match brood.trajectories.as_slice() {
                    [child] => {
                        if current.samples.last().map(|s| s.time) != Some(brood.fork_time) {
                            return Err(TrajectoryError::Corrupt(format!(
                                "brood forks at {} but its parent does not end there",
                                brood.fork_time
                            )));
                        }
                        nodes.push(child);
                        current = child;
                    }
                    trajectories => {
                        return Err(TrajectoryError::Corrupt(format!(
                            "brood holds {} trajectories, expected exactly 1",
                            trajectories.len()
                        )))
                    }
                },
                broods => {
                    return Err(TrajectoryError::Corrupt(format!(
                        "trajectory node has {} broods, expected at most 1",
                        broods.len()
                    )))
                }
            }
        }

        let mut trajectory = Trajectory::new();
        let mut handles = Vec::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            let id = if i == 0 {
                trajectory
                    .chain
                    .first_id()
                    .expect("trajectory chain is never empty")
            } else {
                // Copies the fork sample into the new segment.
                trajectory.new_segment()
            };

            let mut samples = node.samples.as_slice();
            if i > 0 {
                if let (Some(fork), Some(first)) =
                    (trajectory.last().copied(), samples.first().copied())
                {
                    if first.time == fork.time {
                        if first.state == fork.state {
                            warn!(fork_time = %fork.time, "legacy child restates its fork sample");
                            samples = &samples[1..];
                        } else {
                            return Err(TrajectoryError::Corrupt(format!(
                                "legacy child restates fork time {} with a different state",
                                fork.time
                            )));
                        }
                    }
                }
            }
            for sample in samples {
                trajectory.append(sample.time, sample.state).map_err(|_| {
                    TrajectoryError::Corrupt(format!(
                        "legacy sample at {} does not extend its branch",
                        sample.time
                    ))
                })?;
            }

            if let Some(legacy) = &node.downsampling {
                match trajectory.chain.get_mut(id) {
                    Some(segment) if !segment.is_empty() => {
                        segment.restore_downsampling(
                            DownsamplingParameters {
                                window_size: legacy.max_dense_intervals as usize,
                                tolerance: legacy.tolerance,
                            },
                            legacy.dense_start,
                        );
                    }
                    _ => warn!("legacy downsampling descriptor on an empty node, dropped"),
                }
            }
            handles.push(id);
        }

        debug_assert!(trajectory.check_consistency().is_ok());
        Ok((trajectory, handles))
    }

    /// Serialize into the checksummed envelope
    pub fn to_bytes(&self, tracked: &[SegmentId], exact: &[Instant]) -> TrajectoryResult<Vec<u8>> {
        encode(&self.write_to_message(tracked, exact)?)
    }

    /// Deserialize from the checksummed envelope, legacy or current
    pub fn from_bytes(bytes: &[u8]) -> TrajectoryResult<(Trajectory, Vec<SegmentId>)> {
        match decode(bytes)? {
            VersionedMessage::Current(message) => Trajectory::read_from_message(&message),
            VersionedMessage::Legacy(message) => Trajectory::read_from_legacy_message(&message),
        }
    }
}
