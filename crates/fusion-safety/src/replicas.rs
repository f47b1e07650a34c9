//! Voting of triplicated raw sensor frames.
//!
//! A rig with redundant acquisition delivers three copies of every
//! [`SensorFrame`].  [`vote_sensor_frames`] votes each sensor bus with 16-bit
//! lanes and the two timestamps as whole 64-bit words, before any decoding
//! happens.

use fusion_types::{BitVector, Sensor, SensorFrame};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::tmr::{DEFAULT_VOTE_LANE_BITS, TmrVote, TmrVoter, vote_word};

/// Per-sensor error masks produced by [`vote_sensor_frames`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorVoteReport {
    /// One error mask per sensor, indexed by [`Sensor::index`].
    pub masks: [BitVector; 4],
    /// `true` when the three copies of either timestamp all disagreed.
    pub timing_disagreement: bool,
}

impl SensorVoteReport {
    /// Error mask of `sensor` (one bit per 16-bit lane).
    pub fn mask(&self, sensor: Sensor) -> &BitVector {
        &self.masks[sensor.index()]
    }

    /// `true` when every lane and both timestamps had a majority.
    pub fn is_clean(&self) -> bool {
        !self.timing_disagreement && self.masks.iter().all(BitVector::is_zero)
    }
}

/// Vote three replicas of a raw frame.
///
/// Returns the voted frame and the disagreement report.  Never fails: lanes
/// without a majority take the first replica's value.
pub fn vote_sensor_frames(replicas: &[SensorFrame; 3]) -> (SensorFrame, SensorVoteReport) {
    let [a, b, c] = replicas;
    let mut masks: [BitVector; 4] = Sensor::ALL.map(|s| BitVector::zero(s.bus_bits() / DEFAULT_VOTE_LANE_BITS));

    let voted = a.map_sensors(|sensor, first| {
        let vote = vote_bus(sensor, first, b.sensor(sensor), c.sensor(sensor));
        masks[sensor.index()] = vote.errors;
        vote.voted
    });

    let (timestamp, ts_err) = vote_word(a.timestamp_us(), b.timestamp_us(), c.timestamp_us());
    let (reference, ref_err) = vote_word(
        a.reference_time_us(),
        b.reference_time_us(),
        c.reference_time_us(),
    );

    let report = SensorVoteReport {
        masks,
        timing_disagreement: ts_err || ref_err,
    };
    if !report.is_clean() {
        warn!(
            camera = report.mask(Sensor::Camera).count_ones(),
            lidar = report.mask(Sensor::Lidar).count_ones(),
            radar = report.mask(Sensor::Radar).count_ones(),
            imu = report.mask(Sensor::Imu).count_ones(),
            timing = report.timing_disagreement,
            "sensor replicas disagree without majority"
        );
    }
    (voted.with_timing(timestamp, reference), report)
}

fn vote_bus(sensor: Sensor, c1: &BitVector, c2: &BitVector, c3: &BitVector) -> TmrVote {
    // Every raw bus width is a multiple of 16.
    TmrVoter::for_bus(sensor.bus_bits(), DEFAULT_VOTE_LANE_BITS).vote(c1, c2, c3)
}
