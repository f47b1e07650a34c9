//! `fusion-safety` – Redundancy & Voting
//!
//! Triple modular redundancy for the fusion pipeline.  Voting happens only at
//! boundaries the caller chooses; nothing in this crate fails closed.
//!
//! # Modules
//!
//! - [`tmr`] – [`TmrVoter`][tmr::TmrVoter]: lane-wise majority vote of three
//!   copies of a bus, with a per-lane disagreement mask.
//! - [`replicas`] – [`vote_sensor_frames`][replicas::vote_sensor_frames]:
//!   votes three replicas of a raw [`SensorFrame`][fusion_types::SensorFrame]
//!   before decoding.

pub mod replicas;
pub mod tmr;

pub use replicas::{SensorVoteReport, vote_sensor_frames};
pub use tmr::{DEFAULT_VOTE_LANE_BITS, TmrVote, TmrVoter, vote_word};
