//! Gaze samples and their derived validity rules.
//!
//! A [`GazeSample`] is the recorded form of one eye-tracker measurement.
//! The schema is versioned: version 0 records predate most of the fields
//! and must decode with documented defaults (zeros, validity = true)
//! rather than failing. Current samples are written at
//! [`GazeSample::CURRENT_VERSION`].

use serde::{Deserialize, Serialize};

use super::Point;

/// Validity aspects a caller can ask a gaze sample about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// The combined gaze center is usable.
    CenterPositionValid,
    /// The head position vector is usable.
    HeadPositionValid,
    /// The pupil size readings are usable.
    PupilSizesValid,
}

/// One eye-tracker measurement.
///
/// Immutable after construction. `hardware_time` is the remote device clock
/// (may be zero when the device has no clock or it was not synchronized);
/// `arrival_time` is stamped by the recorder when the event is first
/// observed locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    /// Device clock at measurement time, epoch millis. 0 = unknown.
    #[serde(default)]
    pub hardware_time: i64,

    /// Local clock when the recorder first saw this sample, epoch millis.
    #[serde(default)]
    pub arrival_time: i64,

    /// Combined gaze center in document coordinates. Negative coordinates
    /// mark off-document samples.
    pub center: Point,

    #[serde(default)]
    pub head_position: [f32; 3],

    #[serde(default)]
    pub left_eye_distance: f32,

    #[serde(default)]
    pub right_eye_distance: f32,

    #[serde(default)]
    pub left_eye_position: [f32; 3],

    #[serde(default)]
    pub right_eye_position: [f32; 3],

    #[serde(default)]
    pub pupil_size_left: f32,

    #[serde(default)]
    pub pupil_size_right: f32,

    /// Validity flag as reported by the device.
    #[serde(default = "default_validity")]
    pub validity: bool,

    /// Schema version. 0 = legacy record with defaulted fields.
    #[serde(default)]
    pub version: u32,
}

fn default_validity() -> bool {
    true
}

impl GazeSample {
    /// Version written for newly constructed samples.
    pub const CURRENT_VERSION: u32 = 2;

    /// Create a sample at the current schema version with all optional
    /// fields zeroed.
    pub fn new(center: Point) -> Self {
        Self {
            hardware_time: 0,
            arrival_time: 0,
            center,
            head_position: [0.0; 3],
            left_eye_distance: 0.0,
            right_eye_distance: 0.0,
            left_eye_position: [0.0; 3],
            right_eye_position: [0.0; 3],
            pupil_size_left: 0.0,
            pupil_size_right: 0.0,
            validity: true,
            version: Self::CURRENT_VERSION,
        }
    }

    /// The time this sample was observed.
    ///
    /// Remote device clocks may be unsynchronized or absent entirely, so a
    /// zero hardware time falls back to the local arrival time instead of
    /// discarding the sample.
    pub fn observation_time(&self) -> i64 {
        if self.hardware_time == 0 {
            self.arrival_time
        } else {
            self.hardware_time
        }
    }

    /// Evaluate the conjunction of the requested validity aspects.
    ///
    /// For [`Validity::CenterPositionValid`] the stored flag is combined
    /// with an override that forces invalidity whenever either coordinate
    /// of the combined center is negative (off-document samples). All
    /// other aspects currently pass through as valid.
    pub fn are_valid(&self, validities: &[Validity]) -> bool {
        let mut rval = true;

        for validity in validities {
            if *validity == Validity::CenterPositionValid {
                rval &= self.validity;

                if self.center.x < 0 || self.center.y < 0 {
                    rval = false;
                }
            }
        }

        rval
    }
}
