//! Brain-channel samples.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One brain-tracker measurement: a timestamp plus named channel values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrainSample {
    /// Device clock at measurement time, epoch millis. 0 = unknown.
    #[serde(default)]
    pub time: i64,

    /// Channel name to reading. Ordered so records serialize stably.
    pub channels: BTreeMap<String, f64>,
}

impl BrainSample {
    pub fn new(time: i64, channels: BTreeMap<String, f64>) -> Self {
        Self { time, channels }
    }

    /// Names of all channels present in this sample.
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Reading for a single channel, if present.
    pub fn value(&self, channel: &str) -> Option<f64> {
        self.channels.get(channel).copied()
    }
}
