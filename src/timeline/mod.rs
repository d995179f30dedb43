//! Session timeline: the single ordered, durable log of a session.
//!
//! The format is NDJSON. The first line is a [`LogHeader`] describing the
//! recording (format version, screen size, start reference); each
//! subsequent line is one envelope encoded by the [`crate::events::codec`]
//! registry.
//!
//! # Structure
//!
//! - `writer` - the single active per-session writer ([`SessionTimeline`])
//! - `reader` - decoding a finished log back into envelopes

mod reader;
mod writer;

pub use reader::TimelineFile;
pub use writer::SessionTimeline;

use serde::{Deserialize, Serialize};

use crate::events::Dimensions;

/// Current log format version.
pub const FORMAT_VERSION: u8 = 1;

/// Metadata header written as the first line of every session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogHeader {
    /// Format version (currently 1).
    pub version: u8,

    /// Effective screen size for this session (live or fake-replay).
    pub screen: Dimensions,

    /// Session start reference, epoch millis. Elapsed times in all records
    /// are relative to this.
    pub timestamp: i64,

    /// Optional human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl LogHeader {
    pub fn new(screen: Dimensions, timestamp: i64) -> Self {
        Self {
            version: FORMAT_VERSION,
            screen,
            timestamp,
            title: None,
        }
    }
}

/// Errors raised by the timeline writer.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("failed to open session log: {0}")]
    Open(#[source] std::io::Error),

    #[error("session log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session log is already closed")]
    Closed,
}
