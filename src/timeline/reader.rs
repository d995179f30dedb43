//! Session log parser.
//!
//! Reads a finished session log back into a header plus ordered envelopes.
//! The first line is the JSON header, every following non-empty line one
//! record. Decoding tolerates unknown optional fields inside record
//! payloads and legacy (version 0) gaze records.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};

use super::LogHeader;
use crate::events::{Envelope, EventCodec};

/// A fully decoded session log.
#[derive(Debug)]
pub struct TimelineFile {
    /// Recording metadata.
    pub header: LogHeader,

    /// All records, in the order they were written.
    pub records: Vec<Envelope>,
}

impl TimelineFile {
    /// Parse a session log from a filesystem path.
    pub fn parse<P: AsRef<Path>>(codec: &EventCodec, path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            fs::File::open(path).with_context(|| format!("Failed to open file: {:?}", path))?;
        let reader = BufReader::new(file);

        Self::parse_reader(codec, reader)
    }

    /// Parse a session log from any buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is empty, the header is invalid or of
    /// an unsupported version, or any record line fails to decode.
    pub fn parse_reader<R: BufRead>(codec: &EventCodec, reader: R) -> Result<Self> {
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .context("File is empty")?
            .context("Failed to read header line")?;

        let header: LogHeader =
            serde_json::from_str(&header_line).context("Failed to parse header")?;

        if header.version != super::FORMAT_VERSION {
            bail!(
                "Unsupported session log version {} (expected {})",
                header.version,
                super::FORMAT_VERSION
            );
        }

        let mut records = Vec::new();
        for (line_num, line_result) in lines.enumerate() {
            let line =
                line_result.with_context(|| format!("Failed to read line {}", line_num + 2))?;

            if line.trim().is_empty() {
                continue;
            }

            let record = codec
                .decode_line(&line)
                .with_context(|| format!("Failed to decode record on line {}", line_num + 2))?;
            records.push(record);
        }

        Ok(TimelineFile { header, records })
    }

    /// Parse a session log from a string.
    pub fn parse_str(codec: &EventCodec, content: &str) -> Result<Self> {
        let reader = BufReader::new(content.as_bytes());
        Self::parse_reader(codec, reader)
    }

    /// Total duration of the recording in millis (elapsed of the last record).
    pub fn duration(&self) -> i64 {
        self.records.last().map(|r| r.elapsed).unwrap_or(0)
    }

    /// All records of one kind.
    pub fn records_of(&self, kind: crate::events::EventKind) -> Vec<&Envelope> {
        self.records
            .iter()
            .filter(|r| r.event.kind() == kind)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, SessionEvent};

    fn codec() -> EventCodec {
        EventCodec::with_default_converters().unwrap()
    }

    #[test]
    fn parse_from_string() {
        let content = r#"{"version":1,"screen":{"width":800,"height":600},"timestamp":1000}
{"t":0,"at":0,"v":1,"kind":"mark","data":{"tag":"start"}}
{"t":5,"at":0,"v":1,"kind":"mouse","data":{"action":"move","x":1,"y":2}}"#;

        let codec = codec();
        let file = TimelineFile::parse_str(&codec, content).unwrap();
        assert_eq!(file.header.timestamp, 1000);
        assert_eq!(file.records.len(), 2);
        assert_eq!(file.duration(), 5);
    }

    #[test]
    fn parse_skips_empty_lines() {
        let content = r#"{"version":1,"screen":{"width":800,"height":600},"timestamp":0}
{"t":0,"at":0,"v":1,"kind":"mark","data":{"tag":"a"}}

{"t":1,"at":0,"v":1,"kind":"mark","data":{"tag":"b"}}"#;

        let codec = codec();
        let file = TimelineFile::parse_str(&codec, content).unwrap();
        assert_eq!(file.records.len(), 2);
    }

    #[test]
    fn parse_rejects_wrong_version() {
        let content = r#"{"version":9,"screen":{"width":1,"height":1},"timestamp":0}"#;
        let codec = codec();
        assert!(TimelineFile::parse_str(&codec, content).is_err());
    }

    #[test]
    fn parse_rejects_empty_input() {
        let codec = codec();
        assert!(TimelineFile::parse_str(&codec, "").is_err());
    }

    #[test]
    fn records_of_filters_by_kind() {
        let content = r#"{"version":1,"screen":{"width":1,"height":1},"timestamp":0}
{"t":0,"at":0,"v":1,"kind":"mark","data":{"tag":"a"}}
{"t":1,"at":0,"v":1,"kind":"mouse","data":{"action":"click","kind":1,"button":0}}
{"t":2,"at":0,"v":1,"kind":"mark","data":{"tag":"b"}}"#;

        let codec = codec();
        let file = TimelineFile::parse_str(&codec, content).unwrap();
        let markers = file.records_of(EventKind::Marker);
        assert_eq!(markers.len(), 2);
        assert!(matches!(markers[1].event, SessionEvent::Marker(_)));
    }
}
