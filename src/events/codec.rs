//! Wire codec for session log records.
//!
//! Each event kind is registered under a stable human-readable alias
//! together with a pair of encode/decode converters. Registration happens
//! once at construction; a duplicate alias or converter is a setup error,
//! and a recorder whose codec failed to build must refuse to open any
//! session rather than silently lose data.
//!
//! A record line looks like:
//!
//! ```text
//! {"t":1234,"at":1700000000000,"v":2,"kind":"gaze","data":{...}}
//! ```
//!
//! where `t` is the session-relative elapsed time, `at` the producer
//! observation time, `v` the payload schema version and `kind` the
//! registered alias. Unknown optional fields inside `data` are ignored on
//! decode, so the format stays readable across schema evolution.

use std::collections::BTreeMap;

use serde_json::Value;

use super::{
    BrainSample, ElementGeometryUpdate, ElementMetaUpdate, Envelope, EventKind, FunctionCall,
    GazeSample, GeometryUpdate, ImageCapture, ListenerChange, LogMarker, MouseEvent,
    PropertyUpdate, SessionEvent, ViewportUpdate,
};

/// Errors raised while building the codec or translating records.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("alias '{0}' is already registered")]
    DuplicateAlias(String),

    #[error("no converter registered for kind '{0}'")]
    UnknownKind(String),

    #[error("converter for '{0}' received an event of a different kind")]
    KindMismatch(&'static str),

    #[error("malformed record: {0}")]
    Malformed(&'static str),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

type EncodeFn = fn(&SessionEvent) -> Result<Value, CodecError>;
type DecodeFn = fn(u32, Value) -> Result<SessionEvent, CodecError>;

/// Encode/decode rules for one event kind under one alias.
pub struct Converter {
    alias: &'static str,
    encode: EncodeFn,
    decode: DecodeFn,
}

impl Converter {
    pub fn new(alias: &'static str, encode: EncodeFn, decode: DecodeFn) -> Self {
        Self {
            alias,
            encode,
            decode,
        }
    }

    pub fn alias(&self) -> &'static str {
        self.alias
    }
}

/// Registry of kind aliases and converters for the session log format.
pub struct EventCodec {
    converters: BTreeMap<&'static str, Converter>,
}

impl EventCodec {
    /// Build a codec with converters for every kind in the closed set.
    ///
    /// Fails if any registration collides; callers must treat that as the
    /// recorder being unavailable.
    pub fn with_default_converters() -> Result<Self, CodecError> {
        let mut codec = Self {
            converters: BTreeMap::new(),
        };

        codec.register(Converter::new(
            EventKind::Gaze.alias(),
            encode_gaze,
            decode_gaze,
        ))?;
        codec.register(Converter::new(
            EventKind::Brain.alias(),
            encode_brain,
            decode_brain,
        ))?;
        codec.register(Converter::new(
            EventKind::Mouse.alias(),
            encode_mouse,
            decode_mouse,
        ))?;
        codec.register(Converter::new(
            EventKind::Viewport.alias(),
            encode_viewport,
            decode_viewport,
        ))?;
        codec.register(Converter::new(
            EventKind::Geometry.alias(),
            encode_geometry,
            decode_geometry,
        ))?;
        codec.register(Converter::new(
            EventKind::Marker.alias(),
            encode_marker,
            decode_marker,
        ))?;
        codec.register(Converter::new(
            EventKind::FunctionCall.alias(),
            encode_call,
            decode_call,
        ))?;
        codec.register(Converter::new(
            EventKind::Listener.alias(),
            encode_listener,
            decode_listener,
        ))?;
        codec.register(Converter::new(
            EventKind::Property.alias(),
            encode_property,
            decode_property,
        ))?;
        codec.register(Converter::new(
            EventKind::ElementMeta.alias(),
            encode_element_meta,
            decode_element_meta,
        ))?;
        codec.register(Converter::new(
            EventKind::ElementGeometry.alias(),
            encode_element_geometry,
            decode_element_geometry,
        ))?;
        codec.register(Converter::new(
            EventKind::ImageCapture.alias(),
            encode_image,
            decode_image,
        ))?;

        Ok(codec)
    }

    /// Register a converter under its alias.
    ///
    /// Returns [`CodecError::DuplicateAlias`] if the alias is taken.
    pub fn register(&mut self, converter: Converter) -> Result<(), CodecError> {
        if self.converters.contains_key(converter.alias) {
            return Err(CodecError::DuplicateAlias(converter.alias.to_string()));
        }
        self.converters.insert(converter.alias, converter);
        Ok(())
    }

    /// Serialize one envelope to a single log line (without the newline).
    pub fn encode_line(&self, envelope: &Envelope) -> Result<String, CodecError> {
        let alias = envelope.event.kind().alias();
        let converter = self
            .converters
            .get(alias)
            .ok_or_else(|| CodecError::UnknownKind(alias.to_string()))?;

        let data = (converter.encode)(&envelope.event)?;
        let line = serde_json::json!({
            "t": envelope.elapsed,
            "at": envelope.observed,
            "v": envelope.version,
            "kind": alias,
            "data": data,
        });

        Ok(serde_json::to_string(&line)?)
    }

    /// Parse one log line back into an envelope.
    pub fn decode_line(&self, line: &str) -> Result<Envelope, CodecError> {
        let value: Value = serde_json::from_str(line)?;
        let record = value
            .as_object()
            .ok_or(CodecError::Malformed("record must be a JSON object"))?;

        let elapsed = record
            .get("t")
            .and_then(Value::as_i64)
            .ok_or(CodecError::Malformed("missing elapsed time"))?;
        let observed = record.get("at").and_then(Value::as_i64).unwrap_or(0);
        let version = record.get("v").and_then(Value::as_u64).unwrap_or(0) as u32;
        let alias = record
            .get("kind")
            .and_then(Value::as_str)
            .ok_or(CodecError::Malformed("missing kind tag"))?;

        let converter = self
            .converters
            .get(alias)
            .ok_or_else(|| CodecError::UnknownKind(alias.to_string()))?;

        let data = record.get("data").cloned().unwrap_or(Value::Null);
        let event = (converter.decode)(version, data)?;

        Ok(Envelope {
            observed,
            elapsed,
            version,
            event,
        })
    }
}

// ============================================================================
// Default converters
// ============================================================================

fn encode_gaze(event: &SessionEvent) -> Result<Value, CodecError> {
    match event {
        SessionEvent::Gaze(sample) => Ok(serde_json::to_value(sample)?),
        _ => Err(CodecError::KindMismatch("gaze")),
    }
}

fn decode_gaze(_version: u32, data: Value) -> Result<SessionEvent, CodecError> {
    let sample: GazeSample = serde_json::from_value(data)?;
    Ok(SessionEvent::Gaze(sample))
}

fn encode_brain(event: &SessionEvent) -> Result<Value, CodecError> {
    match event {
        SessionEvent::Brain(sample) => Ok(serde_json::to_value(sample)?),
        _ => Err(CodecError::KindMismatch("brain")),
    }
}

fn decode_brain(_version: u32, data: Value) -> Result<SessionEvent, CodecError> {
    let sample: BrainSample = serde_json::from_value(data)?;
    Ok(SessionEvent::Brain(sample))
}

fn encode_mouse(event: &SessionEvent) -> Result<Value, CodecError> {
    match event {
        SessionEvent::Mouse(mouse) => Ok(serde_json::to_value(mouse)?),
        _ => Err(CodecError::KindMismatch("mouse")),
    }
}

fn decode_mouse(_version: u32, data: Value) -> Result<SessionEvent, CodecError> {
    let mouse: MouseEvent = serde_json::from_value(data)?;
    Ok(SessionEvent::Mouse(mouse))
}

fn encode_viewport(event: &SessionEvent) -> Result<Value, CodecError> {
    match event {
        SessionEvent::Viewport(viewport) => Ok(serde_json::to_value(viewport)?),
        _ => Err(CodecError::KindMismatch("viewport")),
    }
}

fn decode_viewport(_version: u32, data: Value) -> Result<SessionEvent, CodecError> {
    let viewport: ViewportUpdate = serde_json::from_value(data)?;
    Ok(SessionEvent::Viewport(viewport))
}

fn encode_geometry(event: &SessionEvent) -> Result<Value, CodecError> {
    match event {
        SessionEvent::Geometry(geometry) => Ok(serde_json::to_value(geometry)?),
        _ => Err(CodecError::KindMismatch("geometry")),
    }
}

fn decode_geometry(_version: u32, data: Value) -> Result<SessionEvent, CodecError> {
    let geometry: GeometryUpdate = serde_json::from_value(data)?;
    Ok(SessionEvent::Geometry(geometry))
}

fn encode_marker(event: &SessionEvent) -> Result<Value, CodecError> {
    match event {
        SessionEvent::Marker(marker) => Ok(serde_json::to_value(marker)?),
        _ => Err(CodecError::KindMismatch("mark")),
    }
}

fn decode_marker(_version: u32, data: Value) -> Result<SessionEvent, CodecError> {
    let marker: LogMarker = serde_json::from_value(data)?;
    Ok(SessionEvent::Marker(marker))
}

fn encode_call(event: &SessionEvent) -> Result<Value, CodecError> {
    match event {
        SessionEvent::FunctionCall(call) => Ok(serde_json::to_value(call)?),
        _ => Err(CodecError::KindMismatch("call")),
    }
}

fn decode_call(_version: u32, data: Value) -> Result<SessionEvent, CodecError> {
    let call: FunctionCall = serde_json::from_value(data)?;
    Ok(SessionEvent::FunctionCall(call))
}

fn encode_listener(event: &SessionEvent) -> Result<Value, CodecError> {
    match event {
        SessionEvent::Listener(change) => Ok(serde_json::to_value(change)?),
        _ => Err(CodecError::KindMismatch("listener")),
    }
}

fn decode_listener(_version: u32, data: Value) -> Result<SessionEvent, CodecError> {
    let change: ListenerChange = serde_json::from_value(data)?;
    Ok(SessionEvent::Listener(change))
}

fn encode_property(event: &SessionEvent) -> Result<Value, CodecError> {
    match event {
        SessionEvent::Property(update) => Ok(serde_json::to_value(update)?),
        _ => Err(CodecError::KindMismatch("property")),
    }
}

fn decode_property(_version: u32, data: Value) -> Result<SessionEvent, CodecError> {
    let update: PropertyUpdate = serde_json::from_value(data)?;
    Ok(SessionEvent::Property(update))
}

fn encode_element_meta(event: &SessionEvent) -> Result<Value, CodecError> {
    match event {
        SessionEvent::ElementMeta(update) => Ok(serde_json::to_value(update)?),
        _ => Err(CodecError::KindMismatch("element_meta")),
    }
}

fn decode_element_meta(_version: u32, data: Value) -> Result<SessionEvent, CodecError> {
    let update: ElementMetaUpdate = serde_json::from_value(data)?;
    Ok(SessionEvent::ElementMeta(update))
}

fn encode_element_geometry(event: &SessionEvent) -> Result<Value, CodecError> {
    match event {
        SessionEvent::ElementGeometry(update) => Ok(serde_json::to_value(update)?),
        _ => Err(CodecError::KindMismatch("element_geometry")),
    }
}

fn decode_element_geometry(_version: u32, data: Value) -> Result<SessionEvent, CodecError> {
    let update: ElementGeometryUpdate = serde_json::from_value(data)?;
    Ok(SessionEvent::ElementGeometry(update))
}

fn encode_image(event: &SessionEvent) -> Result<Value, CodecError> {
    match event {
        SessionEvent::ImageCapture(capture) => Ok(serde_json::to_value(capture)?),
        _ => Err(CodecError::KindMismatch("image")),
    }
}

fn decode_image(_version: u32, data: Value) -> Result<SessionEvent, CodecError> {
    let capture: ImageCapture = serde_json::from_value(data)?;
    Ok(SessionEvent::ImageCapture(capture))
}
