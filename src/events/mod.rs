//! Event model for recorded browsing sessions.
//!
//! Every observable signal in a session (gaze samples, brain-channel
//! readings, mouse and viewport activity, DOM element updates, log markers,
//! screenshot references) is represented by one case of the closed
//! [`SessionEvent`] sum type. Events are wrapped in an [`Envelope`] that
//! carries the timing and schema-version metadata shared by all kinds:
//!
//! - `observed` - the producer/hardware clock time (epoch millis, 0 = unknown)
//! - `elapsed` - time since the session start reference, assigned at write time
//! - `version` - schema version of the payload, for backward-compatible decode
//!
//! The wire representation of each kind is owned by the codec in
//! [`codec`], which maps kinds to stable human-readable aliases.

pub mod brain;
pub mod codec;
pub mod gaze;

pub use brain::BrainSample;
pub use codec::{CodecError, Converter, EventCodec};
pub use gaze::{GazeSample, Validity};

use serde::{Deserialize, Serialize};

// ============================================================================
// Geometry primitives
// ============================================================================

/// A point in document or screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A rectangular screen region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Screen dimensions, as recorded in the session log header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

// ============================================================================
// Event kinds
// ============================================================================

/// Identifier for each event kind in the closed set.
///
/// The alias is the stable tag written into every log record; decoding
/// dispatches on it. Aliases never change once released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Gaze,
    Brain,
    Mouse,
    Viewport,
    Geometry,
    Marker,
    FunctionCall,
    Listener,
    Property,
    ElementMeta,
    ElementGeometry,
    ImageCapture,
}

impl EventKind {
    /// The wire tag for this kind.
    pub fn alias(&self) -> &'static str {
        match self {
            EventKind::Gaze => "gaze",
            EventKind::Brain => "brain",
            EventKind::Mouse => "mouse",
            EventKind::Viewport => "viewport",
            EventKind::Geometry => "geometry",
            EventKind::Marker => "mark",
            EventKind::FunctionCall => "call",
            EventKind::Listener => "listener",
            EventKind::Property => "property",
            EventKind::ElementMeta => "element_meta",
            EventKind::ElementGeometry => "element_geometry",
            EventKind::ImageCapture => "image",
        }
    }

    /// All kinds, in declaration order.
    pub fn all() -> &'static [EventKind] {
        &[
            EventKind::Gaze,
            EventKind::Brain,
            EventKind::Mouse,
            EventKind::Viewport,
            EventKind::Geometry,
            EventKind::Marker,
            EventKind::FunctionCall,
            EventKind::Listener,
            EventKind::Property,
            EventKind::ElementMeta,
            EventKind::ElementGeometry,
            EventKind::ImageCapture,
        ]
    }
}

// ============================================================================
// Payload types
// ============================================================================

/// Mouse activity: a click or a position change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MouseEvent {
    Click { kind: i32, button: i32 },
    Move { x: i32, y: i32 },
}

/// Scroll position of the document viewport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportUpdate {
    pub x: i32,
    pub y: i32,
}

/// Position and size of the document on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryUpdate {
    pub bounds: Region,
}

/// Free-form annotation inserted by the instrumented page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMarker {
    pub tag: String,
}

/// A browser-side function invocation, with stringified arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// A listener being attached to or detached from the page bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ListenerChange {
    Registered { kind: String, listener: String },
    Removed { listener: String },
}

/// Whether a property record came from a parameter or a preference call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyScope {
    #[default]
    Parameter,
    Preference,
}

/// A session-scoped key/value update (parameters, preferences, device info).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyUpdate {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub scope: PropertyScope,
}

/// Metadata attached to a DOM element (includes boolean flags, stringified).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementMetaUpdate {
    pub id: String,
    pub key: String,
    pub value: String,
}

/// Position, kind and content reference of a DOM element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementGeometryUpdate {
    pub id: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub bounds: Region,
}

/// Reference to a screenshot file captured into the session directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCapture {
    pub file: String,
}

// ============================================================================
// SessionEvent
// ============================================================================

/// The closed set of recordable event kinds.
///
/// Instances are immutable after construction and owned by their producer
/// until handed to the session timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Gaze(GazeSample),
    Brain(BrainSample),
    Mouse(MouseEvent),
    Viewport(ViewportUpdate),
    Geometry(GeometryUpdate),
    Marker(LogMarker),
    FunctionCall(FunctionCall),
    Listener(ListenerChange),
    Property(PropertyUpdate),
    ElementMeta(ElementMetaUpdate),
    ElementGeometry(ElementGeometryUpdate),
    ImageCapture(ImageCapture),
}

impl SessionEvent {
    /// The kind tag of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Gaze(_) => EventKind::Gaze,
            SessionEvent::Brain(_) => EventKind::Brain,
            SessionEvent::Mouse(_) => EventKind::Mouse,
            SessionEvent::Viewport(_) => EventKind::Viewport,
            SessionEvent::Geometry(_) => EventKind::Geometry,
            SessionEvent::Marker(_) => EventKind::Marker,
            SessionEvent::FunctionCall(_) => EventKind::FunctionCall,
            SessionEvent::Listener(_) => EventKind::Listener,
            SessionEvent::Property(_) => EventKind::Property,
            SessionEvent::ElementMeta(_) => EventKind::ElementMeta,
            SessionEvent::ElementGeometry(_) => EventKind::ElementGeometry,
            SessionEvent::ImageCapture(_) => EventKind::ImageCapture,
        }
    }

    /// Schema version of the payload, written into the envelope.
    ///
    /// Gaze samples carry their own version (0 = legacy); every other kind
    /// is at version 1.
    pub fn schema_version(&self) -> u32 {
        match self {
            SessionEvent::Gaze(sample) => sample.version,
            _ => 1,
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// A single timestamped, versioned, typed record destined for the log.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Producer/hardware clock time in epoch millis; 0 means unknown.
    pub observed: i64,
    /// Millis since the session start reference, assigned at write time.
    pub elapsed: i64,
    /// Schema version of the payload.
    pub version: u32,
    /// The typed payload.
    pub event: SessionEvent,
}
