//! Browser Session Recorder (BSR) Library
//!
//! A Rust library for recording live browsing sessions instrumented with
//! eye- and brain-tracking hardware. All signals (gaze samples, brain
//! channels, mouse/viewport/DOM activity, screenshots) funnel into one
//! ordered, durable session log that can be decoded, replayed
//! deterministically (fake replay) and exported as an archive.

pub mod archive;
pub mod capture;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod fetch;
pub mod recorder;
pub mod session;
pub mod timeline;

pub use capture::{CaptureError, NullScreen, ScreenSource, ScreenshotScheduler};
pub use config::RecorderConfig;
pub use device::{
    open_device, DeviceAddress, DeviceCategory, DeviceDescriptor, DeviceRegistry, DeviceTransport,
    DistributionHub, RawTrackingEvent, RemoteTrackingEvent, TrackingDevice, TrackingListener,
    TransportCallback,
};
pub use error::RecorderError;
pub use events::{
    BrainSample, Dimensions, Envelope, EventCodec, EventKind, GazeSample, Point, Region,
    SessionEvent, Validity,
};
pub use fetch::{HttpFetcher, ResourceFetcher};
pub use recorder::{FakeReplay, SessionRecorder, SpecialCommand};
pub use session::Session;
pub use timeline::{LogHeader, SessionTimeline, TimelineFile};
