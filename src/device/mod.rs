//! Remote tracking devices.
//!
//! A tracking device (eye tracker, brain tracker) lives behind a remote
//! transport that this crate does not implement. The transport is reached
//! through two narrow traits: [`DeviceTransport`] resolves an address to a
//! [`DeviceRegistry`] handle, and the registry delivers raw records to a
//! single callback installed by the connected device.
//!
//! Raw records are adapted lazily: a [`RemoteTrackingEvent`] exposes
//! channel readings backed by the shared raw record rather than copying
//! them per listener.
//!
//! # Structure
//!
//! - `hub` - the lock-guarded listener registry and fanout point
//! - `connection` - address validation, bounded connect, metadata fetch

pub mod connection;
pub mod hub;

pub use connection::{open_device, DeviceAddress};
pub use hub::{DistributionHub, TrackingListener};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::events::BrainSample;

// ============================================================================
// Device descriptor
// ============================================================================

/// The fixed descriptor key set every tracking device provider exposes.
pub const DESCRIPTOR_KEYS: [&str; 3] = ["DEVICE_NAME", "HARDWARE_ID", "DEVICE_MANUFACTURER"];

/// Which kind of tracking hardware a connection talks to. Determines the
/// namespace device metadata is recorded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCategory {
    EyeTracking,
    BrainTracking,
}

impl DeviceCategory {
    /// Property-key prefix for metadata of this category.
    pub fn property_prefix(&self) -> &'static str {
        match self {
            DeviceCategory::EyeTracking => "#deviceinfo.",
            DeviceCategory::BrainTracking => "#braindeviceinfo.",
        }
    }
}

/// Metadata reported by a tracking device.
///
/// Absent keys resolve to unknown ([`None`]) rather than erroring; a
/// descriptor created before the metadata fetch completed answers unknown
/// for every key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    entries: BTreeMap<String, String>,
}

impl DeviceDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Value for a descriptor key, or `None` when unknown.
    pub fn info(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// The fixed key set, regardless of which values are known.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> {
        DESCRIPTOR_KEYS.iter().copied()
    }
}

// ============================================================================
// Raw and adapted events
// ============================================================================

/// The record shape delivered by the remote transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrackingEvent {
    /// Remote clock at measurement time, epoch millis.
    pub time: i64,

    /// Channel name to reading.
    pub channels: BTreeMap<String, f64>,
}

/// A raw transport record adapted to the local event abstraction.
///
/// Channel reads go straight to the shared raw record; nothing is copied
/// per listener.
#[derive(Debug, Clone)]
pub struct RemoteTrackingEvent {
    raw: Arc<RawTrackingEvent>,
}

impl RemoteTrackingEvent {
    pub fn new(raw: RawTrackingEvent) -> Self {
        Self { raw: Arc::new(raw) }
    }

    /// Remote clock at measurement time, epoch millis.
    pub fn event_time(&self) -> i64 {
        self.raw.time
    }

    /// Names of all channels in the underlying record.
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.raw.channels.keys().map(String::as_str)
    }

    /// Reading for one channel, if present.
    pub fn value(&self, channel: &str) -> Option<f64> {
        self.raw.channels.get(channel).copied()
    }

    /// Materialize the record as a loggable brain sample.
    pub fn to_sample(&self) -> BrainSample {
        BrainSample::new(self.raw.time, self.raw.channels.clone())
    }
}

// ============================================================================
// Transport collaborator traits
// ============================================================================

/// Callback installed on the transport by a connected device. Receives
/// every raw record the transport delivers, including its spurious `None`s.
pub type TransportCallback = Box<dyn Fn(Option<RawTrackingEvent>) + Send + Sync>;

/// Handle to a resolved remote registry for one device.
pub trait DeviceRegistry: Send {
    /// Fetch the device metadata. `None` when the remote has none to offer.
    fn device_info(&self) -> Option<DeviceDescriptor>;

    /// Install the sole transport-side callback target. The transport
    /// invokes it from its own thread.
    fn set_callback(&mut self, callback: TransportCallback);
}

/// The remote transport collaborator.
///
/// `connect` resolves an address to a registry handle; `None` means the
/// remote was reachable in principle but yielded no registry ("not
/// properly connected"). Transport security is the transport's concern.
pub trait DeviceTransport: Send + Sync {
    fn connect(&self, address: &DeviceAddress) -> Option<Box<dyn DeviceRegistry>>;
}

// ============================================================================
// Connected device
// ============================================================================

/// One open connection to a remote tracking device.
///
/// Owns the listener hub for this connection and keeps the registry handle
/// (and with it the transport subscription) alive.
pub struct TrackingDevice {
    category: DeviceCategory,
    hub: Arc<DistributionHub>,
    descriptor: Option<DeviceDescriptor>,
    _registry: Box<dyn DeviceRegistry>,
}

impl TrackingDevice {
    pub(crate) fn new(
        category: DeviceCategory,
        hub: Arc<DistributionHub>,
        descriptor: Option<DeviceDescriptor>,
        registry: Box<dyn DeviceRegistry>,
    ) -> Self {
        Self {
            category,
            hub,
            descriptor,
            _registry: registry,
        }
    }

    pub fn category(&self) -> DeviceCategory {
        self.category
    }

    /// Device metadata. Unknown for every key until the one-time fetch at
    /// connect has produced a descriptor.
    pub fn descriptor(&self) -> DeviceDescriptor {
        self.descriptor.clone().unwrap_or_default()
    }

    pub fn add_listener(&self, listener: Arc<dyn TrackingListener>) {
        self.hub.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn TrackingListener>) {
        self.hub.remove_listener(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_resolves_absent_keys_to_unknown() {
        let mut descriptor = DeviceDescriptor::new();
        descriptor.insert("DEVICE_NAME", "TrackIR 5");

        assert_eq!(descriptor.info("DEVICE_NAME"), Some("TrackIR 5"));
        assert_eq!(descriptor.info("HARDWARE_ID"), None);
        assert_eq!(descriptor.keys().count(), 3);
    }

    #[test]
    fn category_prefixes_differ() {
        assert_eq!(DeviceCategory::EyeTracking.property_prefix(), "#deviceinfo.");
        assert_eq!(
            DeviceCategory::BrainTracking.property_prefix(),
            "#braindeviceinfo."
        );
    }

    #[test]
    fn adapted_event_reads_raw_channels() {
        let mut channels = BTreeMap::new();
        channels.insert("af3".to_string(), 0.7);
        let event = RemoteTrackingEvent::new(RawTrackingEvent { time: 99, channels });

        assert_eq!(event.event_time(), 99);
        assert_eq!(event.value("af3"), Some(0.7));
        assert_eq!(event.value("af4"), None);

        let sample = event.to_sample();
        assert_eq!(sample.time, 99);
        assert_eq!(sample.value("af3"), Some(0.7));
    }
}
