//! Device connection lifecycle.
//!
//! Opening a device resolves a remote registry handle for an address. All
//! failure modes degrade to "no device" with a log line: a malformed
//! address, an unreachable or empty registry, and a resolution that takes
//! longer than the connect timeout. None of them raise an error to the
//! caller.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::bounded;
use tracing::{debug, info, warn};

use super::{DeviceCategory, DeviceTransport, DistributionHub, TrackingDevice};

/// A validated `scheme://host[:port]` device address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    scheme: String,
    host: String,
    port: Option<u16>,
}

/// Errors raised while parsing a device address.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("address '{0}' has no scheme separator")]
    MissingScheme(String),

    #[error("address '{0}' has an empty host")]
    EmptyHost(String),

    #[error("address '{0}' has an invalid port")]
    InvalidPort(String),
}

impl DeviceAddress {
    /// Parse an address of the form `scheme://host[:port]`.
    pub fn parse(address: &str) -> Result<Self, AddressError> {
        let (scheme, rest) = address
            .split_once("://")
            .ok_or_else(|| AddressError::MissingScheme(address.to_string()))?;

        if scheme.is_empty() || rest.is_empty() {
            return Err(AddressError::EmptyHost(address.to_string()));
        }

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(AddressError::EmptyHost(address.to_string()));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| AddressError::InvalidPort(address.to_string()))?;
                (host.to_string(), Some(port))
            }
            None => (rest.to_string(), None),
        };

        Ok(Self {
            scheme: scheme.to_string(),
            host,
            port,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}://{}:{}", self.scheme, self.host, port),
            None => write!(f, "{}://{}", self.scheme, self.host),
        }
    }
}

/// Open a tracking device at `address` over the given transport.
///
/// Returns `None` (never an error) when the address is malformed, the
/// registry cannot be resolved, the remote reports "not properly
/// connected", or resolution exceeds `timeout`. On success the device has
/// installed itself as the sole transport callback target and fetched its
/// metadata once.
pub fn open_device(
    transport: Arc<dyn DeviceTransport>,
    address: &str,
    category: DeviceCategory,
    timeout: Duration,
) -> Option<TrackingDevice> {
    let address = match DeviceAddress::parse(address) {
        Ok(address) => address,
        Err(e) => {
            warn!("malformed device address: {}", e);
            return None;
        }
    };

    // Resolution happens on a helper thread so a stalled remote cannot
    // hang the caller past the timeout.
    let (tx, rx) = bounded(1);
    {
        let transport = transport.clone();
        let address = address.clone();
        std::thread::spawn(move || {
            let _ = tx.send(transport.connect(&address));
        });
    }

    let mut registry = match rx.recv_timeout(timeout) {
        Ok(Some(registry)) => registry,
        Ok(None) => {
            info!("device at {} is not properly connected", address);
            return None;
        }
        Err(_) => {
            warn!(
                "device connect to {} timed out after {:?}",
                address, timeout
            );
            return None;
        }
    };

    debug!("obtaining device information from {}", address);
    let descriptor = registry.device_info();

    let hub = Arc::new(DistributionHub::new());
    let callback_hub = hub.clone();
    registry.set_callback(Box::new(move |raw| callback_hub.dispatch(raw)));

    Some(TrackingDevice::new(category, hub, descriptor, registry))
}
