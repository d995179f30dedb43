//! Screen capture: the screen seam and the debounced scheduler.
//!
//! The screen itself is external hardware reached through the narrow
//! [`ScreenSource`] trait, the same way a debug probe or tracking device
//! sits behind a trait: the host environment (which may hold privileges
//! the instrumented page sandbox does not) wires in the real
//! implementation, and tests substitute their own.
//!
//! The part this crate owns is the [`ScreenshotScheduler`]: debouncing
//! bursts of geometry/viewport changes into a single delayed capture and
//! handing the resulting file reference to the session timeline.

mod scheduler;

pub use scheduler::{ScreenshotScheduler, DEFAULT_DEBOUNCE, QUICK_DELAY};

use crate::events::{Dimensions, Region};

/// Errors raised by a screen source.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no screen is available")]
    NoScreen,

    #[error("screen capture failed: {0}")]
    Backend(String),
}

/// Narrow interface to the display hardware.
///
/// `grab` returns an encoded PNG image of the requested region. It is only
/// ever called from the scheduler's own thread, never the caller's, so a
/// host implementation may acquire whatever elevated capability it needs
/// without involving the (possibly sandboxed) calling context.
pub trait ScreenSource: Send + Sync {
    /// Size of the live display, if one is present.
    fn screen_size(&self) -> Option<Dimensions>;

    /// Capture the given screen region as PNG bytes.
    fn grab(&self, region: Region) -> Result<Vec<u8>, CaptureError>;
}

/// A screen source for headless environments: no display, every capture
/// fails. Useful for fake replay, where capture is disabled anyway.
#[derive(Debug, Default)]
pub struct NullScreen;

impl ScreenSource for NullScreen {
    fn screen_size(&self) -> Option<Dimensions> {
        None
    }

    fn grab(&self, _region: Region) -> Result<Vec<u8>, CaptureError> {
        Err(CaptureError::NoScreen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_screen_has_no_size() {
        assert_eq!(NullScreen.screen_size(), None);
    }

    #[test]
    fn null_screen_grab_fails() {
        let result = NullScreen.grab(Region::new(0, 0, 10, 10));
        assert!(matches!(result, Err(CaptureError::NoScreen)));
    }
}
