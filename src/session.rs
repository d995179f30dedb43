//! Session values and file naming.

use std::path::{Path, PathBuf};

use chrono::Utc;

/// Prefix of every session log filename.
pub const FILENAME_PREFIX: &str = "session.";

/// Extension of every session log filename.
pub const FILENAME_EXTENSION: &str = "ndjson";

/// One bounded recording or replay interval.
///
/// Created by the recorder's `start()` and destroyed by `stop()`; never
/// reachable through any ambient or global lookup.
#[derive(Debug, Clone)]
pub struct Session {
    /// Directory all session artifacts are written into.
    pub dir: PathBuf,

    /// Start reference, epoch millis. Elapsed times and the log filename
    /// derive from it.
    pub start_reference: i64,

    /// Whether this session replays a previous recording deterministically.
    pub fake_replay: bool,
}

impl Session {
    pub fn new(dir: PathBuf, start_reference: i64, fake_replay: bool) -> Self {
        Self {
            dir,
            start_reference,
            fake_replay,
        }
    }

    /// Path of this session's log file:
    /// `<dir>/session.<startReferenceMillis>.ndjson`.
    pub fn log_path(&self) -> PathBuf {
        self.dir.join(format!(
            "{}{}.{}",
            FILENAME_PREFIX, self.start_reference, FILENAME_EXTENSION
        ))
    }
}

/// Generate a fresh session directory path under the system temp dir.
///
/// Used when no session directory has been configured.
pub fn generate_session_dir() -> PathBuf {
    let millis = Utc::now().timestamp_millis();
    std::env::temp_dir().join(format!("bsr-session-{}.dir", millis))
}

/// Filename for a cached remote image inside a session directory:
/// `image.<hash>.<ext>`.
pub fn cached_image_name(hash: &str, extension: &str) -> String {
    format!("image.{}.{}", hash, extension)
}

/// Full path of a cached remote image.
pub fn cached_image_path(dir: &Path, hash: &str, extension: &str) -> PathBuf {
    dir.join(cached_image_name(hash, extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_path_embeds_start_reference() {
        let session = Session::new(PathBuf::from("/tmp/study"), 1234567, false);
        assert_eq!(
            session.log_path(),
            PathBuf::from("/tmp/study/session.1234567.ndjson")
        );
    }

    #[test]
    fn generated_dirs_live_under_temp() {
        let dir = generate_session_dir();
        assert!(dir.starts_with(std::env::temp_dir()));
        assert!(dir.to_string_lossy().ends_with(".dir"));
    }

    #[test]
    fn cached_image_name_is_content_addressed() {
        assert_eq!(cached_image_name("abc123", "png"), "image.abc123.png");
    }
}
