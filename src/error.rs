//! Recorder error taxonomy.
//!
//! Most failures in this subsystem degrade gracefully where they happen:
//! connection problems yield no device, capture problems are logged and the
//! session continues, recording calls without an open session are no-ops,
//! and spurious null transport records are dropped. The variants below are
//! the failures that do surface to callers of the recorder facade.

use crate::timeline::TimelineError;

/// Errors surfaced by the recorder facade.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// Codec alias/converter registration failed at construction. The one
    /// fatal condition: the recorder is permanently inert and refuses to
    /// open any session rather than silently lose data.
    #[error("serialization setup failed, session recording is unavailable")]
    SerializationSetup,

    /// `start()` was called while a session is already active.
    #[error("a session is already active")]
    SessionActive,

    /// The session directory could not be created.
    #[error("failed to create session directory {dir}: {source}")]
    SessionDirectory {
        dir: String,
        #[source]
        source: std::io::Error,
    },

    /// Opening, writing or closing the session log failed.
    #[error(transparent)]
    Timeline(#[from] TimelineError),

    /// Archiving the session directory after a fake replay failed.
    #[error(transparent)]
    Archive(#[from] anyhow::Error),
}
