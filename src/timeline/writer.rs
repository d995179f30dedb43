//! Session timeline writer.
//!
//! [`SessionTimeline`] is the one serialized sink every producer in a
//! session writes through. Appends from any thread are funneled over a
//! channel into a dedicated writer thread, which assigns the elapsed time,
//! encodes the record and appends it as a single line. The written order is
//! the channel arrival order (a valid interleaving of the concurrent
//! calls), and elapsed times are non-decreasing by construction.
//!
//! `close()` sends a close command and blocks until the writer thread
//! acknowledges that everything accepted before it has been flushed to
//! disk. Appends racing with `close()` are not guaranteed to be included.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::thread::JoinHandle;

use chrono::Utc;
use crossbeam_channel::{unbounded, Sender};
use tracing::warn;

use super::{LogHeader, TimelineError};
use crate::events::{Envelope, EventCodec, SessionEvent};

enum WriterCommand {
    Append { observed: i64, event: SessionEvent },
    OverrideClock(i64),
    Close(Sender<Result<(), String>>),
}

/// The single active writer for one session log file.
pub struct SessionTimeline {
    commands: Sender<WriterCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
    path: PathBuf,
}

impl SessionTimeline {
    /// Open a new session log at `path` and write its header.
    ///
    /// The header's `timestamp` becomes the start reference all elapsed
    /// times are computed against.
    pub fn open(
        codec: Arc<EventCodec>,
        path: &Path,
        header: LogHeader,
    ) -> Result<Self, TimelineError> {
        let file = fs::File::create(path).map_err(TimelineError::Open)?;
        let mut writer = BufWriter::new(file);

        let header_line =
            serde_json::to_string(&header).map_err(|e| TimelineError::Open(e.into()))?;
        writeln!(writer, "{}", header_line)?;

        let (tx, rx) = unbounded();
        let start_reference = header.timestamp;

        let worker = std::thread::spawn(move || {
            let mut fake_now: Option<i64> = None;
            let mut last_elapsed: i64 = 0;

            while let Ok(command) = rx.recv() {
                match command {
                    WriterCommand::Append { observed, event } => {
                        let now = fake_now.unwrap_or_else(|| Utc::now().timestamp_millis());
                        // Clamped so a clock override jumping backwards can
                        // never produce a decreasing timeline.
                        let elapsed = (now - start_reference).max(last_elapsed).max(0);
                        last_elapsed = elapsed;

                        let envelope = Envelope {
                            observed,
                            elapsed,
                            version: event.schema_version(),
                            event,
                        };

                        match codec.encode_line(&envelope) {
                            Ok(line) => {
                                if let Err(e) = writeln!(writer, "{}", line) {
                                    warn!("failed to append session record: {}", e);
                                }
                            }
                            Err(e) => warn!("failed to encode session record: {}", e),
                        }
                    }
                    WriterCommand::OverrideClock(now) => {
                        fake_now = Some(now);
                    }
                    WriterCommand::Close(ack) => {
                        let result = writer.flush().map_err(|e| e.to_string());
                        let _ = ack.send(result);
                        return;
                    }
                }
            }

            // Channel dropped without an explicit close; flush best-effort.
            if let Err(e) = writer.flush() {
                warn!("failed to flush session log on drop: {}", e);
            }
        });

        Ok(Self {
            commands: tx,
            worker: Mutex::new(Some(worker)),
            path: path.to_path_buf(),
        })
    }

    /// Path of the log file this writer owns.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event from any producer thread.
    ///
    /// Never blocks on disk I/O. `observed` is the producer/hardware clock
    /// time in epoch millis (0 = unknown); the elapsed time is assigned on
    /// the writer thread. Appends after `close()` are silently dropped.
    pub fn append(&self, observed: i64, event: SessionEvent) {
        let _ = self.commands.send(WriterCommand::Append { observed, event });
    }

    /// Route a synthetic "now" to the writer; subsequent elapsed times are
    /// computed against it instead of the wall clock. Used by fake replay.
    pub fn override_clock(&self, now_millis: i64) {
        let _ = self.commands.send(WriterCommand::OverrideClock(now_millis));
    }

    /// Close the log, blocking until every append accepted before this call
    /// has been flushed to disk.
    ///
    /// Idempotent: closing an already-closed timeline returns `Ok`.
    pub fn close(&self) -> Result<(), TimelineError> {
        let worker = {
            let mut guard = self.worker.lock().expect("timeline worker lock poisoned");
            match guard.take() {
                Some(handle) => handle,
                None => return Ok(()),
            }
        };

        let (ack_tx, ack_rx) = unbounded();
        if self.commands.send(WriterCommand::Close(ack_tx)).is_err() {
            let _ = worker.join();
            return Err(TimelineError::Closed);
        }

        let result = ack_rx.recv().map_err(|_| TimelineError::Closed)?;
        let _ = worker.join();

        result.map_err(|e| TimelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
    }
}
