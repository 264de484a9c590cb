//! Prerecorded trace file replay.

use crate::error::{ReaderError, Result};
use crate::processor::{
    CallbackSet, EventCallback, EventKinds, EventProcessor, ProcessSummary, SessionCallback,
    SessionNotice,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_events::record::{Frame, RecordReader};
use std::io::Cursor;
use std::path::PathBuf;

/// Replays one or more prerecorded binary trace files sequentially.
///
/// Frames whose payload fails to decode are counted in
/// [`FileProcessor::unreadable_events`] without stopping the run; corrupt
/// framing skips the rest of that file. The observed event-time window is
/// exposed through [`FileProcessor::start_time`] and
/// [`FileProcessor::end_time`].
pub struct FileProcessor {
    files: Vec<PathBuf>,
    kinds: EventKinds,
    callbacks: CallbackSet,
    count: u64,
    unreadable: u64,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

impl FileProcessor {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            kinds: EventKinds::ALL,
            callbacks: CallbackSet::default(),
            count: 0,
            unreadable: 0,
            start_time: None,
            end_time: None,
        }
    }

    /// Restricts delivery to the given record origins.
    pub fn set_event_kinds(&mut self, kinds: EventKinds) {
        self.kinds = kinds;
    }

    pub fn event_kinds(&self) -> EventKinds {
        self.kinds
    }

    /// Swaps to a single new file and resets every counter.
    pub fn set_file(&mut self, path: impl Into<PathBuf>) {
        self.files = vec![path.into()];
        self.count = 0;
        self.unreadable = 0;
        self.start_time = None;
        self.end_time = None;
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path.into());
    }

    /// Events delivered so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Frames that failed to decode.
    pub fn unreadable_events(&self) -> u64 {
        self.unreadable
    }

    /// Earliest delivered event timestamp.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// Latest delivered event timestamp.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    fn session_name(&self) -> String {
        self.files
            .first()
            .and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
            .unwrap_or("trace")
            .to_string()
    }

    fn replay_buffer(&mut self, buffer: Vec<u8>) -> Result<()> {
        let mut reader = RecordReader::new(Cursor::new(buffer))
            .map_err(|e| ReaderError::Decode(e.to_string()))?;
        loop {
            match reader.next_frame() {
                Ok(Some(Frame::Event(kind, event))) => {
                    if !self.kinds.admits(kind) {
                        continue;
                    }
                    self.count += 1;
                    let ts = event.timestamp();
                    self.start_time = Some(self.start_time.map_or(ts, |t| t.min(ts)));
                    self.end_time = Some(self.end_time.map_or(ts, |t| t.max(ts)));
                    self.callbacks.dispatch_event(&event);
                }
                Ok(Some(Frame::Unreadable)) => {
                    self.unreadable += 1;
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    // Framing is gone; the rest of this file is opaque.
                    tracing::warn!(error = %e, "trace file framing corrupt, skipping remainder");
                    self.unreadable += 1;
                    return Ok(());
                }
            }
        }
    }
}

#[async_trait]
impl EventProcessor for FileProcessor {
    fn on_event(&mut self, callback: EventCallback) {
        self.callbacks.event.push(callback);
    }

    fn on_session_start(&mut self, callback: SessionCallback) {
        self.callbacks.session_start.push(callback);
    }

    fn on_session_end(&mut self, callback: SessionCallback) {
        self.callbacks.session_end.push(callback);
    }

    /// Replays every file in order.
    ///
    /// # Errors
    ///
    /// `Cancelled` when no files are set, `NotFound` when a file is
    /// missing, `Decode` when a file lacks the record header.
    async fn process(&mut self) -> Result<ProcessSummary> {
        if self.files.is_empty() {
            return Err(ReaderError::Cancelled(
                "file processor invoked with no files".to_string(),
            ));
        }

        let session = self.session_name();
        self.callbacks.dispatch_start(&SessionNotice {
            session: session.clone(),
            event_count: 0,
        });

        let files = self.files.clone();
        for path in files {
            let buffer = tokio::fs::read(&path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ReaderError::NotFound(format!("trace file {}", path.display()))
                } else {
                    ReaderError::Io(e)
                }
            })?;
            self.replay_buffer(buffer)?;
        }

        self.callbacks.dispatch_end(&SessionNotice {
            session,
            event_count: self.count,
        });
        Ok(ProcessSummary {
            events: self.count,
            unreadable: self.unreadable,
        })
    }
}

impl std::fmt::Debug for FileProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileProcessor")
            .field("files", &self.files)
            .field("kinds", &self.kinds)
            .field("count", &self.count)
            .field("unreadable", &self.unreadable)
            .finish()
    }
}
