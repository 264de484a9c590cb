//! Binary record codec.
//!
//! The interchange format shared by trace-file sinks and the reader side:
//! an eight-byte file header followed by length-prefixed frames, each frame
//! carrying a record kind tag and a JSON-encoded [`TraceEvent`]. The codec
//! stands in for the host platform's kernel trace encoding; everything that
//! writes or replays `.etl` files goes through it.

use crate::error::{EventError, Result};
use crate::event::TraceEvent;
use std::io::{self, Read, Write};

/// File magic, also versioning the frame layout.
pub const RECORD_MAGIC: [u8; 8] = *b"TRCLOG01";

/// Upper bound on a single frame payload. Anything larger is corruption.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Origin classification of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Application provider event.
    User,
    /// Host kernel event.
    Kernel,
    /// Provider manifest/metadata record.
    Manifest,
}

impl RecordKind {
    fn tag(self) -> u8 {
        match self {
            RecordKind::User => 0,
            RecordKind::Kernel => 1,
            RecordKind::Manifest => 2,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(RecordKind::User),
            1 => Ok(RecordKind::Kernel),
            2 => Ok(RecordKind::Manifest),
            other => Err(EventError::Decode(format!("unknown record kind {}", other))),
        }
    }
}

/// Encodes one event as a standalone frame (kind tag, length, payload).
pub fn encode_frame(kind: RecordKind, event: &TraceEvent) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(event)
        .map_err(|e| EventError::Decode(format!("failed to encode event: {}", e)))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| EventError::Decode("event payload too large".to_string()))?;
    let mut frame = Vec::with_capacity(payload.len() + 5);
    frame.push(kind.tag());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Writes framed records to an underlying byte stream.
pub struct RecordWriter<W: Write> {
    inner: W,
}

impl<W: Write> RecordWriter<W> {
    /// Wraps a stream and writes the file header.
    pub fn new(mut inner: W) -> Result<Self> {
        inner.write_all(&RECORD_MAGIC)?;
        Ok(Self { inner })
    }

    /// Wraps a stream positioned past an existing header.
    pub fn resume(inner: W) -> Self {
        Self { inner }
    }

    /// Appends one event frame.
    pub fn write_event(&mut self, kind: RecordKind, event: &TraceEvent) -> Result<()> {
        let frame = encode_frame(kind, event)?;
        self.inner.write_all(&frame)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// One decoded frame, or the raw bytes of a frame that failed to decode.
#[derive(Debug)]
pub enum Frame {
    Event(RecordKind, TraceEvent),
    /// Frame-level framing survived but the payload did not decode.
    Unreadable,
}

/// Reads framed records from an underlying byte stream.
pub struct RecordReader<R: Read> {
    inner: R,
}

impl<R: Read> RecordReader<R> {
    /// Wraps a stream and validates the file header.
    pub fn new(mut inner: R) -> Result<Self> {
        let mut magic = [0u8; 8];
        inner.read_exact(&mut magic).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                EventError::Decode("file too short for record header".to_string())
            } else {
                EventError::Io(e)
            }
        })?;
        if magic != RECORD_MAGIC {
            return Err(EventError::Decode("bad record file magic".to_string()));
        }
        Ok(Self { inner })
    }

    /// Reads the next frame; `None` at a clean end of stream.
    ///
    /// A payload that fails to decode is reported as [`Frame::Unreadable`]
    /// and the stream stays aligned on the next frame. Corrupt framing
    /// (truncated length, oversized frame) is a hard error.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut tag = [0u8; 1];
        match self.inner.read_exact(&mut tag) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(EventError::Io(e)),
        }
        let kind = RecordKind::from_tag(tag[0]);

        let mut len_bytes = [0u8; 4];
        self.inner.read_exact(&mut len_bytes).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                EventError::Decode("truncated frame length".to_string())
            } else {
                EventError::Io(e)
            }
        })?;
        let len = u32::from_le_bytes(len_bytes);
        if len > MAX_FRAME_LEN {
            return Err(EventError::Decode(format!(
                "frame length {} exceeds limit",
                len
            )));
        }

        let mut payload = vec![0u8; len as usize];
        self.inner.read_exact(&mut payload).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                EventError::Decode("truncated frame payload".to_string())
            } else {
                EventError::Io(e)
            }
        })?;

        let kind = match kind {
            Ok(kind) => kind,
            Err(_) => return Ok(Some(Frame::Unreadable)),
        };
        match serde_json::from_slice::<TraceEvent>(&payload) {
            Ok(event) => Ok(Some(Frame::Event(kind, event))),
            Err(_) => Ok(Some(Frame::Unreadable)),
        }
    }
}
