//! Kind-specific write backends.
//!
//! A backend lives on its sink's writer thread and owns the actual
//! destination: a rotating file, stdout, the memory ring, or a TCP
//! connection. The writer loop hands it either a formatted line or the raw
//! event, depending on the sink kind.

use crate::buffer::LineRing;
use crate::file::FileBackedWriter;
use crate::session;
use chrono::{DateTime, Utc};
use core_events::record::{encode_frame, RecordKind, RECORD_MAGIC};
use core_events::TraceEvent;
use std::io::{self, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub(crate) trait Backend: Send {
    fn write_line(&mut self, _line: &str, _now: DateTime<Utc>) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "sink kind has no text format",
        ))
    }

    fn write_event(&mut self, _event: &Arc<TraceEvent>, _now: DateTime<Utc>) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "sink kind has no serialized format",
        ))
    }

    fn flush(&mut self) -> io::Result<()>;

    fn checked_rotate(&mut self, _now: DateTime<Utc>) -> io::Result<bool> {
        Ok(false)
    }

    fn force_rotate(&mut self, _now: DateTime<Utc>) -> io::Result<bool> {
        Ok(false)
    }

    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

/// Rotating `.log` file of formatted lines.
pub(crate) struct TextFileBackend {
    writer: FileBackedWriter,
}

impl TextFileBackend {
    pub(crate) fn new(writer: FileBackedWriter) -> Self {
        Self { writer }
    }
}

impl Backend for TextFileBackend {
    fn write_line(&mut self, line: &str, now: DateTime<Utc>) -> io::Result<()> {
        self.writer.write_line(line, now)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn checked_rotate(&mut self, now: DateTime<Utc>) -> io::Result<bool> {
        self.writer.checked_rotate(now)
    }

    fn force_rotate(&mut self, now: DateTime<Utc>) -> io::Result<bool> {
        self.writer.force_rotate(now)
    }

    fn close(&mut self) -> io::Result<()> {
        self.writer.close()
    }
}

/// Rotating `.etl` file of binary record frames, mirrored to the live
/// session registry.
pub(crate) struct TraceFileBackend {
    writer: FileBackedWriter,
    session_name: String,
}

impl TraceFileBackend {
    pub(crate) fn new(writer: FileBackedWriter, session_name: String) -> Self {
        Self {
            writer,
            session_name,
        }
    }

    fn ensure_header(&mut self, now: DateTime<Utc>) -> io::Result<()> {
        if self.writer.current_len() == 0 {
            self.writer.write_all(&RECORD_MAGIC, now)?;
        }
        Ok(())
    }
}

impl Backend for TraceFileBackend {
    fn write_event(&mut self, event: &Arc<TraceEvent>, now: DateTime<Utc>) -> io::Result<()> {
        // Rotate first so the frame and header land in the same file.
        self.writer.checked_rotate(now)?;
        self.ensure_header(now)?;
        let frame = encode_frame(RecordKind::User, event)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        self.writer.write_all(&frame, now)?;
        session::publish(&self.session_name, event);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn checked_rotate(&mut self, now: DateTime<Utc>) -> io::Result<bool> {
        let rotated = self.writer.checked_rotate(now)?;
        if rotated {
            self.ensure_header(now)?;
        }
        Ok(rotated)
    }

    fn force_rotate(&mut self, now: DateTime<Utc>) -> io::Result<bool> {
        let rotated = self.writer.force_rotate(now)?;
        if rotated {
            self.ensure_header(now)?;
        }
        Ok(rotated)
    }

    fn close(&mut self) -> io::Result<()> {
        self.writer.close()
    }
}

/// Formatted lines to standard output.
pub(crate) struct ConsoleBackend {
    out: io::Stdout,
}

impl ConsoleBackend {
    pub(crate) fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl Backend for ConsoleBackend {
    fn write_line(&mut self, line: &str, _now: DateTime<Utc>) -> io::Result<()> {
        let mut lock = self.out.lock();
        lock.write_all(line.as_bytes())?;
        lock.write_all(b"\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.lock().flush()
    }
}

/// Formatted lines into the shared ring buffer.
pub(crate) struct MemoryBackend {
    ring: LineRing,
}

impl MemoryBackend {
    pub(crate) fn new(ring: LineRing) -> Self {
        Self { ring }
    }
}

impl Backend for MemoryBackend {
    fn write_line(&mut self, line: &str, _now: DateTime<Utc>) -> io::Result<()> {
        self.ring.push(line.to_string());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

const RECONNECT_BACKOFF_START: Duration = Duration::from_millis(250);
const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// One JSON record per line over TCP.
pub(crate) struct NetworkBackend {
    address: String,
    stream: Option<TcpStream>,
    backoff: Duration,
    next_attempt: Option<Instant>,
}

impl NetworkBackend {
    pub(crate) fn new(hostname: &str, port: u16) -> Self {
        Self {
            address: format!("{}:{}", hostname, port),
            stream: None,
            backoff: RECONNECT_BACKOFF_START,
            next_attempt: None,
        }
    }

    fn ensure_connected(&mut self) -> io::Result<&mut TcpStream> {
        if self.stream.is_none() {
            if let Some(at) = self.next_attempt {
                if Instant::now() < at {
                    return Err(io::Error::new(
                        io::ErrorKind::NotConnected,
                        "collector connection backing off",
                    ));
                }
            }
            match TcpStream::connect(&self.address) {
                Ok(stream) => {
                    stream.set_nodelay(true).ok();
                    self.stream = Some(stream);
                    self.backoff = RECONNECT_BACKOFF_START;
                    self.next_attempt = None;
                }
                Err(e) => {
                    self.next_attempt = Some(Instant::now() + self.backoff);
                    self.backoff = (self.backoff * 2).min(RECONNECT_BACKOFF_MAX);
                    return Err(e);
                }
            }
        }
        Ok(self.stream.as_mut().expect("stream just ensured"))
    }

    fn drop_connection(&mut self) {
        self.stream = None;
        self.next_attempt = Some(Instant::now() + self.backoff);
        self.backoff = (self.backoff * 2).min(RECONNECT_BACKOFF_MAX);
    }
}

impl Backend for NetworkBackend {
    fn write_event(&mut self, event: &Arc<TraceEvent>, _now: DateTime<Utc>) -> io::Result<()> {
        let mut payload = serde_json::to_vec(event.as_ref())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        payload.push(b'\n');

        let stream = self.ensure_connected()?;
        if let Err(e) = stream.write_all(&payload) {
            self.drop_connection();
            return Err(e);
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = match self.stream.as_mut() {
            Some(stream) => stream.flush(),
            None => return Ok(()),
        };
        if let Err(e) = result {
            self.drop_connection();
            return Err(e);
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        let result = self.flush();
        self.stream = None;
        result
    }
}
