//! The sink type and its writer thread.
//!
//! Construction opens the destination on the caller's thread, so
//! configuration errors surface immediately; after that a dedicated writer
//! thread owns all I/O. Emission is a bounded `try_send`: a full queue drops
//! the event and bumps the lost counter instead of blocking the producer.

use crate::backend::{
    Backend, ConsoleBackend, MemoryBackend, NetworkBackend, TextFileBackend, TraceFileBackend,
};
use crate::buffer::LineRing;
use crate::error::{Result, SinkError};
use crate::file::{FileBackedWriter, FileSinkSettings};
use crate::filter::FilterChain;
use crate::format::{format_line, FormatFlags};
use chrono::{DateTime, Utc};
use core_events::TraceEvent;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use uuid::Uuid;

/// Rough per-event queue cost used to turn a megabyte budget into a queue
/// depth.
pub const QUEUE_EVENTS_PER_MB: usize = 1024;

/// How long flush, rotate and close wait on the writer thread.
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// How long sink destruction waits for queued events to drain.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The destination kind of a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    /// Formatted lines to rotating `.log` files.
    Text,
    /// Binary record frames to rotating `.etl` files and the live session
    /// registry.
    EventTracing,
    /// Formatted lines into an in-memory ring.
    Memory,
    /// Formatted lines to standard output.
    Console,
    /// Serialized records to a remote collector.
    Network,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::Text => "text",
            SinkKind::EventTracing => "etl",
            SinkKind::Memory => "memory",
            SinkKind::Console => "console",
            SinkKind::Network => "network",
        }
    }

    /// Whether events are rendered through the text line format.
    pub fn has_text_format(&self) -> bool {
        matches!(self, SinkKind::Text | SinkKind::Memory | SinkKind::Console)
    }

    /// Whether the sink owns rotating files on disk.
    pub fn is_file_backed(&self) -> bool {
        matches!(self, SinkKind::Text | SinkKind::EventTracing)
    }

    /// Whether regex filter chains may be configured.
    pub fn supports_filters(&self) -> bool {
        !matches!(self, SinkKind::EventTracing)
    }

    pub fn file_extension(&self) -> Option<&'static str> {
        match self {
            SinkKind::Text => Some(".log"),
            SinkKind::EventTracing => Some(".etl"),
            _ => None,
        }
    }
}

impl FromStr for SinkKind {
    type Err = SinkError;

    /// Accepts the declarative schema's aliases.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(SinkKind::Text),
            "etl" | "etw" => Ok(SinkKind::EventTracing),
            "memory" | "memorybuffer" => Ok(SinkKind::Memory),
            "console" | "cons" | "con" => Ok(SinkKind::Console),
            "network" | "net" => Ok(SinkKind::Network),
            other => Err(SinkError::InvalidConfiguration(format!(
                "unknown sink kind '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for SinkKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SinkKind {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// What a sink is known as in the registry: kind plus name, where console
/// and memory sinks have empty names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SinkIdentity {
    pub kind: SinkKind,
    pub name: String,
}

impl SinkIdentity {
    pub fn new(kind: SinkKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for SinkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}:{}", self.kind, self.name)
        }
    }
}

/// Kind-independent construction options.
#[derive(Debug, Clone)]
pub struct SinkSettings {
    /// Regex filter chain patterns.
    pub filters: Vec<String>,
    /// Text rendering flags for formatted kinds.
    pub format: FormatFlags,
    /// Bounded queue depth in events.
    pub queue_capacity: usize,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            format: FormatFlags::default(),
            queue_capacity: QUEUE_EVENTS_PER_MB,
        }
    }
}

impl SinkSettings {
    /// Derives the queue depth from a buffer budget in megabytes.
    pub fn with_buffer_mb(mut self, buffer_size_mb: u64) -> Self {
        self.queue_capacity = (buffer_size_mb as usize).max(1) * QUEUE_EVENTS_PER_MB;
        self
    }
}

/// Introspection counters.
#[derive(Debug, Clone, Default)]
pub struct SinkStats {
    pub written: u64,
    pub lost: u64,
    pub rotations: u64,
    pub last_error: Option<String>,
}

struct SinkShared {
    enabled: AtomicBool,
    written: AtomicU64,
    lost: AtomicU64,
    rotations: AtomicU64,
    last_error: Mutex<Option<String>>,
    activity_filter: Mutex<Uuid>,
}

impl SinkShared {
    fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            written: AtomicU64::new(0),
            lost: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
            last_error: Mutex::new(None),
            activity_filter: Mutex::new(Uuid::nil()),
        }
    }

    fn record_error(&self, error: &std::io::Error) {
        self.lost.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error.to_string());
    }
}

enum SinkCommand {
    Event(Arc<TraceEvent>),
    Flush(Sender<std::io::Result<()>>),
    Rotate {
        now: DateTime<Utc>,
        force: bool,
        ack: Sender<std::io::Result<bool>>,
    },
    Close(Sender<()>),
}

/// A single event destination.
///
/// The manager owns sinks behind `Arc`; dropping the last reference drains
/// the queue with a bounded timeout and joins the writer thread.
pub struct Sink {
    identity: SinkIdentity,
    tx: Sender<SinkCommand>,
    shared: Arc<SinkShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Sink {
    /// Text file sink.
    pub fn text(file: FileSinkSettings, settings: SinkSettings) -> Result<Self> {
        let name = file.log_name.clone();
        let now = Utc::now();
        let writer = FileBackedWriter::open(file, ".log", now)?;
        Self::spawn(
            SinkIdentity::new(SinkKind::Text, name),
            Box::new(TextFileBackend::new(writer)),
            settings,
        )
    }

    /// Binary trace file sink; the log name doubles as the live session
    /// name.
    pub fn trace(file: FileSinkSettings, settings: SinkSettings) -> Result<Self> {
        if !settings.filters.is_empty() {
            return Err(SinkError::InvalidConfiguration(
                "trace sinks do not support filters".to_string(),
            ));
        }
        let name = file.log_name.clone();
        let now = Utc::now();
        let writer = FileBackedWriter::open(file, ".etl", now)?;
        Self::spawn(
            SinkIdentity::new(SinkKind::EventTracing, name.clone()),
            Box::new(TraceFileBackend::new(writer, name)),
            settings,
        )
    }

    /// Console sink. Unnamed; the manager enforces the one-per-process
    /// rule.
    pub fn console(settings: SinkSettings) -> Result<Self> {
        Self::spawn(
            SinkIdentity::new(SinkKind::Console, ""),
            Box::new(ConsoleBackend::new()),
            settings,
        )
    }

    /// Memory sink; returns the shared ring for inspection.
    pub fn memory(capacity_bytes: usize, settings: SinkSettings) -> Result<(Self, LineRing)> {
        if capacity_bytes == 0 {
            return Err(SinkError::InvalidArgument(
                "memory sinks need a non-zero capacity".to_string(),
            ));
        }
        let ring = LineRing::new(capacity_bytes);
        let sink = Self::spawn(
            SinkIdentity::new(SinkKind::Memory, ""),
            Box::new(MemoryBackend::new(ring.clone())),
            settings,
        )?;
        Ok((sink, ring))
    }

    /// Network sink streaming serialized records to `hostname:port`.
    pub fn network(
        name: impl Into<String>,
        hostname: &str,
        port: u16,
        settings: SinkSettings,
    ) -> Result<Self> {
        if hostname.is_empty() {
            return Err(SinkError::InvalidArgument(
                "network sinks need a hostname".to_string(),
            ));
        }
        if port == 0 {
            return Err(SinkError::InvalidArgument(
                "network sinks need a non-zero port".to_string(),
            ));
        }
        Self::spawn(
            SinkIdentity::new(SinkKind::Network, name),
            Box::new(NetworkBackend::new(hostname, port)),
            settings,
        )
    }

    fn spawn(
        identity: SinkIdentity,
        backend: Box<dyn Backend>,
        settings: SinkSettings,
    ) -> Result<Self> {
        let filters = FilterChain::new(&settings.filters)?;
        let (tx, rx) = bounded(settings.queue_capacity.max(1));
        let shared = Arc::new(SinkShared::new());

        let worker_shared = Arc::clone(&shared);
        let kind = identity.kind;
        let format = settings.format;
        let thread_name = format!("sink-{}", identity);
        let worker = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || run_writer(kind, backend, rx, worker_shared, filters, format))
            .map_err(SinkError::Io)?;

        Ok(Self {
            identity,
            tx,
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn identity(&self) -> &SinkIdentity {
        &self.identity
    }

    pub fn kind(&self) -> SinkKind {
        self.identity.kind
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Hands an event to the writer queue. Never blocks: overflow and
    /// closed queues drop the event and count it lost; a disabled sink
    /// drops silently without counting.
    pub fn write_event(&self, event: &Arc<TraceEvent>) {
        if !self.shared.enabled.load(Ordering::Relaxed) {
            return;
        }
        match self.tx.try_send(SinkCommand::Event(Arc::clone(event))) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.shared.lost.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Synchronously drains buffered output.
    pub fn flush(&self) -> Result<()> {
        let (ack, done) = bounded(1);
        self.send_control(SinkCommand::Flush(ack))?;
        match done.recv_timeout(CONTROL_TIMEOUT) {
            Ok(result) => result.map_err(SinkError::Io),
            Err(_) => Err(SinkError::Timeout(format!("flush of {}", self.identity))),
        }
    }

    /// Rotates iff the rotation clock is due. Non-file kinds report
    /// `false`.
    pub fn checked_rotate(&self, now: DateTime<Utc>) -> Result<bool> {
        self.rotate_command(now, false)
    }

    /// Rotates unconditionally (demand rotation).
    pub fn rotate_now(&self, now: DateTime<Utc>) -> Result<bool> {
        self.rotate_command(now, true)
    }

    fn rotate_command(&self, now: DateTime<Utc>, force: bool) -> Result<bool> {
        if !self.identity.kind.is_file_backed() {
            return Ok(false);
        }
        let (ack, done) = bounded(1);
        self.send_control(SinkCommand::Rotate { now, force, ack })?;
        match done.recv_timeout(CONTROL_TIMEOUT) {
            Ok(result) => {
                let rotated = result.map_err(SinkError::Io)?;
                if rotated {
                    self.shared.rotations.fetch_add(1, Ordering::Relaxed);
                }
                Ok(rotated)
            }
            Err(_) => Err(SinkError::Timeout(format!("rotate of {}", self.identity))),
        }
    }

    fn send_control(&self, command: SinkCommand) -> Result<()> {
        self.tx
            .send_timeout(command, CONTROL_TIMEOUT)
            .map_err(|_| SinkError::Closed(self.identity.to_string()))
    }

    /// Disabled sinks drop events silently and stay registered.
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Relaxed)
    }

    /// Non-nil filters drop every event with a different activity id.
    pub fn set_activity_filter(&self, activity_id: Uuid) {
        *self.shared.activity_filter.lock() = activity_id;
    }

    pub fn activity_filter(&self) -> Uuid {
        *self.shared.activity_filter.lock()
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            written: self.shared.written.load(Ordering::Relaxed),
            lost: self.shared.lost.load(Ordering::Relaxed),
            rotations: self.shared.rotations.load(Ordering::Relaxed),
            last_error: self.shared.last_error.lock().clone(),
        }
    }

    /// Drains the queue and joins the writer thread, waiting at most
    /// [`DRAIN_TIMEOUT`]; events still queued after that are counted lost.
    pub fn close(&self) {
        let handle = match self.worker.lock().take() {
            Some(handle) => handle,
            None => return,
        };
        let (ack, done) = bounded(1);
        let closed = self
            .tx
            .send_timeout(SinkCommand::Close(ack), DRAIN_TIMEOUT)
            .is_ok()
            && done.recv_timeout(DRAIN_TIMEOUT).is_ok();
        if closed {
            let _ = handle.join();
        } else {
            let stranded = self.tx.len() as u64;
            self.shared.lost.fetch_add(stranded, Ordering::Relaxed);
            tracing::warn!(sink = %self.identity, stranded, "sink close timed out");
        }
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("identity", &self.identity)
            .field("enabled", &self.is_enabled())
            .field("queued", &self.tx.len())
            .finish()
    }
}

fn run_writer(
    kind: SinkKind,
    mut backend: Box<dyn Backend>,
    rx: Receiver<SinkCommand>,
    shared: Arc<SinkShared>,
    filters: FilterChain,
    format: FormatFlags,
) {
    let start = Utc::now();

    while let Ok(command) = rx.recv() {
        match command {
            SinkCommand::Event(event) => {
                let activity_filter = *shared.activity_filter.lock();
                if !activity_filter.is_nil() && event.activity_id() != activity_filter {
                    continue;
                }
                let now = Utc::now();
                let result = if kind.has_text_format() {
                    let line = format_line(&event, format, start);
                    if !filters.matches_line(&line) {
                        continue;
                    }
                    backend.write_line(&line, now)
                } else if kind == SinkKind::Network {
                    if !filters.matches_parameters(&event) {
                        continue;
                    }
                    backend.write_event(&event, now)
                } else {
                    backend.write_event(&event, now)
                };
                match result {
                    Ok(()) => {
                        shared.written.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => shared.record_error(&e),
                }
            }
            SinkCommand::Flush(ack) => {
                let _ = ack.send(backend.flush());
            }
            SinkCommand::Rotate { now, force, ack } => {
                let result = if force {
                    backend.force_rotate(now)
                } else {
                    backend.checked_rotate(now)
                };
                let _ = ack.send(result);
            }
            SinkCommand::Close(ack) => {
                if let Err(e) = backend.close() {
                    shared.record_error(&e);
                }
                let _ = ack.send(());
                return;
            }
        }
    }

    // All senders gone without an explicit close.
    let _ = backend.close();
}
