//! The shared processor surface.

use crate::error::Result;
use async_trait::async_trait;
use bitflags::bitflags;
use core_events::record::RecordKind;
use core_events::TraceEvent;
use std::sync::Arc;

bitflags! {
    /// Which record origins a processor delivers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventKinds: u32 {
        const USER = 1 << 0;
        const KERNEL = 1 << 1;
        const MANIFEST = 1 << 2;
    }
}

impl EventKinds {
    pub const ALL: EventKinds = EventKinds::all();

    pub fn admits(&self, kind: RecordKind) -> bool {
        match kind {
            RecordKind::User => self.contains(EventKinds::USER),
            RecordKind::Kernel => self.contains(EventKinds::KERNEL),
            RecordKind::Manifest => self.contains(EventKinds::MANIFEST),
        }
    }
}

impl Default for EventKinds {
    fn default() -> Self {
        EventKinds::ALL
    }
}

/// Callback receiving each replayed event.
pub type EventCallback = Arc<dyn Fn(&TraceEvent) + Send + Sync>;

/// Callback receiving session boundary notices.
pub type SessionCallback = Arc<dyn Fn(&SessionNotice) + Send + Sync>;

/// Payload of session start/end callbacks.
#[derive(Debug, Clone)]
pub struct SessionNotice {
    pub session: String,
    /// Events delivered so far: zero at start, the total at end.
    pub event_count: u64,
}

/// Outcome of a completed processing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub events: u64,
    pub unreadable: u64,
}

/// Common surface of the file, realtime and mock processors.
#[async_trait]
pub trait EventProcessor: Send {
    /// Subscribes a callback to every delivered event.
    fn on_event(&mut self, callback: EventCallback);

    /// Subscribes to the session-start notice.
    fn on_session_start(&mut self, callback: SessionCallback);

    /// Subscribes to the session-end notice.
    fn on_session_end(&mut self, callback: SessionCallback);

    /// Runs the processor to completion.
    async fn process(&mut self) -> Result<ProcessSummary>;
}

/// Callback storage shared by the processor implementations.
#[derive(Clone, Default)]
pub(crate) struct CallbackSet {
    pub(crate) event: Vec<EventCallback>,
    pub(crate) session_start: Vec<SessionCallback>,
    pub(crate) session_end: Vec<SessionCallback>,
}

impl CallbackSet {
    pub(crate) fn dispatch_event(&self, event: &TraceEvent) {
        for callback in &self.event {
            callback(event);
        }
    }

    pub(crate) fn dispatch_start(&self, notice: &SessionNotice) {
        for callback in &self.session_start {
            callback(notice);
        }
    }

    pub(crate) fn dispatch_end(&self, notice: &SessionNotice) {
        for callback in &self.session_end {
            callback(notice);
        }
    }
}

impl std::fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSet")
            .field("event", &self.event.len())
            .field("session_start", &self.session_start.len())
            .field("session_end", &self.session_end.len())
            .finish()
    }
}
