//! Live session draining.

use crate::error::{ReaderError, Result};
use crate::processor::{CallbackSet, ProcessSummary, SessionNotice};
use core_sinks::session;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Attaches to a named live trace session and drains it on a task.
///
/// The session is owned exclusively: if a consumer already holds it and
/// `reclaim` is false, the processing task completes with a cancellation
/// error. Reclaiming takes the session over.
pub struct RealtimeProcessor {
    session_name: String,
    reclaim: bool,
    callbacks: CallbackSet,
    cancel: CancellationToken,
}

impl RealtimeProcessor {
    pub fn new(session_name: impl Into<String>, reclaim: bool) -> Self {
        Self {
            session_name: session_name.into(),
            reclaim,
            callbacks: CallbackSet::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    /// Subscribes a callback to every drained event.
    pub fn on_event(&mut self, callback: crate::processor::EventCallback) {
        self.callbacks.event.push(callback);
    }

    pub fn on_session_start(&mut self, callback: crate::processor::SessionCallback) {
        self.callbacks.session_start.push(callback);
    }

    pub fn on_session_end(&mut self, callback: crate::processor::SessionCallback) {
        self.callbacks.session_end.push(callback);
    }

    /// Spawns the drain loop. The returned handle completes when
    /// [`RealtimeProcessor::stop_processing`] is called (or the session's
    /// publishers disappear after a reclaim conflict).
    pub fn create_processing_task(&self) -> JoinHandle<Result<ProcessSummary>> {
        let session_name = self.session_name.clone();
        let reclaim = self.reclaim;
        let callbacks = self.callbacks.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut rx = session::attach(&session_name, reclaim).map_err(|_| {
                ReaderError::Cancelled(format!(
                    "session '{}' already exists and reclaim is disabled",
                    session_name
                ))
            })?;

            callbacks.dispatch_start(&SessionNotice {
                session: session_name.clone(),
                event_count: 0,
            });

            let mut events: u64 = 0;
            let mut unreadable: u64 = 0;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) => {
                            events += 1;
                            callbacks.dispatch_event(&event);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            unreadable += missed;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }

            session::detach(&session_name);
            callbacks.dispatch_end(&SessionNotice {
                session: session_name,
                event_count: events,
            });
            Ok(ProcessSummary { events, unreadable })
        })
    }

    /// Signals the drain loop to finish; the processing task then
    /// completes promptly.
    pub fn stop_processing(&self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for RealtimeProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeProcessor")
            .field("session", &self.session_name)
            .field("reclaim", &self.reclaim)
            .finish()
    }
}
