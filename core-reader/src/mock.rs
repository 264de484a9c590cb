//! Reusable processor for consumer tests.

use crate::error::Result;
use crate::processor::{
    CallbackSet, EventCallback, EventProcessor, ProcessSummary, SessionCallback, SessionNotice,
};
use async_trait::async_trait;
use core_events::TraceEvent;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

/// Injects events into a [`MockProcessor`]. Cloneable; dropping every
/// injector ends an unbounded run.
#[derive(Clone)]
pub struct MockInjector {
    tx: UnboundedSender<TraceEvent>,
}

impl MockInjector {
    /// Queues one event for delivery. Returns `false` once the processor
    /// is gone.
    pub fn inject(&self, event: TraceEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn inject_many(&self, events: impl IntoIterator<Item = TraceEvent>) -> bool {
        events.into_iter().all(|event| self.inject(event))
    }
}

impl std::fmt::Debug for MockInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockInjector").finish()
    }
}

/// A processor fed by injected events instead of a trace source.
///
/// Emits the same session-start/session-end notices as the real
/// processors. With `stop_when_drained` the run ends as soon as the
/// injection queue is empty; otherwise it runs until [`MockProcessor::stop`]
/// or until every injector is dropped.
pub struct MockProcessor {
    session_name: String,
    stop_when_drained: bool,
    callbacks: CallbackSet,
    rx: UnboundedReceiver<TraceEvent>,
    cancel: CancellationToken,
}

impl MockProcessor {
    pub fn new(session_name: impl Into<String>, stop_when_drained: bool) -> (Self, MockInjector) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                session_name: session_name.into(),
                stop_when_drained,
                callbacks: CallbackSet::default(),
                rx,
                cancel: CancellationToken::new(),
            },
            MockInjector { tx },
        )
    }

    /// Signals an unbounded run to finish.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// A token other tasks can use to stop the run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[async_trait]
impl EventProcessor for MockProcessor {
    fn on_event(&mut self, callback: EventCallback) {
        self.callbacks.event.push(callback);
    }

    fn on_session_start(&mut self, callback: SessionCallback) {
        self.callbacks.session_start.push(callback);
    }

    fn on_session_end(&mut self, callback: SessionCallback) {
        self.callbacks.session_end.push(callback);
    }

    async fn process(&mut self) -> Result<ProcessSummary> {
        self.callbacks.dispatch_start(&SessionNotice {
            session: self.session_name.clone(),
            event_count: 0,
        });

        let mut events: u64 = 0;
        if self.stop_when_drained {
            loop {
                match self.rx.try_recv() {
                    Ok(event) => {
                        events += 1;
                        self.callbacks.dispatch_event(&event);
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }
        } else {
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    received = self.rx.recv() => match received {
                        Some(event) => {
                            events += 1;
                            self.callbacks.dispatch_event(&event);
                        }
                        None => break,
                    },
                }
            }
        }

        self.callbacks.dispatch_end(&SessionNotice {
            session: self.session_name.clone(),
            event_count: events,
        });
        Ok(ProcessSummary {
            events,
            unreadable: 0,
        })
    }
}

impl std::fmt::Debug for MockProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProcessor")
            .field("session", &self.session_name)
            .field("stop_when_drained", &self.stop_when_drained)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::{Level, ProviderDescriptor};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn event(name: &str) -> TraceEvent {
        let provider = ProviderDescriptor::from_name("MockTests").unwrap();
        TraceEvent::builder(&provider, 1, name)
            .level(Level::Informational)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_drained_run_delivers_queued_events() {
        let (mut processor, injector) = MockProcessor::new("mock", true);
        injector.inject_many([event("A"), event("B"), event("C")]);

        let seen = Arc::new(AtomicU64::new(0));
        let seen_cb = Arc::clone(&seen);
        processor.on_event(Arc::new(move |_| {
            seen_cb.fetch_add(1, Ordering::SeqCst);
        }));

        let summary = processor.process().await.unwrap();
        assert_eq!(summary.events, 3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_session_notices_carry_counts() {
        let (mut processor, injector) = MockProcessor::new("mock", true);
        injector.inject(event("A"));

        let end_count = Arc::new(AtomicU64::new(u64::MAX));
        let end_cb = Arc::clone(&end_count);
        processor.on_session_end(Arc::new(move |notice| {
            end_cb.store(notice.event_count, Ordering::SeqCst);
        }));

        processor.process().await.unwrap();
        assert_eq!(end_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unbounded_run_stops_on_request() {
        let (mut processor, injector) = MockProcessor::new("mock", false);
        let cancel = processor.cancellation_token();

        let feeder = tokio::spawn(async move {
            injector.inject(event("A"));
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            injector.inject(event("B"));
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let summary = processor.process().await.unwrap();
        feeder.await.unwrap();
        assert_eq!(summary.events, 2);
    }

    #[tokio::test]
    async fn test_unbounded_run_ends_when_injectors_drop() {
        let (mut processor, injector) = MockProcessor::new("mock", false);
        injector.inject(event("A"));
        drop(injector);

        let summary = processor.process().await.unwrap();
        assert_eq!(summary.events, 1);
    }
}
