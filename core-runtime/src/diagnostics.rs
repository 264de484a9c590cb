//! Manager self-diagnostics.
//!
//! The manager reports its own milestones (configuration installs,
//! reloads, demand rotations) as ordinary trace events on an internal
//! provider. To keep a sink that subscribes to this provider from recursing
//! into the operation being reported, events go through a bounded channel
//! drained by a dedicated thread; a full channel drops the report.

use crate::manager::ManagerInner;
use core_events::{Level, ProviderDescriptor, TraceEvent};
use crossbeam_channel::{bounded, Sender, TrySendError};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

/// Name of the internal provider carrying manager diagnostics.
pub const INTERNAL_PROVIDER_NAME: &str = "TraceLogManager";

const CHANNEL_CAPACITY: usize = 256;

/// The internal provider's descriptor.
pub fn internal_provider() -> ProviderDescriptor {
    ProviderDescriptor::from_name(INTERNAL_PROVIDER_NAME).expect("internal provider name is valid")
}

pub(crate) struct Diagnostics {
    tx: Option<Sender<TraceEvent>>,
    worker: Option<JoinHandle<()>>,
}

impl Diagnostics {
    /// Starts the drain thread. It holds the manager weakly so shutdown is
    /// never kept alive by its own diagnostics.
    pub(crate) fn spawn(inner: Weak<ManagerInner>) -> Self {
        let (tx, rx) = bounded::<TraceEvent>(CHANNEL_CAPACITY);
        let worker = std::thread::Builder::new()
            .name("log-diagnostics".to_string())
            .spawn(move || {
                while let Ok(event) = rx.recv() {
                    match inner.upgrade() {
                        Some(inner) => inner.dispatch(Arc::new(event)),
                        None => break,
                    }
                }
            })
            .ok();

        Self {
            tx: Some(tx),
            worker,
        }
    }

    /// Queues a diagnostic event; drops it when the channel is full.
    pub(crate) fn report(&self, event: TraceEvent) {
        if let Some(tx) = &self.tx {
            match tx.try_send(event) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!("diagnostics channel full, report dropped");
                }
            }
        }
    }

    /// Builds a diagnostic event with a single message parameter.
    pub(crate) fn event(name: &str, message: String) -> TraceEvent {
        TraceEvent::builder(&internal_provider(), 0, name)
            .level(Level::Informational)
            .param("message", message)
            .build()
            .expect("diagnostic events are well-formed")
    }

    /// Disconnects the channel and joins the drain thread.
    pub(crate) fn close(&mut self) {
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Diagnostics {
    fn drop(&mut self) {
        self.close();
    }
}
