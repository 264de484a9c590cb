//! Live trace session registry.
//!
//! The in-process stand-in for the host's realtime tracing facility. Trace
//! sinks publish every persisted record under their session name (the log
//! name); a realtime reader attaches as the session's single consumer and
//! drains a broadcast channel. Attaching a second consumer fails unless the
//! caller reclaims the session.

use crate::error::{Result, SinkError};
use core_events::TraceEvent;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::broadcast;

const SESSION_CHANNEL_CAPACITY: usize = 4096;

struct SessionEntry {
    sender: broadcast::Sender<Arc<TraceEvent>>,
    consumer_attached: bool,
}

fn registry() -> &'static Mutex<HashMap<String, SessionEntry>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, SessionEntry>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn entry_sender(name: &str) -> broadcast::Sender<Arc<TraceEvent>> {
    let mut sessions = registry().lock();
    sessions
        .entry(name.to_string())
        .or_insert_with(|| SessionEntry {
            sender: broadcast::channel(SESSION_CHANNEL_CAPACITY).0,
            consumer_attached: false,
        })
        .sender
        .clone()
}

/// Publishes one record into the named session. Without an attached
/// consumer the record is simply not observed.
pub fn publish(name: &str, event: &Arc<TraceEvent>) {
    let _ = entry_sender(name).send(event.clone());
}

/// Whether a consumer currently owns the named session.
pub fn is_attached(name: &str) -> bool {
    registry()
        .lock()
        .get(name)
        .map(|entry| entry.consumer_attached)
        .unwrap_or(false)
}

/// Attaches the calling consumer to the named session.
///
/// # Errors
///
/// `SessionExists` when a consumer is already attached and `reclaim` is
/// false; reclaiming replaces the prior registration.
pub fn attach(name: &str, reclaim: bool) -> Result<broadcast::Receiver<Arc<TraceEvent>>> {
    let mut sessions = registry().lock();
    let entry = sessions
        .entry(name.to_string())
        .or_insert_with(|| SessionEntry {
            sender: broadcast::channel(SESSION_CHANNEL_CAPACITY).0,
            consumer_attached: false,
        });
    if entry.consumer_attached && !reclaim {
        return Err(SinkError::SessionExists(name.to_string()));
    }
    entry.consumer_attached = true;
    Ok(entry.sender.subscribe())
}

/// Releases the consumer slot of the named session.
pub fn detach(name: &str) {
    let mut sessions = registry().lock();
    if let Some(entry) = sessions.get_mut(name) {
        entry.consumer_attached = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::{ProviderDescriptor, TraceEvent};

    fn event() -> Arc<TraceEvent> {
        let provider = ProviderDescriptor::from_name("SessionTests").unwrap();
        Arc::new(TraceEvent::builder(&provider, 1, "E").build().unwrap())
    }

    #[tokio::test]
    async fn test_publish_reaches_attached_consumer() {
        let mut rx = attach("session-pub", false).unwrap();
        publish("session-pub", &event());
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_name(), "E");
        detach("session-pub");
    }

    #[test]
    fn test_second_attach_conflicts() {
        let _rx = attach("session-conflict", false).unwrap();
        assert!(matches!(
            attach("session-conflict", false),
            Err(SinkError::SessionExists(_))
        ));
        detach("session-conflict");
    }

    #[test]
    fn test_reclaim_replaces_consumer() {
        let _rx = attach("session-reclaim", false).unwrap();
        assert!(attach("session-reclaim", true).is_ok());
        detach("session-reclaim");
    }

    #[test]
    fn test_detach_frees_slot() {
        let _rx = attach("session-free", false).unwrap();
        detach("session-free");
        assert!(attach("session-free", false).is_ok());
        detach("session-free");
    }
}
