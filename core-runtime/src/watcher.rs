//! Configuration file watching.
//!
//! A background thread polls the registered file's modification time; when
//! it changes, the file is re-parsed and installed through the normal
//! configuration path, and the manager's reload counter advances. Parse or
//! validation failures leave the installed configuration untouched.

use crate::config::LoggingConfig;
use crate::manager::{LogManager, ManagerInner};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::path::PathBuf;
use std::sync::Weak;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

/// Default modification-time poll cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub(crate) struct ConfigWatcher {
    stop_tx: Sender<()>,
    worker: Option<JoinHandle<()>>,
}

impl ConfigWatcher {
    pub(crate) fn spawn(
        path: PathBuf,
        inner: Weak<ManagerInner>,
        poll_interval: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let worker = std::thread::Builder::new()
            .name("log-config-watch".to_string())
            .spawn(move || watch_loop(path, inner, stop_rx, poll_interval))
            .ok();

        Self { stop_tx, worker }
    }

    pub(crate) fn close(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Change fingerprint: modification time plus length, since mtime alone can
/// have whole-second granularity.
fn fingerprint(path: &PathBuf) -> Option<(SystemTime, u64)> {
    let metadata = std::fs::metadata(path).ok()?;
    let modified = metadata.modified().ok()?;
    Some((modified, metadata.len()))
}

fn watch_loop(
    path: PathBuf,
    inner: Weak<ManagerInner>,
    stop_rx: Receiver<()>,
    poll_interval: Duration,
) {
    let mut last_seen = fingerprint(&path);

    loop {
        match stop_rx.recv_timeout(poll_interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let current = fingerprint(&path);
        if current == last_seen {
            continue;
        }
        last_seen = current;

        let manager = match inner.upgrade() {
            Some(inner) => LogManager::from_inner(inner),
            None => return,
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "configuration file unreadable");
                continue;
            }
        };
        let config = match LoggingConfig::from_json(&text) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "configuration file invalid, keeping installed configuration");
                continue;
            }
        };
        match manager.set_configuration(config) {
            Ok(()) => {
                manager.note_reload();
                tracing::info!(path = %path.display(), "configuration reloaded");
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "configuration reload failed");
            }
        }
    }
}
