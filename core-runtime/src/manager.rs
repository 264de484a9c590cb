//! # Logging Manager
//!
//! The process-wide owner of sink lifecycle, configuration state and the
//! activity-ID slot.
//!
//! ## Overview
//!
//! A [`LogManager`] mediates every configuration transition: installing a
//! [`LoggingConfig`] diffs the desired sink set against the registry,
//! creates and destroys sinks accordingly, and swaps the routing table in
//! one step so concurrent emissions observe either the old or the new
//! configuration, never a half-applied one.
//!
//! The type is instantiable so tests can run isolated lifecycles; the
//! process singleton is reached through [`manager()`].
//!
//! ## Lifecycle
//!
//! ```ignore
//! use core_runtime::{manager, LoggingConfig};
//!
//! manager().start()?;
//! manager().set_configuration(config)?;
//! // ... emit events ...
//! manager().shutdown();
//! ```

use crate::config::{BinaryLogging, LogConfig, LoggingConfig};
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::routing::RoutingTable;
use crate::watcher::{ConfigWatcher, DEFAULT_POLL_INTERVAL};
use chrono::Utc;
use core_events::{activity, Level, Subscription, TraceEvent};
use core_sinks::{
    FileSinkSettings, RetentionPolicy, Sink, SinkIdentity, SinkKind, SinkSettings,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Minimum spacing between successful demand rotations. Kept below the
/// smallest configurable rotation interval so throttling never starves a
/// sink of rotations it would have performed on its own clock.
pub const MIN_DEMAND_ROTATION_DELTA: Duration = Duration::from_secs(30);

/// Environment variable controlling the default log directory.
pub const DATA_DIRECTORY_VARIABLE: &str = "DATADIR";

/// Resolves the default directory: `$DATADIR/logs` when `DATADIR` holds an
/// absolute path, `./logs` otherwise.
pub fn resolve_default_directory() -> PathBuf {
    match std::env::var_os(DATA_DIRECTORY_VARIABLE) {
        Some(raw) => {
            let base = PathBuf::from(raw);
            if base.is_absolute() {
                base.join("logs")
            } else {
                PathBuf::from("./logs")
            }
        }
        None => PathBuf::from("./logs"),
    }
}

/// Whether this process can open kernel trace sessions.
///
/// On Linux the kernel tracing control directory is only readable with
/// elevated privileges, which makes it a usable capability probe. Other
/// platforms report no capability and rely on the binary-logging gate.
pub fn probe_trace_capability() -> bool {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_dir("/sys/kernel/tracing").is_ok()
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

struct SinkEntry {
    sink: Arc<Sink>,
    subscriptions: Vec<Subscription>,
    /// The frozen descriptor this sink was created from; `None` for
    /// externally registered sinks.
    config: Option<LogConfig>,
    owned: bool,
}

struct ManagerState {
    sinks: HashMap<SinkIdentity, SinkEntry>,
    installed: LoggingConfig,
    default_directory: PathBuf,
    trace_capable: bool,
    watcher: Option<ConfigWatcher>,
    diagnostics: Option<Diagnostics>,
    last_demand_rotation: Option<Instant>,
}

impl ManagerState {
    fn new() -> Self {
        Self {
            sinks: HashMap::new(),
            installed: LoggingConfig::default(),
            default_directory: PathBuf::from("./logs"),
            trace_capable: false,
            watcher: None,
            diagnostics: None,
            last_demand_rotation: None,
        }
    }
}

pub(crate) struct ManagerInner {
    routing: RwLock<Arc<RoutingTable>>,
    state: Mutex<ManagerState>,
    started: AtomicBool,
    reload_count: AtomicU64,
}

impl ManagerInner {
    /// Emission fan-out against the current routing snapshot. Lock-free
    /// after the snapshot clone.
    pub(crate) fn dispatch(&self, event: Arc<TraceEvent>) {
        let table = self.routing.read().clone();
        for sink in table.route(&event) {
            sink.write_event(&event);
        }
    }

    fn swap_routing(&self, table: RoutingTable) {
        *self.routing.write() = Arc::new(table);
    }

    fn rebuild_routing(&self, state: &ManagerState) {
        let entries: Vec<(&Arc<Sink>, &[Subscription])> = state
            .sinks
            .values()
            .map(|entry| (&entry.sink, entry.subscriptions.as_slice()))
            .collect();
        self.swap_routing(RoutingTable::build(entries));
    }
}

/// Handle to the logging runtime; clones share the same state.
#[derive(Clone)]
pub struct LogManager {
    inner: Arc<ManagerInner>,
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LogManager {
    /// A fresh, stopped manager. Most callers want [`manager()`] instead.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                routing: RwLock::new(Arc::new(RoutingTable::empty())),
                state: Mutex::new(ManagerState::new()),
                started: AtomicBool::new(false),
                reload_count: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ManagerInner>) -> Self {
        Self { inner }
    }

    fn ensure_started(&self) -> Result<()> {
        if !self.inner.started.load(Ordering::Acquire) {
            return Err(Error::ConflictingState(
                "the logging manager is not started".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Initializes the runtime: resolves the default directory, resets the
    /// activity slot, probes the trace capability and installs an empty
    /// configuration. Idempotent.
    pub fn start(&self) -> Result<()> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let result = (|| {
            let mut state = self.inner.state.lock();
            state.default_directory = resolve_default_directory();
            std::fs::create_dir_all(&state.default_directory)?;
            state.trace_capable = probe_trace_capability();
            state.installed = LoggingConfig::default();
            state.last_demand_rotation = None;
            state.diagnostics = Some(Diagnostics::spawn(Arc::downgrade(&self.inner)));
            Ok(())
        })();

        match result {
            Ok(()) => {
                activity::clear();
                self.inner.swap_routing(RoutingTable::empty());
                tracing::debug!("logging manager started");
                Ok(())
            }
            Err(e) => {
                self.inner.started.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Flushes and destroys every sink, closes the watcher and resets the
    /// binary-logging gate. A no-op when not started.
    pub fn shutdown(&self) {
        if !self.inner.started.swap(false, Ordering::AcqRel) {
            return;
        }

        let watcher = self.inner.state.lock().watcher.take();
        if let Some(mut watcher) = watcher {
            watcher.close();
        }

        // Stop routing first so late emissions see an empty configuration.
        self.inner.swap_routing(RoutingTable::empty());

        let (entries, diagnostics) = {
            let mut state = self.inner.state.lock();
            let entries: Vec<SinkEntry> = state.sinks.drain().map(|(_, entry)| entry).collect();
            let diagnostics = state.diagnostics.take();
            state.installed = LoggingConfig::default();
            state.last_demand_rotation = None;
            (entries, diagnostics)
        };

        if let Some(mut diagnostics) = diagnostics {
            diagnostics.close();
        }
        for entry in entries {
            let _ = entry.sink.flush();
            entry.sink.close();
        }
        tracing::debug!("logging manager shut down");
    }

    /// The directory sinks land in when their configuration names none.
    pub fn default_directory(&self) -> PathBuf {
        self.inner.state.lock().default_directory.clone()
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Applies the binary-logging gate to one log: trace configs are
    /// demoted to text when the gate or the missing host capability says
    /// so.
    fn apply_binary_gate(
        log: &LogConfig,
        gate: BinaryLogging,
        trace_capable: bool,
    ) -> LogConfig {
        if log.kind() != SinkKind::EventTracing {
            return log.clone();
        }
        let demote = match gate {
            BinaryLogging::Disabled => true,
            BinaryLogging::None => !trace_capable,
            BinaryLogging::Enabled => false,
        };
        if demote {
            tracing::debug!(log = log.name(), "binary logging unavailable, demoting trace sink to text");
            log.demote_to_text()
        } else {
            log.clone()
        }
    }

    /// Installs a configuration.
    ///
    /// The installed sink set is diffed against the desired one: sinks only
    /// in the current set are destroyed, sinks only in the next set are
    /// created, and a sink whose descriptor changed (including a kind
    /// change under the same name) is destroyed and recreated. The routing
    /// table is swapped exactly once, after the sink set is final, so no
    /// emission observes a partial install. On any error the current
    /// configuration stays untouched.
    pub fn set_configuration(&self, next: LoggingConfig) -> Result<()> {
        self.ensure_started()?;
        next.validate()?;

        let removed = {
            let mut state = self.inner.state.lock();

            let effective = LoggingConfig {
                logs: next
                    .logs
                    .iter()
                    .map(|log| {
                        Self::apply_binary_gate(
                            log,
                            next.allow_binary_logging,
                            state.trace_capable,
                        )
                    })
                    .collect(),
                allow_binary_logging: next.allow_binary_logging,
            };

            let mut desired: HashMap<SinkIdentity, LogConfig> = HashMap::new();
            for log in &effective.logs {
                desired.insert(SinkIdentity::new(log.kind(), log.name()), log.clone());
            }

            // Phase 1: create every sink that is new or changed. Nothing is
            // committed yet, so a failure leaves the installed set alone.
            let mut created: Vec<(SinkIdentity, SinkEntry)> = Vec::new();
            let mut create_error: Option<Error> = None;
            for (identity, log) in &desired {
                match state.sinks.get(identity) {
                    Some(entry) if !entry.owned => {
                        create_error = Some(Error::ConflictingState(format!(
                            "sink {} is externally registered and cannot be replaced by configuration",
                            identity
                        )));
                        break;
                    }
                    Some(entry) if entry.config.as_ref() == Some(log) => continue,
                    _ => {}
                }
                match Self::create_sink(log, &state.default_directory) {
                    Ok(entry) => created.push(((*identity).clone(), entry)),
                    Err(e) => {
                        create_error = Some(e);
                        break;
                    }
                }
            }
            if let Some(e) = create_error {
                for (_, entry) in created {
                    entry.sink.close();
                }
                return Err(e);
            }

            // Phase 2: commit. Remove owned sinks that are gone or being
            // replaced, insert the new ones, then swap the routing table.
            let mut removed: Vec<SinkEntry> = Vec::new();
            let stale: Vec<SinkIdentity> = state
                .sinks
                .iter()
                .filter(|(identity, entry)| {
                    entry.owned
                        && match desired.get(*identity) {
                            Some(log) => entry.config.as_ref() != Some(log),
                            None => true,
                        }
                })
                .map(|(identity, _)| identity.clone())
                .collect();
            for identity in stale {
                if let Some(entry) = state.sinks.remove(&identity) {
                    removed.push(entry);
                }
            }
            for (identity, entry) in created {
                state.sinks.insert(identity, entry);
            }

            state.installed = effective;
            self.inner.rebuild_routing(&state);
            removed
        };

        for entry in removed {
            let _ = entry.sink.flush();
            entry.sink.close();
        }

        self.report(Diagnostics::event(
            "ConfigurationInstalled",
            "configuration installed".to_string(),
        ));
        Ok(())
    }

    fn create_sink(log: &LogConfig, default_directory: &PathBuf) -> Result<SinkEntry> {
        let settings = SinkSettings {
            filters: log.filters().to_vec(),
            ..SinkSettings::default()
        }
        .with_buffer_mb(log.buffer_size_mb());

        let file_settings = || FileSinkSettings {
            log_name: log.name().to_string(),
            directory: log
                .directory()
                .cloned()
                .unwrap_or_else(|| default_directory.clone()),
            filename_template: log.filename_template().map(str::to_string),
            timestamp_local: log.timestamp_local(),
            rotation_interval: log
                .rotation_interval()
                .map(|s| chrono::Duration::seconds(s as i64)),
            retention: RetentionPolicy {
                max_age: log.maximum_age().map(|s| chrono::Duration::seconds(s as i64)),
                max_total_bytes: log.maximum_size(),
            },
        };

        let sink = match log.kind() {
            SinkKind::Text => Sink::text(file_settings(), settings)?,
            SinkKind::EventTracing => Sink::trace(file_settings(), settings)?,
            SinkKind::Console => Sink::console(settings)?,
            SinkKind::Network => Sink::network(
                log.name(),
                log.hostname().unwrap_or_default(),
                log.port().unwrap_or_default(),
                settings,
            )?,
            SinkKind::Memory => {
                return Err(Error::InvalidConfiguration(
                    "memory sinks cannot be created from configuration".to_string(),
                ))
            }
        };

        log.freeze();
        Ok(SinkEntry {
            sink: Arc::new(sink),
            subscriptions: log.subscriptions().to_vec(),
            config: Some(log.clone()),
            owned: true,
        })
    }

    /// The currently installed configuration (after gate rewrites).
    pub fn configuration(&self) -> LoggingConfig {
        self.inner.state.lock().installed.clone()
    }

    // ========================================================================
    // Configuration file watching
    // ========================================================================

    /// Loads, installs and then watches a JSON configuration file,
    /// reinstalling on every modification.
    pub fn watch_configuration_file(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.watch_configuration_file_every(path, DEFAULT_POLL_INTERVAL)
    }

    /// [`LogManager::watch_configuration_file`] with an explicit poll
    /// cadence.
    pub fn watch_configuration_file_every(
        &self,
        path: impl Into<PathBuf>,
        poll_interval: Duration,
    ) -> Result<()> {
        self.ensure_started()?;
        let path = path.into();
        let text = std::fs::read_to_string(&path)
            .map_err(|_| Error::NotFound(format!("configuration file {}", path.display())))?;
        let config = LoggingConfig::from_json(&text)?;
        self.set_configuration(config)?;

        let watcher = ConfigWatcher::spawn(path, Arc::downgrade(&self.inner), poll_interval);
        let previous = self.inner.state.lock().watcher.replace(watcher);
        if let Some(mut previous) = previous {
            previous.close();
        }
        Ok(())
    }

    /// Number of watcher-triggered reloads since start.
    pub fn reload_count(&self) -> u64 {
        self.inner.reload_count.load(Ordering::Relaxed)
    }

    pub(crate) fn note_reload(&self) {
        self.inner.reload_count.fetch_add(1, Ordering::Relaxed);
        self.report(Diagnostics::event(
            "ConfigurationReloaded",
            "configuration file reloaded".to_string(),
        ));
    }

    // ========================================================================
    // Emission
    // ========================================================================

    /// Routes one event to every admitting sink.
    pub fn write_event(&self, event: TraceEvent) {
        if !self.is_started() {
            return;
        }
        self.inner.dispatch(Arc::new(event));
    }

    /// Routes an already-shared event.
    pub fn write_shared(&self, event: &Arc<TraceEvent>) {
        if !self.is_started() {
            return;
        }
        self.inner.dispatch(Arc::clone(event));
    }

    /// Provider-side early-out: whether building an event at this level
    /// and keyword set could reach any sink.
    pub fn is_provider_enabled(&self, provider_id: Uuid, level: Level, keywords: u64) -> bool {
        let table = self.inner.routing.read().clone();
        table.is_provider_enabled(provider_id, level, keywords)
    }

    // ========================================================================
    // Sink registry
    // ========================================================================

    /// Looks up a sink by identity.
    pub fn get_sink(&self, kind: SinkKind, name: &str) -> Option<Arc<Sink>> {
        self.inner
            .state
            .lock()
            .sinks
            .get(&SinkIdentity::new(kind, name))
            .map(|entry| Arc::clone(&entry.sink))
    }

    /// Registers an externally constructed sink with its subscriptions.
    /// The manager routes to it but will not destroy it.
    pub fn register_sink(&self, sink: Arc<Sink>, subscriptions: Vec<Subscription>) -> Result<()> {
        self.ensure_started()?;
        for subscription in &subscriptions {
            subscription.validate()?;
        }
        let identity = sink.identity().clone();
        let mut state = self.inner.state.lock();
        if state.sinks.contains_key(&identity) {
            return Err(Error::ConflictingState(format!(
                "a sink named {} is already registered",
                identity
            )));
        }
        if identity.kind == SinkKind::Console
            && state.sinks.keys().any(|id| id.kind == SinkKind::Console)
        {
            return Err(Error::ConflictingState(
                "a console sink already exists".to_string(),
            ));
        }
        state.sinks.insert(
            identity,
            SinkEntry {
                sink,
                subscriptions,
                config: None,
                owned: false,
            },
        );
        self.inner.rebuild_routing(&state);
        Ok(())
    }

    /// Removes an externally registered sink from routing and returns it.
    pub fn unregister_sink(&self, kind: SinkKind, name: &str) -> Result<Arc<Sink>> {
        self.ensure_started()?;
        let identity = SinkIdentity::new(kind, name);
        let mut state = self.inner.state.lock();
        match state.sinks.get(&identity) {
            None => return Err(Error::NotFound(format!("sink {}", identity))),
            Some(entry) if entry.owned => {
                return Err(Error::ConflictingState(format!(
                    "sink {} is owned by the manager; change the configuration instead",
                    identity
                )))
            }
            Some(_) => {}
        }
        let entry = state.sinks.remove(&identity).expect("entry just checked");
        self.inner.rebuild_routing(&state);
        Ok(entry.sink)
    }

    /// Destroys a manager-owned sink.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown identities, `ConflictingState` for externally
    /// registered sinks and for the console sink.
    pub fn destroy_sink(&self, kind: SinkKind, name: &str) -> Result<()> {
        self.ensure_started()?;
        if kind == SinkKind::Console {
            return Err(Error::ConflictingState(
                "the console sink cannot be destroyed".to_string(),
            ));
        }
        let identity = SinkIdentity::new(kind, name);
        let entry = {
            let mut state = self.inner.state.lock();
            match state.sinks.get(&identity) {
                None => return Err(Error::NotFound(format!("sink {}", identity))),
                Some(entry) if !entry.owned => {
                    return Err(Error::ConflictingState(format!(
                        "sink {} was registered externally and cannot be destroyed here",
                        identity
                    )))
                }
                Some(_) => {}
            }
            let entry = state.sinks.remove(&identity).expect("entry just checked");
            state.installed.logs.retain(|log| {
                SinkIdentity::new(log.kind(), log.name()) != identity
            });
            self.inner.rebuild_routing(&state);
            entry
        };
        let _ = entry.sink.flush();
        entry.sink.close();
        Ok(())
    }

    pub fn sink_count(&self) -> usize {
        self.inner.state.lock().sinks.len()
    }

    // ========================================================================
    // Rotation
    // ========================================================================

    /// Rotates every file-backed sink on demand.
    ///
    /// Throttled by [`MIN_DEMAND_ROTATION_DELTA`]: a call inside the
    /// throttle window returns `false` and performs no I/O.
    pub fn rotate_files(&self) -> bool {
        if self.ensure_started().is_err() {
            return false;
        }
        let file_sinks: Vec<Arc<Sink>> = {
            let mut state = self.inner.state.lock();
            let now = Instant::now();
            if let Some(last) = state.last_demand_rotation {
                if now.duration_since(last) < MIN_DEMAND_ROTATION_DELTA {
                    return false;
                }
            }
            state.last_demand_rotation = Some(now);
            state
                .sinks
                .values()
                .filter(|entry| entry.sink.kind().is_file_backed())
                .map(|entry| Arc::clone(&entry.sink))
                .collect()
        };

        let now = Utc::now();
        for sink in &file_sinks {
            if let Err(e) = sink.rotate_now(now) {
                tracing::warn!(sink = %sink.identity(), error = %e, "demand rotation failed");
            }
        }

        self.report(Diagnostics::event(
            "FilesRotated",
            format!("rotated {} file-backed sinks", file_sinks.len()),
        ));
        true
    }

    // ========================================================================
    // Activity identifiers
    // ========================================================================

    /// Sets the calling thread's activity identifier.
    pub fn set_activity_id(&self, id: Uuid) -> Result<()> {
        if id.is_nil() {
            return Err(Error::InvalidArgument(
                "the nil GUID cannot be an activity id; use clear_activity_id".to_string(),
            ));
        }
        activity::set(id);
        Ok(())
    }

    /// Clears the calling thread's activity identifier.
    pub fn clear_activity_id(&self) {
        activity::clear();
    }

    /// The calling thread's activity identifier; nil when cleared.
    pub fn activity_id(&self) -> Uuid {
        activity::get()
    }

    /// Installs and returns a fresh random activity identifier.
    pub fn new_activity_id(&self) -> Uuid {
        activity::new_random()
    }

    /// Exchanges the calling thread's activity identifier.
    pub fn swap_activity_id(&self, id: Uuid) -> Uuid {
        activity::swap(id)
    }

    fn report(&self, event: TraceEvent) {
        let state = self.inner.state.lock();
        if let Some(diagnostics) = &state.diagnostics {
            diagnostics.report(event);
        }
    }
}

impl std::fmt::Debug for LogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogManager")
            .field("started", &self.is_started())
            .field("sinks", &self.sink_count())
            .finish()
    }
}

static GLOBAL: OnceLock<LogManager> = OnceLock::new();

/// The process-wide manager singleton.
pub fn manager() -> &'static LogManager {
    GLOBAL.get_or_init(LogManager::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::ProviderDescriptor;

    fn provider() -> ProviderDescriptor {
        ProviderDescriptor::from_name("ManagerTests").unwrap()
    }

    fn event(name: &str, level: Level, keywords: u64) -> TraceEvent {
        TraceEvent::builder(&provider(), 1, name)
            .level(level)
            .keywords(keywords)
            .build()
            .unwrap()
    }

    fn started_manager() -> LogManager {
        let manager = LogManager::new();
        manager.start().unwrap();
        manager
    }

    fn attach_memory(manager: &LogManager, min_level: Level, keywords: u64) -> core_sinks::LineRing {
        let (sink, ring) = Sink::memory(64 * 1024, SinkSettings::default()).unwrap();
        manager
            .register_sink(
                Arc::new(sink),
                vec![Subscription::for_provider(&provider(), min_level, keywords)],
            )
            .unwrap();
        ring
    }

    #[test]
    fn test_start_is_idempotent() {
        let manager = LogManager::new();
        manager.start().unwrap();
        manager.start().unwrap();
        assert!(manager.is_started());
        manager.shutdown();
    }

    #[test]
    fn test_shutdown_without_start_is_noop() {
        let manager = LogManager::new();
        manager.shutdown();
        assert!(!manager.is_started());
    }

    #[test]
    fn test_operations_require_start() {
        let manager = LogManager::new();
        assert!(matches!(
            manager.set_configuration(LoggingConfig::default()),
            Err(Error::ConflictingState(_))
        ));
        assert!(!manager.rotate_files());
    }

    #[test]
    fn test_routing_through_registered_sink() {
        let manager = started_manager();
        let ring = attach_memory(&manager, Level::Informational, 0);

        manager.write_event(event("Hello", Level::Informational, 0));
        manager.write_event(event("TooVerbose", Level::Verbose, 0));
        manager
            .get_sink(SinkKind::Memory, "")
            .unwrap()
            .flush()
            .unwrap();

        let snap = ring.snapshot();
        assert_eq!(snap.lines.len(), 1);
        assert!(snap.lines[0].contains("Hello"));
        manager.shutdown();
    }

    #[test]
    fn test_provider_enabled_follows_routing() {
        let manager = started_manager();
        assert!(!manager.is_provider_enabled(provider().id(), Level::Critical, 0x1));
        let _ring = attach_memory(&manager, Level::Warning, 0x1);
        assert!(manager.is_provider_enabled(provider().id(), Level::Warning, 0x1));
        assert!(!manager.is_provider_enabled(provider().id(), Level::Verbose, 0x1));
        manager.shutdown();
    }

    #[test]
    fn test_second_console_rejected() {
        let manager = started_manager();
        let console = Arc::new(Sink::console(SinkSettings::default()).unwrap());
        manager
            .register_sink(
                console,
                vec![Subscription::for_provider(&provider(), Level::Verbose, 0)],
            )
            .unwrap();
        let another = Arc::new(Sink::console(SinkSettings::default()).unwrap());
        assert!(matches!(
            manager.register_sink(another, vec![]),
            Err(Error::ConflictingState(_))
        ));
        manager.shutdown();
    }

    #[test]
    fn test_external_sink_cannot_be_destroyed() {
        let manager = started_manager();
        let _ring = attach_memory(&manager, Level::Verbose, 0);
        assert!(matches!(
            manager.destroy_sink(SinkKind::Memory, ""),
            Err(Error::ConflictingState(_))
        ));
        // But it can be unregistered.
        assert!(manager.unregister_sink(SinkKind::Memory, "").is_ok());
        assert_eq!(manager.sink_count(), 0);
        manager.shutdown();
    }

    #[test]
    fn test_configured_sink_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let manager = started_manager();

        let mut log = LogConfig::new("svc", SinkKind::Text);
        log.add_subscription(Subscription::for_provider(&provider(), Level::Verbose, 0))
            .unwrap();
        log.set_directory(dir.path()).unwrap();
        let config = LoggingConfig::new().with_log(log.clone());

        manager.set_configuration(config).unwrap();
        assert!(manager.get_sink(SinkKind::Text, "svc").is_some());
        assert!(log.is_frozen());

        // Installing an empty configuration destroys it.
        manager.set_configuration(LoggingConfig::default()).unwrap();
        assert!(manager.get_sink(SinkKind::Text, "svc").is_none());
        manager.shutdown();
    }

    #[test]
    fn test_unchanged_sink_survives_reinstall() {
        let dir = tempfile::tempdir().unwrap();
        let manager = started_manager();

        let make_config = || {
            let mut log = LogConfig::new("svc", SinkKind::Text);
            log.add_subscription(Subscription::for_provider(&provider(), Level::Verbose, 0))
                .unwrap();
            log.set_directory(dir.path()).unwrap();
            LoggingConfig::new().with_log(log)
        };

        manager.set_configuration(make_config()).unwrap();
        let before = manager.get_sink(SinkKind::Text, "svc").unwrap();
        manager.set_configuration(make_config()).unwrap();
        let after = manager.get_sink(SinkKind::Text, "svc").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        manager.shutdown();
    }

    #[test]
    fn test_invalid_configuration_keeps_installed() {
        let dir = tempfile::tempdir().unwrap();
        let manager = started_manager();

        let mut log = LogConfig::new("svc", SinkKind::Text);
        log.add_subscription(Subscription::for_provider(&provider(), Level::Verbose, 0))
            .unwrap();
        log.set_directory(dir.path()).unwrap();
        manager
            .set_configuration(LoggingConfig::new().with_log(log))
            .unwrap();

        // Duplicate names make the next configuration invalid.
        let mut a = LogConfig::new("dup", SinkKind::Text);
        a.add_subscription(Subscription::for_provider(&provider(), Level::Verbose, 0))
            .unwrap();
        let mut b = LogConfig::new("dup", SinkKind::Text);
        b.add_subscription(Subscription::for_provider(&provider(), Level::Verbose, 0))
            .unwrap();
        let bad = LoggingConfig::new().with_log(a).with_log(b);

        assert!(manager.set_configuration(bad).is_err());
        assert!(manager.get_sink(SinkKind::Text, "svc").is_some());
        manager.shutdown();
    }

    #[test]
    fn test_binary_logging_disabled_demotes_to_text() {
        let dir = tempfile::tempdir().unwrap();
        let manager = started_manager();

        let mut log = LogConfig::new("bin", SinkKind::EventTracing);
        log.add_subscription(Subscription::for_provider(&provider(), Level::Verbose, 0))
            .unwrap();
        log.set_directory(dir.path()).unwrap();
        let config = LoggingConfig::new()
            .with_log(log)
            .with_binary_logging(BinaryLogging::Disabled);

        manager.set_configuration(config).unwrap();
        assert!(manager.get_sink(SinkKind::EventTracing, "bin").is_none());
        let text = manager.get_sink(SinkKind::Text, "bin").unwrap();
        assert_eq!(text.kind(), SinkKind::Text);
        manager.shutdown();
    }

    #[test]
    fn test_rotate_files_is_throttled() {
        let dir = tempfile::tempdir().unwrap();
        let manager = started_manager();

        let mut log = LogConfig::new("svc", SinkKind::Text);
        log.add_subscription(Subscription::for_provider(&provider(), Level::Verbose, 0))
            .unwrap();
        log.set_directory(dir.path()).unwrap();
        manager
            .set_configuration(LoggingConfig::new().with_log(log))
            .unwrap();

        assert!(manager.rotate_files());
        assert!(!manager.rotate_files());
        manager.shutdown();
    }

    #[test]
    fn test_activity_api() {
        let manager = started_manager();
        assert!(manager.activity_id().is_nil());
        assert!(manager.set_activity_id(Uuid::nil()).is_err());

        let id = Uuid::new_v4();
        manager.set_activity_id(id).unwrap();
        assert_eq!(manager.activity_id(), id);

        let fresh = manager.new_activity_id();
        assert_eq!(manager.activity_id(), fresh);

        let swapped = manager.swap_activity_id(id);
        assert_eq!(swapped, fresh);
        assert_eq!(manager.activity_id(), id);

        manager.clear_activity_id();
        assert!(manager.activity_id().is_nil());
        manager.shutdown();
    }

    #[test]
    fn test_default_directory_resolution() {
        // Without DATADIR the default is relative to the working directory.
        // The variable is process-global, so only the unset shape is
        // asserted here.
        if std::env::var_os(DATA_DIRECTORY_VARIABLE).is_none() {
            assert_eq!(resolve_default_directory(), PathBuf::from("./logs"));
        }
    }
}
