//! # Log Configuration
//!
//! Descriptors for sinks and for the whole logging process.
//!
//! ## Overview
//!
//! A [`LogConfig`] describes one sink: its kind, the provider subscriptions
//! feeding it, filters, and the kind-specific properties (file lifecycle,
//! network endpoint). A [`LoggingConfig`] bundles the full set of logs plus
//! the process-wide binary-logging gate, and is what the manager installs.
//!
//! Validation is side-effect-free and happens in two stages: structural
//! rules here (the kind/property matrix, value ranges, uniqueness), then the
//! manager applies capability-dependent rewrites (binary-logging demotion)
//! at install time.
//!
//! ## Freezing
//!
//! Once a sink has been instantiated from a `LogConfig`, the descriptor is
//! frozen: every later property write fails with `ConflictingState`. Clones
//! share the frozen flag, so holding a copy does not reopen the window.
//!
//! ## JSON
//!
//! `LogConfig`, `LoggingConfig` and `Subscription` round-trip through
//! `serde_json`: `parse(stringify(x)) == x` for every valid value.

use crate::error::{Error, Result};
use core_events::Subscription;
use core_sinks::{FilenameTemplate, FilterChain, SinkKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Smallest accepted time-based rotation interval, in seconds.
pub const MIN_ROTATION_INTERVAL: u64 = 60;

/// Largest accepted time-based rotation interval, in seconds.
pub const MAX_ROTATION_INTERVAL: u64 = 86_400;

/// Buffer budget bounds, in megabytes.
pub const MIN_BUFFER_SIZE_MB: u64 = 1;
pub const MAX_BUFFER_SIZE_MB: u64 = 1024;

/// Default buffer budget for a sink.
pub const DEFAULT_BUFFER_SIZE_MB: u64 = 1;

fn default_buffer_size_mb() -> u64 {
    DEFAULT_BUFFER_SIZE_MB
}

/// Process-wide gate over binary trace sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryLogging {
    /// Defer to the host capability probe.
    #[default]
    None,
    /// Admit trace sinks unconditionally.
    Enabled,
    /// Rewrite trace sinks as text sinks of the same name.
    Disabled,
}

/// Configuration of a single sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    name: String,
    kind: SinkKind,
    #[serde(default)]
    subscriptions: Vec<Subscription>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    filters: Vec<String>,
    #[serde(default = "default_buffer_size_mb")]
    buffer_size_mb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    directory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filename_template: Option<String>,
    #[serde(default)]
    timestamp_local: bool,
    /// Seconds between time-based rotations; absent disables the clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rotation_interval: Option<u64>,
    /// Retention: prior files older than this many seconds are deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    maximum_age: Option<u64>,
    /// Retention: newest-first cumulative byte budget for prior files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    maximum_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip, default)]
    frozen: Arc<AtomicBool>,
}

/// Equality ignores the freeze flag: a frozen config still equals its
/// serialized round-trip.
impl PartialEq for LogConfig {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.subscriptions == other.subscriptions
            && self.filters == other.filters
            && self.buffer_size_mb == other.buffer_size_mb
            && self.directory == other.directory
            && self.filename_template == other.filename_template
            && self.timestamp_local == other.timestamp_local
            && self.rotation_interval == other.rotation_interval
            && self.maximum_age == other.maximum_age
            && self.maximum_size == other.maximum_size
            && self.hostname == other.hostname
            && self.port == other.port
    }
}

impl Eq for LogConfig {}

impl LogConfig {
    /// Starts a descriptor for the given kind. Console sinks use an empty
    /// name.
    pub fn new(name: impl Into<String>, kind: SinkKind) -> Self {
        Self {
            name: name.into(),
            kind,
            subscriptions: Vec::new(),
            filters: Vec::new(),
            buffer_size_mb: DEFAULT_BUFFER_SIZE_MB,
            directory: None,
            filename_template: None,
            timestamp_local: false,
            rotation_interval: None,
            maximum_age: None,
            maximum_size: None,
            hostname: None,
            port: None,
            frozen: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SinkKind {
        self.kind
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    pub fn buffer_size_mb(&self) -> u64 {
        self.buffer_size_mb
    }

    pub fn directory(&self) -> Option<&PathBuf> {
        self.directory.as_ref()
    }

    pub fn filename_template(&self) -> Option<&str> {
        self.filename_template.as_deref()
    }

    pub fn timestamp_local(&self) -> bool {
        self.timestamp_local
    }

    pub fn rotation_interval(&self) -> Option<u64> {
        self.rotation_interval
    }

    pub fn maximum_age(&self) -> Option<u64> {
        self.maximum_age
    }

    pub fn maximum_size(&self) -> Option<u64> {
        self.maximum_size
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Marks the descriptor immutable. Called when a sink is instantiated
    /// from it.
    pub(crate) fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::ConflictingState(format!(
                "log configuration '{}' is frozen: a sink was already created from it",
                self.name
            )));
        }
        Ok(())
    }

    pub fn add_subscription(&mut self, subscription: Subscription) -> Result<()> {
        self.ensure_mutable()?;
        subscription.validate()?;
        self.subscriptions.push(subscription);
        Ok(())
    }

    pub fn add_filter(&mut self, pattern: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        self.filters.push(pattern.into());
        Ok(())
    }

    pub fn set_buffer_size_mb(&mut self, buffer_size_mb: u64) -> Result<()> {
        self.ensure_mutable()?;
        self.buffer_size_mb = buffer_size_mb;
        Ok(())
    }

    pub fn set_directory(&mut self, directory: impl Into<PathBuf>) -> Result<()> {
        self.ensure_mutable()?;
        self.directory = Some(directory.into());
        Ok(())
    }

    pub fn set_filename_template(&mut self, template: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        self.filename_template = Some(template.into());
        Ok(())
    }

    pub fn set_timestamp_local(&mut self, local: bool) -> Result<()> {
        self.ensure_mutable()?;
        self.timestamp_local = local;
        Ok(())
    }

    pub fn set_rotation_interval(&mut self, seconds: u64) -> Result<()> {
        self.ensure_mutable()?;
        self.rotation_interval = Some(seconds);
        Ok(())
    }

    pub fn set_maximum_age(&mut self, seconds: u64) -> Result<()> {
        self.ensure_mutable()?;
        self.maximum_age = Some(seconds);
        Ok(())
    }

    pub fn set_maximum_size(&mut self, bytes: u64) -> Result<()> {
        self.ensure_mutable()?;
        self.maximum_size = Some(bytes);
        Ok(())
    }

    pub fn set_hostname(&mut self, hostname: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        self.hostname = Some(hostname.into());
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<()> {
        self.ensure_mutable()?;
        self.port = Some(port);
        Ok(())
    }

    /// A copy of this descriptor rewritten as a text sink: same name,
    /// subscriptions and file lifecycle. Used by the binary-logging gate.
    pub(crate) fn demote_to_text(&self) -> LogConfig {
        let mut demoted = self.clone();
        demoted.kind = SinkKind::Text;
        demoted.frozen = Arc::new(AtomicBool::new(false));
        demoted
    }

    /// Structural validation against the kind/property matrix.
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            SinkKind::Console | SinkKind::Memory => {
                if !self.name.is_empty() {
                    return Err(Error::InvalidConfiguration(format!(
                        "{} sinks are unnamed, got '{}'",
                        self.kind, self.name
                    )));
                }
            }
            _ => {
                if self.name.is_empty() {
                    return Err(Error::InvalidConfiguration(format!(
                        "{} sinks need a name",
                        self.kind
                    )));
                }
            }
        }

        if self.subscriptions.is_empty() {
            return Err(Error::InvalidConfiguration(format!(
                "log '{}' needs at least one subscription",
                self.name
            )));
        }
        for subscription in &self.subscriptions {
            subscription.validate()?;
        }

        if !(MIN_BUFFER_SIZE_MB..=MAX_BUFFER_SIZE_MB).contains(&self.buffer_size_mb) {
            return Err(Error::InvalidConfiguration(format!(
                "buffer size {} MB is outside [{}, {}]",
                self.buffer_size_mb, MIN_BUFFER_SIZE_MB, MAX_BUFFER_SIZE_MB
            )));
        }

        if !self.filters.is_empty() {
            if !self.kind.supports_filters() {
                return Err(Error::InvalidConfiguration(format!(
                    "{} sinks do not support filters",
                    self.kind
                )));
            }
            // Compiles the chain so duplicates and bad patterns surface at
            // configuration time rather than on the writer thread.
            FilterChain::new(&self.filters)?;
        }

        if self.kind.is_file_backed() {
            if let Some(seconds) = self.rotation_interval {
                if !(MIN_ROTATION_INTERVAL..=MAX_ROTATION_INTERVAL).contains(&seconds) {
                    return Err(Error::InvalidConfiguration(format!(
                        "rotation interval {} s is outside [{}, {}]",
                        seconds, MIN_ROTATION_INTERVAL, MAX_ROTATION_INTERVAL
                    )));
                }
            }
            if let Some(template) = &self.filename_template {
                FilenameTemplate::parse(template)?;
            }
        } else {
            if self.directory.is_some()
                || self.filename_template.is_some()
                || self.rotation_interval.is_some()
                || self.maximum_age.is_some()
                || self.maximum_size.is_some()
                || self.timestamp_local
            {
                return Err(Error::InvalidConfiguration(format!(
                    "{} sinks have no file lifecycle properties",
                    self.kind
                )));
            }
        }

        if self.kind == SinkKind::Network {
            if self.hostname.as_deref().unwrap_or("").is_empty() {
                return Err(Error::InvalidConfiguration(
                    "network sinks need a hostname".to_string(),
                ));
            }
            if self.port.unwrap_or(0) == 0 {
                return Err(Error::InvalidConfiguration(
                    "network sinks need a non-zero port".to_string(),
                ));
            }
        } else if self.hostname.is_some() || self.port.is_some() {
            return Err(Error::InvalidConfiguration(format!(
                "hostname/port are only valid on network sinks, not {}",
                self.kind
            )));
        }

        Ok(())
    }
}

/// The full configuration the manager installs: every log plus the
/// binary-logging gate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub logs: Vec<LogConfig>,
    #[serde(default)]
    pub allow_binary_logging: BinaryLogging,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(mut self, log: LogConfig) -> Self {
        self.logs.push(log);
        self
    }

    pub fn with_binary_logging(mut self, gate: BinaryLogging) -> Self {
        self.allow_binary_logging = gate;
        self
    }

    /// Structural validation of the whole set.
    pub fn validate(&self) -> Result<()> {
        let mut console_seen = false;
        for (index, log) in self.logs.iter().enumerate() {
            log.validate()?;

            if log.kind() == SinkKind::Memory {
                return Err(Error::InvalidConfiguration(
                    "memory sinks cannot be declared in a configuration".to_string(),
                ));
            }
            if log.kind() == SinkKind::Console {
                if console_seen {
                    return Err(Error::InvalidConfiguration(
                        "at most one console sink may be configured".to_string(),
                    ));
                }
                console_seen = true;
            }

            let name = log.name().to_lowercase();
            if !name.is_empty()
                && self.logs[..index]
                    .iter()
                    .any(|prior| prior.name().to_lowercase() == name)
            {
                return Err(Error::InvalidConfiguration(format!(
                    "duplicate log name '{}'",
                    log.name()
                )));
            }
        }
        Ok(())
    }

    /// Merges `other` on top of this configuration: logs with the same name
    /// are replaced, new logs appended, and the right-hand binary-logging
    /// gate wins when it says anything. A resulting `Disabled` gate
    /// rewrites trace logs in the merged set to text.
    pub fn merge(mut self, other: LoggingConfig) -> LoggingConfig {
        for log in other.logs {
            let name = log.name().to_lowercase();
            match self
                .logs
                .iter_mut()
                .find(|prior| !name.is_empty() && prior.name().to_lowercase() == name)
            {
                Some(slot) => *slot = log,
                None => self.logs.push(log),
            }
        }
        if other.allow_binary_logging != BinaryLogging::None {
            self.allow_binary_logging = other.allow_binary_logging;
        }
        if self.allow_binary_logging == BinaryLogging::Disabled {
            for log in &mut self.logs {
                if log.kind() == SinkKind::EventTracing {
                    *log = log.demote_to_text();
                }
            }
        }
        self
    }

    /// Parses and validates JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: LoggingConfig = serde_json::from_str(text)
            .map_err(|e| Error::InvalidConfiguration(format!("configuration JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Canonical JSON form; the inverse of [`LoggingConfig::from_json`].
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::InvalidConfiguration(format!("configuration JSON: {}", e)))
    }
}

/// Side-effect-free validity probe for configuration text.
pub fn is_configuration_valid(text: &str) -> bool {
    LoggingConfig::from_json(text).is_ok()
}
