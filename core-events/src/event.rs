//! The immutable event record.

use crate::activity;
use crate::error::{EventError, Result};
use crate::level::Level;
use crate::provider::ProviderDescriptor;
use crate::value::EventValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(1);

thread_local! {
    static THREAD_ID: u32 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Stable per-thread identifier stamped onto events.
pub fn current_thread_id() -> u32 {
    THREAD_ID.with(|id| *id)
}

/// A single trace event.
///
/// Events are immutable once built: the routing engine hands the same record
/// to every admitting sink behind an `Arc`, so nothing downstream may mutate
/// it. Timestamps are truncated to millisecond precision at construction,
/// matching the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
    provider_id: Uuid,
    provider_name: String,
    id: u16,
    event_name: String,
    version: u8,
    level: Level,
    opcode: u8,
    keywords: u64,
    activity_id: Uuid,
    process_id: u32,
    thread_id: u32,
    parameters: Vec<(String, EventValue)>,
}

impl TraceEvent {
    /// Starts building an event for the given provider.
    pub fn builder(
        provider: &ProviderDescriptor,
        id: u16,
        event_name: impl Into<String>,
    ) -> TraceEventBuilder {
        TraceEventBuilder {
            provider_id: provider.id(),
            provider_name: provider.name().to_string(),
            id,
            event_name: event_name.into(),
            version: 0,
            level: Level::Informational,
            opcode: 0,
            keywords: 0,
            timestamp: None,
            activity_id: None,
            parameters: Vec::new(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn provider_id(&self) -> Uuid {
        self.provider_id
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    /// Symbolic event name; composed names use a `Task/Opcode` shape.
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn keywords(&self) -> u64 {
        self.keywords
    }

    /// Activity identifier; nil when no activity was set at emission.
    pub fn activity_id(&self) -> Uuid {
        self.activity_id
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    /// Named parameters in declaration order.
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &EventValue)> {
        self.parameters.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Looks up a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&EventValue> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }
}

/// Builder for [`TraceEvent`].
///
/// `build()` captures whatever context was not set explicitly: the current
/// time, the thread's activity slot, and the process/thread identifiers.
#[derive(Debug)]
pub struct TraceEventBuilder {
    provider_id: Uuid,
    provider_name: String,
    id: u16,
    event_name: String,
    version: u8,
    level: Level,
    opcode: u8,
    keywords: u64,
    timestamp: Option<DateTime<Utc>>,
    activity_id: Option<Uuid>,
    parameters: Vec<(String, EventValue)>,
}

impl TraceEventBuilder {
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    pub fn opcode(mut self, opcode: u8) -> Self {
        self.opcode = opcode;
        self
    }

    pub fn keywords(mut self, keywords: u64) -> Self {
        self.keywords = keywords;
        self
    }

    /// Overrides the capture timestamp (truncated to milliseconds).
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Overrides the activity identifier instead of reading the slot.
    pub fn activity_id(mut self, activity_id: Uuid) -> Self {
        self.activity_id = Some(activity_id);
        self
    }

    /// Appends a named parameter. Order of calls is preserved.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<EventValue>) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }

    /// Finishes the record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the event name is empty or a parameter
    /// name is empty or duplicated.
    pub fn build(self) -> Result<TraceEvent> {
        if self.event_name.is_empty() {
            return Err(EventError::InvalidArgument(
                "event name cannot be empty".to_string(),
            ));
        }
        for (index, (name, _)) in self.parameters.iter().enumerate() {
            if name.is_empty() {
                return Err(EventError::InvalidArgument(
                    "parameter names cannot be empty".to_string(),
                ));
            }
            if self.parameters[..index].iter().any(|(n, _)| n == name) {
                return Err(EventError::InvalidArgument(format!(
                    "duplicate parameter name '{}'",
                    name
                )));
            }
        }

        let raw = self.timestamp.unwrap_or_else(Utc::now);
        let timestamp = DateTime::from_timestamp_millis(raw.timestamp_millis())
            .unwrap_or(raw);
        let activity_id = self.activity_id.unwrap_or_else(activity::get);

        Ok(TraceEvent {
            timestamp,
            provider_id: self.provider_id,
            provider_name: self.provider_name,
            id: self.id,
            event_name: self.event_name,
            version: self.version,
            level: self.level,
            opcode: self.opcode,
            keywords: self.keywords,
            activity_id,
            process_id: std::process::id(),
            thread_id: current_thread_id(),
            parameters: self.parameters,
        })
    }
}
