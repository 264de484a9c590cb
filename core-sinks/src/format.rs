//! Text line formatting.
//!
//! The one-line grammar shared by text, console and memory sinks:
//!
//! ```text
//! <time-or-offset>? (activity-hex)? [pid/tid/l:Provider EventName] name=value ...
//! ```
//!
//! Sections toggled off by the format flags disappear together with their
//! separating space.

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use core_events::{EventValue, TraceEvent};
use std::fmt::Write as _;

bitflags! {
    /// Combinable rendering options for text-formatted sinks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FormatFlags: u32 {
        /// Absolute event timestamp.
        const TIMESTAMP = 1 << 0;
        /// Seconds since the sink started, instead of the timestamp.
        const TIME_OFFSET = 1 << 1;
        /// Parenthesized activity GUID when one is set.
        const ACTIVITY_ID = 1 << 2;
        /// Process and thread identifiers inside the bracket section.
        const PROCESS_THREAD = 1 << 3;
    }
}

impl Default for FormatFlags {
    fn default() -> Self {
        FormatFlags::TIMESTAMP | FormatFlags::ACTIVITY_ID | FormatFlags::PROCESS_THREAD
    }
}

/// Renders one event as a text line (no trailing newline).
///
/// `TIME_OFFSET` wins over `TIMESTAMP` when both are set.
pub fn format_line(event: &TraceEvent, flags: FormatFlags, sink_start: DateTime<Utc>) -> String {
    let mut line = String::with_capacity(96);

    if flags.contains(FormatFlags::TIME_OFFSET) {
        let offset = event
            .timestamp()
            .signed_duration_since(sink_start)
            .num_milliseconds() as f64
            / 1000.0;
        let _ = write!(line, "{:.3}", offset);
    } else if flags.contains(FormatFlags::TIMESTAMP) {
        let _ = write!(line, "{}", event.timestamp().format("%Y-%m-%d %H:%M:%S%.3f"));
    }

    if flags.contains(FormatFlags::ACTIVITY_ID) && !event.activity_id().is_nil() {
        if !line.is_empty() {
            line.push(' ');
        }
        let _ = write!(line, "({})", event.activity_id().simple());
    }

    if !line.is_empty() {
        line.push(' ');
    }
    line.push('[');
    if flags.contains(FormatFlags::PROCESS_THREAD) {
        let _ = write!(line, "{}/{}/", event.process_id(), event.thread_id());
    }
    let _ = write!(
        line,
        "{}:{} {}]",
        event.level().letter(),
        event.provider_name(),
        event.event_name()
    );

    for (name, value) in event.parameters() {
        line.push(' ');
        line.push_str(name);
        line.push('=');
        append_value(&mut line, value);
    }

    line
}

fn append_value(line: &mut String, value: &EventValue) {
    match value {
        EventValue::Str(text) => {
            line.push('"');
            for c in text.chars() {
                match c {
                    '\n' => line.push_str("\\n"),
                    '\r' => line.push_str("\\r"),
                    '\t' => line.push_str("\\t"),
                    '"' => line.push_str("\\\""),
                    '\\' => line.push_str("\\\\"),
                    other => line.push(other),
                }
            }
            line.push('"');
        }
        other => {
            let _ = write!(line, "{}", other);
        }
    }
}
