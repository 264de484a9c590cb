//! # Event Model
//!
//! Core vocabulary of the trace logging platform: the immutable
//! [`TraceEvent`] record, the typed [`EventValue`] scalars it carries, the
//! [`Level`] severity ordering, provider identity, declarative
//! [`Subscription`] filters, the thread-local activity slot, and the binary
//! record codec used by trace files and the reader side.
//!
//! Everything in this crate is plain data: no I/O, no background work. The
//! sink and runtime crates build on these types.

pub mod activity;
pub mod error;
pub mod event;
pub mod level;
pub mod provider;
pub mod record;
pub mod subscription;
pub mod value;

pub use error::{EventError, Result};
pub use event::{TraceEvent, TraceEventBuilder};
pub use level::Level;
pub use provider::ProviderDescriptor;
pub use record::{RecordKind, RecordReader, RecordWriter};
pub use subscription::Subscription;
pub use value::EventValue;
