//! # Event Sinks
//!
//! Destinations for routed trace events. A [`Sink`] pairs a bounded command
//! queue with a dedicated writer thread, so emission never blocks on I/O:
//! the hot path hands an `Arc`'d event to the queue and returns, and
//! overflow drops the event while incrementing the sink's lost counter.
//!
//! Five kinds exist behind one type:
//! - **Text**: formatted lines to rotating `.log` files
//! - **EventTracing**: binary record frames to rotating `.etl` files, also
//!   published to the live session registry
//! - **Memory**: formatted lines into a byte-bounded ring buffer
//! - **Console**: formatted lines to standard output
//! - **Network**: JSON records over TCP to a remote collector
//!
//! File-backed kinds own the on-disk lifecycle: filename templating, the
//! rotation clock and age/size retention live in [`file`].

pub mod buffer;
pub mod error;
pub mod file;
pub mod filter;
pub mod format;
pub mod session;
pub mod sink;

mod backend;

pub use buffer::{BufferSnapshot, LineRing};
pub use error::{Result, SinkError};
pub use file::{FileSinkSettings, FilenameTemplate, RetentionPolicy, RotationClock};
pub use filter::FilterChain;
pub use format::FormatFlags;
pub use sink::{Sink, SinkIdentity, SinkKind, SinkSettings, SinkStats};
