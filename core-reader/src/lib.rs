//! # Trace Readers
//!
//! The replay side of the platform: processors that turn persisted or live
//! binary traces back into [`core_events::TraceEvent`]s, plus the expiring
//! collection used to correlate multi-part events.
//!
//! Three processors share one subscription surface:
//! - [`FileProcessor`] replays prerecorded `.etl` record files
//! - [`RealtimeProcessor`] drains a named live session as a task
//! - [`MockProcessor`] feeds injected events to consumers under test

pub mod composite;
pub mod error;
pub mod file;
pub mod mock;
pub mod processor;
pub mod realtime;

pub use composite::{CompositeEvent, ExpiringCompositeCollection};
pub use error::{ReaderError, Result};
pub use file::FileProcessor;
pub use mock::{MockInjector, MockProcessor};
pub use processor::{
    EventCallback, EventKinds, EventProcessor, ProcessSummary, SessionCallback, SessionNotice,
};
pub use realtime::RealtimeProcessor;
