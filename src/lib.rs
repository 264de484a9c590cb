//! Workspace placeholder crate.
//!
//! This crate exists to expose the individual workspace crates behind a
//! single dependency. Host applications can depend on `tracelog-workspace`
//! and reach the event model, sinks, runtime and readers without wiring
//! each crate individually.

pub use core_events as events;
pub use core_reader as reader;
pub use core_runtime as runtime;
pub use core_sinks as sinks;
